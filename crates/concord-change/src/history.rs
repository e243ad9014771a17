//! Append-only log of the operations a replica has produced or applied.

use concord_core::{NodeId, Operation, OperationKind};

/// Ordered operation history of one replica.
///
/// Local operations are recorded when compiled, received ones after they
/// were applied. Entries are never rewritten, so an index into the history
/// stays valid for the lifetime of the replica.
#[derive(Clone, Debug, Default)]
pub struct History {
    entries: Vec<Operation>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation and return a reference to the stored entry.
    pub fn record(&mut self, op: Operation) -> &Operation {
        self.entries.push(op);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[Operation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Operation> {
        self.entries.last()
    }

    /// Entries recorded at or after `index`. Empty when out of range.
    pub fn since(&self, index: usize) -> &[Operation] {
        self.entries.get(index..).unwrap_or_default()
    }

    /// Number of entries of one kind.
    pub fn count(&self, kind: OperationKind) -> usize {
        self.entries.iter().filter(|op| op.kind() == kind).count()
    }

    /// Entries produced by `node`.
    pub fn produced_by<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Operation> + 'a {
        self.entries
            .iter()
            .filter(move |op| op.originator() == node)
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
