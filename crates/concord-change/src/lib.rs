//! # concord-change
//!
//! Change capture for Concord replicas.
//!
//! A [`ChangeCompiler`] observes the notifications a local store emits,
//! translates each into at most one replayable [`concord_core::Operation`]
//! and appends it to the replica's [`History`].

pub mod compiler;
pub mod error;
pub mod history;

pub use compiler::{ChangeCompiler, ClearReconstruction, CompilerConfig};
pub use error::{CompileError, Result};
pub use history::History;
