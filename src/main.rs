use simulation::{simulate, simulate_scaling};
use tracing_subscriber::EnvFilter;
pub mod simulation;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(async_main()) {
        eprintln!("simulation failed: {}", e);
        std::process::exit(1);
    }
}

async fn async_main() -> concord_sync::Result<()> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            REPLICATION SIMULATIONS                          ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut converged = true;

    // Run 1: small cluster
    let stats = simulate(3, 100, 200, 7).await?;
    stats.print();
    converged &= stats.converged;

    // Run 2: medium cluster
    let stats = simulate(8, 400, 1000, 11).await?;
    stats.print();
    converged &= stats.converged;

    // Run 3: scaling analysis
    converged &= simulate_scaling(12, 4, 23).await?;

    if converged {
        println!("\n✓ All replicas converged in every run!");
    } else {
        println!("\n✗ Divergence detected, rerun with RUST_LOG=debug for details");
        std::process::exit(2);
    }
    Ok(())
}
