//! sched-worker — standalone dispatch loop for the resource-selection
//! scheduler.
//!
//! Wires the pieces together the way the engine does: env config seeds the
//! live registry, resources are enumerated from it, the flat-search pass is
//! registered on the chain, and the dispatcher loop runs until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use quiver_core::{Config, ConfigRegistry};
use quiver_sched::selector::{FlatSearchPass, PassChain};
use quiver_sched::{Dispatcher, ResourceManager};

// ── CLI ─────────────────────────────────────────────────────────────

/// Resource-selection scheduler worker.
#[derive(Parser, Debug)]
#[command(name = "sched-worker", version, about)]
struct Cli {
    /// Shutdown timeout in seconds.
    #[arg(long, env = "SCHED_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    quiver_core::config::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let registry = ConfigRegistry::new();
    config.seed_registry(&registry);

    let resources = ResourceManager::new(&registry);
    resources.enumerate()?;

    let mut chain = PassChain::new();
    chain.register(FlatSearchPass::new(&registry, &resources))?;

    let dispatcher = Arc::new(Dispatcher::new(chain, resources)?);

    let loop_handle = {
        let dispatcher = Arc::clone(&dispatcher);
        std::thread::spawn(move || dispatcher.run())
    };

    info!("sched-worker started");
    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, shutting down");

    dispatcher.shutdown();
    let deadline = Duration::from_secs(cli.shutdown_timeout);
    let join = tokio::task::spawn_blocking(move || loop_handle.join());
    match tokio::time::timeout(deadline, join).await {
        Ok(joined) => {
            joined?.map_err(|_| anyhow::anyhow!("dispatch loop panicked"))?;
        }
        Err(_) => {
            anyhow::bail!("dispatch loop did not stop within {:?}", deadline);
        }
    }

    info!("sched-worker exited cleanly");
    Ok(())
}
