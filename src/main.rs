mod cli;
mod run;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::warn;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use pastewatch_core::AppConfig;

use crate::cli::Cli;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    if cli.daemon {
        warn!("daemon mode is not implemented, staying in the foreground");
    }
    if cli.stats {
        warn!("stats reporting is not implemented");
    }

    let Some(config_path) = cli.config_path() else {
        bail!(
            "configuration file not found; create /etc/pastewatch.yaml, \
             ./pastewatch.yaml, or pass one with -c"
        );
    };
    let config = AppConfig::load(&config_path)?;

    run::run_monitor(config).await
}
