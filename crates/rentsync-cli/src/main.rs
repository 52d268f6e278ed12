mod config;
mod report;
mod run;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use rentsync_store::DuckStore;
use rentsync_sync::PlatformClient;
use tracing_subscriber::EnvFilter;

use crate::config::Cli;
use crate::run::run_sync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("rentsync v{}", env!("CARGO_PKG_VERSION"));

    let options = cli
        .run_options(Local::now().naive_local())
        .context("resolving sync window")?;

    let mut store = DuckStore::open_persistent(&cli.db)
        .with_context(|| format!("opening database {}", cli.db.display()))?;
    store.ensure_schema().context("creating tables")?;

    let platform = PlatformClient::new(cli.platform_config());
    let report = run_sync(&mut store, &platform, &options).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
