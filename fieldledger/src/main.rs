use anyhow::Result;
use clap::Parser;
use fieldledger::config::{Cli, Config};
use fieldledger_core::DataStore;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_cli(Cli::parse())?;

    let store = DataStore::open_with_policy(&config.data_file, config.policy);
    // fail fast on an unreadable or corrupt data file
    store.init().await?;
    store.count("projects").await?;

    let app = fieldledger::app(store);
    let listener = TcpListener::bind(config.addr).await?;
    info!(
        addr = %config.addr,
        data_file = %config.data_file.display(),
        "fieldledger listening"
    );
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
