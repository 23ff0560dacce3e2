use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::info;

use nsc_fetcher::configure::load_config;
use nsc_fetcher::logger;
use nsc_fetcher::transfer::adapters::{
    GlobusAuthClient, GlobusTransferClient, JsonFileTokenStore, StdinCodeProvider,
};
use nsc_fetcher::transfer::ConsentAwareTransferSession;

/// Submit a transfer between two endpoints, granting endpoint consents on the way
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Source endpoint id
    #[clap(name = "SRC")]
    src: String,
    /// Destination endpoint id
    #[clap(name = "DST")]
    dst: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();
    let config = load_config().context("failed to load configuration")?;
    logger::setup_logger(&config).map_err(|e| anyhow!("failed to set up logger: {}", e))?;

    let task = config
        .transfer_task(&args.src, &args.dst)
        .map_err(|e| anyhow!("{} (set transfer_items in the config file)", e))?;
    info!(
        "Transfer {} -> {} with {} item(s)",
        task.source_endpoint(),
        task.destination_endpoint(),
        task.items().len()
    );

    let auth = GlobusAuthClient::new(&config.client_id, &config.auth_base_url)?;
    let transfer = GlobusTransferClient::new(&config.transfer_base_url)?;

    let mut session = ConsentAwareTransferSession::new(
        Arc::new(auth),
        Arc::new(transfer),
        Arc::new(StdinCodeProvider::new()),
    )
    .with_code_timeout(Duration::from_secs(config.auth_code_timeout_secs));

    if config.persist_tokens {
        let store = JsonFileTokenStore::from_config_path(&config.token_file);
        info!("Using token file {}", store.path().display());
        session = session.with_store(Arc::new(store));
    }

    let task_id = session.run(&task).await.context("transfer was not submitted")?;
    println!("submitted transfer, task_id={}", task_id);

    Ok(())
}
