use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dotenv::dotenv;

use nsc_fetcher::archive::{ArchiveClient, ExposureFiles};
use nsc_fetcher::configure::load_config;
use nsc_fetcher::logger;

/// Download flux, weight, and mask files for rawname
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Exposure rawname
    #[clap(long)]
    rawname: String,
    /// Exposure flux file
    #[clap(long)]
    fluxfile: String,
    /// Exposure weight file
    #[clap(long)]
    wtfile: String,
    /// Exposure mask file
    #[clap(long)]
    maskfile: String,
    /// Directory to which files will be downloaded
    #[clap(long, default_value = ".")]
    outdir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();
    let config = load_config().context("failed to load configuration")?;
    logger::setup_logger(&config).map_err(|e| anyhow!("failed to set up logger: {}", e))?;

    let files = ExposureFiles {
        flux: args.fluxfile,
        mask: args.maskfile,
        weight: args.wtfile,
    };

    let client = ArchiveClient::new(&config.archive_url)?;
    let saved = client
        .fetch_exposure(&args.rawname, &files, &args.outdir)
        .await
        .with_context(|| format!("failed to fetch exposure {}", args.rawname))?;

    for path in saved {
        println!("{}", path.display());
    }
    Ok(())
}
