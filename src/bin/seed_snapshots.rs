use clap::Parser;
use color_eyre::Result;
use eyre::eyre;
use park_waits::{
    app,
    logging,
    RemoteCredentials,
    Settings,
};
use tracing::info;

/// Uploads every snapshot in the file store to the remote snapshot table.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    Args::parse();
    logging::init()?;

    let settings = Settings::load()?;
    let report = app::run_snapshot_seed(&settings, RemoteCredentials::from_env()?).await?;

    if let Some(e) = report.error {
        return Err(eyre!("Seeding stopped after {}/{} rows: {e}", report.inserted, report.total));
    }
    info!(inserted = report.inserted, "Seeding finished");
    Ok(())
}
