use chrono::Utc;
use clap::Parser;
use color_eyre::Result;
use park_waits::{
    app,
    logging,
    RemoteCredentials,
    Settings,
};
use tracing::warn;

/// Records one snapshot of the current wait times of every park.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    Args::parse();
    logging::init()?;

    let settings = Settings::load()?;
    let credentials = RemoteCredentials::from_env()?;
    let report = app::run_collection(&settings, credentials, Utc::now()).await?;

    if !report.outside_window && report.stored() == 0 {
        warn!("No park was stored in this cycle");
    }
    Ok(())
}
