use clap::Parser;
use color_eyre::Result;
use park_waits::{
    app,
    logging,
    RemoteCredentials,
    Settings,
};
use tracing::info;

/// Upserts the park, area and ride catalog into the remote master tables.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    Args::parse();
    logging::init()?;

    let settings = Settings::load()?;
    let report = app::run_master_seed(&settings, RemoteCredentials::from_env()?).await?;

    info!(parks = report.parks, areas = report.areas, rides = report.rides, "Master tables seeded");
    Ok(())
}
