use clap::Parser;
use color_eyre::Result;
use park_waits::{
    app,
    logging,
    Settings,
};
use tracing::info;

/// Drops every stored snapshot that is not on the compaction grid.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {}

fn main() -> Result<()> {
    Args::parse();
    logging::init()?;

    let settings = Settings::load()?;
    let report = app::run_compaction(&settings)?;

    if report.is_empty() {
        info!(root = %settings.data_dir.display(), "No data files to compact");
        return Ok(());
    }

    info!(
        files = report.files.len(),
        skipped = report.skipped.len(),
        before = report.total_before(),
        after = report.total_after(),
        "Compaction finished"
    );
    Ok(())
}
