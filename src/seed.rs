//! Bulk loading of the file store into the remote snapshot table.

use crate::{
    compact::{
        find_json_files,
        SkippedFile,
    },
    snapshot::DailyRecord,
    store::remote::{
        RestClient,
        RestError,
        SnapshotRow,
        SNAPSHOT_TABLE,
    },
};
use eyre::Result;
use park_waits_config::Catalog;
use std::path::Path;

/// Every snapshot below `root`, flattened into table rows. The park comes from the file name prefix
/// (`land_2026-02-05.json`); files whose prefix is not a catalog park, or that do not parse, are skipped.
pub fn collect_rows(root: &Path, catalog: &Catalog) -> Result<(Vec<SnapshotRow>, Vec<SkippedFile>)> {
    let mut rows = Vec::new();
    let (paths, mut skipped) = find_json_files(root)?;

    for path in paths {
        let prefix = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.split_once('_'))
            .map(|(prefix, _)| prefix);
        let Some(park) = prefix.and_then(|prefix| catalog.park(prefix)) else {
            skipped.push(SkippedFile {
                path,
                reason: "file name does not start with a known park key".to_string(),
            });
            continue;
        };

        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) => {
                skipped.push(SkippedFile {
                    path,
                    reason: format!("unreadable: {e}"),
                });
                continue;
            }
        };
        let record: DailyRecord = match serde_json::from_slice(&content) {
            Ok(record) => record,
            Err(e) => {
                skipped.push(SkippedFile {
                    path,
                    reason: format!("not a daily record: {e}"),
                });
                continue;
            }
        };

        debug!(path = %path.display(), snapshots = record.records.len(), "Collected");
        rows.extend(
            record
                .records
                .iter()
                .map(|snapshot| SnapshotRow::new(&park.key, &record.date, snapshot)),
        );
    }

    Ok((rows, skipped))
}

#[derive(Debug)]
pub struct SeedReport {
    pub total: usize,
    pub inserted: usize,
    /// The failure that stopped the load, if any. Rows after the failed batch were not attempted.
    pub error: Option<RestError>,
}

/// Inserts `rows` in batches of `batch_size`, stopping at the first batch the remote rejects.
#[instrument(skip_all, fields(total = rows.len(), batch_size = batch_size))]
pub async fn seed_snapshots(client: &RestClient, rows: &[SnapshotRow], batch_size: usize) -> SeedReport {
    let mut report = SeedReport {
        total: rows.len(),
        inserted: 0,
        error: None,
    };

    for batch in rows.chunks(batch_size.max(1)) {
        if let Err(e) = client.insert(SNAPSHOT_TABLE, batch).await {
            error!(inserted = report.inserted, "Batch insert failed: {e}");
            report.error = Some(e);
            break;
        }
        report.inserted += batch.len();
        info!("Inserted {}/{}", report.inserted, report.total);
    }

    report
}
