use super::{
    AppendOutcome,
    SnapshotStore,
};
use crate::{
    error::WaitsError,
    snapshot::{
        DailyRecord,
        Snapshot,
    },
    time::NormalizedTime,
};
use park_waits_config::ParkDescriptor;
use std::{
    future::Future,
    io::ErrorKind,
    path::{
        Path,
        PathBuf,
    },
    pin::Pin,
};

/// Target of the structured event emitted when a partition had to be discarded.
pub const CORRUPTION_TARGET: &str = "park_waits::corruption";

/// JSON partitions laid out as `{root}/{folder}/{YYYY}/{MM}/{park}_{YYYY-MM-DD}.json`.
///
/// Precondition: at most one writer per partition at a time. Cycles must not overlap (the external
/// scheduler guarantees this); there is no file locking.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_path(&self, park: &ParkDescriptor, at: &NormalizedTime) -> PathBuf {
        self.root
            .join(&park.folder)
            .join(format!("{:04}", at.year()))
            .join(format!("{:02}", at.month()))
            .join(format!("{}_{}.json", park.key, at.date_key))
    }

    /// Reads the partition. A missing file yields a fresh container; an unreadable one yields a fresh
    /// container plus the `StoreReadCorrupt` that explains what was discarded.
    pub async fn load(
        &self,
        path: &Path,
        park: &ParkDescriptor,
        date_key: &str,
    ) -> (DailyRecord, Option<WaitsError>) {
        let fresh = || DailyRecord::new(date_key, &park.name);
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return (fresh(), None),
            Err(e) => return (fresh(), Some(corrupt(path, e))),
        };
        match serde_json::from_slice::<DailyRecord>(&content) {
            Ok(record) => (record, None),
            Err(e) => (fresh(), Some(corrupt(path, e))),
        }
    }

    async fn append_snapshot(
        &self,
        park: &ParkDescriptor,
        at: &NormalizedTime,
        snapshot: &Snapshot,
    ) -> Result<AppendOutcome, WaitsError> {
        let path = self.partition_path(park, at);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| WaitsError::write(&park.name, format!("creating {dir:?}: {e}")))?;
        }

        let (mut record, corruption) = self.load(&path, park, &at.date_key).await;
        let recovered_corrupt = corruption.map(|e| {
            warn!(
                target: CORRUPTION_TARGET,
                event = "store_read_corrupt",
                park = %park.key,
                path = %path.display(),
                "{e}; starting a fresh container"
            );
            path.clone()
        });

        let duplicate_time = record.has_time(&snapshot.time);
        if duplicate_time {
            warn!(park = %park.key, time = %snapshot.time, path = %path.display(), "Partition already holds a snapshot for this time");
        }

        record.records.push(snapshot.clone());

        let content = serde_json::to_vec_pretty(&record)
            .map_err(|e| WaitsError::write(&park.name, format!("serializing {path:?}: {e}")))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| WaitsError::write(&park.name, format!("writing {path:?}: {e}")))?;

        debug!(park = %park.key, path = %path.display(), records = record.records.len(), "Partition written");

        Ok(AppendOutcome {
            records: Some(record.records.len()),
            recovered_corrupt,
            duplicate_time,
        })
    }
}

fn corrupt(path: &Path, reason: impl ToString) -> WaitsError {
    WaitsError::StoreReadCorrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

impl SnapshotStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn append<'a>(
        &'a self,
        park: &'a ParkDescriptor,
        at: &'a NormalizedTime,
        snapshot: &'a Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<AppendOutcome, WaitsError>> + Send + 'a>> {
        Box::pin(self.append_snapshot(park, at, snapshot))
    }
}
