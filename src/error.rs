use crate::sync::SyncStage;
use std::path::PathBuf;

/// Everything that can go wrong during collection. Only `ConfigMissing` aborts a run; the other
/// variants are logged and the affected park (or the sync step) is skipped.
#[derive(thiserror::Error, Debug)]
pub enum WaitsError {
    #[error("Fetching wait times for {park} failed: {reason}")]
    FetchFailed { park: String, reason: String },
    #[error("Partition {path:?} could not be read: {reason}")]
    StoreReadCorrupt { path: PathBuf, reason: String },
    #[error("Persisting the snapshot for {park} failed: {reason}")]
    StoreWriteFailed { park: String, reason: String },
    #[error("Sync failed during {stage}: {reason}")]
    SyncFailed { stage: SyncStage, reason: String },
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),
}

impl WaitsError {
    pub(crate) fn fetch(park: &str, reason: impl ToString) -> Self {
        Self::FetchFailed {
            park: park.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(park: &str, reason: impl ToString) -> Self {
        Self::StoreWriteFailed {
            park: park.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigMissing(_))
    }
}
