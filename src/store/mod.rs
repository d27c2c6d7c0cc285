//! # Record Store
//!
//! Appends one snapshot to the daily record of a park.
//!
//! - **`FileStore`**: one pretty-printed JSON container per (park, date) under the store root, rewritten in
//!   full on every append.
//! - **`RemoteStore`**: one row per snapshot in the `wait_time_snapshots` table; accumulation happens on the
//!   remote side.
//!
//! Both give at-least-once semantics. A cycle that is rescheduled after a partial failure may append a
//! second snapshot with the same time key; that is detected and logged, never silently dropped.

pub mod file;
pub mod remote;

use crate::{
    error::WaitsError,
    snapshot::Snapshot,
    time::NormalizedTime,
};
pub use file::FileStore;
use park_waits_config::ParkDescriptor;
pub use remote::{
    MasterClient,
    MasterSeedReport,
    RemoteStore,
    RestClient,
};
use std::{
    future::Future,
    path::PathBuf,
    pin::Pin,
};

/// What a successful append observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Snapshots in the partition after the append, when the backend can tell.
    pub records: Option<usize>,
    /// Set when an unreadable partition was replaced by a fresh container.
    pub recovered_corrupt: Option<PathBuf>,
    /// The partition already held a snapshot with this time key.
    pub duplicate_time: bool,
}

pub trait SnapshotStore {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn append<'a>(
        &'a self,
        park: &'a ParkDescriptor,
        at: &'a NormalizedTime,
        snapshot: &'a Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<AppendOutcome, WaitsError>> + Send + 'a>>;
}
