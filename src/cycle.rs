//! # Collection cycle
//!
//! One pass over the catalog: gate, then per park fetch, assemble and append to every configured store,
//! then publish. Parks are handled one after another in catalog order and a failure in one park never
//! affects the next. Nothing in here returns an error; the outcome of every step is in the
//! [`CycleReport`].

use crate::{
    error::WaitsError,
    fetch::{
        fetch_or_skip,
        WaitTimeSource,
    },
    gate::OperatingWindow,
    snapshot::{
        assemble,
        Snapshot,
        SnapshotStats,
    },
    store::{
        AppendOutcome,
        SnapshotStore,
    },
    sync::{
        SyncOutcome,
        SyncPublisher,
        SyncStage,
    },
    time::NormalizedTime,
};
use park_waits_config::{
    Catalog,
    ParkDescriptor,
};
use std::{
    path::Path,
    sync::Arc,
};

#[derive(Debug)]
pub enum ParkStatus {
    Stored {
        stats: SnapshotStats,
        appended: Vec<(&'static str, AppendOutcome)>,
        /// Backends that rejected the snapshot while at least one other accepted it.
        failed: Vec<(&'static str, String)>,
    },
    FetchFailed,
    StoreFailed {
        failed: Vec<(&'static str, String)>,
    },
}

#[derive(Debug)]
pub struct ParkReport {
    pub park: String,
    pub status: ParkStatus,
    /// Rides in the snapshot that the catalog does not know about.
    pub unknown_rides: usize,
}

#[derive(Debug)]
pub struct CycleReport {
    pub at: NormalizedTime,
    pub outside_window: bool,
    pub parks: Vec<ParkReport>,
    pub sync: Option<Result<SyncOutcome, WaitsError>>,
}

impl CycleReport {
    pub fn new(at: NormalizedTime) -> Self {
        Self {
            at,
            outside_window: false,
            parks: Vec::new(),
            sync: None,
        }
    }

    pub fn skipped(at: NormalizedTime) -> Self {
        Self {
            outside_window: true,
            ..Self::new(at)
        }
    }

    pub fn stored(&self) -> usize {
        self.parks
            .iter()
            .filter(|p| matches!(p.status, ParkStatus::Stored { .. }))
            .count()
    }

    pub fn fetch_failures(&self) -> usize {
        self.parks
            .iter()
            .filter(|p| matches!(p.status, ParkStatus::FetchFailed))
            .count()
    }

    pub fn store_failures(&self) -> usize {
        self.parks
            .iter()
            .filter(|p| matches!(p.status, ParkStatus::StoreFailed { .. }))
            .count()
    }

    /// Partitions that were unreadable and got replaced during this cycle.
    pub fn recovered_corrupt(&self) -> Vec<&Path> {
        self.parks
            .iter()
            .filter_map(|p| match &p.status {
                ParkStatus::Stored { appended, .. } => Some(appended),
                _ => None,
            })
            .flatten()
            .filter_map(|(_, outcome)| outcome.recovered_corrupt.as_deref())
            .collect()
    }
}

pub struct CollectionCycle<'a> {
    catalog: &'a Catalog,
    source: Box<dyn WaitTimeSource + Send + Sync>,
    stores: Vec<Box<dyn SnapshotStore + Send + Sync>>,
    window: OperatingWindow,
    publisher: Option<Arc<SyncPublisher>>,
}

impl<'a> CollectionCycle<'a> {
    pub fn new(
        catalog: &'a Catalog,
        source: Box<dyn WaitTimeSource + Send + Sync>,
        stores: Vec<Box<dyn SnapshotStore + Send + Sync>>,
        window: OperatingWindow,
    ) -> Self {
        Self {
            catalog,
            source,
            stores,
            window,
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: SyncPublisher) -> Self {
        self.publisher = Some(Arc::new(publisher));
        self
    }

    #[instrument(skip_all, fields(at = %at.timestamp))]
    pub async fn run(&self, at: NormalizedTime) -> CycleReport {
        if !self.window.permits(at.hour) {
            info!(hour = at.hour, window = %self.window, "Outside the operating window, nothing to collect");
            return CycleReport::skipped(at);
        }

        info!(date = %at.date_key, time = %at.time_key, parks = self.catalog.parks().len(), "Collection started");
        let mut report = CycleReport::new(at);

        for park in self.catalog.parks() {
            let park_report = self.collect_park(park, &report.at).await;
            report.parks.push(park_report);
        }

        if report.stored() > 0 {
            if let Some(publisher) = &self.publisher {
                let result = Self::publish(publisher, &report.at.timestamp).await;
                if let Err(e) = &result {
                    let hint = match e {
                        WaitsError::SyncFailed { stage, .. } => stage.remediation(),
                        _ => "",
                    };
                    error!(hint, "{e}");
                }
                report.sync = Some(result);
            }
        }

        info!(
            stored = report.stored(),
            fetch_failures = report.fetch_failures(),
            store_failures = report.store_failures(),
            "Collection finished"
        );
        report
    }

    /// Git runs as child processes that block until they exit, so the pipeline goes to the blocking pool.
    async fn publish(publisher: &Arc<SyncPublisher>, timestamp: &str) -> Result<SyncOutcome, WaitsError> {
        let publisher = Arc::clone(publisher);
        let timestamp = timestamp.to_string();
        tokio::task::spawn_blocking(move || publisher.publish(&timestamp))
            .await
            .unwrap_or_else(|e| {
                Err(WaitsError::SyncFailed {
                    stage: SyncStage::Stage,
                    reason: format!("git task did not complete: {e}"),
                })
            })
    }

    async fn collect_park(&self, park: &ParkDescriptor, at: &NormalizedTime) -> ParkReport {
        info!(park = %park.key, "Fetching {}", park.name);

        let Some(rides) = fetch_or_skip(self.source.as_ref(), park).await else {
            return ParkReport {
                park: park.key.clone(),
                status: ParkStatus::FetchFailed,
                unknown_rides: 0,
            };
        };

        let snapshot = assemble(&rides, at);
        let unknown_rides = self.unknown_rides(park, &snapshot);

        let mut appended = Vec::new();
        let mut failed = Vec::new();
        for store in &self.stores {
            match store.append(park, at, &snapshot).await {
                Ok(outcome) => appended.push((store.name(), outcome)),
                Err(e) => {
                    error!(park = %park.key, backend = store.name(), "{e}");
                    failed.push((store.name(), e.to_string()));
                }
            }
        }

        let status = if appended.is_empty() {
            ParkStatus::StoreFailed { failed }
        } else {
            let stats = snapshot.stats();
            info!(
                park = %park.key,
                open = stats.open,
                total = stats.total,
                average_wait = stats.average_wait,
                "Snapshot stored"
            );
            ParkStatus::Stored {
                stats,
                appended,
                failed,
            }
        };

        ParkReport {
            park: park.key.clone(),
            status,
            unknown_rides,
        }
    }

    fn unknown_rides(&self, park: &ParkDescriptor, snapshot: &Snapshot) -> usize {
        if self.catalog.rides_for(&park.key).next().is_none() {
            return 0;
        }
        let unknown: Vec<_> = snapshot
            .rides
            .iter()
            .filter(|r| self.catalog.ride(&park.key, r.id).is_none())
            .collect();
        for ride in &unknown {
            debug!(park = %park.key, id = ride.id, name = %ride.name, "Ride missing from catalog");
        }
        unknown.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        fetch::ApiRide,
        snapshot::DailyRecord,
        store::FileStore,
        sync::tests::ScriptedGit,
    };
    use chrono::{
        TimeZone as _,
        Utc,
    };
    use pretty_assertions::assert_eq;
    use std::{
        collections::HashMap,
        future::Future,
        pin::Pin,
    };
    use temp_dir::TempDir;

    /// Serves canned rides per park key; parks without an entry fail like an HTTP 500.
    pub(crate) struct StaticSource(pub HashMap<String, Vec<ApiRide>>);

    impl WaitTimeSource for StaticSource {
        fn fetch<'a>(
            &'a self,
            park: &'a ParkDescriptor,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<ApiRide>, WaitsError>> + Send + 'a>> {
            Box::pin(async move {
                self.0
                    .get(&park.key)
                    .cloned()
                    .ok_or_else(|| WaitsError::fetch(&park.name, "HTTP status 500"))
            })
        }
    }

    struct RejectingStore;

    impl SnapshotStore for RejectingStore {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        fn append<'a>(
            &'a self,
            park: &'a ParkDescriptor,
            _at: &'a NormalizedTime,
            _snapshot: &'a Snapshot,
        ) -> Pin<Box<dyn Future<Output = Result<AppendOutcome, WaitsError>> + Send + 'a>> {
            Box::pin(async move { Err(WaitsError::write(&park.name, "disk full")) })
        }
    }

    fn rides(wait: u32) -> Vec<ApiRide> {
        vec![ApiRide {
            id: 1,
            name: "X".to_string(),
            is_open: true,
            wait_time: Some(wait),
        }]
    }

    fn at(hour_utc: u32, minute: u32) -> NormalizedTime {
        NormalizedTime::from_instant(Utc.with_ymd_and_hms(2026, 2, 5, hour_utc, minute, 0).unwrap())
    }

    fn source(entries: &[(&str, Vec<ApiRide>)]) -> Box<StaticSource> {
        Box::new(StaticSource(
            entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        ))
    }

    fn read_record(store: &FileStore, catalog: &Catalog, park: &str, at: &NormalizedTime) -> DailyRecord {
        let path = store.partition_path(catalog.park(park).unwrap(), at);
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn end_to_end_into_an_empty_store() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::embedded().unwrap();
        let store = FileStore::new(dir.path());
        let cycle = CollectionCycle::new(
            &catalog,
            source(&[("land", rides(45)), ("sea", rides(10))]),
            vec![Box::new(store.clone())],
            OperatingWindow::new(9, 21),
        );

        let now = at(3, 0);
        let report = cycle.run(now.clone()).await;
        assert_eq!(report.stored(), 2);

        let written: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("TDL/2026/02/land_2026-02-05.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            written,
            serde_json::json!({
                "date": "2026-02-05",
                "park": "東京ディズニーランド",
                "records": [{
                    "time": "12:00",
                    "timestamp": "2026-02-05T12:00:00+09:00",
                    "rides": [{"id": 1, "name": "X", "is_open": true, "wait_time": 45}]
                }]
            })
        );
        assert_eq!(read_record(&store, &catalog, "sea", &now).park, "東京ディズニーシー");
    }

    #[tokio::test]
    async fn one_park_failing_does_not_affect_the_other() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::embedded().unwrap();
        let store = FileStore::new(dir.path());
        let cycle = CollectionCycle::new(
            &catalog,
            source(&[("land", rides(45))]),
            vec![Box::new(store.clone())],
            OperatingWindow::new(9, 21),
        );

        let report = cycle.run(at(3, 0)).await;
        assert_eq!(report.stored(), 1);
        assert_eq!(report.fetch_failures(), 1);
        assert!(matches!(report.parks[1].status, ParkStatus::FetchFailed));
        assert!(dir.path().join("TDL/2026/02/land_2026-02-05.json").exists());
        assert!(!dir.path().join("TDS").exists());
    }

    #[tokio::test]
    async fn repeated_cycles_append_in_order() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::embedded().unwrap();
        let store = FileStore::new(dir.path());

        let times: Vec<_> = (0..6).map(|i| at(1 + i, 15)).collect();
        for (i, now) in times.iter().enumerate() {
            let cycle = CollectionCycle::new(
                &catalog,
                source(&[("land", rides(i as u32 * 5))]),
                vec![Box::new(store.clone())],
                OperatingWindow::new(9, 21),
            );
            cycle.run(now.clone()).await;
        }

        let record = read_record(&store, &catalog, "land", &times[0]);
        assert_eq!(record.records.len(), 6);
        let waits: Vec<_> = record.records.iter().map(|r| r.rides[0].wait_time.unwrap()).collect();
        assert_eq!(waits, vec![0, 5, 10, 15, 20, 25]);
        let keys: Vec<_> = record.records.iter().map(|r| r.time.as_str()).collect();
        assert_eq!(keys, vec!["10:15", "11:15", "12:15", "13:15", "14:15", "15:15"]);
    }

    #[tokio::test]
    async fn corrupt_partition_yields_a_single_snapshot() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::embedded().unwrap();
        let store = FileStore::new(dir.path());
        let now = at(3, 0);
        let path = store.partition_path(catalog.park("land").unwrap(), &now);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "\u{0}\u{0}garbage").unwrap();

        let cycle = CollectionCycle::new(
            &catalog,
            source(&[("land", rides(45))]),
            vec![Box::new(store.clone())],
            OperatingWindow::new(9, 21),
        );
        let report = cycle.run(now.clone()).await;

        assert_eq!(report.recovered_corrupt(), vec![path.as_path()]);
        let record = read_record(&store, &catalog, "land", &now);
        assert_eq!(record.records.len(), 1);
        assert_eq!(record.date, "2026-02-05");
    }

    #[tokio::test]
    async fn outside_the_window_nothing_happens() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::embedded().unwrap();
        let git = ScriptedGit::default().with_exit("diff", 1);
        let cycle = CollectionCycle::new(
            &catalog,
            source(&[("land", rides(45)), ("sea", rides(45))]),
            vec![Box::new(FileStore::new(dir.path()))],
            OperatingWindow::new(9, 21),
        )
        .with_publisher(SyncPublisher::new(Box::new(git.clone()), "data"));

        // 13:00 UTC is 22:00 in Tokyo.
        let report = cycle.run(at(13, 0)).await;
        assert!(report.outside_window);
        assert!(report.parks.is_empty());
        assert!(report.sync.is_none());
        assert!(git.calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // 12:59 UTC is 21:59, still inside the inclusive upper bound.
        assert!(!cycle.run(at(12, 59)).await.outside_window);
    }

    #[tokio::test]
    async fn store_failure_is_reported_and_skips_sync() {
        let catalog = Catalog::embedded().unwrap();
        let git = ScriptedGit::default().with_exit("diff", 1);
        let cycle = CollectionCycle::new(
            &catalog,
            source(&[("land", rides(45)), ("sea", rides(45))]),
            vec![Box::new(RejectingStore)],
            OperatingWindow::new(9, 21),
        )
        .with_publisher(SyncPublisher::new(Box::new(git.clone()), "data"));

        let report = cycle.run(at(3, 0)).await;
        assert_eq!(report.store_failures(), 2);
        assert!(report.sync.is_none());
        assert!(git.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_rejecting_backend_does_not_lose_the_snapshot() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::embedded().unwrap();
        let cycle = CollectionCycle::new(
            &catalog,
            source(&[("land", rides(45))]),
            vec![Box::new(FileStore::new(dir.path())), Box::new(RejectingStore)],
            OperatingWindow::new(9, 21),
        );

        let report = cycle.run(at(3, 0)).await;
        match &report.parks[0].status {
            ParkStatus::Stored { appended, failed, .. } => {
                assert_eq!(appended.len(), 1);
                assert_eq!(failed[0].0, "rejecting");
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sync_failure_does_not_fail_the_cycle() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::embedded().unwrap();
        let git = ScriptedGit::default().with_exit("diff", 1).with_exit("push", 1);
        let cycle = CollectionCycle::new(
            &catalog,
            source(&[("land", rides(45)), ("sea", rides(45))]),
            vec![Box::new(FileStore::new(dir.path()))],
            OperatingWindow::new(9, 21),
        )
        .with_publisher(SyncPublisher::new(Box::new(git.clone()), "data"));

        let report = cycle.run(at(3, 0)).await;
        assert_eq!(report.stored(), 2);
        assert!(matches!(report.sync, Some(Err(WaitsError::SyncFailed { .. }))));
        assert_eq!(git.subcommands(), vec!["add", "diff", "pull", "commit", "push"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sync_runs_off_the_async_workers() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::embedded().unwrap();
        let git = ScriptedGit::default().with_exit("diff", 1);
        let cycle = CollectionCycle::new(
            &catalog,
            source(&[("land", rides(45))]),
            vec![Box::new(FileStore::new(dir.path()))],
            OperatingWindow::new(9, 21),
        )
        .with_publisher(SyncPublisher::new(Box::new(git.clone()), "data"));

        let report = cycle.run(at(3, 0)).await;
        assert!(matches!(report.sync, Some(Ok(SyncOutcome::Published { .. }))));
        let calls = git.calls.lock().unwrap().clone();
        assert_eq!(calls[3], "commit -m data: wait times 2026-02-05T12:00:00+09:00 -- data");
    }

    #[tokio::test]
    async fn counts_rides_missing_from_the_catalog() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::embedded().unwrap();
        let mut land = rides(45);
        land.push(ApiRide {
            id: 7994,
            name: "ビッグサンダー・マウンテン".to_string(),
            is_open: true,
            wait_time: Some(60),
        });
        let cycle = CollectionCycle::new(
            &catalog,
            source(&[("land", land)]),
            vec![Box::new(FileStore::new(dir.path()))],
            OperatingWindow::new(9, 21),
        );

        let report = cycle.run(at(3, 0)).await;
        assert_eq!(report.parks[0].unknown_rides, 1);
    }
}
