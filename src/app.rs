//! Wiring from [`Settings`] to the pieces that do the work. Each binary calls exactly one of the `run_*`
//! functions.

use crate::{
    compact::{
        CompactionReport,
        Compactor,
        TimeGrid,
    },
    cycle::{
        CollectionCycle,
        CycleReport,
    },
    error::WaitsError,
    fetch::HttpFetcher,
    gate::OperatingWindow,
    seed::{
        self,
        SeedReport,
    },
    store::{
        FileStore,
        MasterClient,
        MasterSeedReport,
        RemoteStore,
        RestClient,
        SnapshotStore,
    },
    sync::{
        SyncPublisher,
        SystemGit,
    },
    time::NormalizedTime,
};
use chrono::{
    DateTime,
    Utc,
};
use eyre::{
    Context as _,
    Result,
};
use park_waits_config::{
    Backend,
    Catalog,
    CatalogSource,
    RemoteCredentials,
    Settings,
    REMOTE_KEY_VAR,
    REMOTE_URL_VAR,
};
use std::time::Duration;

fn missing_credentials(purpose: &str) -> WaitsError {
    WaitsError::ConfigMissing(format!("{REMOTE_URL_VAR} and {REMOTE_KEY_VAR} are required for {purpose}"))
}

/// One collection cycle at `now`. Only configuration problems are returned as errors; everything that
/// goes wrong per park is in the report.
#[instrument(skip_all, fields(backend = %settings.backend))]
pub async fn run_collection(
    settings: &Settings,
    credentials: Option<RemoteCredentials>,
    now: DateTime<Utc>,
) -> Result<CycleReport> {
    let timeout = settings.fetch_timeout()?;

    if credentials.is_none() {
        match settings.backend {
            Backend::Remote => return Err(missing_credentials("backend = remote").into()),
            Backend::Mirror => warn!(
                "MIRROR BACKEND WITHOUT CREDENTIALS: {REMOTE_URL_VAR}/{REMOTE_KEY_VAR} are not set, snapshots go to the file store only"
            ),
            Backend::File => {}
        }
    }

    let at = NormalizedTime::from_instant(now);
    let window = OperatingWindow::from(settings.window);
    if !window.permits(at.hour) {
        info!(hour = at.hour, window = %window, "Outside the operating window, nothing to collect");
        return Ok(CycleReport::skipped(at));
    }

    let catalog = resolve_catalog(settings, credentials.as_ref(), timeout).await?;

    let mut stores: Vec<Box<dyn SnapshotStore + Send + Sync>> = Vec::new();
    if settings.backend != Backend::Remote {
        stores.push(Box::new(FileStore::new(&settings.data_dir)));
    }
    if settings.backend != Backend::File {
        if let Some(credentials) = &credentials {
            stores.push(Box::new(RemoteStore::new(RestClient::new(credentials.clone(), timeout)?)));
        }
    }

    let mut cycle = CollectionCycle::new(&catalog, Box::new(HttpFetcher::new(timeout)?), stores, window);
    if settings.sync.enabled {
        if settings.backend == Backend::Remote {
            info!("Sync publishes the file store, which the remote backend does not write");
        } else {
            let pathspec = std::path::absolute(&settings.data_dir).wrap_err("Failed to resolve data_dir")?;
            cycle = cycle.with_publisher(SyncPublisher::new(
                Box::new(SystemGit::new(&settings.sync.repo_dir)),
                pathspec.to_string_lossy(),
            ));
        }
    }

    Ok(cycle.run(at).await)
}

/// The remote master tables when asked for and reachable, the local catalog otherwise.
async fn resolve_catalog(
    settings: &Settings,
    credentials: Option<&RemoteCredentials>,
    timeout: Duration,
) -> Result<Catalog> {
    if settings.catalog_source == CatalogSource::Remote {
        match credentials {
            Some(credentials) => {
                let master = MasterClient::new(RestClient::new(credentials.clone(), timeout)?);
                match master.load_catalog().await {
                    Ok(catalog) => {
                        info!(parks = catalog.parks().len(), rides = catalog.rides().len(), "Catalog loaded from the master tables");
                        return Ok(catalog);
                    }
                    Err(e) => warn!("Loading the remote catalog failed, using the local one: {e:#}"),
                }
            }
            None => warn!("catalog_source is remote but no credentials are set, using the local catalog"),
        }
    }
    settings.local_catalog()
}

pub fn run_compaction(settings: &Settings) -> Result<CompactionReport> {
    let grid = TimeGrid::from(settings.compaction);
    info!(root = %settings.data_dir.display(), keys = grid.len(), "Compacting");
    Compactor::new(&settings.data_dir, grid).run()
}

pub async fn run_snapshot_seed(settings: &Settings, credentials: Option<RemoteCredentials>) -> Result<SeedReport> {
    let credentials = credentials.ok_or_else(|| missing_credentials("seeding snapshots"))?;
    let catalog = settings.local_catalog()?;

    let (rows, skipped) = seed::collect_rows(&settings.data_dir, &catalog)?;
    for file in &skipped {
        warn!(path = %file.path.display(), "Skipping: {}", file.reason);
    }
    info!(rows = rows.len(), skipped = skipped.len(), "Collected snapshots from {}", settings.data_dir.display());

    let client = RestClient::new(credentials, settings.fetch_timeout()?)?;
    Ok(seed::seed_snapshots(&client, &rows, settings.seed_batch_size).await)
}

pub async fn run_master_seed(settings: &Settings, credentials: Option<RemoteCredentials>) -> Result<MasterSeedReport> {
    let credentials = credentials.ok_or_else(|| missing_credentials("seeding the master tables"))?;
    let catalog = settings.local_catalog()?;
    let master = MasterClient::new(RestClient::new(credentials, settings.fetch_timeout()?)?);
    master.seed(&catalog).await.wrap_err("Seeding the master tables failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        dead_url,
        serve,
    };
    use chrono::TimeZone as _;
    use park_waits_config::{
        CompactionSettings,
        SyncSettings,
        WindowSettings,
    };
    use pretty_assertions::assert_eq;
    use temp_dir::TempDir;
    use url::Url;

    fn settings(dir: &TempDir, backend: Backend) -> Settings {
        Settings {
            data_dir: dir.child("data"),
            config_dir: dir.child("config"),
            backend,
            catalog_source: CatalogSource::Embedded,
            catalog_file: None,
            fetch_timeout: "5s".to_string(),
            seed_batch_size: 100,
            window: WindowSettings {
                start_hour: 9,
                end_hour: 21,
            },
            compaction: CompactionSettings {
                start_hour: 9,
                end_hour: 21,
                step_minutes: 15,
            },
            sync: SyncSettings {
                enabled: false,
                repo_dir: dir.path().to_path_buf(),
            },
        }
    }

    /// Two parks whose upstream endpoints are the given URLs.
    fn write_catalog(dir: &TempDir, land: &Url, sea: &Url) -> std::path::PathBuf {
        let path = dir.child("catalog.yaml");
        let yaml = format!(
            "parks:\n  - {{ key: land, name: 東京ディズニーランド, api_id: 274, folder: TDL, source_url: \"{land}\" }}\n  - {{ key: sea, name: 東京ディズニーシー, api_id: 275, folder: TDS, source_url: \"{sea}\" }}\n"
        );
        std::fs::write(&path, yaml).unwrap();
        path
    }

    fn noon_in_tokyo() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 5, 3, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn remote_backend_without_credentials_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = run_collection(&settings(&dir, Backend::Remote), None, noon_in_tokyo())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<WaitsError>(), Some(WaitsError::ConfigMissing(_))));
        assert!(!dir.child("data").exists());
    }

    #[tokio::test]
    async fn seeding_without_credentials_is_fatal() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir, Backend::File);
        for err in [
            run_snapshot_seed(&settings, None).await.unwrap_err(),
            run_master_seed(&settings, None).await.map(|_| ()).unwrap_err(),
        ] {
            assert!(err.downcast_ref::<WaitsError>().is_some_and(WaitsError::is_fatal));
        }
    }

    #[tokio::test]
    async fn outside_the_window_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir, Backend::File);
        let dead = dead_url().await;
        settings.catalog_file = Some(write_catalog(&dir, &dead, &dead));

        let report = run_collection(&settings, None, Utc.with_ymd_and_hms(2026, 2, 5, 22, 0, 0).unwrap())
            .await
            .unwrap();
        assert!(report.outside_window);
        assert!(!dir.child("data").exists());
    }

    #[tokio::test]
    async fn partial_failure_writes_one_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir, Backend::Mirror);
        let (land, _land_server) = serve(vec![(
            200,
            r#"{"lands":[],"rides":[{"id":1,"name":"X","is_open":true,"wait_time":45}]}"#.to_string(),
        )])
        .await;
        let (sea, _sea_server) = serve(vec![(500, "{}".to_string())]).await;
        settings.catalog_file = Some(write_catalog(&dir, &land, &sea));

        let report = run_collection(&settings, None, noon_in_tokyo()).await.unwrap();
        assert_eq!(report.stored(), 1);
        assert_eq!(report.fetch_failures(), 1);

        let written: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.child("data").join("TDL/2026/02/land_2026-02-05.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written["records"][0]["time"], "12:00");
        assert_eq!(written["records"][0]["rides"][0]["wait_time"], 45);
        assert!(!dir.child("data").join("TDS").exists());
    }

    #[tokio::test]
    async fn remote_catalog_failure_falls_back_to_the_local_one() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir, Backend::File);
        settings.catalog_source = CatalogSource::Remote;
        let credentials = RemoteCredentials {
            url: dead_url().await,
            service_key: "service-key".to_string(),
        };

        let catalog = resolve_catalog(&settings, Some(&credentials), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(catalog, Catalog::embedded().unwrap());
    }

    #[test]
    fn compaction_uses_the_configured_grid() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir, Backend::File);
        settings.compaction.step_minutes = 30;
        let path = dir.child("data").join("TDL/2026/02/land_2026-02-05.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"date":"2026-02-05","park":"東京ディズニーランド","records":[{"time":"09:00"},{"time":"09:15"},{"time":"09:30"}]}"#,
        )
        .unwrap();

        let report = run_compaction(&settings).unwrap();
        assert_eq!((report.total_before(), report.total_after()), (3, 2));
    }
}
