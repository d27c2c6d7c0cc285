//! PostgREST access to the remote tables: snapshot inserts plus the master catalog tables.

use super::{
    AppendOutcome,
    SnapshotStore,
};
use crate::{
    error::WaitsError,
    snapshot::{
        RideSample,
        Snapshot,
    },
    time::NormalizedTime,
};
use park_waits_config::{
    Area,
    Catalog,
    ParkDescriptor,
    RemoteCredentials,
    RideInfo,
};
use reqwest::{
    Client as HttpClient,
    RequestBuilder,
};
use serde::{
    de::DeserializeOwned,
    Deserialize,
    Serialize,
};
use std::{
    future::Future,
    pin::Pin,
    time::Duration,
};
use url::Url;

pub const SNAPSHOT_TABLE: &str = "wait_time_snapshots";

#[derive(thiserror::Error, Debug)]
pub enum RestError {
    #[error("invalid table URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{table} answered HTTP {status}: {body}")]
    Status { table: String, status: u16, body: String },
}

/// Thin client for `{url}/rest/v1/{table}`.
#[derive(Clone)]
pub struct RestClient {
    http_client: HttpClient,
    credentials: RemoteCredentials,
}

impl RestClient {
    pub fn new(credentials: RemoteCredentials, timeout: Duration) -> eyre::Result<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            credentials,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/rest/v1/{table}",
            self.credentials.url.as_str().trim_end_matches('/')
        ))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.credentials.service_key)
            .bearer_auth(&self.credentials.service_key)
    }

    async fn check(table: &str, response: reqwest::Response) -> Result<reqwest::Response, RestError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RestError::Status {
            table: table.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    pub async fn insert<T: Serialize + ?Sized>(&self, table: &str, rows: &T) -> Result<(), RestError> {
        let request = self
            .http_client
            .post(self.table_url(table)?)
            .header("Prefer", "return=minimal")
            .json(rows);
        let response = self.authorized(request).send().await?;
        Self::check(table, response).await?;
        Ok(())
    }

    /// Insert-or-update keyed by `on_conflict`, so re-running a seed never trips a unique constraint.
    pub async fn upsert<T: Serialize + ?Sized>(&self, table: &str, on_conflict: &str, rows: &T) -> Result<(), RestError> {
        let request = self
            .http_client
            .post(self.table_url(table)?)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        let response = self.authorized(request).send().await?;
        Self::check(table, response).await?;
        Ok(())
    }

    pub async fn select<T: DeserializeOwned>(&self, table: &str, order: &str) -> Result<Vec<T>, RestError> {
        let request = self
            .http_client
            .get(self.table_url(table)?)
            .query(&[("select", "*"), ("order", order)])
            .header("Accept", "application/json");
        let response = self.authorized(request).send().await?;
        let rows = Self::check(table, response).await?.json().await?;
        Ok(rows)
    }
}

/// One row of `wait_time_snapshots`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub park_id: String,
    pub date: String,
    pub time: String,
    pub timestamp: String,
    pub rides: Vec<RideSample>,
}

impl SnapshotRow {
    pub fn new(park_id: &str, date_key: &str, snapshot: &Snapshot) -> Self {
        Self {
            park_id: park_id.to_string(),
            date: date_key.to_string(),
            time: snapshot.time.clone(),
            timestamp: snapshot.timestamp.clone(),
            rides: snapshot.rides.clone(),
        }
    }
}

/// Inserts each snapshot as its own row without reading anything back.
pub struct RemoteStore {
    client: RestClient,
}

impl RemoteStore {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    async fn insert_snapshot(
        &self,
        park: &ParkDescriptor,
        at: &NormalizedTime,
        snapshot: &Snapshot,
    ) -> Result<AppendOutcome, WaitsError> {
        let row = SnapshotRow::new(&park.key, &at.date_key, snapshot);
        self.client
            .insert(SNAPSHOT_TABLE, &[row])
            .await
            .map_err(|e| WaitsError::write(&park.name, e))?;
        debug!(park = %park.key, time = %snapshot.time, "Snapshot row inserted");
        Ok(AppendOutcome::default())
    }
}

impl SnapshotStore for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn append<'a>(
        &'a self,
        park: &'a ParkDescriptor,
        at: &'a NormalizedTime,
        snapshot: &'a Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<AppendOutcome, WaitsError>> + Send + 'a>> {
        Box::pin(self.insert_snapshot(park, at, snapshot))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkRow {
    pub park_id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub api_id: u32,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaRow {
    pub park_id: String,
    pub area_key: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideRow {
    pub park_id: String,
    pub ride_id: i64,
    pub area_key: String,
    pub name: String,
}

/// Read and write access to the `parks`, `areas` and `rides` master tables.
pub struct MasterClient {
    client: RestClient,
}

impl MasterClient {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn load_catalog(&self) -> eyre::Result<Catalog> {
        let parks: Vec<ParkRow> = self.client.select("parks", "park_id").await?;
        let areas: Vec<AreaRow> = self.client.select("areas", "park_id,area_key").await?;
        let rides: Vec<RideRow> = self.client.select("rides", "park_id,ride_id").await?;

        Catalog::new(
            parks
                .into_iter()
                .map(|p| ParkDescriptor {
                    key: p.park_id,
                    name: p.name,
                    api_id: p.api_id,
                    icon: p.icon.unwrap_or_default(),
                    folder: p.folder,
                    source_url: None,
                })
                .collect(),
            areas
                .into_iter()
                .map(|a| Area {
                    park: a.park_id,
                    key: a.area_key,
                    name: a.name,
                    icon: a.icon.unwrap_or_default(),
                })
                .collect(),
            rides
                .into_iter()
                .map(|r| RideInfo {
                    park: r.park_id,
                    id: r.ride_id,
                    area: r.area_key,
                    name: r.name,
                })
                .collect(),
        )
    }

    /// Upserts the whole catalog, parks first so the foreign keys of areas and rides resolve. Stops at
    /// the first table that fails.
    pub async fn seed(&self, catalog: &Catalog) -> Result<MasterSeedReport, RestError> {
        let parks: Vec<ParkRow> = catalog
            .parks()
            .iter()
            .map(|p| ParkRow {
                park_id: p.key.clone(),
                name: p.name.clone(),
                icon: Some(p.icon.clone()),
                api_id: p.api_id,
                folder: p.folder.clone(),
            })
            .collect();
        let areas: Vec<AreaRow> = catalog
            .areas()
            .iter()
            .map(|a| AreaRow {
                park_id: a.park.clone(),
                area_key: a.key.clone(),
                name: a.name.clone(),
                icon: Some(a.icon.clone()),
            })
            .collect();
        let rides: Vec<RideRow> = catalog
            .rides()
            .iter()
            .map(|r| RideRow {
                park_id: r.park.clone(),
                ride_id: r.id,
                area_key: r.area.clone(),
                name: r.name.clone(),
            })
            .collect();

        self.client.upsert("parks", "park_id", &parks).await?;
        info!(rows = parks.len(), "parks upserted");
        self.client.upsert("areas", "park_id,area_key", &areas).await?;
        info!(rows = areas.len(), "areas upserted");
        self.client.upsert("rides", "park_id,ride_id", &rides).await?;
        info!(rows = rides.len(), "rides upserted");

        Ok(MasterSeedReport {
            parks: parks.len(),
            areas: areas.len(),
            rides: rides.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterSeedReport {
    pub parks: usize,
    pub areas: usize,
    pub rides: usize,
}
