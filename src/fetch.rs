use crate::error::WaitsError;
use park_waits_config::ParkDescriptor;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::Value;
use std::{
    future::Future,
    pin::Pin,
    time::Duration,
};

/// A ride as reported by queue-times.com. Fields beyond these four are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRide {
    pub id: i64,
    pub name: String,
    pub is_open: bool,
    pub wait_time: Option<u32>,
}

impl ApiRide {
    /// Reads one entry of the `rides` array without judging it. Missing or oddly typed fields fall back
    /// to empty values and a wait that is not a non-negative number becomes `None`. Only an entry without
    /// a usable id is dropped, since nothing downstream can refer to it.
    pub fn from_entry(entry: &Value) -> Option<Self> {
        let id = match entry.get("id")? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        Some(Self {
            id,
            name: entry.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            is_open: entry.get("is_open").and_then(Value::as_bool).unwrap_or_default(),
            wait_time: entry.get("wait_time").and_then(lenient_minutes),
        })
    }
}

fn lenient_minutes(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(minutes) => u32::try_from(minutes).ok(),
            None => n
                .as_f64()
                .filter(|m| m.is_finite() && *m >= 0.0 && *m <= f64::from(u32::MAX))
                .map(|m| m.round() as u32),
        },
        _ => None,
    }
}

/// Only the envelope is strict: a body without a `rides` array is a failed fetch.
#[derive(Debug, Deserialize)]
struct QueueTimesResponse {
    rides: Vec<Value>,
}

/// Anything that can report the current rides of a park.
pub trait WaitTimeSource {
    fn fetch<'a>(
        &'a self,
        park: &'a ParkDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ApiRide>, WaitsError>> + Send + 'a>>;
}

/// Fetches `ParkDescriptor::source_url` once per call. There are no retries; a failed park waits for the
/// next scheduled cycle.
pub struct HttpFetcher {
    http_client: HttpClient,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> eyre::Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http_client })
    }

    async fn fetch_rides(&self, park: &ParkDescriptor) -> Result<Vec<ApiRide>, WaitsError> {
        let url = park
            .source_url()
            .map_err(|e| WaitsError::fetch(&park.name, format!("invalid source URL: {e}")))?;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| WaitsError::fetch(&park.name, format!("transport error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WaitsError::fetch(&park.name, format!("HTTP status {}", status.as_u16())));
        }

        let body: QueueTimesResponse = response
            .json()
            .await
            .map_err(|e| WaitsError::fetch(&park.name, format!("malformed body: {e}")))?;

        let rides: Vec<ApiRide> = body.rides.iter().filter_map(ApiRide::from_entry).collect();
        if rides.len() < body.rides.len() {
            warn!(park = %park.key, dropped = body.rides.len() - rides.len(), "Ride entries without an id");
        }
        Ok(rides)
    }
}

impl WaitTimeSource for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        park: &'a ParkDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ApiRide>, WaitsError>> + Send + 'a>> {
        Box::pin(self.fetch_rides(park))
    }
}

/// Fetches one park and turns any failure into a logged `None`, so the caller can move on to the next
/// park.
pub async fn fetch_or_skip(source: &(dyn WaitTimeSource + Send + Sync), park: &ParkDescriptor) -> Option<Vec<ApiRide>> {
    match source.fetch(park).await {
        Ok(rides) => {
            debug!(park = %park.key, rides = rides.len(), "Fetched rides");
            Some(rides)
        }
        Err(e) => {
            error!(park = %park.key, "{e}");
            None
        }
    }
}
