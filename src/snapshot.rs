//! Records as they are persisted, plus the projection from upstream rides into them.

use crate::{
    fetch::ApiRide,
    time::NormalizedTime,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideSample {
    pub id: i64,
    pub name: String,
    pub is_open: bool,
    /// Minutes. `None` is persisted as `null` when upstream does not know.
    pub wait_time: Option<u32>,
}

/// One observation of every ride of a park.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time: String,
    pub timestamp: String,
    pub rides: Vec<RideSample>,
    /// Fields written by other tools. Carried through appends untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// All snapshots of one park on one date, in the order they were collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: String,
    pub park: String,
    pub records: Vec<Snapshot>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DailyRecord {
    pub fn new(date_key: &str, park_name: &str) -> Self {
        Self {
            date: date_key.to_string(),
            park: park_name.to_string(),
            records: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn has_time(&self, time_key: &str) -> bool {
        self.records.iter().any(|r| r.time == time_key)
    }
}

/// Keeps the four fields the store cares about and drops whatever else upstream sent.
pub fn assemble(rides: &[ApiRide], at: &NormalizedTime) -> Snapshot {
    Snapshot {
        time: at.time_key.clone(),
        timestamp: at.timestamp.clone(),
        rides: rides
            .iter()
            .map(|ride| RideSample {
                id: ride.id,
                name: ride.name.clone(),
                is_open: ride.is_open,
                wait_time: ride.wait_time,
            })
            .collect(),
        extra: Map::new(),
    }
}

/// Headline numbers for the collection log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub open: usize,
    pub total: usize,
    /// Rounded mean over open rides reporting a positive wait; 0 when there are none.
    pub average_wait: u32,
}

impl Snapshot {
    pub fn stats(&self) -> SnapshotStats {
        let open = self.rides.iter().filter(|r| r.is_open).count();
        let waits: Vec<u32> = self
            .rides
            .iter()
            .filter(|r| r.is_open)
            .filter_map(|r| r.wait_time)
            .filter(|w| *w > 0)
            .collect();
        let average_wait = if waits.is_empty() {
            0
        } else {
            let sum: u64 = waits.iter().map(|w| u64::from(*w)).sum();
            (sum as f64 / waits.len() as f64).round() as u32
        };
        SnapshotStats {
            open,
            total: self.rides.len(),
            average_wait,
        }
    }
}
