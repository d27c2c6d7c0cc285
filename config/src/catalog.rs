//! Master data for the parks being collected.
//!
//! The catalog is loaded once at startup and passed by reference to whatever needs it. There is no
//! process-wide lookup table.

use eyre::{
    eyre,
    Context as _,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashSet,
    path::Path,
};
use url::Url;

const DEFAULT_CATALOG: &str = include_str!("default-catalog.yaml");

/// One park that gets polled. `key` doubles as the file name prefix of its partitions and as `park_id`
/// in the remote tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkDescriptor {
    pub key: String,
    pub name: String,
    pub api_id: u32,
    #[serde(default)]
    pub icon: String,
    pub folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<Url>,
}

impl ParkDescriptor {
    /// The upstream endpoint, either the explicit override or the queue-times.com URL for `api_id`.
    pub fn source_url(&self) -> Result<Url, url::ParseError> {
        match &self.source_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(&format!(
                "https://queue-times.com/parks/{}/queue_times.json",
                self.api_id
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub park: String,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideInfo {
    pub park: String,
    pub id: i64,
    pub area: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    parks: Vec<ParkDescriptor>,
    #[serde(default)]
    areas: Vec<Area>,
    #[serde(default)]
    rides: Vec<RideInfo>,
}

impl Catalog {
    pub fn new(parks: Vec<ParkDescriptor>, areas: Vec<Area>, rides: Vec<RideInfo>) -> Result<Self> {
        let catalog = Self { parks, areas, rides };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The catalog compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_yaml(DEFAULT_CATALOG).context("Failed to parse embedded catalog")
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let catalog: Self = serde_yml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).wrap_err_with(|| format!("Failed to read catalog {:?}", path))?;
        Self::from_yaml(&content).wrap_err_with(|| format!("Invalid catalog {:?}", path))
    }

    /// Parks in declaration order. Collection cycles visit them in exactly this order.
    pub fn parks(&self) -> &[ParkDescriptor] {
        &self.parks
    }

    pub fn park(&self, key: &str) -> Option<&ParkDescriptor> {
        self.parks.iter().find(|p| p.key == key)
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn rides(&self) -> &[RideInfo] {
        &self.rides
    }

    pub fn ride(&self, park: &str, id: i64) -> Option<&RideInfo> {
        self.rides.iter().find(|r| r.park == park && r.id == id)
    }

    pub fn areas_for<'a>(&'a self, park: &'a str) -> impl Iterator<Item = &'a Area> + 'a {
        self.areas.iter().filter(move |a| a.park == park)
    }

    pub fn rides_for<'a>(&'a self, park: &'a str) -> impl Iterator<Item = &'a RideInfo> + 'a {
        self.rides.iter().filter(move |r| r.park == park)
    }

    fn validate(&self) -> Result<()> {
        if self.parks.is_empty() {
            return Err(eyre!("catalog.parks must be non-empty"));
        }

        let mut keys = HashSet::new();
        for park in &self.parks {
            if park.key.is_empty() || park.folder.is_empty() {
                return Err(eyre!("park {:?} needs both a key and a folder", park.name));
            }
            if !keys.insert(park.key.as_str()) {
                return Err(eyre!("duplicate park key {:?}", park.key));
            }
        }

        for area in &self.areas {
            if !keys.contains(area.park.as_str()) {
                return Err(eyre!("area {:?} refers to unknown park {:?}", area.key, area.park));
            }
        }

        let mut ride_ids = HashSet::new();
        for ride in &self.rides {
            if !keys.contains(ride.park.as_str()) {
                return Err(eyre!("ride {} refers to unknown park {:?}", ride.id, ride.park));
            }
            if !ride_ids.insert((ride.park.as_str(), ride.id)) {
                return Err(eyre!("duplicate ride {} in park {:?}", ride.id, ride.park));
            }
        }

        Ok(())
    }
}
