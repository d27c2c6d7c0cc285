#[macro_use]
extern crate tracing;

mod app_config;
mod catalog;
mod credentials;

pub use app_config::{
    get_config_dir,
    get_data_dir,
};
pub use catalog::{
    Area,
    Catalog,
    ParkDescriptor,
    RideInfo,
};
pub use credentials::{
    RemoteCredentials,
    REMOTE_KEY_VAR,
    REMOTE_URL_VAR,
};
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
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use strum::{
    Display,
    EnumString,
};

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

/// Where snapshots are persisted.
#[derive(Debug, Default, Clone, Copy, Display, EnumString, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    /// JSON partitions under `data_dir` only.
    #[default]
    File,
    /// Rows in the remote snapshot table only. Requires credentials.
    Remote,
    /// JSON partitions plus a best-effort copy in the remote table.
    Mirror,
}

#[derive(Debug, Default, Clone, Copy, Display, EnumString, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CatalogSource {
    #[default]
    Embedded,
    Remote,
}

/// Hours of the day (UTC+9) during which collection runs. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowSettings {
    pub start_hour: u32,
    pub end_hour: u32,
}

/// Grid that compaction keeps: every `step_minutes` from `start_hour:00` through `end_hour:00`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompactionSettings {
    pub start_hour: u32,
    pub end_hour: u32,
    pub step_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Working tree of the repository that contains `data_dir`.
    pub repo_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    #[serde(skip_serializing)]
    pub config_dir: PathBuf,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub catalog_source: CatalogSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_file: Option<PathBuf>,
    pub fetch_timeout: String,
    pub seed_batch_size: usize,
    pub window: WindowSettings,
    pub compaction: CompactionSettings,
    pub sync: SyncSettings,
}

impl Settings {
    /// Layers the embedded defaults, `config.yaml` from the config directory, and `PARK_WAITS__*`
    /// environment variables (`__` separates nested keys, e.g. `PARK_WAITS__WINDOW__END_HOUR=20`).
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_dir(), &get_data_dir())
    }

    pub fn load_from(config_dir: &Path, data_dir: &Path) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("data_dir", data_dir.to_string_lossy().to_string())?
            .set_default("config_dir", config_dir.to_string_lossy().to_string())?
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        let config_files = [("config.yaml", config::FileFormat::Yaml)];

        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PARK_WAITS")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Self = builder
            .build()?
            .try_deserialize()
            .context("Failed to deserialize settings")?;
        settings.validate()?;
        debug!(?settings, "Settings loaded");
        Ok(settings)
    }

    pub fn fetch_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.fetch_timeout)
            .wrap_err_with(|| format!("Invalid fetch_timeout {:?}", self.fetch_timeout))
    }

    /// Resolves the catalog file setting or falls back to the embedded catalog.
    pub fn local_catalog(&self) -> Result<Catalog> {
        match &self.catalog_file {
            Some(path) => Catalog::from_file(path),
            None => Catalog::embedded(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let WindowSettings { start_hour, end_hour } = self.window;
        if start_hour > 23 || end_hour > 23 || start_hour > end_hour {
            return Err(eyre!("window must satisfy 0 <= start_hour <= end_hour <= 23, got {start_hour}..={end_hour}"));
        }

        let CompactionSettings {
            start_hour,
            end_hour,
            step_minutes,
        } = self.compaction;
        if start_hour > 23 || end_hour > 23 || start_hour > end_hour {
            return Err(eyre!(
                "compaction must satisfy 0 <= start_hour <= end_hour <= 23, got {start_hour}..={end_hour}"
            ));
        }
        if step_minutes == 0 || step_minutes > 60 {
            return Err(eyre!("compaction.step_minutes must be within 1..=60, got {step_minutes}"));
        }

        if self.seed_batch_size == 0 {
            return Err(eyre!("seed_batch_size must be positive"));
        }

        self.fetch_timeout()?;
        Ok(())
    }
}
