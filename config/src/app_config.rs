use directories::ProjectDirs;
use std::{
    env,
    path::PathBuf,
};

lazy_static::lazy_static! {
    pub(crate) static ref PROJECT_NAME: String = "PARK_WAITS".to_string();
    static ref DATA_OVERRIDE: Option<PathBuf> = env_path("DATA");
    static ref CONFIG_OVERRIDE: Option<PathBuf> = env_path("CONFIG");
}

fn env_path(suffix: &str) -> Option<PathBuf> {
    env::var(format!("{}_{suffix}", PROJECT_NAME.as_str()))
        .ok()
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Root of the file store, `PARK_WAITS_DATA` or `./data`. The store lives inside the synced repository,
/// so it is relative to the working directory rather than a per-user directory.
pub fn get_data_dir() -> PathBuf {
    DATA_OVERRIDE.clone().unwrap_or_else(|| PathBuf::from("data"))
}

/// `PARK_WAITS_CONFIG`, else the platform config directory, else `./.config`.
pub fn get_config_dir() -> PathBuf {
    match (CONFIG_OVERRIDE.clone(), ProjectDirs::from("dev", "park-waits", "park-waits")) {
        (Some(dir), _) => dir,
        (None, Some(dirs)) => dirs.config_local_dir().to_path_buf(),
        (None, None) => PathBuf::from(".").join(".config"),
    }
}
