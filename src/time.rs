//! Fixed-zone time keys.
//!
//! Every key is computed against UTC+9 directly. The process time zone (`TZ`, `/etc/localtime`) is never
//! consulted, so a collector running on a UTC host produces the same partitions as one running in Tokyo.

use chrono::{
    DateTime,
    Datelike as _,
    FixedOffset,
    NaiveDate,
    Timelike as _,
    Utc,
};

pub const PARK_UTC_OFFSET_SECONDS: i32 = 9 * 3600;

pub fn park_zone() -> FixedOffset {
    FixedOffset::east_opt(PARK_UTC_OFFSET_SECONDS).expect("UTC+9 is a valid offset")
}

/// The keys of one instant, all derived from the same zoned value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTime {
    pub date: NaiveDate,
    /// `YYYY-MM-DD`
    pub date_key: String,
    /// `HH:MM`, seconds truncated.
    pub time_key: String,
    /// `YYYY-MM-DDTHH:MM:SS+09:00`
    pub timestamp: String,
    pub hour: u32,
}

impl NormalizedTime {
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        let local = instant.with_timezone(&park_zone());
        Self {
            date: local.date_naive(),
            date_key: local.format("%Y-%m-%d").to_string(),
            time_key: local.format("%H:%M").to_string(),
            timestamp: local.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            hour: local.hour(),
        }
    }

    pub fn now() -> Self {
        Self::from_instant(Utc::now())
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }
}
