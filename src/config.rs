use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "activity-approval";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// More than two products are not retained by the physician.
pub const MAX_PRESENTED_PRODUCTS: usize = 2;
pub const MIN_NARRATIVE_CHARS: usize = 10;
pub const SAMPLE_QUANTITY: RangeInclusive<u32> = 1..=100;
pub const CONFIDENCE: RangeInclusive<u8> = 1..=5;
pub const DEFAULT_CONFIDENCE: u8 = 3;
pub const MONEY_SCALE: u32 = 2;

pub const DB_PATH_ENV: &str = "ACTIVITY_APPROVAL_DB";
pub const LOG_FILTER_ENV: &str = "ACTIVITY_APPROVAL_LOG";

/// Runtime settings for binaries embedding the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub log_filter: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup(DB_PATH_ENV)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);
        let log_filter = lookup(LOG_FILTER_ENV)
            .filter(|filter| !filter.is_empty())
            .unwrap_or_else(|| default_log_filter().to_owned());

        Self {
            db_path,
            log_filter,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

pub fn default_db_path() -> PathBuf {
    PathBuf::from(format!("{APP_NAME}.db"))
}

pub fn default_log_filter() -> &'static str {
    "activity_approval=info"
}
