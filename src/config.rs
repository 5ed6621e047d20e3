use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerts::retry::RetryPolicy;
use crate::alerts::types::AlertError;

/// Application-level constants
pub const APP_NAME: &str = "Vigilance";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory (~/Vigilance/).
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Engine database: reference catalog tables and the acknowledgement ledger.
pub fn database_path() -> PathBuf {
    app_data_dir().join("vigilance.db")
}

/// Directory scanned by the JSON catalog source.
pub fn catalog_dir() -> PathBuf {
    app_data_dir().join("catalog")
}

/// Practice-specific keyword dictionary, used instead of the bundled one when present.
pub fn keyword_dictionary_path() -> PathBuf {
    app_data_dir().join("condition_keywords.json")
}

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,vigilance_lib=debug"
}

/// Tunables for the alert stream controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiescence window before a submitted edit is evaluated.
    pub debounce_ms: u64,
    /// Retry and timeout policy for catalog, intake and ledger calls.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AlertError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| AlertError::ReferenceDataLoad(path.display().to_string(), e.to_string()))?;
        serde_json::from_str(&json)
            .map_err(|e| AlertError::ReferenceDataParse(path.display().to_string(), e.to_string()))
    }
}
