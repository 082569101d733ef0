//! Observatory configuration
//!
//! Loaded from `.voyager_transits.json` (or an explicit path), then
//! overridden by `VT_ORACLE_URL`, `VT_API_KEY` and `VT_CACHE_DIR`.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::cache::CachePolicy;
use super::error::{Result, TransitError};
use super::models::Subject;

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = ".voyager_transits.json";

/// Per-call oracle timeout (15 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Delay between successive Range Fetcher calls
pub const DEFAULT_PACING_MS: u64 = 50;

/// Batch size for streamed ephemeris cache hits
pub const DEFAULT_EPHEMERIS_BATCH_SIZE: usize = 10;

/// Delay between streamed ephemeris batches
pub const DEFAULT_EPHEMERIS_BATCH_DELAY_MS: u64 = 30;

/// Cache policy as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

fn default_max_entries() -> usize {
    240 // 20 years of months for one subject
}

fn default_ttl_hours() -> u64 {
    24 * 30
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl CacheSettings {
    /// Convert to the runtime policy
    pub fn policy(&self) -> CachePolicy {
        CachePolicy::new(self.max_entries, Duration::from_secs(self.ttl_hours * 3600))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservatoryConfig {
    #[serde(default = "default_oracle_url")]
    pub oracle_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_ephemeris_batch_size")]
    pub ephemeris_batch_size: usize,
    #[serde(default = "default_ephemeris_batch_delay_ms")]
    pub ephemeris_batch_delay_ms: u64,
    #[serde(default)]
    pub cache: CacheSettings,
    /// On-disk cache root; platform cache dir when unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Observer for raw-sky ephemeris timelines; Greenwich when unset
    #[serde(default)]
    pub ephemeris_observer: Option<Subject>,
}

fn default_oracle_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_pacing_ms() -> u64 {
    DEFAULT_PACING_MS
}

fn default_ephemeris_batch_size() -> usize {
    DEFAULT_EPHEMERIS_BATCH_SIZE
}

fn default_ephemeris_batch_delay_ms() -> u64 {
    DEFAULT_EPHEMERIS_BATCH_DELAY_MS
}

impl Default for ObservatoryConfig {
    fn default() -> Self {
        Self {
            oracle_url: default_oracle_url(),
            api_key: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            pacing_ms: DEFAULT_PACING_MS,
            ephemeris_batch_size: DEFAULT_EPHEMERIS_BATCH_SIZE,
            ephemeris_batch_delay_ms: DEFAULT_EPHEMERIS_BATCH_DELAY_MS,
            cache: CacheSettings::default(),
            cache_dir: None,
            ephemeris_observer: None,
        }
    }
}

impl ObservatoryConfig {
    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TransitError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. A missing file yields defaults; a malformed one is an error.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| e.with_context(path.display().to_string()))
    }

    /// Load `path` (or the default file) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `VT_*` overrides from a variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("VT_ORACLE_URL") {
            info!("VT_ORACLE_URL set, overriding oracle url");
            self.oracle_url = url;
        }
        if let Some(key) = lookup("VT_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(dir) = lookup("VT_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    fn validate(&self) -> Result<()> {
        if self.oracle_url.trim().is_empty() {
            return Err(TransitError::invalid_config("oracle_url must not be empty"));
        }
        if self.request_timeout_ms == 0 {
            return Err(TransitError::invalid_config("request_timeout_ms must be positive"));
        }
        if self.ephemeris_batch_size == 0 {
            return Err(TransitError::invalid_config("ephemeris_batch_size must be positive"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn ephemeris_batch_delay(&self) -> Duration {
        Duration::from_millis(self.ephemeris_batch_delay_ms)
    }

    /// Resolved on-disk cache directory
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("voyager-transits")
        })
    }

    /// Resolved ephemeris observer
    pub fn observer(&self) -> Subject {
        self.ephemeris_observer
            .clone()
            .unwrap_or_else(Subject::greenwich_observer)
    }
}
