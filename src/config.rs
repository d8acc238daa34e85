//! Runtime configuration.
//!
//! Layering: built-in defaults → `~/.courier-beacon/config.json` → `COURIER_*`
//! environment variables → CLI flags (applied by `main`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Credential for the map script and reverse geocoding.
    pub maps_api_key: Option<String>,
    pub order_service_url: String,
    pub nominatim_url: String,
    pub reverse_geocode_url: String,
    pub map_script_url: String,
    pub sync_interval_secs: u64,
    pub user_agent: String,
    pub cache_geocodes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maps_api_key: None,
            order_service_url: "http://localhost:8080/api".into(),
            nominatim_url: "https://nominatim.openstreetmap.org/search".into(),
            reverse_geocode_url: "https://maps.googleapis.com/maps/api/geocode/json".into(),
            map_script_url: "https://maps.googleapis.com/maps/api/js".into(),
            sync_interval_secs: 5,
            user_agent: format!("CourierBeacon/{}", env!("CARGO_PKG_VERSION")),
            cache_geocodes: true,
        }
    }
}

/// `~/.courier-beacon`, or `./.courier-beacon` when there is no home directory.
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".courier-beacon")
}

impl Config {
    pub fn default_path() -> PathBuf {
        state_dir().join("config.json")
    }

    /// Load from `path` (or the default location), then apply the environment.
    ///
    /// A missing file is not an error.
    pub fn load(path: Option<PathBuf>) -> Result<Config, ConfigError> {
        let path = path.unwrap_or_else(Self::default_path);
        let mut config = Self::from_file(&path)?;
        config.apply_env(|var| std::env::var(var).ok())?;
        if config.maps_api_key.as_deref().map_or(true, str::is_empty) {
            tracing::warn!("No maps API key configured; map script and reverse geocoding will be degraded");
        }
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Config::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("COURIER_MAPS_API_KEY") {
            self.maps_api_key = Some(v);
        }
        if let Some(v) = lookup("COURIER_ORDER_SERVICE_URL") {
            self.order_service_url = v;
        }
        if let Some(v) = lookup("COURIER_NOMINATIM_URL") {
            self.nominatim_url = v;
        }
        if let Some(v) = lookup("COURIER_REVERSE_GEOCODE_URL") {
            self.reverse_geocode_url = v;
        }
        if let Some(v) = lookup("COURIER_MAP_SCRIPT_URL") {
            self.map_script_url = v;
        }
        if let Some(v) = lookup("COURIER_SYNC_INTERVAL_SECS") {
            self.sync_interval_secs = match v.trim().parse() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Env {
                        var: "COURIER_SYNC_INTERVAL_SECS",
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup("COURIER_CACHE_GEOCODES") {
            self.cache_geocodes = !matches!(v.trim(), "0" | "false" | "no");
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    /// Map script URL with the credential and the geometry library.
    pub fn provider_script_url(&self) -> String {
        format!(
            "{}?key={}&libraries=geometry",
            self.map_script_url,
            crate::http::urlencode(self.maps_api_key.as_deref().unwrap_or("")),
        )
    }
}
