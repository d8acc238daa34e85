//! File-based forward-geocode cache at ~/.courier-beacon/geocode-cache.json.
//!
//! TTL: 30 days. Case-insensitive keys. Pincode centroids do not move, so a hit
//! saves a round trip to the rate-limited provider.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::GeocodeMatch;

const CACHE_TTL_MS: i64 = 30 * 24 * 3600 * 1000;

#[derive(Serialize, Deserialize, Clone)]
struct CacheEntry {
    lat: f64,
    lng: f64,
    address: String,
    timestamp: i64,
}

pub struct GeocodeCache {
    path: Option<PathBuf>,
    entries: HashMap<String, CacheEntry>,
}

impl GeocodeCache {
    /// Load cache from a specific path. Unreadable or corrupt files start empty.
    pub fn load_from(path: PathBuf) -> Self {
        let entries = Self::read_file(&path).unwrap_or_default();
        Self {
            path: Some(path),
            entries,
        }
    }

    /// A cache that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
        }
    }

    pub fn default_path() -> PathBuf {
        crate::config::state_dir().join("geocode-cache.json")
    }

    fn read_file(path: &Path) -> Option<HashMap<String, CacheEntry>> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    /// Returns None if missing or expired.
    pub fn get(&self, query: &str) -> Option<GeocodeMatch> {
        let entry = self.entries.get(&query.trim().to_lowercase())?;
        if Utc::now().timestamp_millis() - entry.timestamp > CACHE_TTL_MS {
            return None;
        }
        Some(GeocodeMatch {
            lat: entry.lat,
            lng: entry.lng,
            address: entry.address.clone(),
        })
    }

    pub fn put(&mut self, query: &str, found: &GeocodeMatch) {
        self.entries.insert(
            query.trim().to_lowercase(),
            CacheEntry {
                lat: found.lat,
                lng: found.lng,
                address: found.address.clone(),
                timestamp: Utc::now().timestamp_millis(),
            },
        );
        self.persist();
    }

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&self.entries) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    tracing::debug!(path = %path.display(), error = %e, "Failed to persist geocode cache");
                }
            }
            Err(e) => tracing::debug!(error = %e, "Failed to serialize geocode cache"),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
