/// Reverse-geocoding cache.
///
/// Memoises place names by a caller-chosen key (a lightning cluster key,
/// a quake event id). Only non-empty answers are cached so a failed lookup
/// is retried the next time the same key comes up. Entries never expire.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Turns coordinates into a human-readable place name.
///
/// Implementations return an empty string on any failure; callers decide
/// what an unknown location means for them.
#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn resolve(&self, lat: f64, lon: f64) -> String;
}

/// Shared, cloneable cache in front of a [`ReverseGeocoder`].
#[derive(Clone)]
pub struct GeocodeCache {
    geocoder: Arc<dyn ReverseGeocoder>,
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl GeocodeCache {
    pub fn new(geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        Self {
            geocoder,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cached place name for `key`, resolving `(lat, lon)` on a miss.
    pub async fn lookup(&self, key: &str, lat: f64, lon: f64) -> String {
        if let Some(hit) = self.cached(key) {
            return hit;
        }

        let location = self.geocoder.resolve(lat, lon).await;
        if location.is_empty() {
            tracing::debug!("geocode: no place name for {key} ({lat:.3}, {lon:.3})");
        } else if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), location.clone());
        }
        location
    }

    fn cached(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
