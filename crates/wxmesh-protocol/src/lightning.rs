/// Spatial strike clustering.
///
/// Strikes inside the monitored area are bucketed into cells of
/// (compass heading, 10 km distance band) as seen from home. Every
/// collection interval the buffer is evaluated as a whole: each cell with
/// enough strikes that has not alerted before produces one alert, and then
/// the buffer is emptied. Cells are remembered for the life of the process.
///
/// The buffer is a tumbling window, not a sliding one: a burst split across
/// two intervals is counted separately in each.
use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use tokio::time::Instant;
use wxmesh_transport::Channel;

use crate::config::LightningConfig;
use crate::geo::{heading_and_distance, BoundingBox, Compass, CompassLabels, Position};
use crate::geocode::GeocodeCache;
use crate::messenger::AlertSink;
use crate::suppression::SuppressionStore;

/// Width of a distance band in kilometres.
pub const DISTANCE_BUCKET_KM: f64 = 10.0;

/// A strike report as published by the strike feed. Extra fields are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Strike {
    pub lat: f64,
    pub lon: f64,
}

/// One (heading, distance band) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterKey {
    pub heading: Compass,
    /// `floor(distance_km / 10)`.
    pub bucket: u32,
}

impl ClusterKey {
    /// Lower edge of the distance band.
    pub fn distance_km(&self) -> u32 {
        self.bucket * DISTANCE_BUCKET_KM as u32
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.heading, self.bucket)
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    key: ClusterKey,
    lat: f64,
    lon: f64,
}

/// A cell that crossed the threshold in the current window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueCluster {
    pub key: ClusterKey,
    pub count: usize,
    /// First strike of the window in this cell.
    pub lat: f64,
    pub lon: f64,
}

/// Lightning engine state: the window buffer and alerted cells.
pub struct LightningMonitor {
    home: Position,
    area: BoundingBox,
    min_count: usize,
    labels: CompassLabels,
    buffer: Vec<Sample>,
    alerted: SuppressionStore,
}

impl LightningMonitor {
    pub fn new(config: &LightningConfig, home: Position, labels: CompassLabels) -> Self {
        Self {
            home,
            area: config.monitor_area,
            min_count: config.min_count,
            labels,
            buffer: Vec::new(),
            alerted: SuppressionStore::permanent(),
        }
    }

    /// Cell for a strike position.
    pub fn cluster_key(&self, lat: f64, lon: f64) -> ClusterKey {
        let bearing = heading_and_distance(self.home, Position::new(lat, lon));
        ClusterKey {
            heading: bearing.heading,
            bucket: (bearing.distance_km / DISTANCE_BUCKET_KM).floor() as u32,
        }
    }

    /// Buffer a strike. Returns false (and drops it) when outside the area.
    pub fn record(&mut self, strike: Strike) -> bool {
        if !self.area.contains(strike.lat, strike.lon) {
            return false;
        }
        let key = self.cluster_key(strike.lat, strike.lon);
        self.buffer.push(Sample {
            key,
            lat: strike.lat,
            lon: strike.lon,
        });
        true
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_alerted(&self, key: &ClusterKey) -> bool {
        self.alerted.is_suppressed(&key.to_string())
    }

    /// Cells at or above the threshold that have not alerted yet, in the
    /// order their first strike arrived.
    pub fn due_clusters(&self) -> Vec<DueCluster> {
        let mut order: Vec<DueCluster> = Vec::new();
        let mut index: HashMap<ClusterKey, usize> = HashMap::new();
        for sample in &self.buffer {
            match index.get(&sample.key) {
                Some(&i) => order[i].count += 1,
                None => {
                    index.insert(sample.key, order.len());
                    order.push(DueCluster {
                        key: sample.key,
                        count: 1,
                        lat: sample.lat,
                        lon: sample.lon,
                    });
                }
            }
        }
        order.retain(|c| c.count >= self.min_count && !self.is_alerted(&c.key));
        order
    }

    /// Alert text for a cell.
    pub fn format_alert(&self, key: &ClusterKey, location: &str) -> String {
        format!(
            "🌩️ {location} ({}km {})",
            key.distance_km(),
            self.labels.label(key.heading)
        )
    }

    /// Evaluate the window: alert every due cell whose location resolves,
    /// mark it, then clear the buffer. Returns the number of alerts sent.
    pub async fn flush(
        &mut self,
        geocoder: &GeocodeCache,
        sink: &dyn AlertSink,
        channel: &Channel,
    ) -> usize {
        let due = self.due_clusters();
        tracing::debug!(
            "lightning: {} strikes buffered, {} cells due",
            self.buffer.len(),
            due.len()
        );

        let mut sent = 0;
        for cluster in due {
            let key = cluster.key.to_string();
            let location = geocoder.lookup(&key, cluster.lat, cluster.lon).await;
            if location.is_empty() {
                tracing::warn!("lightning: no location for cell {key}, skipping");
                continue;
            }
            let text = self.format_alert(&cluster.key, &location);
            tracing::info!("lightning: cell {key} has {} strikes", cluster.count);
            sink.send_alert(&text, channel).await;
            self.alerted.mark_alerted(key, Instant::now());
            sent += 1;
        }

        self.buffer.clear();
        sent
    }
}
