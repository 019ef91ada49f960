/// Radiation monitoring: station selection, reading parsing and the
/// consecutive-readings streak detector.
///
/// A single high reading is usually a cosmic-ray spike. A station only
/// alerts once its last `required_readings` samples are all at or above its
/// threshold; the history is then reset so the next alert needs a whole new
/// streak. Alerted stations are skipped (no fetch) until their suppression
/// expires, and expiry also discards their history.
use std::collections::{HashMap, VecDeque};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tokio::time::Instant;
use wxmesh_transport::Channel;

use crate::config::{AlertLevel, RadiationConfig};
use crate::error::AlertError;
use crate::geo::{heading_and_distance, CompassLabels, Position};
use crate::messenger::AlertSink;
use crate::sources::RadiationSource;
use crate::suppression::SuppressionStore;

// ── Upstream data ───────────────────────────────────────────────────────

/// A monitoring station from the combined station list.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub user: String,
    pub device: String,
    pub warning: f64,
    pub alert: f64,
    pub lat: f64,
    pub lon: f64,
    pub online: bool,
}

impl Station {
    pub fn threshold(&self, level: AlertLevel) -> f64 {
        match level {
            AlertLevel::Warning => self.warning,
            AlertLevel::Alert => self.alert,
        }
    }
}

/// A station's latest reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub cpm: f64,
    pub timestamp: String,
    pub location: String,
}

fn column<'a>(columns: &'a [Value], index: usize, name: &str) -> Result<&'a [Value], AlertError> {
    columns
        .get(index)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| AlertError::parse("station list", format!("missing column {name}")))
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn as_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Parse the column-oriented combined station list:
/// `[users, _, devices, warnings, alerts, online, _, _, _, _, lats, lons]`.
///
/// Stations with unparseable coordinates are dropped. Online is the
/// string (or number) `1`.
pub fn parse_station_list(json: &str) -> Result<Vec<Station>, AlertError> {
    let root: Value = serde_json::from_str(json)?;
    let columns = root
        .as_array()
        .ok_or_else(|| AlertError::parse("station list", "expected a top-level array"))?;

    let users = column(columns, 0, "users")?;
    let devices = column(columns, 2, "devices")?;
    let warnings = column(columns, 3, "warnings")?;
    let alerts = column(columns, 4, "alerts")?;
    let online = column(columns, 5, "online")?;
    let lats = column(columns, 10, "lats")?;
    let lons = column(columns, 11, "lons")?;

    let stations = users
        .iter()
        .enumerate()
        .map(|(i, user)| Station {
            user: as_text(Some(user)),
            device: as_text(devices.get(i)),
            warning: as_number(warnings.get(i)),
            alert: as_number(alerts.get(i)),
            lat: as_number(lats.get(i)),
            lon: as_number(lons.get(i)),
            online: as_text(online.get(i)) == "1",
        })
        .filter(|s| !s.user.is_empty() && s.lat.is_finite() && s.lon.is_finite())
        .collect();
    Ok(stations)
}

fn reading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([\d.]+)\s+CPM\s+on\s+(.+?UTC)\s+at\s+(.+)$").expect("valid reading pattern")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"))
}

/// Parse `"<cpm> CPM on <timestamp>UTC at <location>"`. HTML tags in the
/// location are stripped.
pub fn parse_last_reading(text: &str) -> Option<Reading> {
    let caps = reading_regex().captures(text.trim())?;
    let cpm: f64 = caps.get(1)?.as_str().parse().ok()?;
    let timestamp = caps.get(2)?.as_str().to_string();
    let location = tag_regex()
        .replace_all(caps.get(3)?.as_str(), "")
        .trim()
        .to_string();
    Some(Reading {
        cpm,
        timestamp,
        location,
    })
}

// ── Streak detector ─────────────────────────────────────────────────────

/// Per-station rolling history of the last `required` readings.
#[derive(Debug, Clone)]
pub struct StreakDetector {
    required: usize,
    histories: HashMap<String, VecDeque<f64>>,
}

impl StreakDetector {
    pub fn new(required: usize) -> Self {
        Self {
            required: required.max(1),
            histories: HashMap::new(),
        }
    }

    /// Record a reading. Returns true when the history is full and every
    /// sample is at or above `threshold`; the history is reset in that case.
    pub fn push(&mut self, station: &str, cpm: f64, threshold: f64) -> bool {
        let history = self.histories.entry(station.to_string()).or_default();
        history.push_back(cpm);
        while history.len() > self.required {
            history.pop_front();
        }

        let streak = history.len() == self.required && history.iter().all(|&c| c >= threshold);
        if streak {
            history.clear();
        }
        streak
    }

    pub fn history(&self, station: &str) -> Vec<f64> {
        self.histories
            .get(station)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forget a station's history.
    pub fn reset(&mut self, station: &str) {
        self.histories.remove(station);
    }
}

// ── Monitor ─────────────────────────────────────────────────────────────

pub struct RadiationMonitor {
    config: RadiationConfig,
    home: Position,
    labels: CompassLabels,
    suppression: SuppressionStore,
    streaks: StreakDetector,
}

impl RadiationMonitor {
    pub fn new(config: RadiationConfig, home: Position, labels: CompassLabels) -> Self {
        Self {
            suppression: SuppressionStore::with_ttl(config.suppression_ttl()),
            streaks: StreakDetector::new(config.required_readings),
            config,
            home,
            labels,
        }
    }

    pub fn is_suppressed(&self, user: &str) -> bool {
        self.suppression.is_suppressed(user)
    }

    pub fn history(&self, user: &str) -> Vec<f64> {
        self.streaks.history(user)
    }

    /// Online stations in the area, nearest first, at most `nearest_stations`.
    pub fn select_stations(&self, mut stations: Vec<Station>) -> Vec<Station> {
        stations.retain(|s| s.online && self.config.monitor_area.contains(s.lat, s.lon));
        let distance = |s: &Station| heading_and_distance(self.home, Position::new(s.lat, s.lon)).distance_km;
        stations.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
        stations.truncate(self.config.nearest_stations);
        stations
    }

    pub fn format_alert(&self, station: &Station, reading: &Reading) -> String {
        let bearing = heading_and_distance(self.home, Position::new(station.lat, station.lon));
        format!(
            "☢️ {} ({}km {}) {} CPM",
            reading.location,
            bearing.distance_km.round(),
            self.labels.label(bearing.heading),
            reading.cpm
        )
    }

    /// Feed one reading for a station. Alerts when the streak completes.
    pub async fn observe(
        &mut self,
        station: &Station,
        reading: &Reading,
        sink: &dyn AlertSink,
        channel: &Channel,
        now: Instant,
    ) -> bool {
        let threshold = station.threshold(self.config.alert_level);
        if !self.streaks.push(&station.user, reading.cpm, threshold) {
            return false;
        }
        tracing::info!(
            "radiation: station {} held {} readings at or above {threshold} CPM",
            station.user,
            self.config.required_readings
        );
        let text = self.format_alert(station, reading);
        sink.send_alert(&text, channel).await;
        self.suppression.mark_alerted(station.user.clone(), now);
        true
    }

    /// One polling cycle. Upstream failures are logged and end the cycle.
    pub async fn poll(
        &mut self,
        source: &dyn RadiationSource,
        sink: &dyn AlertSink,
        channel: &Channel,
    ) -> usize {
        for user in self.suppression.expire(Instant::now()) {
            tracing::debug!("radiation: suppression for {user} expired");
            self.streaks.reset(&user);
        }

        let stations = match source.fetch_stations().await {
            Ok(stations) => stations,
            Err(e) => {
                tracing::warn!("radiation: station list unavailable: {e}");
                return 0;
            }
        };

        let mut alerts = 0;
        for station in self.select_stations(stations) {
            if self.suppression.is_suppressed(&station.user) {
                continue;
            }
            let reading = match source.fetch_last_reading(&station.user).await {
                Ok(Some(reading)) => reading,
                Ok(None) => {
                    tracing::debug!("radiation: no parseable reading for {}", station.user);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("radiation: reading for {} unavailable: {e}", station.user);
                    continue;
                }
            };
            if self
                .observe(&station, &reading, sink, channel, Instant::now())
                .await
            {
                alerts += 1;
            }
        }
        alerts
    }
}
