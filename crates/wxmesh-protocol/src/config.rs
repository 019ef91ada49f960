//! Bot configuration, loaded from `wxmesh.toml`.
//!
//! Every field has a default, so a partial file (or no file section at all)
//! is valid. Call [`AlertConfig::validate`] after loading; `load_from_path`
//! does it for you.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AlertError;
use crate::geo::{BoundingBox, CompassLabels, Position};
use crate::messenger::{SendConfig, MAX_CHANNEL_TEXT_BYTES};

/// Default channel for hazard alerts.
pub const ALERTS_CHANNEL: &str = "#alerts";
/// Default channel for forecasts.
pub const WEATHER_CHANNEL: &str = "#weather";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub meshcore: MeshcoreConfig,
    pub send: SendSection,
    pub compass: CompassLabels,
    pub forecast: ForecastConfig,
    pub blitz: LightningConfig,
    pub quake: QuakeConfig,
    pub radiation: RadiationConfig,
    pub meteo_alerts: MeteoConfig,
}

impl AlertConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, AlertError> {
        let config: AlertConfig =
            toml::from_str(text).map_err(|e| AlertError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, AlertError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| AlertError::ConfigFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text).map_err(|e| AlertError::ConfigFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Reject settings that would make an engine misbehave.
    pub fn validate(&self) -> Result<(), AlertError> {
        if self.send.max_retries == 0 {
            return Err(AlertError::Config(
                "send.max_retries must be at least 1".into(),
            ));
        }
        if self.radiation.required_readings == 0 {
            return Err(AlertError::Config(
                "radiation.required_readings must be at least 1".into(),
            ));
        }
        if self.radiation.nearest_stations == 0 {
            return Err(AlertError::Config(
                "radiation.nearest_stations must be at least 1".into(),
            ));
        }
        if self.blitz.min_count == 0 {
            return Err(AlertError::Config("blitz.min_count must be at least 1".into()));
        }
        for (section, area) in [
            ("blitz", &self.blitz.monitor_area),
            ("quake", &self.quake.monitor_area),
            ("radiation", &self.radiation.monitor_area),
        ] {
            if !area.is_valid() {
                return Err(AlertError::Config(format!(
                    "{section}.monitor_area has min greater than max"
                )));
            }
        }
        for (section, secs) in [
            ("blitz.collection_interval_ms", self.blitz.collection_interval_ms),
            ("radiation.poll_interval", self.radiation.poll_interval),
            ("meteo_alerts.poll_interval", self.meteo_alerts.poll_interval),
        ] {
            if secs == 0 {
                return Err(AlertError::Config(format!("{section} must be positive")));
            }
        }
        crate::forecast::Alarm::parse(&self.forecast.alarm)?;
        Ok(())
    }

    /// Reference position for bearings and distances.
    pub fn home(&self) -> Position {
        Position::new(self.meshcore.lat, self.meshcore.lon)
    }
}

// ── [meshcore] ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Serial,
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshcoreConfig {
    #[serde(rename = "type")]
    pub connection: ConnectionKind,
    /// Serial device of a USB companion.
    pub port: String,
    pub baud_rate: u32,
    /// `host:port` of a WiFi companion.
    pub host: String,
    pub lat: f64,
    pub lon: f64,
    /// Channel slots probed when looking up channels.
    pub max_channels: u8,
}

impl Default for MeshcoreConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionKind::Serial,
            port: "/dev/cu.usbmodem1101".into(),
            baud_rate: 115_200,
            host: "192.168.0.1:5000".into(),
            lat: 48.14,
            lon: 17.11,
            max_channels: 8,
        }
    }
}

// ── [send] ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendSection {
    pub repeat_wait_ms: u64,
    pub max_retries: u32,
    pub cooldown_ms: u64,
}

impl Default for SendSection {
    fn default() -> Self {
        Self {
            repeat_wait_ms: 15_000,
            max_retries: 3,
            cooldown_ms: 30_000,
        }
    }
}

impl SendSection {
    pub fn to_send_config(&self) -> SendConfig {
        SendConfig {
            repeat_wait: Duration::from_millis(self.repeat_wait_ms),
            max_retries: self.max_retries,
            cooldown: Duration::from_millis(self.cooldown_ms),
            max_text_bytes: MAX_CHANNEL_TEXT_BYTES,
        }
    }
}

// ── [forecast] ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRegion {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub enabled: bool,
    pub channel: String,
    /// `"HH:MM"` local time, or `"*"` to send once at start.
    pub alarm: String,
    /// IANA zone passed to the forecast service.
    pub timezone: String,
    pub regions: Vec<ForecastRegion>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        let region = |name: &str, lat, lon| ForecastRegion {
            name: name.into(),
            lat,
            lon,
        };
        Self {
            enabled: true,
            channel: WEATHER_CHANNEL.into(),
            alarm: "*".into(),
            timezone: "Europe/Bratislava".into(),
            regions: vec![
                region("BA", 48.15, 17.11),
                region("KE", 48.72, 21.26),
                region("BB", 48.73, 19.15),
            ],
        }
    }
}

// ── [blitz] ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightningConfig {
    pub enabled: bool,
    pub channel: String,
    pub collection_interval_ms: u64,
    /// Strikes per cell and interval needed to alert.
    pub min_count: usize,
    pub monitor_area: BoundingBox,
}

impl Default for LightningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: ALERTS_CHANNEL.into(),
            collection_interval_ms: 600_000,
            min_count: 10,
            monitor_area: BoundingBox::default(),
        }
    }
}

impl LightningConfig {
    pub fn collection_interval(&self) -> Duration {
        Duration::from_millis(self.collection_interval_ms)
    }
}

// ── [quake] ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuakeConfig {
    pub enabled: bool,
    pub channel: String,
    pub min_mag: f64,
    pub monitor_area: BoundingBox,
    /// How long an event id stays suppressed.
    pub timeout: u64,
}

impl Default for QuakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: ALERTS_CHANNEL.into(),
            min_mag: 3.0,
            monitor_area: BoundingBox::default(),
            timeout: 60,
        }
    }
}

impl QuakeConfig {
    pub fn suppression_ttl(&self) -> Duration {
        Duration::from_secs(self.timeout * 60)
    }
}

// ── [radiation] ─────────────────────────────────────────────────────────

/// Which per-station threshold triggers an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiationConfig {
    pub enabled: bool,
    pub channel: String,
    /// Seconds between polls.
    pub poll_interval: u64,
    pub alert_level: AlertLevel,
    pub nearest_stations: usize,
    pub monitor_area: BoundingBox,
    /// Consecutive readings at or above threshold needed to alert.
    pub required_readings: usize,
    /// Minutes before the same station may alert again.
    pub timeout: u64,
}

impl Default for RadiationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: ALERTS_CHANNEL.into(),
            poll_interval: 300,
            alert_level: AlertLevel::Warning,
            nearest_stations: 3,
            monitor_area: BoundingBox::default(),
            required_readings: 4,
            timeout: 60,
        }
    }
}

impl RadiationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn suppression_ttl(&self) -> Duration {
        Duration::from_secs(self.timeout * 60)
    }
}

// ── [meteo_alerts] ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteoConfig {
    pub enabled: bool,
    pub channel: String,
    /// Atom feed URL.
    pub url: String,
    /// Seconds between polls.
    pub poll_interval: u64,
    /// Minutes a delivered warning stays suppressed.
    pub timeout: u64,
    pub severity_filter: Vec<String>,
    pub certainty_filter: Vec<String>,
    /// Area names, matched exactly against the feed.
    pub regions: Vec<String>,
    /// Placeholders: `{region} {start} {end} {event} {severity} {certainty}`.
    pub message_template: String,
    pub severity: BTreeMap<String, String>,
    pub certainty: BTreeMap<String, String>,
    pub events: BTreeMap<String, String>,
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for MeteoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: ALERTS_CHANNEL.into(),
            url: "https://feeds.meteoalarm.org/feeds/meteoalarm-legacy-atom-slovakia".into(),
            poll_interval: 60,
            timeout: 180,
            severity_filter: vec!["severe".into(), "extreme".into()],
            certainty_filter: vec!["likely".into(), "observed".into()],
            regions: vec!["Bratislava".into()],
            message_template:
                "{region} {start} - {end}\n{event}\nSeverity: {severity}, Certainty: {certainty}"
                    .into(),
            severity: labels(&[
                ("unknown", "Unknown"),
                ("minor", "Minor"),
                ("moderate", "Moderate"),
                ("severe", "Severe"),
                ("extreme", "Extreme"),
            ]),
            certainty: labels(&[
                ("observed", "Observed"),
                ("likely", "Likely (> 50%)"),
                ("possible", "Possible (<= 50%)"),
                ("unlikely", "Unlikely (~ 0%)"),
                ("unknown", "Unknown"),
            ]),
            events: labels(&[
                ("wind", "Wind"),
                ("snoworice", "Snow or Ice"),
                ("thunderstorm", "Thunderstorm"),
                ("fog", "Fog"),
                ("hightemperature", "High Temperature"),
                ("lowtemperature", "Low Temperature"),
                ("coastalevent", "Coastal Event"),
                ("forestfire", "Forest Fire"),
                ("avalanche", "Avalanche"),
                ("rain", "Rain"),
                ("flood", "Flood"),
                ("rainflood", "Rain Flood"),
                ("marinehazard", "Marine Hazard"),
                ("drought", "Drought"),
                ("icing", "Icing"),
            ]),
        }
    }
}

impl MeteoConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn suppression_ttl(&self) -> Duration {
        Duration::from_secs(self.timeout * 60)
    }
}
