/// Seismic event alerts.
///
/// Events arrive from a push stream that may replay recent events after a
/// reconnect, so delivered event ids are remembered for the configured
/// timeout.
use serde_json::Value;
use tokio::time::Instant;
use wxmesh_transport::Channel;

use crate::config::QuakeConfig;
use crate::error::AlertError;
use crate::geo::{heading_and_distance, BoundingBox, CompassLabels, Position};
use crate::geocode::GeocodeCache;
use crate::messenger::AlertSink;
use crate::suppression::SuppressionStore;

/// A newly published earthquake.
#[derive(Debug, Clone, PartialEq)]
pub struct QuakeEvent {
    pub id: String,
    pub mag: f64,
    pub lat: f64,
    pub lon: f64,
}

/// Parse one stream message.
///
/// `Ok(None)` for well-formed messages that are not new events (updates,
/// deletions, non-features). Malformed JSON or a `create` feature without
/// the expected fields is an error.
pub fn parse_seismic_message(json: &str) -> Result<Option<QuakeEvent>, AlertError> {
    let message: Value = serde_json::from_str(json)?;
    if message.get("action").and_then(Value::as_str) != Some("create") {
        return Ok(None);
    }
    let data = message
        .get("data")
        .ok_or_else(|| AlertError::parse("seismic message", "missing data"))?;
    if data.get("type").and_then(Value::as_str) != Some("Feature") {
        return Ok(None);
    }

    let id = match data.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(AlertError::parse("seismic message", "missing id")),
    };
    let properties = data
        .get("properties")
        .ok_or_else(|| AlertError::parse("seismic message", "missing properties"))?;
    let number = |name: &'static str| {
        properties
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| AlertError::parse("seismic message", format!("missing {name}")))
    };

    Ok(Some(QuakeEvent {
        id,
        mag: number("mag")?,
        lat: number("lat")?,
        lon: number("lon")?,
    }))
}

pub struct QuakeMonitor {
    home: Position,
    area: BoundingBox,
    min_mag: f64,
    labels: CompassLabels,
    seen: SuppressionStore,
}

impl QuakeMonitor {
    pub fn new(config: &QuakeConfig, home: Position, labels: CompassLabels) -> Self {
        Self {
            home,
            area: config.monitor_area,
            min_mag: config.min_mag,
            labels,
            seen: SuppressionStore::with_ttl(config.suppression_ttl()),
        }
    }

    /// Strong enough and inside the monitored area.
    pub fn is_relevant(&self, event: &QuakeEvent) -> bool {
        event.mag >= self.min_mag && self.area.contains(event.lat, event.lon)
    }

    pub fn is_suppressed(&self, id: &str) -> bool {
        self.seen.is_suppressed(id)
    }

    pub fn format_alert(&self, event: &QuakeEvent, location: &str) -> String {
        let bearing = heading_and_distance(self.home, Position::new(event.lat, event.lon));
        let place = if location.is_empty() {
            String::new()
        } else {
            format!("{location} ")
        };
        format!(
            "🌍 quake: mag:M{} {place}({}km {})",
            event.mag,
            bearing.distance_km.round(),
            self.labels.label(bearing.heading)
        )
    }

    /// Alert on an event unless it is irrelevant or already delivered.
    pub async fn handle(
        &mut self,
        event: &QuakeEvent,
        geocoder: &GeocodeCache,
        sink: &dyn AlertSink,
        channel: &Channel,
    ) -> bool {
        self.seen.expire(Instant::now());

        if !self.is_relevant(event) {
            tracing::debug!("quake: ignoring {} (M{})", event.id, event.mag);
            return false;
        }
        if self.seen.is_suppressed(&event.id) {
            tracing::debug!("quake: {} already delivered", event.id);
            return false;
        }

        let location = geocoder.lookup(&event.id, event.lat, event.lon).await;
        let text = self.format_alert(event, &location);
        tracing::info!("quake: M{} event {}", event.mag, event.id);
        sink.send_alert(&text, channel).await;
        self.seen.mark_alerted(event.id.clone(), Instant::now());
        true
    }
}
