/// Severe-weather warning filtering, ordering and formatting.
///
/// Each poll keeps warnings for configured areas that have not expired,
/// have not been delivered recently and pass the severity and certainty
/// allow-lists, then delivers them oldest onset first. Each warning is
/// marked right after its own send so a failure half way through a batch
/// never repeats the part already delivered.
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use regex::Regex;
use tokio::time::Instant;
use wxmesh_transport::Channel;

use crate::config::MeteoConfig;
use crate::messenger::AlertSink;
use crate::sources::WarningFeed;
use crate::suppression::SuppressionStore;

/// One CAP warning from the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct MeteoWarning {
    pub id: String,
    pub area: String,
    /// Raw event headline, e.g. `"Severe thunderstorm warning"`.
    pub event: String,
    pub certainty: String,
    pub severity: String,
    pub onset: Option<DateTime<FixedOffset>>,
    pub expires: Option<DateTime<FixedOffset>>,
}

/// Event key from a headline: the words between the first and last space,
/// lower-cased, first `-` removed. `"Severe high-temperature warning"`
/// becomes `"hightemperature"`.
pub fn parse_event(event: &str) -> String {
    let (Some(first), Some(last)) = (event.find(' '), event.rfind(' ')) else {
        return String::new();
    };
    if last <= first {
        return String::new();
    }
    event[first + 1..last]
        .trim()
        .to_lowercase()
        .replacen('-', "", 1)
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^}]+)\}").expect("valid placeholder pattern"))
}

/// Replace `{name}` placeholders; unknown names become empty.
pub fn interpolate(template: &str, values: &BTreeMap<&str, String>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            values.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// `dd.mm. HH:MM` in the given zone.
pub fn format_date_in<Tz: TimeZone>(date: &DateTime<FixedOffset>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.with_timezone(tz).format("%d.%m. %H:%M").to_string()
}

fn format_local(date: Option<&DateTime<FixedOffset>>) -> String {
    date.map(|d| format_date_in(d, &Local)).unwrap_or_default()
}

pub struct MeteoMonitor {
    config: MeteoConfig,
    suppression: SuppressionStore,
}

impl MeteoMonitor {
    pub fn new(config: MeteoConfig) -> Self {
        Self {
            suppression: SuppressionStore::with_ttl(config.suppression_ttl()),
            config,
        }
    }

    pub fn is_suppressed(&self, id: &str) -> bool {
        self.suppression.is_suppressed(id)
    }

    /// Warnings to deliver this cycle, in delivery order.
    pub fn select(&self, warnings: Vec<MeteoWarning>, now: DateTime<Utc>) -> Vec<MeteoWarning> {
        let allowed = |list: &[String], value: &str| {
            let value = value.to_lowercase();
            list.iter().any(|v| *v == value)
        };

        let mut batch_ids = HashSet::new();
        let mut selected: Vec<MeteoWarning> = warnings
            .into_iter()
            .filter(|w| self.config.regions.iter().any(|r| *r == w.area))
            .filter(|w| w.expires.map_or(true, |end| end >= now))
            .filter(|w| !self.suppression.is_suppressed(&w.id))
            .filter(|w| allowed(&self.config.certainty_filter, &w.certainty))
            .filter(|w| allowed(&self.config.severity_filter, &w.severity))
            .filter(|w| batch_ids.insert(w.id.clone()))
            .collect();

        // Stable: equal onsets keep feed order. Unknown onset goes last.
        selected.sort_by_key(|w| (w.onset.is_none(), w.onset));
        selected
    }

    /// Alert text for a warning, with dates in the given zone.
    pub fn format_in<Tz: TimeZone>(&self, warning: &MeteoWarning, tz: &Tz) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let date = |d: Option<&DateTime<FixedOffset>>| {
            d.map(|d| format_date_in(d, tz)).unwrap_or_default()
        };
        self.render(
            warning,
            date(warning.onset.as_ref()),
            date(warning.expires.as_ref()),
        )
    }

    /// Alert text for a warning, with dates in local time.
    pub fn format(&self, warning: &MeteoWarning) -> String {
        self.render(
            warning,
            format_local(warning.onset.as_ref()),
            format_local(warning.expires.as_ref()),
        )
    }

    fn render(&self, warning: &MeteoWarning, start: String, end: String) -> String {
        let severity = warning.severity.to_lowercase();
        let certainty = warning.certainty.to_lowercase();
        let event_key = parse_event(&warning.event);
        let event = if event_key.is_empty() {
            warning.event.trim().to_string()
        } else {
            self.config
                .events
                .get(&event_key)
                .cloned()
                .unwrap_or(event_key)
        };

        let mut values = BTreeMap::new();
        values.insert("region", warning.area.clone());
        values.insert("start", start);
        values.insert("end", end);
        values.insert("event", event);
        values.insert(
            "severity",
            self.config.severity.get(&severity).cloned().unwrap_or(severity),
        );
        values.insert(
            "certainty",
            self.config
                .certainty
                .get(&certainty)
                .cloned()
                .unwrap_or(certainty),
        );
        interpolate(&self.config.message_template, &values)
    }

    /// Filter a fetched batch and deliver it. Returns how many were sent.
    pub async fn process(
        &mut self,
        warnings: Vec<MeteoWarning>,
        now: DateTime<Utc>,
        sink: &dyn AlertSink,
        channel: &Channel,
    ) -> usize {
        let selected = self.select(warnings, now);
        let count = selected.len();
        for warning in selected {
            let text = self.format(&warning);
            tracing::info!("meteo: delivering warning {} for {}", warning.id, warning.area);
            sink.send_alert(&text, channel).await;
            self.suppression.mark_alerted(warning.id, Instant::now());
        }
        count
    }

    /// One polling cycle: sweep, fetch, deliver.
    pub async fn poll(
        &mut self,
        feed: &dyn WarningFeed,
        sink: &dyn AlertSink,
        channel: &Channel,
    ) -> usize {
        self.suppression.expire(Instant::now());

        match feed.fetch_warnings().await {
            Ok(warnings) => self.process(warnings, Utc::now(), sink, channel).await,
            Err(e) => {
                tracing::warn!("meteo: feed unavailable: {e}");
                0
            }
        }
    }
}
