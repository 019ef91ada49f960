/// Meteoalarm Atom feed.
///
/// Each `<entry>` carries the CAP summary fields we need as `cap:*`
/// elements. Entries without an identifier are dropped; dates that do not
/// parse are treated as unknown.
use async_trait::async_trait;
use chrono::DateTime;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use wxmesh_protocol::{AlertError, MeteoWarning, WarningFeed};

use super::fetch_text;

pub struct MeteoalarmFeed {
    client: Client,
    url: String,
}

impl MeteoalarmFeed {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl WarningFeed for MeteoalarmFeed {
    async fn fetch_warnings(&self) -> Result<Vec<MeteoWarning>, AlertError> {
        let request = self
            .client
            .get(&self.url)
            .header("Accept", "application/atom+xml,application/xml;q=0.9");
        let body = fetch_text(request, "meteoalarm").await?;
        parse_feed(&body)
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Area,
    Event,
    Certainty,
    Severity,
    Onset,
    Expires,
    Identifier,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        Some(match tag {
            b"cap:areaDesc" => Field::Area,
            b"cap:event" => Field::Event,
            b"cap:certainty" => Field::Certainty,
            b"cap:severity" => Field::Severity,
            b"cap:onset" => Field::Onset,
            b"cap:expires" => Field::Expires,
            b"cap:identifier" => Field::Identifier,
            _ => return None,
        })
    }
}

#[derive(Debug, Default)]
struct Entry {
    id: String,
    area: String,
    event: String,
    certainty: String,
    severity: String,
    onset: String,
    expires: String,
}

impl Entry {
    fn set(&mut self, field: Field, text: &str) {
        let slot = match field {
            Field::Area => &mut self.area,
            Field::Event => &mut self.event,
            Field::Certainty => &mut self.certainty,
            Field::Severity => &mut self.severity,
            Field::Onset => &mut self.onset,
            Field::Expires => &mut self.expires,
            Field::Identifier => &mut self.id,
        };
        slot.push_str(text.trim());
    }

    fn into_warning(self) -> Option<MeteoWarning> {
        if self.id.is_empty() {
            tracing::debug!("meteo: feed entry without identifier skipped");
            return None;
        }
        let date = |s: &str| DateTime::parse_from_rfc3339(s).ok();
        Some(MeteoWarning {
            onset: date(&self.onset),
            expires: date(&self.expires),
            id: self.id,
            area: self.area,
            event: self.event,
            certainty: self.certainty,
            severity: self.severity,
        })
    }
}

fn is_entry(tag: &[u8]) -> bool {
    matches!(tag, b"entry" | b"item")
}

/// Warnings listed in an Atom document.
pub fn parse_feed(xml: &str) -> Result<Vec<MeteoWarning>, AlertError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut warnings = Vec::new();
    let mut entry: Option<Entry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) => {
                let name = tag.name();
                if is_entry(name.as_ref()) {
                    entry = Some(Entry::default());
                } else if entry.is_some() {
                    field = Field::from_tag(name.as_ref());
                }
            }
            Ok(Event::Text(text)) => {
                if let (Some(entry), Some(field)) = (entry.as_mut(), field) {
                    let text = text
                        .unescape()
                        .map_err(|e| AlertError::parse("meteoalarm feed", e))?;
                    entry.set(field, &text);
                }
            }
            Ok(Event::CData(data)) => {
                if let (Some(entry), Some(field)) = (entry.as_mut(), field) {
                    entry.set(field, &String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::End(tag)) => {
                if is_entry(tag.name().as_ref()) {
                    if let Some(warning) = entry.take().and_then(Entry::into_warning) {
                        warnings.push(warning);
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AlertError::parse(
                    "meteoalarm feed",
                    format!("at byte {}: {e}", reader.buffer_position()),
                ))
            }
        }
    }
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:cap="urn:oasis:names:tc:emergency:cap:1.2">
  <id>https://feeds.meteoalarm.org/feeds/meteoalarm-legacy-atom-slovakia</id>
  <title>MeteoAlarm Slovakia</title>
  <entry>
    <id>https://feeds.meteoalarm.org/api/v1/warnings/feeds-slovakia/abc</id>
    <title>Orange Thunderstorm Warning issued for Slovakia - Bratislava</title>
    <cap:areaDesc>Bratislava</cap:areaDesc>
    <cap:event>Severe thunderstorm warning</cap:event>
    <cap:certainty>Likely</cap:certainty>
    <cap:severity>Severe</cap:severity>
    <cap:onset>2026-07-01T14:00:00+02:00</cap:onset>
    <cap:expires>2026-07-01T22:00:00+02:00</cap:expires>
    <cap:identifier>2.49.0.0.703.0.SK.260701.abc</cap:identifier>
  </entry>
  <entry>
    <title>Yellow High-temperature Warning</title>
    <cap:areaDesc><![CDATA[Malacky]]></cap:areaDesc>
    <cap:event>Moderate high-temperature warning</cap:event>
    <cap:certainty>Likely</cap:certainty>
    <cap:severity>Moderate</cap:severity>
    <cap:onset>not a date</cap:onset>
    <cap:identifier>2.49.0.0.703.0.SK.260701.def</cap:identifier>
  </entry>
  <entry>
    <cap:areaDesc>Senec</cap:areaDesc>
    <cap:event>Severe wind warning</cap:event>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_entries() {
        let warnings = parse_feed(FEED).unwrap();
        assert_eq!(warnings.len(), 2);

        let first = &warnings[0];
        assert_eq!(first.id, "2.49.0.0.703.0.SK.260701.abc");
        assert_eq!(first.area, "Bratislava");
        assert_eq!(first.event, "Severe thunderstorm warning");
        assert_eq!(first.certainty, "Likely");
        assert_eq!(first.severity, "Severe");
        assert_eq!(
            first.onset.unwrap().to_rfc3339(),
            "2026-07-01T14:00:00+02:00"
        );
        assert!(first.expires.is_some());
    }

    #[test]
    fn test_cdata_and_bad_dates() {
        let warnings = parse_feed(FEED).unwrap();
        let second = &warnings[1];
        assert_eq!(second.area, "Malacky");
        assert_eq!(second.onset, None);
        assert_eq!(second.expires, None);
    }

    #[test]
    fn test_feed_level_fields_ignored() {
        let warnings = parse_feed(FEED).unwrap();
        assert!(warnings.iter().all(|w| !w.id.starts_with("https://")));
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_feed("<feed><entry><cap:event>x</cap:severity></entry></feed>").unwrap_err();
        assert!(matches!(err, AlertError::Parse { .. }));
    }

    #[test]
    fn test_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>none</title></feed>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }
}
