/// Daily forecast: response model, condensed emoji formatting and the
/// wall-clock alarm that schedules it.
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Deserialize;
use wxmesh_transport::Channel;

use crate::config::ForecastConfig;
use crate::error::AlertError;
use crate::messenger::AlertSink;
use crate::sources::ForecastSource;
use crate::text::chunk;

/// Byte budget of one forecast message.
pub const FORECAST_CHUNK_BYTES: usize = 130;

/// Daily fields requested from the forecast service.
pub const DAILY_FIELDS: &[&str] = &[
    "weather_code",
    "temperature_2m_max",
    "temperature_2m_min",
    "apparent_temperature_max",
    "apparent_temperature_min",
    "wind_speed_10m_max",
    "wind_gusts_10m_max",
    "precipitation_sum",
    "precipitation_probability_max",
    "sunrise",
    "sunset",
];

/// Current-conditions fields requested from the forecast service.
pub const CURRENT_FIELDS: &[&str] = &[
    "temperature_2m",
    "weather_code",
    "wind_speed_10m",
    "relative_humidity_2m",
];

// ── Response model ──────────────────────────────────────────────────────

/// Open-Meteo `/v1/forecast` answer. Each daily vector holds one entry
/// per forecast day; only the first day is used.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ForecastResponse {
    pub daily: DailyForecast,
    #[serde(default)]
    pub current: Option<CurrentConditions>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DailyForecast {
    pub weather_code: Vec<u8>,
    pub temperature_2m_max: Vec<f64>,
    pub temperature_2m_min: Vec<f64>,
    pub apparent_temperature_max: Vec<f64>,
    pub apparent_temperature_min: Vec<f64>,
    pub wind_speed_10m_max: Vec<f64>,
    pub wind_gusts_10m_max: Vec<f64>,
    pub precipitation_sum: Vec<f64>,
    pub precipitation_probability_max: Vec<f64>,
    pub sunrise: Vec<String>,
    pub sunset: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CurrentConditions {
    pub temperature_2m: f64,
    pub weather_code: u8,
    pub wind_speed_10m: f64,
    pub relative_humidity_2m: f64,
}

// ── Weather codes ───────────────────────────────────────────────────────

/// Emoji for a WMO weather code.
pub fn weather_emoji(code: u8) -> &'static str {
    match code {
        0 => "☀️",
        1 => "🌤️",
        2 => "⛅",
        3 => "☁️",
        45 => "🌫️",
        48 => "🌫️❄️",
        51 | 53 => "🌦️",
        55 => "🌧️",
        56 | 57 => "🌧️❄️",
        61 | 63 => "🌧️",
        65 => "🌧️🌧️",
        66 | 67 => "🧊🌧️",
        71 | 73 => "🌨️",
        75 => "❄️❄️",
        77 => "❄️",
        80 => "🌦️",
        81 => "🌧️",
        82 => "⛈️",
        85 => "🌨️",
        86 => "❄️⛈️",
        95 => "⛈️",
        96 | 99 => "⛈️🧊",
        _ => "🌡️",
    }
}

/// Short English description for a WMO weather code.
pub fn weather_description(code: u8) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Freezing fog",
        51 => "Light drizzle",
        53 => "Drizzle",
        55 => "Dense drizzle",
        56 => "Freezing drizzle",
        57 => "Heavy freezing drizzle",
        61 => "Light rain",
        63 => "Rain",
        65 => "Heavy rain",
        66 => "Freezing rain",
        67 => "Heavy freezing rain",
        71 => "Light snow",
        73 => "Snow",
        75 => "Heavy snow",
        77 => "Snow grains",
        80 => "Light showers",
        81 => "Showers",
        82 => "Heavy showers",
        85 => "Light snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm + hail",
        99 => "Severe thunderstorm + hail",
        _ => "Unknown",
    }
}

// ── Formatting ──────────────────────────────────────────────────────────

/// Round half up, so -2.5 becomes -2.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// `HH:MM` from an ISO local timestamp such as `2026-07-01T05:03`.
fn clock_time(iso: Option<&String>) -> &str {
    iso.and_then(|s| s.get(11..16)).unwrap_or("--:--")
}

fn first<T: Copy>(values: &[T], field: &'static str) -> Result<T, AlertError> {
    values
        .first()
        .copied()
        .ok_or_else(|| AlertError::parse("forecast", format!("daily.{field} is empty")))
}

/// Condensed multi-line summary of today's forecast for `name`.
pub fn format_forecast(response: &ForecastResponse, name: &str) -> Result<String, AlertError> {
    let d = &response.daily;
    let code = first(&d.weather_code, "weather_code")?;
    let t_max = round_half_up(first(&d.temperature_2m_max, "temperature_2m_max")?);
    let t_min = round_half_up(first(&d.temperature_2m_min, "temperature_2m_min")?);
    let wind = round_half_up(first(&d.wind_speed_10m_max, "wind_speed_10m_max")?);
    let gust = round_half_up(first(&d.wind_gusts_10m_max, "wind_gusts_10m_max")?);
    let precip = d.precipitation_sum.first().copied().unwrap_or(0.0);
    let precip_prob = d.precipitation_probability_max.first().copied().unwrap_or(0.0);

    let mut lines = vec![
        format!("{name} {}", weather_emoji(code)),
        format!("🌡️ ▲{t_max}°C ▼{t_min}°C"),
        format!("🌬️ {wind} km/h ({gust} km/h)"),
    ];
    if precip > 0.0 || precip_prob > 20.0 {
        lines.push(format!("🌧️ {precip} mm ({precip_prob}% chance)"));
    }
    lines.push(format!(
        "🌅 {}  🌇 {}",
        clock_time(d.sunrise.first()),
        clock_time(d.sunset.first())
    ));
    Ok(lines.join("\n"))
}

// ── Alarm ───────────────────────────────────────────────────────────────

/// When the forecast goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alarm {
    /// `"*"`: once, right after start.
    Immediate,
    /// `"HH:MM"`: once per local calendar day.
    Daily { hour: u32, minute: u32 },
}

impl Alarm {
    pub fn parse(value: &str) -> Result<Self, AlertError> {
        let value = value.trim();
        if value == "*" {
            return Ok(Alarm::Immediate);
        }
        let invalid = || AlertError::Config(format!("forecast.alarm {value:?} is not \"*\" or \"HH:MM\""));
        let (h, m) = value.split_once(':').ok_or_else(invalid)?;
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Alarm::Daily { hour, minute })
    }
}

/// Fires an [`Alarm`] at most once per day.
#[derive(Debug)]
pub struct AlarmClock {
    alarm: Alarm,
    last_fired: Option<NaiveDate>,
    fired_immediate: bool,
}

impl AlarmClock {
    pub fn new(alarm: Alarm) -> Self {
        Self {
            alarm,
            last_fired: None,
            fired_immediate: false,
        }
    }

    pub fn alarm(&self) -> Alarm {
        self.alarm
    }

    /// Check the local wall clock. Returns true when the forecast is due.
    pub fn should_fire(&mut self, now: NaiveDateTime) -> bool {
        match self.alarm {
            Alarm::Immediate => !std::mem::replace(&mut self.fired_immediate, true),
            Alarm::Daily { hour, minute } => {
                let today = now.date();
                if now.hour() != hour || now.minute() != minute || self.last_fired == Some(today) {
                    return false;
                }
                self.last_fired = Some(today);
                true
            }
        }
    }
}

// ── Delivery ────────────────────────────────────────────────────────────

/// Fetch, format and send the forecast of every configured region.
/// Returns how many regions were delivered.
pub async fn send_forecasts(
    source: &dyn ForecastSource,
    sink: &dyn AlertSink,
    channel: &Channel,
    config: &ForecastConfig,
) -> usize {
    let mut delivered = 0;
    for region in &config.regions {
        let text = match source
            .fetch_forecast(region.lat, region.lon, &config.timezone)
            .await
            .and_then(|response| format_forecast(&response, &region.name))
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("forecast: skipping {}: {e}", region.name);
                continue;
            }
        };

        for piece in chunk(&text, FORECAST_CHUNK_BYTES) {
            sink.send_alert(&piece, channel).await;
        }
        tracing::info!("forecast: sent {}", region.name);
        delivered += 1;
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForecastRegion;
    use crate::messenger::mock::RecordingSink;
    use crate::sources::mock::MockForecastSource;

    const SAMPLE: &str = r#"{
        "latitude": 48.14, "longitude": 17.12,
        "current": {"time": "2026-07-01T09:00", "temperature_2m": 21.3,
                    "weather_code": 1, "wind_speed_10m": 8.2, "relative_humidity_2m": 60},
        "daily": {
            "time": ["2026-07-01"],
            "weather_code": [0],
            "temperature_2m_max": [27.5],
            "temperature_2m_min": [14.6],
            "apparent_temperature_max": [28.1],
            "apparent_temperature_min": [14.0],
            "wind_speed_10m_max": [12.4],
            "wind_gusts_10m_max": [30.1],
            "precipitation_sum": [0.0],
            "precipitation_probability_max": [10],
            "sunrise": ["2026-07-01T04:53"],
            "sunset": ["2026-07-01T20:49"]
        }
    }"#;

    fn sample() -> ForecastResponse {
        serde_json::from_str(SAMPLE).unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_format_dry_day() {
        let response = sample();
        assert_eq!(response.current.as_ref().unwrap().weather_code, 1);
        assert_eq!(
            format_forecast(&response, "BA").unwrap(),
            "BA ☀️\n🌡️ ▲28°C ▼15°C\n🌬️ 12 km/h (30 km/h)\n🌅 04:53  🌇 20:49"
        );
    }

    #[test]
    fn test_format_precipitation_line() {
        let mut response = sample();
        response.daily.precipitation_sum = vec![1.2];
        response.daily.precipitation_probability_max = vec![40.0];
        response.daily.weather_code = vec![63];
        let text = format_forecast(&response, "KE").unwrap();
        assert!(text.starts_with("KE 🌧️\n"));
        assert!(text.contains("\n🌧️ 1.2 mm (40% chance)\n"));

        response.daily.precipitation_sum = vec![0.0];
        response.daily.precipitation_probability_max = vec![21.0];
        let text = format_forecast(&response, "KE").unwrap();
        assert!(text.contains("🌧️ 0 mm (21% chance)"));
    }

    #[test]
    fn test_format_unknown_code_and_missing_sun() {
        let mut response = sample();
        response.daily.weather_code = vec![42];
        response.daily.sunrise.clear();
        let text = format_forecast(&response, "BB").unwrap();
        assert!(text.starts_with("BB 🌡️\n"));
        assert!(text.ends_with("🌅 --:--  🌇 20:49"));
        assert_eq!(weather_description(42), "Unknown");
        assert_eq!(weather_description(99), "Severe thunderstorm + hail");
    }

    #[test]
    fn test_negative_temperatures_round_half_up() {
        let mut response = sample();
        response.daily.temperature_2m_max = vec![-2.5];
        response.daily.temperature_2m_min = vec![-7.6];
        let text = format_forecast(&response, "BB").unwrap();
        assert!(text.contains("▲-2°C ▼-8°C"));
    }

    #[test]
    fn test_format_missing_daily_is_error() {
        let err = format_forecast(&ForecastResponse::default(), "BA").unwrap_err();
        assert!(matches!(err, AlertError::Parse { .. }));
    }

    #[test]
    fn test_alarm_parse() {
        assert_eq!(Alarm::parse("*").unwrap(), Alarm::Immediate);
        assert_eq!(
            Alarm::parse("07:30").unwrap(),
            Alarm::Daily { hour: 7, minute: 30 }
        );
        assert!(Alarm::parse("25:99").is_err());
        assert!(Alarm::parse("7h30").is_err());
        assert!(Alarm::parse("").is_err());
    }

    #[test]
    fn test_alarm_fires_once_per_day() {
        let mut clock = AlarmClock::new(Alarm::parse("07:30").unwrap());
        assert!(!clock.should_fire(at("2026-07-01 07:29:50")));
        assert!(clock.should_fire(at("2026-07-01 07:30:10")));
        assert!(!clock.should_fire(at("2026-07-01 07:30:40")));
        assert!(!clock.should_fire(at("2026-07-01 19:30:00")));
        assert!(clock.should_fire(at("2026-07-02 07:30:05")));
    }

    #[test]
    fn test_immediate_alarm_fires_once() {
        let mut clock = AlarmClock::new(Alarm::Immediate);
        assert!(clock.should_fire(at("2026-07-01 03:00:00")));
        assert!(!clock.should_fire(at("2026-07-02 03:00:00")));
    }

    #[tokio::test]
    async fn test_failed_region_is_skipped() {
        let source = MockForecastSource::default();
        source.insert(48.15, sample());
        source.insert(48.73, sample());
        let sink = RecordingSink::new();
        let channel = Channel::from_name(2, "#weather");

        let config = ForecastConfig::default();
        assert_eq!(send_forecasts(&source, &sink, &channel, &config).await, 2);
        assert_eq!(source.calls(), 3);

        let texts = sink.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("BA "));
        assert!(texts[1].starts_with("BB "));
        assert!(sink.sent().iter().all(|(ch, _)| ch == "#weather"));
    }

    #[tokio::test]
    async fn test_long_forecast_is_chunked() {
        let source = MockForecastSource::default();
        source.insert(48.0, sample());
        let sink = RecordingSink::new();
        let channel = Channel::from_name(2, "#weather");
        let config = ForecastConfig {
            regions: vec![ForecastRegion {
                name: "Bratislava Petržalka Ovsište Lúky Dvory Háje Zrkadlový háj Kopčany Starý Háj".into(),
                lat: 48.0,
                lon: 17.0,
            }],
            ..Default::default()
        };

        assert_eq!(send_forecasts(&source, &sink, &channel, &config).await, 1);
        let texts = sink.texts();
        assert!(texts.len() >= 2);
        assert!(texts.iter().all(|t| t.len() <= FORECAST_CHUNK_BYTES));
    }
}
