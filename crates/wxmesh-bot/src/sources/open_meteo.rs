/// Open-Meteo daily forecast.
use async_trait::async_trait;
use reqwest::Client;
use wxmesh_protocol::forecast::{CURRENT_FIELDS, DAILY_FIELDS};
use wxmesh_protocol::{AlertError, ForecastResponse, ForecastSource};

use super::fetch_text;

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: OPEN_METEO_URL.to_string(),
        }
    }
}

/// Query string for today's forecast at a position.
pub fn forecast_query(lat: f64, lon: f64, timezone: &str) -> Vec<(&'static str, String)> {
    vec![
        ("latitude", lat.to_string()),
        ("longitude", lon.to_string()),
        ("timezone", timezone.to_string()),
        ("forecast_days", "1".to_string()),
        ("daily", DAILY_FIELDS.join(",")),
        ("current", CURRENT_FIELDS.join(",")),
    ]
}

#[async_trait]
impl ForecastSource for OpenMeteoClient {
    async fn fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        timezone: &str,
    ) -> Result<ForecastResponse, AlertError> {
        let request = self
            .client
            .get(&self.base_url)
            .query(&forecast_query(lat, lon, timezone));
        let body = fetch_text(request, "open-meteo").await?;
        Ok(serde_json::from_str(&body)?)
    }
}
