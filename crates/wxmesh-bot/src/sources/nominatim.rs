/// Nominatim reverse geocoding.
///
/// Place names read `village|town|city, municipality, state, country`,
/// skipping parts the answer does not have. Any failure resolves to an
/// empty name.
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use wxmesh_protocol::ReverseGeocoder;

use super::fetch_text;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";

pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: NOMINATIM_URL.to_string(),
        }
    }
}

fn non_empty<'a>(address: &'a Value, name: &str) -> Option<&'a str> {
    address
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Place name from a reverse-geocoding answer.
pub fn format_address(answer: &Value) -> String {
    if answer.get("error").is_some() {
        return String::new();
    }
    let Some(address) = answer.get("address") else {
        return String::new();
    };
    let field = |name| non_empty(address, name);

    let settlement = field("village").or_else(|| field("town")).or_else(|| field("city"));
    [settlement, field("municipality"), field("state"), field("country")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn resolve(&self, lat: f64, lon: f64) -> String {
        let request = self.client.get(&self.base_url).query(&[
            ("format", "json".to_string()),
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
        ]);
        let body = match fetch_text(request, "nominatim").await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("geocode: lookup failed: {e}");
                return String::new();
            }
        };
        match serde_json::from_str::<Value>(&body) {
            Ok(answer) => format_address(&answer),
            Err(e) => {
                tracing::warn!("geocode: bad answer: {e}");
                String::new()
            }
        }
    }
}
