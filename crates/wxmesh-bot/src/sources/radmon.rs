/// radmon.org station list and last readings.
use async_trait::async_trait;
use reqwest::Client;
use wxmesh_protocol::{
    parse_last_reading, parse_station_list, AlertError, RadiationSource, Reading, Station,
};

use super::fetch_text;

pub const RADMON_URL: &str = "https://radmon.org/radmon.php";

pub struct RadmonClient {
    client: Client,
    base_url: String,
}

impl RadmonClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: RADMON_URL.to_string(),
        }
    }
}

#[async_trait]
impl RadiationSource for RadmonClient {
    async fn fetch_stations(&self) -> Result<Vec<Station>, AlertError> {
        let request = self
            .client
            .get(&self.base_url)
            .query(&[("function", "getcombinedlistjson")]);
        let body = fetch_text(request, "radmon").await?;
        parse_station_list(&body)
    }

    async fn fetch_last_reading(&self, user: &str) -> Result<Option<Reading>, AlertError> {
        let request = self
            .client
            .get(&self.base_url)
            .query(&[("function", "lastreading"), ("user", user)]);
        let body = fetch_text(request, "radmon").await?;
        Ok(parse_last_reading(&body))
    }
}
