//! Upstream adapters: HTTP pollers, the strike and quake push streams,
//! and the reverse geocoder.

pub mod blitzortung;
pub mod meteoalarm;
pub mod nominatim;
pub mod open_meteo;
pub mod radmon;
pub mod seismic;

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use wxmesh_protocol::AlertError;

/// Sent with every HTTP request; Nominatim rejects anonymous clients.
pub const USER_AGENT: &str = concat!("wxmesh-bot/", env!("CARGO_PKG_VERSION"));

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP client for all pollers.
pub fn http_client() -> Result<Client, AlertError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| AlertError::upstream("http", e))
}

/// Send a request and return the body of a successful response.
pub(crate) async fn fetch_text(
    request: RequestBuilder,
    service: &'static str,
) -> Result<String, AlertError> {
    let response = request
        .send()
        .await
        .map_err(|e| AlertError::upstream(service, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(AlertError::upstream(service, format!("HTTP {status}")));
    }
    response
        .text()
        .await
        .map_err(|e| AlertError::upstream(service, e))
}
