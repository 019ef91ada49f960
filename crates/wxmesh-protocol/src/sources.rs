//! Upstream data sources polled by the engines.
//!
//! In production: HTTP adapters in the bot binary.
//! In tests: the scripted mocks below.

use crate::error::AlertError;
use crate::forecast::ForecastResponse;
use crate::meteo::MeteoWarning;
use crate::radiation::{Reading, Station};

/// Station list and per-station last reading.
#[async_trait::async_trait]
pub trait RadiationSource: Send + Sync {
    async fn fetch_stations(&self) -> Result<Vec<Station>, AlertError>;

    /// `Ok(None)` when the station answered with something unparseable.
    async fn fetch_last_reading(&self, user: &str) -> Result<Option<Reading>, AlertError>;
}

/// Severe-weather warning feed.
#[async_trait::async_trait]
pub trait WarningFeed: Send + Sync {
    async fn fetch_warnings(&self) -> Result<Vec<MeteoWarning>, AlertError>;
}

/// Daily forecast for a position.
#[async_trait::async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
        timezone: &str,
    ) -> Result<ForecastResponse, AlertError>;
}

// ── Mocks (tests) ───────────────────────────────────────────────────────
