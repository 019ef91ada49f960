//! wxmesh alert layer.
//!
//! Turns lightning strikes, earthquakes, radiation readings, severe-weather
//! warnings and daily forecasts into short channel messages on a MeshCore
//! mesh, on top of `wxmesh-transport`.
//!
//! Delivery is confirmed passively: after each send the messenger listens
//! to the radio's receive log for a repeater rebroadcasting our group text,
//! and retries when none is heard.

pub mod config;
pub mod error;
pub mod forecast;
pub mod geo;
pub mod geocode;
pub mod lightning;
pub mod messenger;
pub mod meteo;
pub mod packet;
pub mod quake;
pub mod radiation;
pub mod runtime;
pub mod sources;
pub mod suppression;
pub mod text;
pub mod transport;

pub use config::{
    AlertConfig, AlertLevel, ConnectionKind, ForecastConfig, ForecastRegion, LightningConfig,
    MeshcoreConfig, MeteoConfig, QuakeConfig, RadiationConfig, SendSection,
};
pub use error::AlertError;
pub use forecast::{format_forecast, Alarm, AlarmClock, ForecastResponse};
pub use geo::{heading_and_distance, Bearing, BoundingBox, Compass, CompassLabels, Position};
pub use geocode::{GeocodeCache, ReverseGeocoder};
pub use lightning::{ClusterKey, LightningMonitor, Strike};
pub use messenger::{
    AlertSink, DeliveryAttempt, DeliveryReport, Messenger, SendConfig, MAX_CHANNEL_TEXT_BYTES,
};
pub use meteo::{MeteoMonitor, MeteoWarning};
pub use packet::{MeshPacket, RouteType, PAYLOAD_TYPE_GRP_TXT};
pub use quake::{parse_seismic_message, QuakeEvent, QuakeMonitor};
pub use radiation::{parse_last_reading, parse_station_list, RadiationMonitor, Reading, Station};
pub use sources::{ForecastSource, RadiationSource, WarningFeed};
pub use suppression::{Retention, SuppressionStore};
pub use text::{chunk, truncate};
pub use transport::MeshTransport;

pub use wxmesh_transport::{channel_hash, derive_channel_secret, Channel};
