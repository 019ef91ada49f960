/// Geospatial helpers: great-circle distance, initial bearing, 8-point
/// compass reduction and bounding boxes.
///
/// Pure functions, no state.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// One of the eight principal compass directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Compass {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Compass {
    pub const ALL: [Compass; 8] = [
        Compass::N,
        Compass::NE,
        Compass::E,
        Compass::SE,
        Compass::S,
        Compass::SW,
        Compass::W,
        Compass::NW,
    ];

    /// Nearest direction for a bearing in degrees. Any finite input is
    /// accepted and normalised into `[0, 360)` first.
    pub fn from_degrees(degrees: f64) -> Self {
        let normalized = degrees.rem_euclid(360.0);
        let index = (normalized / 45.0).round() as usize % 8;
        Self::ALL[index]
    }

    /// Short code (`"N"`, `"NE"`, ...).
    pub fn code(self) -> &'static str {
        match self {
            Compass::N => "N",
            Compass::NE => "NE",
            Compass::E => "E",
            Compass::SE => "SE",
            Compass::S => "S",
            Compass::SW => "SW",
            Compass::W => "W",
            Compass::NW => "NW",
        }
    }
}

impl fmt::Display for Compass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A point on the globe, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Direction and distance from a reference point to a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bearing {
    pub heading: Compass,
    /// Initial bearing in degrees, `[0, 360)`.
    pub degrees: f64,
    pub distance_km: f64,
}

/// Heading and haversine distance from `from` to `to`.
pub fn heading_and_distance(from: Position, to: Position) -> Bearing {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (to.lon - from.lon).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    let degrees = y.atan2(x).to_degrees().rem_euclid(360.0);

    Bearing {
        heading: Compass::from_degrees(degrees),
        degrees,
        distance_km: EARTH_RADIUS_KM * c,
    }
}

/// Inclusive latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Points on the edge count as inside.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// Whether min ≤ max on both axes.
    pub fn is_valid(&self) -> bool {
        self.min_lat <= self.max_lat && self.min_lon <= self.max_lon
    }
}

impl Default for BoundingBox {
    /// Western Slovakia and the surrounding border region.
    fn default() -> Self {
        Self::new(47.51, 15.54, 48.76, 18.62)
    }
}

/// Human-readable names for the compass directions, used in alert text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassLabels {
    #[serde(rename = "N")]
    pub n: String,
    #[serde(rename = "NE")]
    pub ne: String,
    #[serde(rename = "E")]
    pub e: String,
    #[serde(rename = "SE")]
    pub se: String,
    #[serde(rename = "S")]
    pub s: String,
    #[serde(rename = "SW")]
    pub sw: String,
    #[serde(rename = "W")]
    pub w: String,
    #[serde(rename = "NW")]
    pub nw: String,
}

impl CompassLabels {
    pub fn label(&self, heading: Compass) -> &str {
        match heading {
            Compass::N => &self.n,
            Compass::NE => &self.ne,
            Compass::E => &self.e,
            Compass::SE => &self.se,
            Compass::S => &self.s,
            Compass::SW => &self.sw,
            Compass::W => &self.w,
            Compass::NW => &self.nw,
        }
    }
}

impl Default for CompassLabels {
    fn default() -> Self {
        Self {
            n: "North".into(),
            ne: "North-East".into(),
            e: "East".into(),
            se: "South-East".into(),
            s: "South".into(),
            sw: "South-West".into(),
            w: "West".into(),
            nw: "North-West".into(),
        }
    }
}
