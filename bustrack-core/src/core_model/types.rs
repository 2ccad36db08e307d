/*
    types.rs - Value types exchanged through the location core

    Defines:
    - ChannelKey: the share identifier a driver publishes under
    - Position: one GPS fix {latitude, longitude, timestamp}
    - Great-circle distance helpers used for fix filtering and path length
*/

use crate::error::{TrackError, TrackResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius used by the haversine formula, in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Milliseconds since the Unix epoch
pub type TimestampMillis = i64;

/// User-supplied identifier of one driver's share
///
/// Never empty. Two publishers picking the same key write to the same
/// channel and the last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelKey(String);

impl ChannelKey {
    /// Build a key, rejecting empty or whitespace-only input
    pub fn new(key: impl Into<String>) -> TrackResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(TrackError::InvalidInput(
                "channel key must not be empty".to_string(),
            ));
        }
        Ok(ChannelKey(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChannelKey {
    type Error = TrackError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ChannelKey::new(value)
    }
}

impl TryFrom<&str> for ChannelKey {
    type Error = TrackError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        ChannelKey::new(value)
    }
}

impl From<ChannelKey> for String {
    fn from(key: ChannelKey) -> Self {
        key.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single GPS fix
///
/// The serialized form has exactly the three fields `latitude`, `longitude`
/// and `timestamp`; it is the only unit exchanged between a publisher and
/// its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: TimestampMillis,
}

impl Position {
    /// Create a position without validating it
    pub fn new(latitude: f64, longitude: f64, timestamp: TimestampMillis) -> Self {
        Position {
            latitude,
            longitude,
            timestamp,
        }
    }

    /// Create a position stamped with the current wall-clock time
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Position::new(latitude, longitude, chrono::Utc::now().timestamp_millis())
    }

    /// Check coordinate ranges
    pub fn validate(&self) -> TrackResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(TrackError::InvalidInput(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(TrackError::InvalidInput(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Great-circle distance to `other` in meters
    pub fn distance_to(&self, other: &Position) -> f64 {
        haversine_meters(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}) @ {}",
            self.latitude, self.longitude, self.timestamp
        )
    }
}

/// Haversine distance between two coordinates in meters
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Total length of a polyline in meters
pub fn path_length_meters(path: &[Position]) -> f64 {
    path.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}
