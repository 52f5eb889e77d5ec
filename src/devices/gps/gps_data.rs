use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversion factor from meters per second to miles per hour.
pub const MPS_TO_MPH: f32 = 2.23694;

/// Conversion factor from knots to meters per second.
pub const KNOTS_TO_MPS: f32 = 0.514444;

/// One recorded location fix.
///
/// Mirrors what a platform location API reports so the store and the views
/// never depend on a particular receiver. Values are taken as reported; no
/// range checks are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub accuracy: f32,   // meters, lower is better
    pub timestamp: i64,  // Unix epoch milliseconds
    pub latitude: f64,
    pub longitude: f64,
    pub bearing: f32,    // degrees
    pub speed: f32,      // meters per second
    pub provider: String,
}

impl LocationSample {
    pub fn new(
        accuracy: f32,
        timestamp: i64,
        latitude: f64,
        longitude: f64,
        bearing: f32,
        speed: f32,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            accuracy,
            timestamp,
            latitude,
            longitude,
            bearing,
            speed,
            provider: provider.into(),
        }
    }

    pub fn speed_mph(&self) -> f32 {
        self.speed * MPS_TO_MPH
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

impl fmt::Display for LocationSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6}°, {:.6}° ±{:.1}m bearing {:.1}° speed {:.2} m/s via {}",
            self.latitude, self.longitude, self.accuracy, self.bearing, self.speed, self.provider
        )?;
        match self.datetime() {
            Some(dt) => write!(f, " at {}", dt.format("%Y-%m-%d %H:%M:%S%.3f UTC")),
            None => write!(f, " at {}ms", self.timestamp),
        }
    }
}

// Helper function to parse coordinates like "0617.5017S" or "10647.6637E"
pub fn parse_coordinate(coord_str: &str) -> Option<f64> {
    if coord_str.len() < 2 {
        return None;
    }

    // The hemisphere letter may be any char after a lossy decode.
    let direction = coord_str.chars().next_back()?;
    let num_str = &coord_str[..coord_str.len() - direction.len_utf8()];

    let coord_val = num_str.parse::<f64>().ok()?;

    // Convert DDMM.MMMM to decimal degrees
    let degrees = (coord_val / 100.0).trunc();
    let minutes = coord_val - degrees * 100.0;
    let decimal_degrees = degrees + minutes / 60.0;

    match direction {
        'N' | 'E' => Some(decimal_degrees),
        'S' | 'W' => Some(-decimal_degrees),
        _ => None,
    }
}
