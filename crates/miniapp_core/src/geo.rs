//! Coordinates, device positions and great-circle distance.

use serde::{Deserialize, Serialize};

/// Event name carrying watched position fixes.
pub const POSITION_UPDATE_EVENT: &str = "location:positionUpdate";

/// Mean Earth radius used for distance estimates.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite latitude in [-90, 90] and longitude in [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Haversine distance to `other` in meters.
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionCoords {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters.
    pub accuracy: f64,
    pub altitude: Option<f64>,
    pub altitude_accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
}

/// Device fix reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub coords: PositionCoords,
    /// Epoch milliseconds.
    pub timestamp: u64,
}

/// Options an app passes with a position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    #[serde(rename = "maximumAge")]
    pub maximum_age_ms: u64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GeoPoint, PositionOptions};
    use serde_json::json;

    #[test]
    fn haversine_matches_known_distances() {
        let paris = GeoPoint::new(48.8566, 2.3522);
        let london = GeoPoint::new(51.5074, -0.1278);
        let meters = paris.distance_meters(&london);
        assert!((meters - 343_500.0).abs() < 1_500.0, "{meters}");
        assert_eq!(paris.distance_meters(&paris), 0.0);

        let equator_a = GeoPoint::new(0.0, 0.0);
        let equator_b = GeoPoint::new(0.0, 1.0);
        assert!((equator_a.distance_meters(&equator_b) - 111_195.0).abs() < 10.0);
    }

    #[test]
    fn rejects_out_of_range_points() {
        assert!(GeoPoint::new(90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.5, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn position_options_fill_defaults() {
        let options: PositionOptions =
            serde_json::from_value(json!({"timeout": 500})).expect("options json");
        assert_eq!(options.timeout_ms, 500);
        assert!(options.enable_high_accuracy);
        assert_eq!(options.maximum_age_ms, 0);
    }
}
