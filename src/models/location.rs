// Locations and geographic primitives
//
// A location is a named point of interest with WGS84 coordinates. All radius
// queries in Explora use metres and great-circle (haversine) distance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ExploraError, Result};

/// Mean Earth radius in metres (IUGG)
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Approximate length of one degree of latitude in metres
pub const METERS_PER_DEGREE_LATITUDE: f64 = 111_320.0;

/// Opaque location identifier
///
/// Locations are referenced by id from jobs, media records and snippets.
/// The wrapped integer is assigned by the persistence layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct LocationId(pub i64);

impl LocationId {
    pub fn new(id: i64) -> Self {
        LocationId(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Deterministic artifact key for this location's generated image
    ///
    /// ```rust
    /// # use explora::LocationId;
    /// assert_eq!(LocationId::new(42).artifact_key(), "location_42");
    /// ```
    pub fn artifact_key(&self) -> String {
        format!("location_{}", self.0)
    }
}

impl From<i64> for LocationId {
    fn from(id: i64) -> Self {
        LocationId(id)
    }
}

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A WGS84 coordinate pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range or non-finite coordinates
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ExploraError::InvalidInput(format!(
                "latitude {} is outside [-90, 90]",
                lat
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(ExploraError::InvalidInput(format!(
                "longitude {} is outside [-180, 180]",
                lng
            )));
        }
        Ok(Self { lat, lng })
    }

    /// Great-circle distance to another point in metres (haversine)
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lng - self.lng).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_METERS * c
    }

    /// Degree-space box that contains every point within `radius_m` metres
    ///
    /// Used as a cheap pre-filter before the exact haversine check. Near the
    /// poles the longitude span widens to the full range.
    pub fn bounding_box(&self, radius_m: f64) -> BoundingBox {
        let lat_span = radius_m / METERS_PER_DEGREE_LATITUDE;
        let cos_lat = self.lat.to_radians().cos();
        let lng_span = if cos_lat.abs() < 1e-6 {
            180.0
        } else {
            (radius_m / (METERS_PER_DEGREE_LATITUDE * cos_lat.abs())).min(180.0)
        };

        BoundingBox {
            min_lat: (self.lat - lat_span).max(-90.0),
            max_lat: (self.lat + lat_span).min(90.0),
            min_lng: self.lng - lng_span,
            max_lng: self.lng + lng_span,
        }
    }
}

/// Degree-space rectangle produced by [`GeoPoint::bounding_box`]
///
/// `min_lng`/`max_lng` may fall outside [-180, 180] when the box crosses the
/// antimeridian; [`BoundingBox::contains`] accounts for the wrap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if point.lat < self.min_lat || point.lat > self.max_lat {
            return false;
        }
        [point.lng, point.lng - 360.0, point.lng + 360.0]
            .iter()
            .any(|lng| *lng >= self.min_lng && *lng <= self.max_lng)
    }

    /// Whether the longitude range wraps past +/-180 degrees
    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lng < -180.0 || self.max_lng > 180.0
    }
}

/// A named geographic point of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

impl Location {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.latitude,
            lng: self.longitude,
        }
    }

    /// Distance from `origin` to this location in metres
    pub fn distance_from(&self, origin: &GeoPoint) -> f64 {
        origin.distance_to(&self.point())
    }
}

/// Input for creating a location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewLocation {
    pub fn new<S: Into<String>>(name: S, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    /// Trim the name and check coordinates
    pub fn validate(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(ExploraError::InvalidInput(
                "location name must not be empty".to_string(),
            ));
        }
        GeoPoint::new(self.latitude, self.longitude)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_key_is_deterministic() {
        let id = LocationId::new(7);
        assert_eq!(id.artifact_key(), "location_7");
        assert_eq!(id.artifact_key(), LocationId::from(7).artifact_key());
    }

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(48.85, 2.35).is_ok());
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(90.5, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.1).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_haversine_distance() {
        let notre_dame = GeoPoint::new(48.852968, 2.349902).unwrap();
        let louvre = GeoPoint::new(48.860611, 2.337644).unwrap();

        let d = notre_dame.distance_to(&louvre);
        // Roughly 1.2 km apart
        assert!(d > 1_100.0 && d < 1_300.0, "distance was {}", d);
        assert_eq!(notre_dame.distance_to(&notre_dame), 0.0);
    }

    #[test]
    fn test_bounding_box_contains_radius() {
        let origin = GeoPoint::new(48.85, 2.35).unwrap();
        let bbox = origin.bounding_box(500.0);

        let near = GeoPoint::new(48.853, 2.352).unwrap();
        assert!(origin.distance_to(&near) < 500.0);
        assert!(bbox.contains(&near));

        let far = GeoPoint::new(48.90, 2.35).unwrap();
        assert!(!bbox.contains(&far));
    }

    #[test]
    fn test_bounding_box_antimeridian() {
        let origin = GeoPoint::new(0.0, 179.999).unwrap();
        let bbox = origin.bounding_box(1_000.0);
        assert!(bbox.crosses_antimeridian());
        assert!(bbox.contains(&GeoPoint::new(0.0, -179.999).unwrap()));
    }

    #[test]
    fn test_new_location_validation() {
        let valid = NewLocation::new("  Notre-Dame de Paris ", 48.852968, 2.349902)
            .validate()
            .unwrap();
        assert_eq!(valid.name, "Notre-Dame de Paris");

        assert!(NewLocation::new("   ", 0.0, 0.0).validate().is_err());
        assert!(NewLocation::new("Nowhere", 100.0, 0.0).validate().is_err());
    }
}
