//! Location data types.

use serde::{Deserialize, Serialize};

use super::error::{GeoError, Result};

/// A validated geographic point.
///
/// Latitude is always within `-90.0..=90.0` and longitude within
/// `-180.0..=180.0`; both are finite. The only way to obtain a `GeoPoint`
/// is through [`GeoPoint::new`] (or deserialization, which runs the same
/// validation), so downstream geometry never has to re-check ranges.
///
/// # Example
///
/// ```
/// use circles_core::location::GeoPoint;
///
/// let point = GeoPoint::new(37.8715, -122.2730).unwrap();
/// assert_eq!(point.latitude(), 37.8715);
///
/// assert!(GeoPoint::new(91.0, 0.0).is_err());
/// assert!(GeoPoint::new(0.0, f64::NAN).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = GeoError;

    fn try_from(raw: RawGeoPoint) -> Result<Self> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    /// Creates a point, rejecting non-finite or out-of-range coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidCoordinate`] if either coordinate is NaN,
    /// infinite, or outside its valid range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let valid_lat = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let valid_lng = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);

        if valid_lat && valid_lng {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(GeoError::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn latitude(self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn longitude(self) -> f64 {
        self.longitude
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_boundaries() {
        assert!(GeoPoint::new(90.0, 0.0).is_ok());
        assert!(GeoPoint::new(-90.0, 0.0).is_ok());
        assert!(GeoPoint::new(0.0, 180.0).is_ok());
        assert!(GeoPoint::new(0.0, -180.0).is_ok());
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert_eq!(
            GeoPoint::new(90.000_1, 0.0),
            Err(GeoError::InvalidCoordinate {
                latitude: 90.000_1,
                longitude: 0.0,
            })
        );
        assert!(GeoPoint::new(-91.0, 0.0).is_err());
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert!(GeoPoint::new(0.0, 180.5).is_err());
        assert!(GeoPoint::new(0.0, -181.0).is_err());
    }

    #[test]
    fn rejects_non_finite_values() {
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
        assert!(GeoPoint::new(f64::NEG_INFINITY, 0.0).is_err());
    }

    #[test]
    fn deserialization_validates_range() {
        let ok: GeoPoint = serde_json::from_str(r#"{"latitude":1.5,"longitude":2.5}"#).unwrap();
        assert_eq!(ok.latitude(), 1.5);
        assert_eq!(ok.longitude(), 2.5);

        let bad = serde_json::from_str::<GeoPoint>(r#"{"latitude":100.0,"longitude":0.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn display_uses_six_decimals() {
        let point = GeoPoint::new(37.8715, -122.273).unwrap();
        assert_eq!(point.to_string(), "(37.871500, -122.273000)");
    }
}
