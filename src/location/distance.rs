//! Great-circle distance on a spherical Earth.

use super::error::{GeoError, Result};
use super::types::GeoPoint;

/// Mean Earth radius in meters used for all distance math.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two points, in meters.
///
/// `a = sin²(Δlat/2) + cos(lat1)·cos(lat2)·sin²(Δlng/2)`,
/// `d = 2·R·atan2(√a, √(1−a))`.
///
/// # Examples
///
/// ```
/// use circles_core::location::{haversine_distance, GeoPoint};
///
/// let p = GeoPoint::new(37.8715, -122.2730).unwrap();
/// assert_eq!(haversine_distance(p, p), 0.0);
/// ```
#[must_use]
pub fn haversine_distance(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude().to_radians();
    let lat2 = to.latitude().to_radians();
    let d_lat = (to.latitude() - from.latitude()).to_radians();
    let d_lng = (to.longitude() - from.longitude()).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1 for antipodal points.
    let a = a.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Point reached by travelling `distance_meters` from `origin` along the
/// initial bearing `bearing_degrees` (clockwise from north).
///
/// Longitude is normalized into `-180.0..=180.0`.
#[must_use]
pub fn destination(origin: GeoPoint, bearing_degrees: f64, distance_meters: f64) -> GeoPoint {
    let delta = distance_meters / EARTH_RADIUS_METERS;
    let theta = bearing_degrees.to_radians();
    let lat1 = origin.latitude().to_radians();
    let lng1 = origin.longitude().to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos())
        .clamp(-1.0, 1.0)
        .asin();
    let lng2 = lng1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    let latitude = lat2.to_degrees().clamp(-90.0, 90.0);
    let longitude = normalize_longitude(lng2.to_degrees());

    GeoPoint::new(latitude, longitude).unwrap_or(origin)
}

/// Checks that a radius is a positive, finite number of meters.
///
/// # Errors
///
/// Returns [`GeoError::InvalidRadius`] otherwise.
pub fn validate_radius(radius_meters: f64) -> Result<f64> {
    if radius_meters.is_finite() && radius_meters > 0.0 {
        Ok(radius_meters)
    } else {
        Err(GeoError::InvalidRadius(radius_meters))
    }
}

/// Arc length in degrees of latitude for a distance along a meridian.
#[must_use]
pub fn meters_to_latitude_degrees(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_METERS).to_degrees()
}

fn normalize_longitude(longitude: f64) -> f64 {
    let wrapped = (longitude + 180.0).rem_euclid(360.0) - 180.0;
    // Keep +180 instead of folding it to -180.
    if wrapped == -180.0 && longitude > 0.0 {
        180.0
    } else {
        wrapped
    }
}
