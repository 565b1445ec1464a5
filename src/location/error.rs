//! Error types for geometry and geohash operations.

use thiserror::Error;

/// Error type for location operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    /// Latitude or longitude outside the valid range, or not finite.
    #[error("Invalid coordinate: ({latitude}, {longitude})")]
    InvalidCoordinate {
        /// The rejected latitude.
        latitude: f64,
        /// The rejected longitude.
        longitude: f64,
    },

    /// Search or circle radius that is not a positive finite number of meters.
    #[error("Invalid radius: {0} m")]
    InvalidRadius(f64),

    /// Geohash precision outside the supported range.
    #[error("Invalid geohash precision: {0}")]
    InvalidPrecision(usize),

    /// Geohash string that is empty or contains characters outside the alphabet.
    #[error("Invalid geohash: {0:?}")]
    InvalidGeohash(String),
}

/// Result type alias for location operations.
pub type Result<T> = std::result::Result<T, GeoError>;
