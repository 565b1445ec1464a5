//! Geohash encoding and cell-bounds decoding.
//!
//! A geohash interleaves longitude and latitude bisection bits and writes
//! them five at a time in a base-32 alphabet. Each additional character
//! shrinks the cell by a factor of 32, and every prefix of a hash is the
//! hash of the enclosing, coarser cell.
//!
//! # Geohash Precision Table
//!
//! | Length | Cell Width | Cell Height |
//! |--------|-----------|-------------|
//! | 4      | 39.1 km   | 19.5 km     |
//! | 5      | 4.9 km    | 4.9 km      |
//! | 6      | 1.2 km    | 0.61 km     |
//! | 7      | 153 m     | 153 m       |
//! | 8      | 38 m      | 19 m        |
//! | 10     | 1.2 m     | 0.6 m       |
//!
//! (Widths measured at the equator.)

use super::error::{GeoError, Result};
use super::types::GeoPoint;

/// The geohash base-32 alphabet, in lexicographic order.
pub const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Longest geohash supported by the encoder.
pub const MAX_PRECISION: usize = 12;

/// Latitude/longitude box covered by a geohash cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    /// Southern edge in degrees.
    pub lat_min: f64,
    /// Northern edge in degrees.
    pub lat_max: f64,
    /// Western edge in degrees.
    pub lng_min: f64,
    /// Eastern edge in degrees.
    pub lng_max: f64,
}

impl CellBounds {
    /// Returns whether the point lies inside this cell (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.lat_min..=self.lat_max).contains(&point.latitude())
            && (self.lng_min..=self.lng_max).contains(&point.longitude())
    }
}

/// Encodes a point as a geohash of the given length.
///
/// # Errors
///
/// Returns [`GeoError::InvalidPrecision`] if `precision` is not in
/// `1..=MAX_PRECISION`.
///
/// # Examples
///
/// ```
/// use circles_core::location::{geohash, GeoPoint};
///
/// let point = GeoPoint::new(37.7749, -122.4194).unwrap();
/// let hash8 = geohash::encode(point, 8).unwrap();
/// let hash5 = geohash::encode(point, 5).unwrap();
/// assert!(hash8.starts_with(&hash5));
/// ```
pub fn encode(point: GeoPoint, precision: usize) -> Result<String> {
    validate_precision(precision)?;

    ::geohash::encode(
        ::geohash::Coord {
            x: point.longitude(),
            y: point.latitude(),
        },
        precision,
    )
    .map_err(|_| GeoError::InvalidCoordinate {
        latitude: point.latitude(),
        longitude: point.longitude(),
    })
}

/// Encodes raw coordinates, validating them first.
///
/// # Errors
///
/// Returns [`GeoError::InvalidCoordinate`] for out-of-range coordinates and
/// [`GeoError::InvalidPrecision`] for an unsupported length.
pub fn encode_coordinates(latitude: f64, longitude: f64, precision: usize) -> Result<String> {
    encode(GeoPoint::new(latitude, longitude)?, precision)
}

/// Decodes a geohash into the lat/lng box of its cell.
///
/// # Errors
///
/// Returns [`GeoError::InvalidGeohash`] if the hash is empty, longer than
/// [`MAX_PRECISION`], or contains characters outside [`BASE32`].
pub fn decode_bounds(hash: &str) -> Result<CellBounds> {
    if hash.is_empty() || hash.len() > MAX_PRECISION || !hash.bytes().all(is_base32) {
        return Err(GeoError::InvalidGeohash(hash.to_string()));
    }

    let rect =
        ::geohash::decode_bbox(hash).map_err(|_| GeoError::InvalidGeohash(hash.to_string()))?;

    Ok(CellBounds {
        lat_min: rect.min().y,
        lat_max: rect.max().y,
        lng_min: rect.min().x,
        lng_max: rect.max().x,
    })
}

/// Returns the `(height, width)` in degrees of a cell at `precision`.
///
/// Longitude takes the extra bit when the total bit count is odd, so odd
/// precisions have cells twice as wide (in degrees) as they are tall.
///
/// # Errors
///
/// Returns [`GeoError::InvalidPrecision`] if `precision` is not in
/// `1..=MAX_PRECISION`.
pub fn cell_size_degrees(precision: usize) -> Result<(f64, f64)> {
    validate_precision(precision)?;

    let bits = precision * 5;
    let lng_bits = bits.div_ceil(2);
    let lat_bits = bits / 2;

    // At most 30 bits per axis for supported precisions.
    Ok((
        180.0 / f64::from(1u32 << lat_bits),
        360.0 / f64::from(1u32 << lng_bits),
    ))
}

/// Returns the hash that follows `hash` among hashes of the same length.
///
/// Returns `None` for the last hash of its length (all `z`).
///
/// ```
/// use circles_core::location::geohash::next_hash;
///
/// assert_eq!(next_hash("9q8y").as_deref(), Some("9q8z"));
/// assert_eq!(next_hash("9q8z").as_deref(), Some("9q90"));
/// assert_eq!(next_hash("zz"), None);
/// ```
#[must_use]
pub fn next_hash(hash: &str) -> Option<String> {
    let mut digits: Vec<usize> = hash
        .bytes()
        .map(|b| BASE32.iter().position(|&c| c == b))
        .collect::<Option<_>>()?;

    for digit in digits.iter_mut().rev() {
        if *digit + 1 < BASE32.len() {
            *digit += 1;
            return Some(digits.iter().map(|&d| char::from(BASE32[d])).collect());
        }
        *digit = 0;
    }

    None
}

/// Returns whether `byte` belongs to the geohash alphabet.
#[must_use]
pub fn is_base32(byte: u8) -> bool {
    BASE32.contains(&byte)
}

fn validate_precision(precision: usize) -> Result<()> {
    if precision == 0 || precision > MAX_PRECISION {
        return Err(GeoError::InvalidPrecision(precision));
    }
    Ok(())
}
