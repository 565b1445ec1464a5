//! Location primitives for circle discovery.
//!
//! Provides the building blocks the discovery engine relies on:
//! - Validated geographic points ([`GeoPoint`])
//! - Geohash encoding and cell-bounds decoding ([`geohash`])
//! - Great-circle distance via the haversine formula ([`distance`])
//!
//! All functions here are pure. Validation failures are reported before any
//! store I/O happens, so callers can reject a bad query up front.
//!
//! # Example Usage
//!
//! ```
//! use circles_core::location::{geohash, haversine_distance, GeoPoint};
//!
//! let berkeley = GeoPoint::new(37.8715, -122.2730).unwrap();
//! let hash = geohash::encode(berkeley, 7).unwrap();
//! assert_eq!(hash.len(), 7);
//!
//! let bounds = geohash::decode_bounds(&hash).unwrap();
//! assert!(bounds.contains(berkeley));
//!
//! let oakland = GeoPoint::new(37.8044, -122.2712).unwrap();
//! let meters = haversine_distance(berkeley, oakland);
//! assert!((7_000.0..8_000.0).contains(&meters));
//! ```

pub mod distance;
mod error;
pub mod geohash;
pub mod types;

pub use distance::{destination, haversine_distance, validate_radius, EARTH_RADIUS_METERS};
pub use error::{GeoError, Result};
pub use types::GeoPoint;
