//! Geospatial discovery over a string-range index.
//!
//! The backing store can only scan one string field by lexicographic range,
//! so "circles within R of P" is answered in four steps:
//!
//! ```text
//! BoundsPlanner ─▶ RangeQueryDispatcher ─▶ refine ─▶ DiscoveryService
//!  (geohash ranges)  (one scan per range,    (dedupe,    (decode, expiry,
//!                     concurrently)           haversine)  visibility)
//! ```
//!
//! Coverage is conservative: the ranges may return circles outside the
//! disc but never miss one inside it.

pub mod bounds;
pub mod dispatch;
pub mod refine;
mod service;

pub use bounds::{BoundsPlanner, QueryBound, QueryPlan};
pub use dispatch::{BasePredicate, RangeQueryDispatcher};
pub use refine::{refine, RefinedCandidate};
pub use service::{DiscoveryService, NearbyCircle, VisibilityFilter};
