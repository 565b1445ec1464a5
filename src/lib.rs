//! Circles Core Library
//!
//! Discovery and lifecycle of small, time-bounded, location-scoped groups
//! ("circles"). Finds circles near a point using only a string-range index
//! on a document store, and enforces the membership state machine that
//! decides who may view, join, or administer each circle.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

mod api;
pub mod circle;
pub mod clock;
mod config;
pub mod discovery;
pub mod location;
pub mod store;

pub use api::CirclesCore;
pub use circle::{CircleError, ErrorKind};
pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use discovery::{NearbyCircle, VisibilityFilter};
