//! Circle lifecycle and membership.
//!
//! A circle is a small, time-bounded group anchored at an optional place.
//! This module owns everything about circles except finding them by
//! location (see [`crate::discovery`]).
//!
//! # Architecture
//!
//! ```text
//! CircleManager (store-facing entry points)
//!     ├── state   (pure transitions + authorization on a Circle snapshot)
//!     └── record  (document layout, version 1 migration, patches)
//! ```
//!
//! # Types
//!
//! - [`Circle`]: identity, membership sets, timing window, visibility
//! - [`Role`]: a user's relationship to a circle
//! - [`CircleConfig`] / [`CircleUpdate`]: creation and partial-update input
//! - [`Invitation`]: a pending invite as seen by the invitee

mod error;
mod manager;
pub mod record;
mod state;
pub mod types;

pub use error::{CircleError, ErrorKind, Result};
pub use manager::CircleManager;
pub use state::{Transition, UpdatedField};
pub use types::{
    Circle, CircleConfig, CircleDuration, CircleId, CircleLocation, CircleUpdate, Invitation,
    Role, UserId, Visibility,
};
