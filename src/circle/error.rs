//! Error types for circle discovery and lifecycle operations.
//!
//! Every failure maps onto an [`ErrorKind`], which is what callers branch
//! on: "no circles nearby" is an empty `Ok`, while "not allowed" or "store
//! down" are always typed errors.

use std::time::Duration;

use thiserror::Error;

use crate::location::GeoError;
use crate::store::StoreError;

/// Coarse classification of a [`CircleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Latitude/longitude out of range or not finite.
    InvalidCoordinate,
    /// Radius not a positive finite number, or above the configured maximum.
    InvalidRadius,
    /// Other malformed caller input (empty name, bad precision, ...).
    InvalidInput,
    /// Store transport/backend failure.
    StoreUnavailable,
    /// Discovery deadline elapsed.
    Timeout,
    /// Circle missing, deleted, or expired.
    NotFound,
    /// Target holds no pending invite.
    NoSuchInvite,
    /// Actor lacks the role required for the transition.
    Unauthorized,
    /// Transition conflicts with current membership (e.g. already a member).
    Conflict,
    /// Internal consistency check failed; indicates a bug or corrupt record.
    InvariantViolation,
}

/// Error type for circle operations.
#[derive(Error, Debug)]
pub enum CircleError {
    /// Geometry validation failed.
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// The document store could not serve the request.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Discovery did not finish before its deadline.
    #[error("Discovery timed out after {0:?}")]
    Timeout(Duration),

    /// Circle not found.
    #[error("Circle not found: {0}")]
    NotFound(String),

    /// Circle exists but has expired.
    #[error("Circle expired: {0}")]
    Expired(String),

    /// The user has no pending invite to the circle.
    #[error("No pending invite for {user} in circle {circle}")]
    NoSuchInvite {
        /// Circle ID.
        circle: String,
        /// User ID.
        user: String,
    },

    /// Actor is not allowed to perform the operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Membership state conflict.
    #[error("Membership conflict: {0}")]
    MembershipConflict(String),

    /// Invalid data provided.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A stored document could not be decoded into a circle.
    #[error("Invalid record {id}: {reason}")]
    InvalidRecord {
        /// ID of the offending document, if known.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Internal invariant violated.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl CircleError {
    /// Classifies this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Geo(GeoError::InvalidCoordinate { .. }) => ErrorKind::InvalidCoordinate,
            Self::Geo(GeoError::InvalidRadius(_)) => ErrorKind::InvalidRadius,
            Self::Geo(_) | Self::InvalidData(_) => ErrorKind::InvalidInput,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::NotFound(_) | Self::Expired(_) => ErrorKind::NotFound,
            Self::NoSuchInvite { .. } => ErrorKind::NoSuchInvite,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::MembershipConflict(_) => ErrorKind::Conflict,
            Self::InvalidRecord { .. } | Self::InvariantViolation(_) => {
                ErrorKind::InvariantViolation
            }
        }
    }

    /// Returns whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::StoreUnavailable | ErrorKind::Timeout)
    }
}

impl From<StoreError> for CircleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key, .. } => Self::NotFound(key),
            StoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
            StoreError::Database(e) => Self::StoreUnavailable(e.to_string()),
            StoreError::Serialization(e) => Self::InvariantViolation(e.to_string()),
            StoreError::InvalidDocument(reason) => Self::InvariantViolation(reason),
        }
    }
}

/// Result type alias for circle operations.
pub type Result<T> = std::result::Result<T, CircleError>;
