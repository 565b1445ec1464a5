//! Runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::location::geohash::MAX_PRECISION;

/// Settings shared by discovery and the circle lifecycle.
///
/// Every field has a default, so a partial JSON object is enough:
///
/// ```
/// use circles_core::CoreConfig;
///
/// let config = CoreConfig::from_json(r#"{"query_timeout_ms": 2500}"#).unwrap();
/// assert_eq!(config.query_timeout().as_millis(), 2500);
/// assert_eq!(config.collection, "circles");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Store collection holding circle documents.
    pub collection: String,

    /// Length of the geohash stored on each circle (1-12).
    pub geohash_precision: usize,

    /// Upper bound on geohash cells the bounds planner may enumerate
    /// before falling back to a coarser precision.
    pub max_query_cells: usize,

    /// Deadline for a whole discovery call, in milliseconds.
    pub query_timeout_ms: u64,

    /// Largest accepted discovery radius, in meters.
    pub max_radius_meters: f64,

    /// Lifetime given to circles created without an explicit duration.
    pub default_duration_minutes: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            collection: "circles".to_string(),
            geohash_precision: 10,
            max_query_cells: 9,
            query_timeout_ms: 10_000,
            max_radius_meters: 50_000.0,
            default_duration_minutes: 24 * 60,
        }
    }
}

impl CoreConfig {
    /// Parses a configuration from JSON, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value fails
    /// [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes this configuration to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (extremely rare).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection.is_empty() {
            return Err(ConfigError::Invalid("collection must not be empty"));
        }
        if self.geohash_precision == 0 || self.geohash_precision > MAX_PRECISION {
            return Err(ConfigError::Invalid("geohash_precision must be 1-12"));
        }
        if self.max_query_cells == 0 {
            return Err(ConfigError::Invalid("max_query_cells must be positive"));
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid("query_timeout_ms must be positive"));
        }
        if !(self.max_radius_meters.is_finite() && self.max_radius_meters > 0.0) {
            return Err(ConfigError::Invalid("max_radius_meters must be positive"));
        }
        if self.default_duration_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "default_duration_minutes must be positive",
            ));
        }
        Ok(())
    }

    /// Discovery deadline as a [`Duration`].
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Sets the store collection.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Sets the discovery deadline.
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the largest accepted discovery radius.
    #[must_use]
    pub const fn with_max_radius(mut self, meters: f64) -> Self {
        self.max_radius_meters = meters;
        self
    }

    /// Sets the planner's cell budget.
    #[must_use]
    pub const fn with_max_query_cells(mut self, cells: usize) -> Self {
        self.max_query_cells = cells;
        self
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON could not be parsed.
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
