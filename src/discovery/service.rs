//! Discovery orchestration.

use std::sync::Arc;

use super::bounds::BoundsPlanner;
use super::dispatch::{BasePredicate, RangeQueryDispatcher};
use super::refine::refine;
use crate::circle::record::{self, fields};
use crate::circle::{Circle, CircleError, Result, UserId, Visibility};
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::location::{validate_radius, GeoError, GeoPoint};
use crate::store::DocumentStore;

/// Whose view of the map a discovery runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityFilter {
    /// Public circles only.
    Public,
    /// Public circles plus private circles the user belongs to or is
    /// invited to.
    ViewableBy(UserId),
}

impl VisibilityFilter {
    fn allows(&self, circle: &Circle) -> bool {
        match self {
            Self::Public => circle.visibility == Visibility::Public,
            Self::ViewableBy(user) => circle.can_view(user),
        }
    }

    fn base_predicate(&self) -> Option<BasePredicate> {
        match self {
            Self::Public => Some(record::is_public_document),
            Self::ViewableBy(_) => None,
        }
    }
}

/// A circle found by discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyCircle {
    /// The circle.
    pub circle: Circle,
    /// Distance from the search center to the circle's location, in meters.
    pub distance_meters: f64,
}

/// Finds active circles near a point.
///
/// Runs plan, dispatch, refine, then drops records that fail to decode,
/// have expired, or are hidden by the [`VisibilityFilter`].
pub struct DiscoveryService<S> {
    planner: BoundsPlanner,
    dispatcher: RangeQueryDispatcher<S>,
    config: CoreConfig,
    clock: Arc<dyn Clock>,
}

impl<S> std::fmt::Debug for DiscoveryService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("planner", &self.planner)
            .field("dispatcher", &self.dispatcher)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore + 'static> DiscoveryService<S> {
    /// Creates a discovery service over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::Geo`] if the configured geohash precision is
    /// out of range.
    pub fn new(store: Arc<S>, config: CoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let planner = BoundsPlanner::from_config(&config)?;
        let dispatcher = RangeQueryDispatcher::new(
            store,
            config.collection.clone(),
            fields::GEOHASH,
            config.query_timeout(),
        );
        Ok(Self {
            planner,
            dispatcher,
            config,
            clock,
        })
    }

    /// Creates a discovery service that reads wall-clock time.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_system_clock(store: Arc<S>, config: CoreConfig) -> Result<Self> {
        Self::new(store, config, Arc::new(SystemClock))
    }

    /// Active circles within `radius_meters` of `center`, nearest first.
    ///
    /// An empty result means nothing is nearby; failures are always errors.
    /// Circles that have not started yet are included.
    ///
    /// # Errors
    ///
    /// - [`CircleError::Geo`] ([`GeoError::InvalidRadius`]) for a radius that
    ///   is not positive or exceeds the configured maximum
    /// - [`CircleError::Unauthorized`] for [`VisibilityFilter::ViewableBy`]
    ///   with an empty user
    /// - [`CircleError::Timeout`] if the store does not answer in time
    /// - [`CircleError::StoreUnavailable`] if any bound query fails
    pub async fn discover_nearby(
        &self,
        center: GeoPoint,
        radius_meters: f64,
        filter: &VisibilityFilter,
    ) -> Result<Vec<NearbyCircle>> {
        let radius_meters = validate_radius(radius_meters)?;
        if radius_meters > self.config.max_radius_meters {
            return Err(GeoError::InvalidRadius(radius_meters).into());
        }
        if matches!(filter, VisibilityFilter::ViewableBy(user) if user.is_empty()) {
            return Err(CircleError::Unauthorized(
                "private discovery requires an authenticated user".to_string(),
            ));
        }

        let plan = self.planner.plan(center, radius_meters)?;
        log::debug!(
            "Discovering around {center} within {radius_meters} m: \
             {} cell(s) at precision {} in {} bound(s)",
            plan.cell_count,
            plan.precision,
            plan.bounds.len()
        );

        let candidates = self
            .dispatcher
            .dispatch(&plan.bounds, filter.base_predicate())
            .await?;
        let refined = refine(center, radius_meters, candidates);

        let now = self.clock.now();
        let nearby: Vec<NearbyCircle> = refined
            .into_iter()
            .filter_map(|candidate| {
                match record::decode(&candidate.document, self.config.geohash_precision) {
                    Ok(circle) => Some(NearbyCircle {
                        circle,
                        distance_meters: candidate.distance_meters,
                    }),
                    Err(e) => {
                        log::warn!("Skipping unreadable circle {}: {e}", candidate.id);
                        None
                    }
                }
            })
            .filter(|nearby| nearby.circle.is_active(now) && filter.allows(&nearby.circle))
            .collect();

        log::info!(
            "Found {} circle(s) within {radius_meters} m of {center}",
            nearby.len()
        );
        Ok(nearby)
    }
}
