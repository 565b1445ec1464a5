//! Top-level API combining discovery and the circle lifecycle.

use std::sync::Arc;

use crate::circle::{
    Circle, CircleConfig, CircleError, CircleId, CircleManager, CircleUpdate, Invitation, Result,
    Role, UserId,
};
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::discovery::{DiscoveryService, NearbyCircle, VisibilityFilter};
use crate::location::GeoPoint;
use crate::store::{DocumentStore, MemoryDocumentStore, SqliteDocumentStore};

/// Core interface for circle functionality.
///
/// This struct serves as the main entry point for all operations. Both
/// halves share one store handle, one configuration and one clock.
///
/// # Examples
///
/// ```
/// use circles_core::circle::{CircleConfig, UserId};
/// use circles_core::location::GeoPoint;
/// use circles_core::{CirclesCore, CoreConfig, VisibilityFilter};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let core = CirclesCore::in_memory(CoreConfig::default()).unwrap();
/// let berkeley = GeoPoint::new(37.8715, -122.2730).unwrap();
///
/// core.create_circle(
///     &UserId::new("alice"),
///     CircleConfig::new("Frisbee").with_location(berkeley, 100.0),
/// )
/// .await
/// .unwrap();
///
/// let nearby = core
///     .discover_nearby(berkeley, 1_000.0, &VisibilityFilter::Public)
///     .await
///     .unwrap();
/// assert_eq!(nearby.len(), 1);
/// # });
/// ```
pub struct CirclesCore<S> {
    circles: CircleManager<S>,
    discovery: DiscoveryService<S>,
}

impl<S> std::fmt::Debug for CirclesCore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CirclesCore")
            .field("circles", &self.circles)
            .field("discovery", &self.discovery)
            .finish()
    }
}

impl CirclesCore<MemoryDocumentStore> {
    /// Creates a core over a fresh in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::InvalidData`] if `config` fails validation.
    pub fn in_memory(config: CoreConfig) -> Result<Self> {
        Self::new(
            Arc::new(MemoryDocumentStore::new()),
            config,
            Arc::new(SystemClock),
        )
    }
}

impl CirclesCore<SqliteDocumentStore> {
    /// Opens (or creates) a `SQLite`-backed core at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::StoreUnavailable`] if the database cannot be
    /// opened, or [`CircleError::InvalidData`] for an invalid configuration.
    pub fn open(path: &std::path::Path, config: CoreConfig) -> Result<Self> {
        let store = Arc::new(SqliteDocumentStore::open(path)?);
        Self::new(store, config, Arc::new(SystemClock))
    }
}

impl<S: DocumentStore + 'static> CirclesCore<S> {
    /// Creates a core over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::InvalidData`] if `config` fails validation.
    pub fn new(store: Arc<S>, config: CoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CircleError::InvalidData(e.to_string()))?;
        Ok(Self {
            circles: CircleManager::new(Arc::clone(&store), config.clone(), Arc::clone(&clock)),
            discovery: DiscoveryService::new(store, config, clock)?,
        })
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        self.circles.config()
    }

    // ==================== Discovery ====================

    /// Active circles within `radius_meters` of `center`, nearest first.
    ///
    /// # Errors
    ///
    /// See [`DiscoveryService::discover_nearby`].
    pub async fn discover_nearby(
        &self,
        center: GeoPoint,
        radius_meters: f64,
        filter: &VisibilityFilter,
    ) -> Result<Vec<NearbyCircle>> {
        self.discovery
            .discover_nearby(center, radius_meters, filter)
            .await
    }

    /// Like [`discover_nearby`](Self::discover_nearby), from raw coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::Geo`] with an invalid-coordinate error before
    /// any store access if the coordinates are out of range.
    pub async fn discover_nearby_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
        filter: &VisibilityFilter,
    ) -> Result<Vec<NearbyCircle>> {
        let center = GeoPoint::new(latitude, longitude)?;
        self.discover_nearby(center, radius_meters, filter).await
    }

    // ==================== Circle Lifecycle ====================

    /// See [`CircleManager::create_circle`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::create_circle`].
    pub async fn create_circle(&self, creator: &UserId, config: CircleConfig) -> Result<Circle> {
        self.circles.create_circle(creator, config).await
    }

    /// See [`CircleManager::get_circle`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::get_circle`].
    pub async fn get_circle(&self, id: &CircleId) -> Result<Circle> {
        self.circles.get_circle(id).await
    }

    /// See [`CircleManager::role_of`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::role_of`].
    pub async fn role_of(&self, id: &CircleId, user: &UserId) -> Result<Role> {
        self.circles.role_of(id, user).await
    }

    /// See [`CircleManager::invite`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::invite`].
    pub async fn invite(&self, id: &CircleId, by: &UserId, target: &UserId) -> Result<()> {
        self.circles.invite(id, by, target).await
    }

    /// See [`CircleManager::accept_invite`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::accept_invite`].
    pub async fn accept(&self, id: &CircleId, user: &UserId) -> Result<()> {
        self.circles.accept_invite(id, user).await
    }

    /// See [`CircleManager::decline_invite`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::decline_invite`].
    pub async fn decline(&self, id: &CircleId, user: &UserId) -> Result<()> {
        self.circles.decline_invite(id, user).await
    }

    /// See [`CircleManager::join_circle`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::join_circle`].
    pub async fn join(&self, id: &CircleId, user: &UserId) -> Result<()> {
        self.circles.join_circle(id, user).await
    }

    /// See [`CircleManager::leave_circle`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::leave_circle`].
    pub async fn leave(&self, id: &CircleId, user: &UserId) -> Result<()> {
        self.circles.leave_circle(id, user).await
    }

    /// See [`CircleManager::update_circle`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::update_circle`].
    pub async fn update(
        &self,
        id: &CircleId,
        by: &UserId,
        update: &CircleUpdate,
    ) -> Result<Circle> {
        self.circles.update_circle(id, by, update).await
    }

    /// See [`CircleManager::delete_circle`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::delete_circle`].
    pub async fn delete(&self, id: &CircleId, by: &UserId) -> Result<()> {
        self.circles.delete_circle(id, by).await
    }

    // ==================== Queries ====================

    /// See [`CircleManager::circles_for_member`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::circles_for_member`].
    pub async fn circles_for_member(&self, user: &UserId) -> Result<Vec<Circle>> {
        self.circles.circles_for_member(user).await
    }

    /// See [`CircleManager::pending_invitations`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::pending_invitations`].
    pub async fn pending_invitations(&self, user: &UserId) -> Result<Vec<Invitation>> {
        self.circles.pending_invitations(user).await
    }

    /// See [`CircleManager::circles_created_by`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::circles_created_by`].
    pub async fn circles_created_by(&self, user: &UserId) -> Result<Vec<Circle>> {
        self.circles.circles_created_by(user).await
    }

    // ==================== Maintenance ====================

    /// See [`CircleManager::reindex_locations`].
    ///
    /// # Errors
    ///
    /// See [`CircleManager::reindex_locations`].
    pub async fn reindex_locations(&self) -> Result<usize> {
        self.circles.reindex_locations().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circle::ErrorKind;

    #[test]
    fn in_memory_uses_default_config() {
        let core = CirclesCore::in_memory(CoreConfig::default()).unwrap();
        assert_eq!(core.config(), &CoreConfig::default());
    }

    #[test]
    fn new_rejects_invalid_config() {
        let err = CirclesCore::new(
            Arc::new(MemoryDocumentStore::new()),
            CoreConfig::default().with_max_query_cells(0),
            Arc::new(SystemClock),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn debug_trait_implementation() {
        let core = CirclesCore::in_memory(CoreConfig::default()).unwrap();
        let debug_str = format!("{core:?}");
        assert!(debug_str.contains("CirclesCore"));
        assert!(debug_str.contains("circles"));
    }

    #[tokio::test]
    async fn invalid_coordinates_fail_before_store_access() {
        let core = CirclesCore::in_memory(CoreConfig::default()).unwrap();
        let err = core
            .discover_nearby_coordinates(91.0, 0.0, 100.0, &VisibilityFilter::Public)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCoordinate);
    }

    #[tokio::test]
    async fn lifecycle_through_facade() {
        let core = CirclesCore::in_memory(CoreConfig::default()).unwrap();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        let circle = core
            .create_circle(&alice, CircleConfig::new("Board games"))
            .await
            .unwrap();
        core.join(&circle.id, &bob).await.unwrap();
        assert_eq!(core.role_of(&circle.id, &bob).await.unwrap(), Role::Member);
        assert_eq!(core.circles_for_member(&bob).await.unwrap().len(), 1);

        core.leave(&circle.id, &bob).await.unwrap();
        core.delete(&circle.id, &alice).await.unwrap();
        assert_eq!(
            core.get_circle(&circle.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
