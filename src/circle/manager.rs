//! High-level circle management API.
//!
//! [`CircleManager`] is the only component that writes circle documents.
//! Every mutation follows the same shape:
//!
//! 1. re-read a fresh snapshot of the circle from the store
//! 2. run the state-machine transition against it (authorization included)
//! 3. persist the resulting [`Transition`] with atomic array edits
//!
//! Each transition is a single document write. Accepting (or joining on) an
//! invite moves the user from `pendingInvites` to `members` with one
//! [`DocumentStore::array_move`], so a failed write leaves the invite intact.
//!
//! There are no cross-document transactions. Two racing `accept` calls from
//! the same user both pass step 2, and the idempotent array edits make the
//! second write harmless.
//!
//! Reads write back what decoding repaired: invites held by members are
//! removed and a missing or short geohash index is rewritten.
//! [`CircleManager::reindex_locations`] does the same for every stored circle.

use std::sync::Arc;

use serde_json::Value;

use super::error::{CircleError, Result};
use super::record::{self, fields};
use super::state::Transition;
use super::types::{
    Circle, CircleConfig, CircleDuration, CircleId, CircleLocation, CircleUpdate, Invitation,
    Role, UserId,
};
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::store::{Document, DocumentStore};

/// Circle lifecycle operations against a [`DocumentStore`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use circles_core::circle::{CircleConfig, CircleManager, UserId};
/// use circles_core::store::MemoryDocumentStore;
/// use circles_core::CoreConfig;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let manager = CircleManager::with_system_clock(
///     Arc::new(MemoryDocumentStore::new()),
///     CoreConfig::default(),
/// );
/// let alice = UserId::new("alice");
/// let circle = manager
///     .create_circle(&alice, CircleConfig::new("Picnic"))
///     .await
///     .unwrap();
/// assert!(circle.is_member(&alice));
/// # });
/// ```
pub struct CircleManager<S> {
    store: Arc<S>,
    config: CoreConfig,
    clock: Arc<dyn Clock>,
}

impl<S> std::fmt::Debug for CircleManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircleManager")
            .field("collection", &self.config.collection)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> CircleManager<S> {
    /// Creates a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, config: CoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Creates a manager that reads wall-clock time.
    #[must_use]
    pub fn with_system_clock(store: Arc<S>, config: CoreConfig) -> Self {
        Self::new(store, config, Arc::new(SystemClock))
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn collection(&self) -> &str {
        &self.config.collection
    }

    // ==================== Circle Lifecycle ====================

    /// Creates a circle owned by `creator`.
    ///
    /// The creator becomes the sole member. The circle expires after the
    /// configured duration (or the default from [`CoreConfig`]).
    ///
    /// # Errors
    ///
    /// - [`CircleError::Unauthorized`] if `creator` is empty
    /// - [`CircleError::InvalidData`] for an empty name or non-positive duration
    /// - [`CircleError::Geo`] for an invalid location or radius
    /// - [`CircleError::StoreUnavailable`] if the write fails
    pub async fn create_circle(&self, creator: &UserId, config: CircleConfig) -> Result<Circle> {
        if creator.is_empty() {
            return Err(CircleError::Unauthorized(
                "an authenticated user is required to create a circle".to_string(),
            ));
        }
        let name = config.name.trim();
        if name.is_empty() {
            return Err(CircleError::InvalidData(
                "circle name must not be empty".to_string(),
            ));
        }

        let duration = config
            .duration
            .unwrap_or(CircleDuration::Minutes(self.config.default_duration_minutes));
        if duration.minutes() <= 0 {
            return Err(CircleError::InvalidData(format!(
                "circle duration must be positive, got {} minutes",
                duration.minutes()
            )));
        }

        let location = config
            .location
            .map(|(point, radius)| {
                CircleLocation::new(point, radius, self.config.geohash_precision)
            })
            .transpose()?;

        let now = self.clock.now();
        let circle = Circle {
            id: CircleId::generate(),
            name: name.to_string(),
            description: config.description,
            creator_id: creator.clone(),
            members: [creator.clone()].into(),
            pending_invites: Default::default(),
            created_at: now,
            expires_at: Some(now + duration.to_duration()),
            start_time: config.start_time,
            visibility: config.visibility,
            category: config.category,
            location,
        };
        circle
            .check_invariants()
            .map_err(CircleError::InvariantViolation)?;

        self.store
            .put(self.collection(), circle.id.as_str(), record::encode(&circle)?)
            .await?;

        log::info!(
            "Created {} circle {} (expires {:?})",
            circle.visibility.as_str(),
            circle.id,
            circle.expires_at
        );
        Ok(circle)
    }

    /// Reads an active circle.
    ///
    /// # Errors
    ///
    /// - [`CircleError::NotFound`] if the circle does not exist
    /// - [`CircleError::Expired`] if it has expired
    /// - [`CircleError::InvalidRecord`] if the stored document is malformed
    pub async fn get_circle(&self, id: &CircleId) -> Result<Circle> {
        let (_, circle) = self.load(id).await?;
        if circle.is_expired(self.clock.now()) {
            return Err(CircleError::Expired(id.to_string()));
        }
        Ok(circle)
    }

    /// Returns `user`'s role in an active circle.
    ///
    /// # Errors
    ///
    /// Same as [`get_circle`](Self::get_circle).
    pub async fn role_of(&self, id: &CircleId, user: &UserId) -> Result<Role> {
        Ok(self.get_circle(id).await?.role_of(user))
    }

    /// Invites `target` to the circle on behalf of member `by`.
    ///
    /// # Errors
    ///
    /// See [`Circle::invite`]; also [`CircleError::NotFound`] and store errors.
    pub async fn invite(&self, id: &CircleId, by: &UserId, target: &UserId) -> Result<()> {
        let (_, mut circle) = self.load(id).await?;
        let transition = circle.invite(by, target, self.clock.now())?;
        self.persist(id, transition).await?;
        log::info!("{by} invited {target} to circle {id}");
        Ok(())
    }

    /// Accepts `user`'s pending invite.
    ///
    /// # Errors
    ///
    /// See [`Circle::accept`]; also [`CircleError::NotFound`] and store errors.
    pub async fn accept_invite(&self, id: &CircleId, user: &UserId) -> Result<()> {
        let (_, mut circle) = self.load(id).await?;
        let transition = circle.accept(user, self.clock.now())?;
        self.persist(id, transition).await?;
        log::info!("{user} accepted invite to circle {id}");
        Ok(())
    }

    /// Declines `user`'s pending invite.
    ///
    /// # Errors
    ///
    /// See [`Circle::decline`]; also [`CircleError::NotFound`] and store errors.
    pub async fn decline_invite(&self, id: &CircleId, user: &UserId) -> Result<()> {
        let (_, mut circle) = self.load(id).await?;
        let transition = circle.decline(user)?;
        self.persist(id, transition).await?;
        log::info!("{user} declined invite to circle {id}");
        Ok(())
    }

    /// Joins `user` to a public circle.
    ///
    /// # Errors
    ///
    /// See [`Circle::join`]; also [`CircleError::NotFound`] and store errors.
    pub async fn join_circle(&self, id: &CircleId, user: &UserId) -> Result<()> {
        let (_, mut circle) = self.load(id).await?;
        let transition = circle.join(user, self.clock.now())?;
        self.persist(id, transition).await?;
        log::info!("{user} joined circle {id}");
        Ok(())
    }

    /// Removes `user` from the circle's members.
    ///
    /// # Errors
    ///
    /// See [`Circle::leave`]; also [`CircleError::NotFound`] and store errors.
    pub async fn leave_circle(&self, id: &CircleId, user: &UserId) -> Result<()> {
        let (_, mut circle) = self.load(id).await?;
        let transition = circle.leave(user)?;
        self.persist(id, transition).await?;
        log::info!("{user} left circle {id}");
        Ok(())
    }

    /// Applies a partial update on behalf of the creator.
    ///
    /// All changed fields, including a re-derived geohash, go out in one
    /// `update_fields` write. Returns the updated circle.
    ///
    /// # Errors
    ///
    /// See [`Circle::apply_update`]; also [`CircleError::NotFound`] and
    /// store errors.
    pub async fn update_circle(
        &self,
        id: &CircleId,
        by: &UserId,
        update: &CircleUpdate,
    ) -> Result<Circle> {
        let (document, mut circle) = self.load(id).await?;
        let changed =
            circle.apply_update(by, update, self.config.geohash_precision, self.clock.now())?;
        if changed.is_empty() {
            return Ok(circle);
        }

        let patch = if record::is_legacy(&document) {
            record::metadata_patch(&circle)?
        } else {
            record::update_patch(&circle, &changed)
        };
        self.store
            .update_fields(self.collection(), id.as_str(), patch)
            .await?;

        log::info!("Updated circle {id}: {changed:?}");
        Ok(circle)
    }

    /// Deletes the circle. Only the creator may delete.
    ///
    /// # Errors
    ///
    /// - [`CircleError::NotFound`] if the circle does not exist (including
    ///   a second delete)
    /// - [`CircleError::Unauthorized`] if `by` is not the creator
    pub async fn delete_circle(&self, id: &CircleId, by: &UserId) -> Result<()> {
        let (_, circle) = self.load(id).await?;
        circle.authorize_delete(by)?;
        self.store.delete(self.collection(), id.as_str()).await?;
        log::info!("Deleted circle {id}");
        Ok(())
    }

    // ==================== Queries ====================

    /// Active circles `user` belongs to, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::StoreUnavailable`] if the query fails.
    pub async fn circles_for_member(&self, user: &UserId) -> Result<Vec<Circle>> {
        let documents = self
            .store
            .query_array_contains(self.collection(), fields::MEMBERS, &Value::from(user.as_str()))
            .await?;
        Ok(self.decode_active(&documents))
    }

    /// Pending invitations held by `user` to active circles.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::StoreUnavailable`] if the query fails.
    pub async fn pending_invitations(&self, user: &UserId) -> Result<Vec<Invitation>> {
        let documents = self
            .store
            .query_array_contains(
                self.collection(),
                fields::PENDING_INVITES,
                &Value::from(user.as_str()),
            )
            .await?;
        Ok(self
            .decode_active(&documents)
            .iter()
            // A repaired overlap may have dropped the invite on read.
            .filter(|circle| circle.is_invited(user))
            .map(Invitation::from_circle)
            .collect())
    }

    /// Active circles created by `user`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::StoreUnavailable`] if the query fails.
    pub async fn circles_created_by(&self, user: &UserId) -> Result<Vec<Circle>> {
        let documents = self
            .store
            .query_equals(self.collection(), fields::CREATOR_ID, &Value::from(user.as_str()))
            .await?;
        Ok(self.decode_active(&documents))
    }

    /// Rewrites the geohash index (and stale invites) of every stored circle
    /// that needs it, including expired ones. Returns how many circles were
    /// repaired.
    ///
    /// Circles written by this crate are always indexed at the configured
    /// precision; this brings older records (version 1, short or missing
    /// geohashes) into range of discovery. Unreadable documents are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::StoreUnavailable`] if the scan or a write fails.
    pub async fn reindex_locations(&self) -> Result<usize> {
        let documents = self
            .store
            .query_range(self.collection(), fields::ID, "", ID_RANGE_END, fields::ID)
            .await?;

        let mut repaired = 0;
        for document in &documents {
            let circle = match record::decode(document, self.config.geohash_precision) {
                Ok(circle) => circle,
                Err(e) => {
                    log::warn!("Skipping unreadable circle during reindex: {e}");
                    continue;
                }
            };
            if self.repair(document, &circle).await? {
                repaired += 1;
            }
        }

        log::info!("Reindexed {repaired} of {} circle(s)", documents.len());
        Ok(repaired)
    }

    // ==================== Internals ====================

    async fn load(&self, id: &CircleId) -> Result<(Document, Circle)> {
        let document = self.store.get(self.collection(), id.as_str()).await?;
        let circle = record::decode(&document, self.config.geohash_precision)?;
        if let Err(e) = self.repair(&document, &circle).await {
            log::warn!("Could not write back repairs for circle {id}: {e}");
        }
        Ok((document, circle))
    }

    /// Persists what decoding fixed in memory: invites held by members and
    /// a missing, short or stale geohash index. Returns whether anything
    /// was written.
    async fn repair(&self, document: &Document, circle: &Circle) -> Result<bool> {
        let collection = self.collection();
        let key = circle.id.as_str();
        let mut repaired = false;

        for user in record::stale_invites(document, circle) {
            self.store
                .array_remove(collection, key, fields::PENDING_INVITES, user_value(&user))
                .await?;
            log::info!("Circle {key}: removed stale invite for member {user}");
            repaired = true;
        }
        if let Some(patch) = record::index_patch(document, circle) {
            self.store.update_fields(collection, key, patch).await?;
            log::info!("Circle {key}: reindexed geohash");
            repaired = true;
        }
        Ok(repaired)
    }

    fn decode_active(&self, documents: &[Document]) -> Vec<Circle> {
        let now = self.clock.now();
        let mut circles: Vec<Circle> = documents
            .iter()
            .filter_map(|document| {
                record::decode(document, self.config.geohash_precision)
                    .map_err(|e| log::warn!("Skipping unreadable circle: {e}"))
                    .ok()
            })
            .filter(|circle| circle.is_active(now))
            .collect();
        circles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        circles
    }

    async fn persist(&self, id: &CircleId, transition: Transition) -> Result<()> {
        let collection = self.collection();
        let key = id.as_str();

        match transition {
            Transition::Unchanged => {}
            Transition::InviteAdded(user) => {
                self.store
                    .array_union(collection, key, fields::PENDING_INVITES, user_value(&user))
                    .await?;
            }
            Transition::InviteRemoved(user) => {
                self.store
                    .array_remove(collection, key, fields::PENDING_INVITES, user_value(&user))
                    .await?;
            }
            Transition::MemberAdded {
                user,
                consumed_invite: true,
            } => {
                self.store
                    .array_move(
                        collection,
                        key,
                        fields::PENDING_INVITES,
                        fields::MEMBERS,
                        user_value(&user),
                    )
                    .await?;
            }
            Transition::MemberAdded {
                user,
                consumed_invite: false,
            } => {
                self.store
                    .array_union(collection, key, fields::MEMBERS, user_value(&user))
                    .await?;
            }
            Transition::MemberRemoved(user) => {
                self.store
                    .array_remove(collection, key, fields::MEMBERS, user_value(&user))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Upper bound for a range scan over every string `id`.
const ID_RANGE_END: &str = "\u{10FFFF}";

fn user_value(user: &UserId) -> Value {
    Value::from(user.as_str())
}
