//! Core types for circles.
//!
//! A circle is a named, time-bounded group anchored at an optional place.
//! Membership is tracked as two disjoint sets: `members` (always containing
//! the creator) and `pending_invites`.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::location::{geohash, validate_radius, GeoError, GeoPoint};

/// Opaque user identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether the ID is empty (an unauthenticated caller).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque circle identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircleId(String);

impl CircleId {
    /// Wraps a circle ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random ID (32 hex characters).
    #[must_use]
    pub fn generate() -> Self {
        Self(hex::encode(rand::random::<[u8; 16]>()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CircleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CircleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Who may discover and join a circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Anyone can discover and join.
    #[default]
    Public,
    /// Visible to members and invitees only; joining requires an invite.
    Private,
}

impl Visibility {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

/// A user's relationship to a circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    /// Neither member nor invitee.
    Stranger,
    /// Holds a pending invite.
    Invited,
    /// Member who did not create the circle.
    Member,
    /// The circle's creator (always a member).
    Creator,
}

impl Role {
    /// Converts to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stranger => "stranger",
            Self::Invited => "invited",
            Self::Member => "member",
            Self::Creator => "creator",
        }
    }

    /// Returns whether this role belongs to the member set.
    #[must_use]
    pub const fn is_member(&self) -> bool {
        matches!(self, Self::Member | Self::Creator)
    }
}

/// Where a circle takes place.
///
/// The geohash is always derived from `point`; there is no way to build a
/// location whose geohash disagrees with its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleLocation {
    point: GeoPoint,
    radius_meters: f64,
    geohash: String,
}

impl CircleLocation {
    /// Creates a location, deriving its geohash at `precision`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidRadius`] for a non-positive radius and
    /// [`GeoError::InvalidPrecision`] for an unsupported precision.
    pub fn new(point: GeoPoint, radius_meters: f64, precision: usize) -> Result<Self, GeoError> {
        let radius_meters = validate_radius(radius_meters)?;
        let geohash = geohash::encode(point, precision)?;
        Ok(Self {
            point,
            radius_meters,
            geohash,
        })
    }

    /// Center of the circle's area.
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        self.point
    }

    /// Radius of the circle's area, in meters.
    #[must_use]
    pub const fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    /// Geohash of [`point`](Self::point), used as the discovery index key.
    #[must_use]
    pub fn geohash(&self) -> &str {
        &self.geohash
    }
}

/// A circle.
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    /// Unique ID.
    pub id: CircleId,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Creator; immutable after creation.
    pub creator_id: UserId,
    /// Current members, creator included.
    pub members: BTreeSet<UserId>,
    /// Users invited but not yet joined. Disjoint from `members`.
    pub pending_invites: BTreeSet<UserId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// After this instant the circle is treated as absent.
    pub expires_at: Option<DateTime<Utc>>,
    /// Scheduled start; circles are discoverable before they start.
    pub start_time: Option<DateTime<Utc>>,
    /// Discovery and join policy.
    pub visibility: Visibility,
    /// Optional free-form category.
    pub category: Option<String>,
    /// Optional place; circles without one are never discovered by location.
    pub location: Option<CircleLocation>,
}

impl Circle {
    /// Returns `user`'s role in this circle.
    #[must_use]
    pub fn role_of(&self, user: &UserId) -> Role {
        if *user == self.creator_id {
            Role::Creator
        } else if self.members.contains(user) {
            Role::Member
        } else if self.pending_invites.contains(user) {
            Role::Invited
        } else {
            Role::Stranger
        }
    }

    /// Returns whether `user` is in the member set.
    #[must_use]
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    /// Returns whether `user` holds a pending invite.
    #[must_use]
    pub fn is_invited(&self, user: &UserId) -> bool {
        self.pending_invites.contains(user)
    }

    /// Returns whether the circle has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Returns whether the circle is still live at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
    }

    /// Returns whether the scheduled start (if any) has passed.
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time.is_none_or(|start| now >= start)
    }

    /// Returns whether `viewer` may see this circle in discovery results.
    #[must_use]
    pub fn can_view(&self, viewer: &UserId) -> bool {
        self.visibility == Visibility::Public || self.is_member(viewer) || self.is_invited(viewer)
    }

    /// Returns whether `user` may edit or delete this circle.
    #[must_use]
    pub fn can_administer(&self, user: &UserId) -> bool {
        *user == self.creator_id
    }

    /// Number of members, creator included.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Checks the structural invariants every stored circle must satisfy.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !self.members.contains(&self.creator_id) {
            return Err(format!("creator {} is not a member", self.creator_id));
        }
        if let Some(user) = self.members.intersection(&self.pending_invites).next() {
            return Err(format!("{user} is both a member and invited"));
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= self.created_at {
                return Err("expiry is not after creation".to_string());
            }
        }
        Ok(())
    }
}

/// How long a new circle lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircleDuration {
    /// One hour.
    OneHour,
    /// Three hours.
    ThreeHours,
    /// One day.
    OneDay,
    /// One week.
    OneWeek,
    /// Custom length in minutes.
    Minutes(i64),
}

impl CircleDuration {
    /// Length in minutes.
    #[must_use]
    pub const fn minutes(&self) -> i64 {
        match self {
            Self::OneHour => 60,
            Self::ThreeHours => 3 * 60,
            Self::OneDay => 24 * 60,
            Self::OneWeek => 7 * 24 * 60,
            Self::Minutes(minutes) => *minutes,
        }
    }

    /// Length as a [`chrono::Duration`].
    #[must_use]
    pub fn to_duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }
}

/// Configuration for creating a new circle.
#[derive(Debug, Clone)]
pub struct CircleConfig {
    /// Circle name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Visibility.
    pub visibility: Visibility,
    /// Optional center point and radius in meters.
    pub location: Option<(GeoPoint, f64)>,
    /// Optional category.
    pub category: Option<String>,
    /// Lifetime; the configured default applies when unset.
    pub duration: Option<CircleDuration>,
    /// Optional scheduled start.
    pub start_time: Option<DateTime<Utc>>,
}

impl CircleConfig {
    /// Creates a new circle configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            visibility: Visibility::default(),
            location: None,
            category: None,
            duration: None,
            start_time: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Anchors the circle at `point` with the given radius.
    #[must_use]
    pub fn with_location(mut self, point: GeoPoint, radius_meters: f64) -> Self {
        self.location = Some((point, radius_meters));
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the lifetime.
    #[must_use]
    pub fn with_duration(mut self, duration: CircleDuration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets the scheduled start.
    #[must_use]
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }
}

/// Partial update to a circle's editable fields.
///
/// Unset fields are left untouched. Membership and the creator are never
/// edited through an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CircleUpdate {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New visibility.
    pub visibility: Option<Visibility>,
    /// New center point.
    pub point: Option<GeoPoint>,
    /// New radius in meters.
    pub radius_meters: Option<f64>,
    /// New category.
    pub category: Option<String>,
}

impl CircleUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Moves the circle to `point`.
    #[must_use]
    pub const fn with_point(mut self, point: GeoPoint) -> Self {
        self.point = Some(point);
        self
    }

    /// Changes the circle's radius.
    #[must_use]
    pub const fn with_radius(mut self, radius_meters: f64) -> Self {
        self.radius_meters = Some(radius_meters);
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Returns whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns whether the update touches the location.
    #[must_use]
    pub const fn changes_location(&self) -> bool {
        self.point.is_some() || self.radius_meters.is_some()
    }
}

/// Pending invitation to join a circle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    /// Circle ID.
    pub circle_id: CircleId,
    /// Circle name.
    pub circle_name: String,
    /// Creator of the circle.
    pub creator_id: UserId,
    /// Number of members in the circle.
    pub member_count: usize,
    /// When the circle expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Invitation {
    /// Builds the invitation view of `circle`.
    #[must_use]
    pub fn from_circle(circle: &Circle) -> Self {
        Self {
            circle_id: circle.id.clone(),
            circle_name: circle.name.clone(),
            creator_id: circle.creator_id.clone(),
            member_count: circle.member_count(),
            expires_at: circle.expires_at,
        }
    }
}
