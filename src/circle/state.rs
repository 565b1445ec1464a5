//! Membership state machine.
//!
//! Each transition checks the actor's [`Role`] against a fresh snapshot of
//! the circle, applies the change to that snapshot, and reports the store
//! edit needed to persist it as a [`Transition`]. Nothing here touches the
//! store, so the rules can be exercised directly in tests.
//!
//! ```text
//!              invite               accept / join
//!  Stranger ────────────▶ Invited ────────────────▶ Member
//!     ▲  ▲                   │                        │
//!     │  └──── decline ──────┘                        │
//!     └──────────────────── leave ────────────────────┘
//!
//!  Stranger / Invited ── join (public only) ──▶ Member
//! ```
//!
//! The creator is a member that can never leave.

use chrono::{DateTime, Utc};

use super::error::{CircleError, Result};
use super::types::{Circle, CircleLocation, CircleUpdate, Role, UserId, Visibility};

/// Store edit that persists a membership transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// State already matches the request; no write needed.
    Unchanged,
    /// Add the user to `pendingInvites`.
    InviteAdded(UserId),
    /// Remove the user from `pendingInvites`.
    InviteRemoved(UserId),
    /// Add the user to `members`, moving them out of `pendingInvites` when
    /// an invite was consumed.
    MemberAdded {
        /// The new member.
        user: UserId,
        /// Whether a pending invite was consumed.
        consumed_invite: bool,
    },
    /// Remove the user from `members`.
    MemberRemoved(UserId),
}

/// Field touched by an applied [`CircleUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatedField {
    /// `name`
    Name,
    /// `description`
    Description,
    /// `visibility`
    Visibility,
    /// `location` together with its derived `geohash`.
    Location,
    /// `category`
    Category,
}

impl Circle {
    fn ensure_active(&self, now: DateTime<Utc>) -> Result<()> {
        if self.is_expired(now) {
            Err(CircleError::Expired(self.id.to_string()))
        } else {
            Ok(())
        }
    }

    /// Invites `target` on behalf of `by`.
    ///
    /// Any member may invite. Re-inviting someone already invited is a no-op.
    ///
    /// # Errors
    ///
    /// - [`CircleError::Expired`] if the circle has expired
    /// - [`CircleError::Unauthorized`] if `by` is not a member
    /// - [`CircleError::MembershipConflict`] if `target` is already a member
    pub fn invite(
        &mut self,
        by: &UserId,
        target: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        self.ensure_active(now)?;

        if !self.role_of(by).is_member() {
            return Err(CircleError::Unauthorized(format!(
                "{by} is not a member of circle {}",
                self.id
            )));
        }

        match self.role_of(target) {
            Role::Creator | Role::Member => Err(CircleError::MembershipConflict(format!(
                "{target} is already a member of circle {}",
                self.id
            ))),
            Role::Invited => Ok(Transition::Unchanged),
            Role::Stranger => {
                self.pending_invites.insert(target.clone());
                Ok(Transition::InviteAdded(target.clone()))
            }
        }
    }

    /// Accepts `target`'s pending invite, moving them into `members`.
    ///
    /// # Errors
    ///
    /// - [`CircleError::Expired`] if the circle has expired
    /// - [`CircleError::NoSuchInvite`] if `target` holds no invite
    pub fn accept(&mut self, target: &UserId, now: DateTime<Utc>) -> Result<Transition> {
        self.ensure_active(now)?;

        if !self.pending_invites.remove(target) {
            return Err(self.no_such_invite(target));
        }
        self.members.insert(target.clone());

        Ok(Transition::MemberAdded {
            user: target.clone(),
            consumed_invite: true,
        })
    }

    /// Declines `target`'s pending invite. Allowed on expired circles.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::NoSuchInvite`] if `target` holds no invite.
    pub fn decline(&mut self, target: &UserId) -> Result<Transition> {
        if !self.pending_invites.remove(target) {
            return Err(self.no_such_invite(target));
        }
        Ok(Transition::InviteRemoved(target.clone()))
    }

    /// Joins `by` to a public circle.
    ///
    /// A pending invite held by `by` is consumed. Private circles are only
    /// entered through [`accept`](Self::accept).
    ///
    /// # Errors
    ///
    /// - [`CircleError::Expired`] if the circle has expired
    /// - [`CircleError::MembershipConflict`] if `by` is already a member
    /// - [`CircleError::Unauthorized`] if the circle is private
    pub fn join(&mut self, by: &UserId, now: DateTime<Utc>) -> Result<Transition> {
        self.ensure_active(now)?;

        if self.role_of(by).is_member() {
            return Err(CircleError::MembershipConflict(format!(
                "{by} is already a member of circle {}",
                self.id
            )));
        }
        if self.visibility != Visibility::Public {
            return Err(CircleError::Unauthorized(format!(
                "circle {} is private; {by} must accept an invite",
                self.id
            )));
        }

        let consumed_invite = self.pending_invites.remove(by);
        self.members.insert(by.clone());

        Ok(Transition::MemberAdded {
            user: by.clone(),
            consumed_invite,
        })
    }

    /// Removes `by` from the members. Allowed on expired circles.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::Unauthorized`] if `by` is the creator or not a
    /// member.
    pub fn leave(&mut self, by: &UserId) -> Result<Transition> {
        match self.role_of(by) {
            Role::Creator => Err(CircleError::Unauthorized(format!(
                "creator cannot leave circle {}",
                self.id
            ))),
            Role::Member => {
                self.members.remove(by);
                Ok(Transition::MemberRemoved(by.clone()))
            }
            Role::Invited | Role::Stranger => Err(CircleError::Unauthorized(format!(
                "{by} is not a member of circle {}",
                self.id
            ))),
        }
    }

    /// Applies a partial update on behalf of `by` (creator only).
    ///
    /// Names are stored trimmed, as on creation. A location change
    /// re-derives the geohash at `precision`. Returns the fields that must
    /// be written.
    ///
    /// # Errors
    ///
    /// - [`CircleError::Expired`] if the circle has expired
    /// - [`CircleError::Unauthorized`] if `by` is not the creator
    /// - [`CircleError::InvalidData`] for an empty name, or a radius-only
    ///   change on a circle without a location
    /// - [`CircleError::Geo`] for an invalid radius
    pub fn apply_update(
        &mut self,
        by: &UserId,
        update: &CircleUpdate,
        precision: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<UpdatedField>> {
        self.ensure_active(now)?;
        self.ensure_creator(by, "update")?;

        // Validate everything before mutating so a rejected update leaves the
        // snapshot untouched.
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CircleError::InvalidData("name must not be empty".to_string()));
        }
        let location = if update.changes_location() {
            let current = self.location.as_ref();
            let point = update
                .point
                .or_else(|| current.map(CircleLocation::point))
                .ok_or_else(|| {
                    CircleError::InvalidData("circle has no location to resize".to_string())
                })?;
            let radius = update
                .radius_meters
                .or_else(|| current.map(CircleLocation::radius_meters))
                .ok_or_else(|| {
                    CircleError::InvalidData("a new location needs a radius".to_string())
                })?;
            Some(CircleLocation::new(point, radius, precision)?)
        } else {
            None
        };

        let mut changed = Vec::new();
        if let Some(name) = &update.name {
            self.name = name.trim().to_string();
            changed.push(UpdatedField::Name);
        }
        if let Some(description) = &update.description {
            self.description = Some(description.clone());
            changed.push(UpdatedField::Description);
        }
        if let Some(visibility) = update.visibility {
            self.visibility = visibility;
            changed.push(UpdatedField::Visibility);
        }
        if let Some(location) = location {
            self.location = Some(location);
            changed.push(UpdatedField::Location);
        }
        if let Some(category) = &update.category {
            self.category = Some(category.clone());
            changed.push(UpdatedField::Category);
        }

        Ok(changed)
    }

    /// Checks that `by` may delete the circle. Allowed on expired circles.
    ///
    /// # Errors
    ///
    /// Returns [`CircleError::Unauthorized`] if `by` is not the creator.
    pub fn authorize_delete(&self, by: &UserId) -> Result<()> {
        self.ensure_creator(by, "delete")
    }

    fn ensure_creator(&self, by: &UserId, action: &str) -> Result<()> {
        if *by == self.creator_id {
            Ok(())
        } else {
            Err(CircleError::Unauthorized(format!(
                "only the creator can {action} circle {}",
                self.id
            )))
        }
    }

    fn no_such_invite(&self, target: &UserId) -> CircleError {
        CircleError::NoSuchInvite {
            circle: self.id.to_string(),
            user: target.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circle::error::ErrorKind;
    use crate::circle::types::CircleId;
    use crate::location::GeoPoint;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn u(id: &str) -> UserId {
        UserId::new(id)
    }

    fn circle(visibility: Visibility) -> Circle {
        Circle {
            id: CircleId::new("c1"),
            name: "Picnic".to_string(),
            description: None,
            creator_id: u("alice"),
            members: [u("alice")].into(),
            pending_invites: Default::default(),
            created_at: t0(),
            expires_at: Some(t0() + Duration::hours(2)),
            start_time: None,
            visibility,
            category: None,
            location: None,
        }
    }

    fn expired() -> DateTime<Utc> {
        t0() + Duration::hours(3)
    }

    // ==================== Invite ====================

    #[test]
    fn member_can_invite_stranger() {
        let mut c = circle(Visibility::Private);
        let t = c.invite(&u("alice"), &u("bob"), t0()).unwrap();
        assert_eq!(t, Transition::InviteAdded(u("bob")));
        assert_eq!(c.role_of(&u("bob")), Role::Invited);
    }

    #[test]
    fn reinvite_is_noop() {
        let mut c = circle(Visibility::Private);
        c.invite(&u("alice"), &u("bob"), t0()).unwrap();
        let t = c.invite(&u("alice"), &u("bob"), t0()).unwrap();
        assert_eq!(t, Transition::Unchanged);
        assert_eq!(c.pending_invites.len(), 1);
    }

    #[test]
    fn non_member_cannot_invite() {
        let mut c = circle(Visibility::Public);
        let err = c.invite(&u("mallory"), &u("bob"), t0()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(c.pending_invites.is_empty());
    }

    #[test]
    fn inviting_member_conflicts() {
        let mut c = circle(Visibility::Private);
        let err = c.invite(&u("alice"), &u("alice"), t0()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn invite_on_expired_circle_fails() {
        let mut c = circle(Visibility::Private);
        let err = c.invite(&u("alice"), &u("bob"), expired()).unwrap_err();
        assert!(matches!(err, CircleError::Expired(_)));
    }

    // ==================== Accept / Decline ====================

    #[test]
    fn accept_moves_invite_to_members() {
        let mut c = circle(Visibility::Private);
        c.invite(&u("alice"), &u("bob"), t0()).unwrap();
        let t = c.accept(&u("bob"), t0()).unwrap();
        assert_eq!(
            t,
            Transition::MemberAdded {
                user: u("bob"),
                consumed_invite: true
            }
        );
        assert_eq!(c.role_of(&u("bob")), Role::Member);
        assert!(c.check_invariants().is_ok());
    }

    #[test]
    fn accept_twice_fails_with_no_such_invite() {
        let mut c = circle(Visibility::Private);
        c.invite(&u("alice"), &u("bob"), t0()).unwrap();
        c.accept(&u("bob"), t0()).unwrap();
        let err = c.accept(&u("bob"), t0()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchInvite);
        assert_eq!(c.member_count(), 2);
    }

    #[test]
    fn decline_removes_invite() {
        let mut c = circle(Visibility::Private);
        c.invite(&u("alice"), &u("bob"), t0()).unwrap();
        let t = c.decline(&u("bob")).unwrap();
        assert_eq!(t, Transition::InviteRemoved(u("bob")));
        assert_eq!(c.role_of(&u("bob")), Role::Stranger);
    }

    #[test]
    fn decline_without_invite_fails() {
        let mut c = circle(Visibility::Private);
        assert_eq!(
            c.decline(&u("bob")).unwrap_err().kind(),
            ErrorKind::NoSuchInvite
        );
    }

    // ==================== Join / Leave ====================

    #[test]
    fn stranger_joins_public_circle() {
        let mut c = circle(Visibility::Public);
        let t = c.join(&u("bob"), t0()).unwrap();
        assert_eq!(
            t,
            Transition::MemberAdded {
                user: u("bob"),
                consumed_invite: false
            }
        );
        assert!(c.is_member(&u("bob")));
    }

    #[test]
    fn stranger_cannot_join_private_circle() {
        let mut c = circle(Visibility::Private);
        let err = c.join(&u("bob"), t0()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(!c.is_member(&u("bob")));
    }

    #[test]
    fn invited_user_joining_public_circle_consumes_invite() {
        let mut c = circle(Visibility::Public);
        c.invite(&u("alice"), &u("bob"), t0()).unwrap();
        let t = c.join(&u("bob"), t0()).unwrap();
        assert_eq!(
            t,
            Transition::MemberAdded {
                user: u("bob"),
                consumed_invite: true
            }
        );
        assert!(c.is_member(&u("bob")));
        assert!(!c.is_invited(&u("bob")));
    }

    #[test]
    fn invited_user_must_accept_private_circle() {
        let mut c = circle(Visibility::Private);
        c.invite(&u("alice"), &u("bob"), t0()).unwrap();
        assert_eq!(
            c.join(&u("bob"), t0()).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        assert!(c.is_invited(&u("bob")));
    }

    #[test]
    fn joining_twice_conflicts() {
        let mut c = circle(Visibility::Public);
        c.join(&u("bob"), t0()).unwrap();
        assert_eq!(
            c.join(&u("bob"), t0()).unwrap_err().kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn join_expired_circle_fails() {
        let mut c = circle(Visibility::Public);
        assert!(matches!(
            c.join(&u("bob"), expired()),
            Err(CircleError::Expired(_))
        ));
    }

    #[test]
    fn creator_cannot_leave() {
        let mut c = circle(Visibility::Public);
        let err = c.leave(&u("alice")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(c.is_member(&u("alice")));
    }

    #[test]
    fn member_leaves_and_non_member_cannot() {
        let mut c = circle(Visibility::Public);
        c.join(&u("bob"), t0()).unwrap();
        assert_eq!(c.leave(&u("bob")).unwrap(), Transition::MemberRemoved(u("bob")));
        assert_eq!(
            c.leave(&u("bob")).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    // ==================== Update / Delete ====================

    #[test]
    fn creator_updates_name_and_location() {
        let mut c = circle(Visibility::Public);
        let point = GeoPoint::new(37.7749, -122.4194).unwrap();
        let update = CircleUpdate::new()
            .with_name("Beach day")
            .with_point(point)
            .with_radius(250.0);

        let changed = c.apply_update(&u("alice"), &update, 9, t0()).unwrap();
        assert_eq!(changed, vec![UpdatedField::Name, UpdatedField::Location]);
        assert_eq!(c.name, "Beach day");
        let location = c.location.as_ref().unwrap();
        assert_eq!(location.geohash().len(), 9);
        assert_eq!(location.radius_meters(), 250.0);
    }

    #[test]
    fn updated_name_is_trimmed_like_on_create() {
        let mut c = circle(Visibility::Public);
        let update = CircleUpdate::new().with_name("  Beach day \t");
        c.apply_update(&u("alice"), &update, 9, t0()).unwrap();
        assert_eq!(c.name, "Beach day");
    }

    #[test]
    fn radius_only_update_keeps_point() {
        let mut c = circle(Visibility::Public);
        let point = GeoPoint::new(10.0, 10.0).unwrap();
        c.location = Some(CircleLocation::new(point, 100.0, 9).unwrap());

        c.apply_update(&u("alice"), &CircleUpdate::new().with_radius(400.0), 9, t0())
            .unwrap();
        let location = c.location.as_ref().unwrap();
        assert_eq!(location.point(), point);
        assert_eq!(location.radius_meters(), 400.0);
    }

    #[test]
    fn radius_without_location_is_rejected() {
        let mut c = circle(Visibility::Public);
        let err = c
            .apply_update(&u("alice"), &CircleUpdate::new().with_radius(10.0), 9, t0())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn rejected_update_leaves_circle_untouched() {
        let mut c = circle(Visibility::Public);
        let before = c.clone();
        let update = CircleUpdate::new()
            .with_name("New")
            .with_point(GeoPoint::new(1.0, 1.0).unwrap())
            .with_radius(-5.0);
        let err = c.apply_update(&u("alice"), &update, 9, t0()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRadius);
        assert_eq!(c, before);
    }

    #[test]
    fn non_creator_cannot_update_or_delete() {
        let mut c = circle(Visibility::Public);
        c.join(&u("bob"), t0()).unwrap();
        let update = CircleUpdate::new().with_name("Mine now");
        assert_eq!(
            c.apply_update(&u("bob"), &update, 9, t0()).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(
            c.authorize_delete(&u("bob")).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        assert!(c.authorize_delete(&u("alice")).is_ok());
    }

    #[test]
    fn update_on_expired_circle_fails_but_delete_is_allowed() {
        let mut c = circle(Visibility::Public);
        let update = CircleUpdate::new().with_name("Late");
        assert!(matches!(
            c.apply_update(&u("alice"), &update, 9, expired()),
            Err(CircleError::Expired(_))
        ));
        assert!(c.authorize_delete(&u("alice")).is_ok());
    }
}
