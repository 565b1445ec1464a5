//! Stored document format for circles.
//!
//! Circles are stored as camelCase JSON documents. The current layout is
//! schema version 2:
//!
//! ```json
//! {
//!   "schemaVersion": 2,
//!   "id": "5f0c...",
//!   "name": "Picnic",
//!   "creatorId": "alice",
//!   "members": ["alice"],
//!   "pendingInvites": [],
//!   "createdAt": "2024-06-01T12:00:00Z",
//!   "expiresAt": "2024-06-02T12:00:00Z",
//!   "visibility": "public",
//!   "location": { "latitude": 37.77, "longitude": -122.41, "radiusMeters": 200.0 },
//!   "geohash": "9q8yyk8ytp"
//! }
//! ```
//!
//! Version 1 documents carry no `schemaVersion`, keep the coordinates flat
//! (`latitude`, `longitude`, `radius`) and use a boolean `isPublic`. They
//! are migrated on read.
//!
//! The top-level `geohash` is the discovery index. Decoding derives it at
//! the configured precision whenever the stored value is missing, too short
//! or inconsistent; [`index_patch`] produces the write that fixes the index.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{CircleError, Result};
use super::state::UpdatedField;
use super::types::{Circle, CircleId, CircleLocation, UserId, Visibility};
use crate::location::{geohash, validate_radius, GeoPoint};
use crate::store::Document;

/// Schema version written by [`encode`].
pub const SCHEMA_VERSION: u64 = 2;

/// Radius given to version 1 documents that stored coordinates but no radius.
pub const LEGACY_DEFAULT_RADIUS_METERS: f64 = 100.0;

/// Top-level document field names.
pub mod fields {
    /// Schema version (absent on version 1 documents).
    pub const SCHEMA_VERSION: &str = "schemaVersion";
    /// Circle ID.
    pub const ID: &str = "id";
    /// Display name.
    pub const NAME: &str = "name";
    /// Description.
    pub const DESCRIPTION: &str = "description";
    /// Creator's user ID.
    pub const CREATOR_ID: &str = "creatorId";
    /// Member array.
    pub const MEMBERS: &str = "members";
    /// Pending invite array.
    pub const PENDING_INVITES: &str = "pendingInvites";
    /// `"public"` or `"private"`.
    pub const VISIBILITY: &str = "visibility";
    /// Category.
    pub const CATEGORY: &str = "category";
    /// Nested location object.
    pub const LOCATION: &str = "location";
    /// Geohash of the location; the discovery index key.
    pub const GEOHASH: &str = "geohash";
    /// Version 1 visibility flag.
    pub const IS_PUBLIC: &str = "isPublic";
    /// Latitude (nested in `location`, flat in version 1).
    pub const LATITUDE: &str = "latitude";
    /// Longitude (nested in `location`, flat in version 1).
    pub const LONGITUDE: &str = "longitude";
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCircle {
    schema_version: u64,
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    creator_id: String,
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    pending_invites: Vec<String>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<DateTime<Utc>>,
    visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<StoredLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    geohash: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLocation {
    latitude: f64,
    longitude: f64,
    radius_meters: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCircle {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    creator_id: String,
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    pending_invites: Vec<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    is_public: bool,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    radius: Option<f64>,
    #[serde(default)]
    category: Option<String>,
}

impl From<LegacyCircle> for StoredCircle {
    fn from(legacy: LegacyCircle) -> Self {
        let location = match (legacy.latitude, legacy.longitude) {
            (Some(latitude), Some(longitude)) => Some(StoredLocation {
                latitude,
                longitude,
                radius_meters: legacy.radius.unwrap_or(LEGACY_DEFAULT_RADIUS_METERS),
            }),
            _ => None,
        };

        Self {
            schema_version: SCHEMA_VERSION,
            id: legacy.id,
            name: legacy.name,
            description: legacy.description,
            creator_id: legacy.creator_id,
            members: legacy.members,
            pending_invites: legacy.pending_invites,
            created_at: legacy.created_at,
            expires_at: legacy.expires_at,
            start_time: None,
            visibility: if legacy.is_public {
                Visibility::Public
            } else {
                Visibility::Private
            },
            category: legacy.category,
            location,
            // Version 1 geohashes were computed at varying precisions.
            geohash: None,
        }
    }
}

impl From<&Circle> for StoredCircle {
    fn from(circle: &Circle) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            id: circle.id.to_string(),
            name: circle.name.clone(),
            description: circle.description.clone(),
            creator_id: circle.creator_id.to_string(),
            members: circle.members.iter().map(ToString::to_string).collect(),
            pending_invites: circle
                .pending_invites
                .iter()
                .map(ToString::to_string)
                .collect(),
            created_at: circle.created_at,
            expires_at: circle.expires_at,
            start_time: circle.start_time,
            visibility: circle.visibility,
            category: circle.category.clone(),
            location: circle.location.as_ref().map(StoredLocation::from),
            geohash: circle
                .location
                .as_ref()
                .map(|location| location.geohash().to_string()),
        }
    }
}

impl From<&CircleLocation> for StoredLocation {
    fn from(location: &CircleLocation) -> Self {
        Self {
            latitude: location.point().latitude(),
            longitude: location.point().longitude(),
            radius_meters: location.radius_meters(),
        }
    }
}

impl StoredCircle {
    fn into_circle(self, precision: usize) -> Result<Circle> {
        let id = self.id;
        let invalid = |reason: String| CircleError::InvalidRecord {
            id: id.clone(),
            reason,
        };

        let creator_id = UserId::new(self.creator_id);
        let members: BTreeSet<UserId> = self.members.into_iter().map(UserId::new).collect();
        if !members.contains(&creator_id) {
            return Err(invalid(format!("creator {creator_id} is not a member")));
        }

        let mut pending_invites: BTreeSet<UserId> =
            self.pending_invites.into_iter().map(UserId::new).collect();
        let before = pending_invites.len();
        pending_invites.retain(|user| !members.contains(user));
        if pending_invites.len() != before {
            log::warn!(
                "Circle {id}: dropped {} pending invite(s) already in members",
                before - pending_invites.len()
            );
        }

        if let Some(expires_at) = self.expires_at {
            if expires_at <= self.created_at {
                return Err(invalid("expiresAt is not after createdAt".to_string()));
            }
        }

        let location = match self.location {
            None => None,
            Some(stored) => {
                let point = GeoPoint::new(stored.latitude, stored.longitude)
                    .map_err(|e| invalid(e.to_string()))?;
                let radius =
                    validate_radius(stored.radius_meters).map_err(|e| invalid(e.to_string()))?;

                // Hashes shorter than the index precision sort before the
                // range starts the planner emits, so they are re-derived.
                let stored_hash = self.geohash.as_deref();
                let hash_len = stored_hash
                    .filter(|hash| hash.len() >= precision && geohash_matches(point, hash))
                    .map_or(precision, str::len);
                match stored_hash {
                    Some(hash) if !geohash_matches(point, hash) => {
                        log::warn!("Circle {id}: stored geohash {hash} does not match location");
                    }
                    Some(hash) if hash.len() < precision => {
                        log::debug!(
                            "Circle {id}: stored geohash {hash} is below precision {precision}"
                        );
                    }
                    _ => {}
                }

                Some(
                    CircleLocation::new(point, radius, hash_len)
                        .map_err(|e| invalid(e.to_string()))?,
                )
            }
        };

        Ok(Circle {
            id: CircleId::new(id),
            name: self.name,
            description: self.description,
            creator_id,
            members,
            pending_invites,
            created_at: self.created_at,
            expires_at: self.expires_at,
            start_time: self.start_time,
            visibility: self.visibility,
            category: self.category,
            location,
        })
    }
}

fn geohash_matches(point: GeoPoint, hash: &str) -> bool {
    geohash::encode(point, hash.len()).is_ok_and(|expected| expected == hash)
}

/// Decodes a stored document, migrating version 1 layouts.
///
/// Geohashes missing from (or inconsistent with) the stored location are
/// derived at `precision`.
///
/// # Errors
///
/// Returns [`CircleError::InvalidRecord`] if the document is malformed,
/// has an unknown schema version, or violates a circle invariant that
/// cannot be repaired.
pub fn decode(document: &Document, precision: usize) -> Result<Circle> {
    let id = document_id(document).unwrap_or("<unknown>").to_string();
    let invalid = |reason: String| CircleError::InvalidRecord {
        id: id.clone(),
        reason,
    };
    let value = Value::Object(document.clone());

    let stored: StoredCircle = match document.get(fields::SCHEMA_VERSION) {
        None => {
            let legacy: LegacyCircle =
                serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
            log::debug!("Migrating version 1 circle {id}");
            legacy.into()
        }
        Some(version) if version.as_u64() == Some(SCHEMA_VERSION) => {
            serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?
        }
        Some(version) => {
            return Err(invalid(format!("unsupported schema version {version}")));
        }
    };

    stored.into_circle(precision)
}

/// Patch that brings the document's indexed `geohash` in line with `circle`.
///
/// Returns `None` when the stored index field already equals the decoded
/// circle's hash, or when the circle has no location.
#[must_use]
pub fn index_patch(document: &Document, circle: &Circle) -> Option<Document> {
    let hash = circle.location.as_ref()?.geohash();
    if document.get(fields::GEOHASH).and_then(Value::as_str) == Some(hash) {
        return None;
    }
    let mut patch = Document::new();
    patch.insert(fields::GEOHASH.to_string(), Value::from(hash));
    Some(patch)
}

/// Users the document lists as invited although `circle` has them as
/// members. Decoding drops such invites; these are the removals that make
/// the stored arrays disjoint again.
#[must_use]
pub fn stale_invites(document: &Document, circle: &Circle) -> Vec<UserId> {
    document
        .get(fields::PENDING_INVITES)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(UserId::new)
        .filter(|user| circle.is_member(user))
        .collect()
}

/// Encodes a circle as a current-version document.
///
/// # Errors
///
/// Returns [`CircleError::InvariantViolation`] if serialization fails.
pub fn encode(circle: &Circle) -> Result<Document> {
    match serde_json::to_value(StoredCircle::from(circle)) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(other) => Err(CircleError::InvariantViolation(format!(
            "circle encoded as non-object: {other}"
        ))),
        Err(e) => Err(CircleError::InvariantViolation(e.to_string())),
    }
}

/// Builds the `update_fields` patch for the given changed fields.
///
/// A location change always writes `location` and `geohash` together.
#[must_use]
pub fn update_patch(circle: &Circle, changed: &[UpdatedField]) -> Document {
    let mut patch = Document::new();
    for field in changed {
        match field {
            UpdatedField::Name => {
                patch.insert(fields::NAME.to_string(), Value::from(circle.name.as_str()));
            }
            UpdatedField::Description => {
                patch.insert(
                    fields::DESCRIPTION.to_string(),
                    circle.description.as_deref().map_or(Value::Null, Value::from),
                );
            }
            UpdatedField::Visibility => {
                patch.insert(
                    fields::VISIBILITY.to_string(),
                    Value::from(circle.visibility.as_str()),
                );
            }
            UpdatedField::Location => {
                if let Some(location) = &circle.location {
                    let stored = StoredLocation::from(location);
                    patch.insert(
                        fields::LOCATION.to_string(),
                        serde_json::json!({
                            "latitude": stored.latitude,
                            "longitude": stored.longitude,
                            "radiusMeters": stored.radius_meters,
                        }),
                    );
                    patch.insert(
                        fields::GEOHASH.to_string(),
                        Value::from(location.geohash()),
                    );
                }
            }
            UpdatedField::Category => {
                patch.insert(
                    fields::CATEGORY.to_string(),
                    circle.category.as_deref().map_or(Value::Null, Value::from),
                );
            }
        }
    }
    patch
}

/// Builds a patch that rewrites every non-membership field in the current
/// layout. Used when editing a version 1 document, so the edit also
/// upgrades it without racing concurrent membership changes.
///
/// # Errors
///
/// Returns [`CircleError::InvariantViolation`] if serialization fails.
pub fn metadata_patch(circle: &Circle) -> Result<Document> {
    let mut document = encode(circle)?;
    document.remove(fields::MEMBERS);
    document.remove(fields::PENDING_INVITES);
    Ok(document)
}

/// Returns whether the document predates schema versioning.
#[must_use]
pub fn is_legacy(document: &Document) -> bool {
    !document.contains_key(fields::SCHEMA_VERSION)
}

/// The document's `id` field.
#[must_use]
pub fn document_id(document: &Document) -> Option<&str> {
    document.get(fields::ID).and_then(Value::as_str)
}

/// The document's center point, in either layout, if present and valid.
#[must_use]
pub fn document_point(document: &Document) -> Option<GeoPoint> {
    let source = if is_legacy(document) {
        document
    } else {
        document.get(fields::LOCATION)?.as_object()?
    };
    let latitude = source.get(fields::LATITUDE)?.as_f64()?;
    let longitude = source.get(fields::LONGITUDE)?.as_f64()?;
    GeoPoint::new(latitude, longitude).ok()
}

/// Returns whether the document is a public circle, in either layout.
#[must_use]
pub fn is_public_document(document: &Document) -> bool {
    match document.get(fields::VISIBILITY) {
        Some(visibility) => visibility.as_str() == Some(Visibility::Public.as_str()),
        None => document.get(fields::IS_PUBLIC) == Some(&Value::Bool(true)),
    }
}
