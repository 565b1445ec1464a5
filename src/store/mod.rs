//! Document store collaborator.
//!
//! The discovery engine and the circle lifecycle only need a small set of
//! primitives from their backing store: keyed upsert/get/delete, field
//! equality, a lexicographic range scan on one string field, array
//! membership queries and atomic set-like array edits on a single document.
//! [`DocumentStore`] captures exactly that contract; there are no
//! cross-document transactions.
//!
//! # Implementations
//!
//! - [`MemoryDocumentStore`]: in-process maps, for tests and embedders
//! - [`SqliteDocumentStore`]: JSON documents in a local `SQLite` database
//!
//! # Range semantics
//!
//! [`DocumentStore::query_range`] is inclusive on both ends
//! (`start <= value <= end`), compared bytewise. Documents whose field is
//! missing or not a string never match.

mod error;
mod memory;
mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

pub use error::{Result, StoreError};
pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// A stored document: a JSON object keyed by field name.
pub type Document = serde_json::Map<String, Value>;

/// The storage contract consumed by this crate.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Full upsert of a document.
    async fn put(&self, collection: &str, key: &str, document: Document) -> Result<()>;

    /// Reads a document, failing with [`StoreError::NotFound`] if absent.
    async fn get(&self, collection: &str, key: &str) -> Result<Document>;

    /// Documents whose top-level `field` equals `value`.
    async fn query_equals(&self, collection: &str, field: &str, value: &Value)
        -> Result<Vec<Document>>;

    /// Documents whose string `field` lies in `start..=end`, ordered by `order_by`.
    async fn query_range(
        &self,
        collection: &str,
        field: &str,
        start: &str,
        end: &str,
        order_by: &str,
    ) -> Result<Vec<Document>>;

    /// Documents whose array `field` contains `value`.
    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>>;

    /// Merges `fields` into an existing document (top-level keys only).
    async fn update_fields(&self, collection: &str, key: &str, fields: Document) -> Result<()>;

    /// Atomically adds `value` to the array `field` unless already present.
    async fn array_union(&self, collection: &str, key: &str, field: &str, value: Value)
        -> Result<()>;

    /// Atomically removes every occurrence of `value` from the array `field`.
    async fn array_remove(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<()>;

    /// Atomically moves `value` from the array `from` to the array `to`.
    ///
    /// Both edits land in one document write: either `value` leaves `from`
    /// and joins `to` (unless already present), or nothing changes.
    async fn array_move(
        &self,
        collection: &str,
        key: &str,
        from: &str,
        to: &str,
        value: Value,
    ) -> Result<()>;

    /// Deletes a document, failing with [`StoreError::NotFound`] if absent.
    async fn delete(&self, collection: &str, key: &str) -> Result<()>;
}

/// Adds `value` to the array at `field`, creating the array if missing.
pub(crate) fn apply_array_union(document: &mut Document, field: &str, value: Value) -> Result<()> {
    match document
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(items) => {
            if !items.contains(&value) {
                items.push(value);
            }
            Ok(())
        }
        _ => Err(StoreError::InvalidDocument(format!(
            "{field} is not an array"
        ))),
    }
}

/// Removes all occurrences of `value` from the array at `field`.
pub(crate) fn apply_array_remove(
    document: &mut Document,
    field: &str,
    value: &Value,
) -> Result<()> {
    match document.get_mut(field) {
        None => Ok(()),
        Some(Value::Array(items)) => {
            items.retain(|item| item != value);
            Ok(())
        }
        Some(_) => Err(StoreError::InvalidDocument(format!(
            "{field} is not an array"
        ))),
    }
}

/// Removes `value` from `from` and adds it to `to`, failing without partial
/// edits if either field is not an array.
pub(crate) fn apply_array_move(
    document: &mut Document,
    from: &str,
    to: &str,
    value: Value,
) -> Result<()> {
    if document.get(to).is_some_and(|v| !v.is_array()) {
        return Err(StoreError::InvalidDocument(format!("{to} is not an array")));
    }
    apply_array_remove(document, from, &value)?;
    apply_array_union(document, to, value)
}

/// Returns whether `document[field]` is a string within `start..=end`.
pub(crate) fn in_range(document: &Document, field: &str, start: &str, end: &str) -> bool {
    document
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|v| start <= v && v <= end)
}

/// Returns whether the array at `document[field]` contains `value`.
pub(crate) fn array_contains(document: &Document, field: &str, value: &Value) -> bool {
    document
        .get(field)
        .and_then(Value::as_array)
        .is_some_and(|items| items.contains(value))
}

/// Sort key used for `order_by`: strings compare as-is, other values by their JSON text.
pub(crate) fn order_key(document: &Document, field: &str) -> String {
    match document.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn array_union_creates_missing_array() {
        let mut d = doc(json!({"id": "a"}));
        apply_array_union(&mut d, "members", json!("u1")).unwrap();
        assert_eq!(d["members"], json!(["u1"]));
    }

    #[test]
    fn array_union_is_idempotent() {
        let mut d = doc(json!({"members": ["u1"]}));
        apply_array_union(&mut d, "members", json!("u1")).unwrap();
        apply_array_union(&mut d, "members", json!("u2")).unwrap();
        assert_eq!(d["members"], json!(["u1", "u2"]));
    }

    #[test]
    fn array_ops_reject_scalars() {
        let mut d = doc(json!({"members": "u1"}));
        assert!(apply_array_union(&mut d, "members", json!("u2")).is_err());
        assert!(apply_array_remove(&mut d, "members", &json!("u1")).is_err());
    }

    #[test]
    fn array_remove_removes_all_occurrences() {
        let mut d = doc(json!({"members": ["u1", "u2", "u1"]}));
        apply_array_remove(&mut d, "members", &json!("u1")).unwrap();
        assert_eq!(d["members"], json!(["u2"]));
    }

    #[test]
    fn array_remove_on_missing_field_is_noop() {
        let mut d = doc(json!({}));
        apply_array_remove(&mut d, "members", &json!("u1")).unwrap();
        assert!(d.get("members").is_none());
    }

    #[test]
    fn array_move_edits_both_fields() {
        let mut d = doc(json!({"members": ["u1"], "pendingInvites": ["u2", "u3"]}));
        apply_array_move(&mut d, "pendingInvites", "members", json!("u2")).unwrap();
        assert_eq!(d["members"], json!(["u1", "u2"]));
        assert_eq!(d["pendingInvites"], json!(["u3"]));
    }

    #[test]
    fn array_move_rejects_scalar_target_without_touching_source() {
        let mut d = doc(json!({"members": "u1", "pendingInvites": ["u2"]}));
        assert!(apply_array_move(&mut d, "pendingInvites", "members", json!("u2")).is_err());
        assert_eq!(d["pendingInvites"], json!(["u2"]));
    }

    #[test]
    fn range_is_inclusive_and_string_only() {
        let d = doc(json!({"geohash": "9q9p", "n": 5}));
        assert!(in_range(&d, "geohash", "9q9p", "9q9p~"));
        assert!(in_range(&d, "geohash", "9q9", "9q9p"));
        assert!(!in_range(&d, "geohash", "9q9q", "9q9z~"));
        assert!(!in_range(&d, "n", "0", "9"));
        assert!(!in_range(&d, "missing", "", "~"));
    }

    #[test]
    fn order_key_falls_back_to_json_text() {
        let d = doc(json!({"a": "x", "b": 3}));
        assert_eq!(order_key(&d, "a"), "x");
        assert_eq!(order_key(&d, "b"), "3");
        assert_eq!(order_key(&d, "c"), "");
    }
}
