//! In-memory document store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    apply_array_move, apply_array_remove, apply_array_union, array_contains, in_range, order_key,
    Document, DocumentStore, Result, StoreError,
};

type Collection = BTreeMap<String, Document>;

/// Document store backed by in-process maps.
///
/// Every write holds the write lock for its whole read-modify-write, so
/// array union/remove are atomic per document, matching the guarantees
/// the rest of the crate expects from a remote store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Returns whether a collection holds no documents.
    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }

    async fn select<F>(&self, collection: &str, predicate: F) -> Vec<Document>
    where
        F: Fn(&Document) -> bool + Send,
    {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().filter(|d| predicate(d)).cloned().collect())
            .unwrap_or_default()
    }

    async fn modify<F>(&self, collection: &str, key: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Document) -> Result<()> + Send,
    {
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(key))
            .ok_or_else(|| StoreError::not_found(collection, key))?;

        // Edit a copy so a failed edit leaves the stored document untouched.
        let mut updated = document.clone();
        edit(&mut updated)?;
        *document = updated;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, collection: &str, key: &str, document: Document) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, key))
    }

    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        Ok(self
            .select(collection, |d| d.get(field) == Some(value))
            .await)
    }

    async fn query_range(
        &self,
        collection: &str,
        field: &str,
        start: &str,
        end: &str,
        order_by: &str,
    ) -> Result<Vec<Document>> {
        let mut documents = self
            .select(collection, |d| in_range(d, field, start, end))
            .await;
        documents.sort_by_cached_key(|d| order_key(d, order_by));
        Ok(documents)
    }

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        Ok(self
            .select(collection, |d| array_contains(d, field, value))
            .await)
    }

    async fn update_fields(&self, collection: &str, key: &str, fields: Document) -> Result<()> {
        self.modify(collection, key, |document| {
            document.extend(fields);
            Ok(())
        })
        .await
    }

    async fn array_union(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        self.modify(collection, key, |document| {
            apply_array_union(document, field, value)
        })
        .await
    }

    async fn array_remove(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        self.modify(collection, key, |document| {
            apply_array_remove(document, field, &value)
        })
        .await
    }

    async fn array_move(
        &self,
        collection: &str,
        key: &str,
        from: &str,
        to: &str,
        value: Value,
    ) -> Result<()> {
        self.modify(collection, key, |document| {
            apply_array_move(document, from, to, value)
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(key))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(collection, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn put_then_get_returns_document() {
        let store = MemoryDocumentStore::new();
        store
            .put("circles", "a", doc(json!({"id": "a", "name": "Picnic"})))
            .await
            .unwrap();

        let fetched = store.get("circles", "a").await.unwrap();
        assert_eq!(fetched["name"], json!("Picnic"));
        assert_eq!(store.len("circles").await, 1);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryDocumentStore::new();
        let err = store.get("circles", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn range_query_is_inclusive_and_ordered() {
        let store = MemoryDocumentStore::new();
        for (key, hash) in [("a", "9q9p3"), ("b", "9q9p0"), ("c", "9q9r0"), ("d", "9q9")] {
            store
                .put("circles", key, doc(json!({"id": key, "geohash": hash})))
                .await
                .unwrap();
        }

        let found = store
            .query_range("circles", "geohash", "9q9p", "9q9p~", "geohash")
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|d| d["id"].clone()).collect();
        assert_eq!(ids, vec![json!("b"), json!("a")]);
    }

    #[tokio::test]
    async fn equality_and_array_queries() {
        let store = MemoryDocumentStore::new();
        store
            .put(
                "circles",
                "a",
                doc(json!({"creatorId": "u1", "members": ["u1", "u2"]})),
            )
            .await
            .unwrap();
        store
            .put("circles", "b", doc(json!({"creatorId": "u2", "members": ["u2"]})))
            .await
            .unwrap();

        let created = store
            .query_equals("circles", "creatorId", &json!("u1"))
            .await
            .unwrap();
        assert_eq!(created.len(), 1);

        let member_of = store
            .query_array_contains("circles", "members", &json!("u2"))
            .await
            .unwrap();
        assert_eq!(member_of.len(), 2);
    }

    #[tokio::test]
    async fn update_fields_merges_top_level_keys() {
        let store = MemoryDocumentStore::new();
        store
            .put("circles", "a", doc(json!({"name": "Old", "category": "music"})))
            .await
            .unwrap();
        store
            .update_fields("circles", "a", doc(json!({"name": "New"})))
            .await
            .unwrap();

        let fetched = store.get("circles", "a").await.unwrap();
        assert_eq!(fetched["name"], json!("New"));
        assert_eq!(fetched["category"], json!("music"));
    }

    #[tokio::test]
    async fn array_move_is_one_write() {
        let store = MemoryDocumentStore::new();
        store
            .put(
                "circles",
                "a",
                doc(json!({"members": ["u1"], "pendingInvites": ["u2"]})),
            )
            .await
            .unwrap();

        store
            .array_move("circles", "a", "pendingInvites", "members", json!("u2"))
            .await
            .unwrap();
        let fetched = store.get("circles", "a").await.unwrap();
        assert_eq!(fetched["members"], json!(["u1", "u2"]));
        assert_eq!(fetched["pendingInvites"], json!([]));

        let err = store
            .array_move("circles", "missing", "pendingInvites", "members", json!("u2"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn array_edits_are_set_like() {
        let store = MemoryDocumentStore::new();
        store
            .put("circles", "a", doc(json!({"members": ["u1"]})))
            .await
            .unwrap();

        store
            .array_union("circles", "a", "members", json!("u2"))
            .await
            .unwrap();
        store
            .array_union("circles", "a", "members", json!("u2"))
            .await
            .unwrap();
        store
            .array_remove("circles", "a", "members", json!("u1"))
            .await
            .unwrap();

        let fetched = store.get("circles", "a").await.unwrap();
        assert_eq!(fetched["members"], json!(["u2"]));
    }

    #[tokio::test]
    async fn failed_edit_leaves_document_unchanged() {
        let store = MemoryDocumentStore::new();
        store
            .put("circles", "a", doc(json!({"members": "oops"})))
            .await
            .unwrap();

        assert!(store
            .array_union("circles", "a", "members", json!("u2"))
            .await
            .is_err());
        assert_eq!(
            store.get("circles", "a").await.unwrap()["members"],
            json!("oops")
        );
    }

    #[tokio::test]
    async fn delete_twice_reports_not_found() {
        let store = MemoryDocumentStore::new();
        store.put("circles", "a", doc(json!({}))).await.unwrap();
        store.delete("circles", "a").await.unwrap();
        assert!(store.is_empty("circles").await);
        assert!(store.delete("circles", "a").await.unwrap_err().is_not_found());
    }
}
