//! Reusable test helpers for circle integration tests.
//!
//! Every environment runs on a [`ManualClock`] so expiry can be driven
//! deterministically, and the store wrappers let tests inject failures and
//! latency underneath the real in-memory store.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use circles_core::circle::{CircleConfig, UserId};
use circles_core::clock::ManualClock;
use circles_core::location::GeoPoint;
use circles_core::store::{Document, DocumentStore, MemoryDocumentStore, Result, StoreError};
use circles_core::{CirclesCore, CoreConfig};

/// Instant every test clock starts at.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Shorthand for a valid point.
pub fn point(latitude: f64, longitude: f64) -> GeoPoint {
    GeoPoint::new(latitude, longitude).expect("test coordinates are valid")
}

/// Downtown Berkeley, used as the default search center.
pub fn berkeley() -> GeoPoint {
    point(37.8715, -122.2730)
}

/// A located circle config with a 50 m radius.
pub fn located(name: &str, at: GeoPoint) -> CircleConfig {
    CircleConfig::new(name).with_location(at, 50.0)
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

/// A core over `store` driven by a manual clock.
pub struct TestEnv<S> {
    pub core: CirclesCore<S>,
    pub store: Arc<S>,
    pub clock: Arc<ManualClock>,
}

impl TestEnv<MemoryDocumentStore> {
    pub fn new() -> Self {
        Self::with_store(MemoryDocumentStore::new(), CoreConfig::default())
    }
}

impl<S: DocumentStore + 'static> TestEnv<S> {
    pub fn with_store(store: S, config: CoreConfig) -> Self {
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(fixed_now()));
        let core = CirclesCore::new(Arc::clone(&store), config, clock.clone())
            .expect("test config is valid");
        Self { core, store, clock }
    }
}

/// Delegates to a [`MemoryDocumentStore`], failing range scans or array
/// moves on demand.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub inner: MemoryDocumentStore,
    fail_ranges: AtomicBool,
    fail_moves: AtomicBool,
    range_calls: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `query_range` fail with `Unavailable`.
    pub fn fail_ranges(&self) {
        self.fail_ranges.store(true, Ordering::SeqCst);
    }

    /// Makes `array_move` fail with `Unavailable` until [`Self::heal`].
    pub fn fail_moves(&self) {
        self.fail_moves.store(true, Ordering::SeqCst);
    }

    /// Clears every injected failure.
    pub fn heal(&self) {
        self.fail_ranges.store(false, Ordering::SeqCst);
        self.fail_moves.store(false, Ordering::SeqCst);
    }

    /// Number of `query_range` calls seen so far.
    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn put(&self, collection: &str, key: &str, document: Document) -> Result<()> {
        self.inner.put(collection, key, document).await
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Document> {
        self.inner.get(collection, key).await
    }

    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        self.inner.query_equals(collection, field, value).await
    }

    async fn query_range(
        &self,
        collection: &str,
        field: &str,
        start: &str,
        end: &str,
        order_by: &str,
    ) -> Result<Vec<Document>> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ranges.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected range failure".to_string()));
        }
        self.inner
            .query_range(collection, field, start, end, order_by)
            .await
    }

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        self.inner.query_array_contains(collection, field, value).await
    }

    async fn update_fields(&self, collection: &str, key: &str, fields: Document) -> Result<()> {
        self.inner.update_fields(collection, key, fields).await
    }

    async fn array_union(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        self.inner.array_union(collection, key, field, value).await
    }

    async fn array_remove(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        self.inner.array_remove(collection, key, field, value).await
    }

    async fn array_move(
        &self,
        collection: &str,
        key: &str,
        from: &str,
        to: &str,
        value: Value,
    ) -> Result<()> {
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected move failure".to_string()));
        }
        self.inner.array_move(collection, key, from, to, value).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.inner.delete(collection, key).await
    }
}

/// Delegates to a [`MemoryDocumentStore`], delaying every range scan.
#[derive(Debug)]
pub struct SlowStore {
    pub inner: MemoryDocumentStore,
    delay: Duration,
    completed: AtomicUsize,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
            delay,
            completed: AtomicUsize::new(0),
        }
    }

    /// Number of range scans that ran to completion after their delay.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for SlowStore {
    async fn put(&self, collection: &str, key: &str, document: Document) -> Result<()> {
        self.inner.put(collection, key, document).await
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Document> {
        self.inner.get(collection, key).await
    }

    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        self.inner.query_equals(collection, field, value).await
    }

    async fn query_range(
        &self,
        collection: &str,
        field: &str,
        start: &str,
        end: &str,
        order_by: &str,
    ) -> Result<Vec<Document>> {
        tokio::time::sleep(self.delay).await;
        let documents = self
            .inner
            .query_range(collection, field, start, end, order_by)
            .await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        documents
    }

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        self.inner.query_array_contains(collection, field, value).await
    }

    async fn update_fields(&self, collection: &str, key: &str, fields: Document) -> Result<()> {
        self.inner.update_fields(collection, key, fields).await
    }

    async fn array_union(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        self.inner.array_union(collection, key, field, value).await
    }

    async fn array_remove(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        self.inner.array_remove(collection, key, field, value).await
    }

    async fn array_move(
        &self,
        collection: &str,
        key: &str,
        from: &str,
        to: &str,
        value: Value,
    ) -> Result<()> {
        self.inner.array_move(collection, key, from, to, value).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.inner.delete(collection, key).await
    }
}
