//! Concurrent range-query fan-out.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::bounds::QueryBound;
use crate::circle::{CircleError, Result};
use crate::store::{Document, DocumentStore};

/// Filter applied to every raw document before refinement.
pub type BasePredicate = fn(&Document) -> bool;

/// Runs one store range scan per [`QueryBound`], all at once.
///
/// The call fails as a whole: the first failing bound aborts the others,
/// and so does the deadline. Partial results are never returned.
pub struct RangeQueryDispatcher<S> {
    store: Arc<S>,
    collection: String,
    field: String,
    timeout: Duration,
}

impl<S> std::fmt::Debug for RangeQueryDispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeQueryDispatcher")
            .field("collection", &self.collection)
            .field("field", &self.field)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore + 'static> RangeQueryDispatcher<S> {
    /// Creates a dispatcher scanning `field` of `collection`.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        collection: impl Into<String>,
        field: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            field: field.into(),
            timeout,
        }
    }

    /// Queries every bound concurrently and concatenates the results.
    ///
    /// Documents rejected by `predicate` are dropped. Duplicates across
    /// bounds are kept; refinement removes them.
    ///
    /// # Errors
    ///
    /// - [`CircleError::Timeout`] if the deadline passes first
    /// - the mapped store error of the first failing bound
    /// - [`CircleError::InvariantViolation`] if a query task panicked
    pub async fn dispatch(
        &self,
        bounds: &[QueryBound],
        predicate: Option<BasePredicate>,
    ) -> Result<Vec<Document>> {
        match tokio::time::timeout(self.timeout, self.fan_out(bounds, predicate)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "Discovery over {} bound(s) timed out after {:?}",
                    bounds.len(),
                    self.timeout
                );
                Err(CircleError::Timeout(self.timeout))
            }
        }
    }

    async fn fan_out(
        &self,
        bounds: &[QueryBound],
        predicate: Option<BasePredicate>,
    ) -> Result<Vec<Document>> {
        // Dropping the set (deadline, caller cancellation) aborts every task.
        let mut tasks = JoinSet::new();
        for bound in bounds {
            let store = Arc::clone(&self.store);
            let collection = self.collection.clone();
            let field = self.field.clone();
            let bound = bound.clone();
            tasks.spawn(async move {
                store
                    .query_range(&collection, &field, &bound.start, &bound.end, &field)
                    .await
            });
        }

        let mut candidates = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let documents = match joined {
                Ok(Ok(documents)) => documents,
                Ok(Err(e)) => {
                    tasks.abort_all();
                    log::warn!("Bound query failed, aborting discovery: {e}");
                    return Err(e.into());
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(CircleError::InvariantViolation(format!(
                        "bound query task failed: {e}"
                    )));
                }
            };
            candidates.extend(
                documents
                    .into_iter()
                    .filter(|document| predicate.is_none_or(|keep| keep(document))),
            );
        }

        log::debug!(
            "{} bound(s) returned {} candidate(s)",
            bounds.len(),
            candidates.len()
        );
        Ok(candidates)
    }
}
