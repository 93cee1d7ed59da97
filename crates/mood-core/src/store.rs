//! Remote document-store capability
//!
//! The pipeline only ever talks to the store through [`DocumentStore`]; the
//! concrete REST client lives in its own crate.

use crate::error::StoreError;
use crate::types::{Block, BlockId, BlockUpdate, ProgressRecord, SourceId};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Remote hierarchical document store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Query the progress source, reading `property` from each record
    async fn query_progress(
        &self,
        source: &SourceId,
        property: &str,
    ) -> Result<Vec<ProgressRecord>, StoreError>;

    /// Complete set of direct children of a block
    ///
    /// Implementations follow their own pagination until the set is complete.
    async fn list_children(&self, parent: &BlockId) -> Result<Vec<Block>, StoreError>;

    /// Apply a single mutation to a block
    async fn update_block(&self, block: &BlockId, update: &BlockUpdate) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn query_progress(
        &self,
        source: &SourceId,
        property: &str,
    ) -> Result<Vec<ProgressRecord>, StoreError> {
        (**self).query_progress(source, property).await
    }

    async fn list_children(&self, parent: &BlockId) -> Result<Vec<Block>, StoreError> {
        (**self).list_children(parent).await
    }

    async fn update_block(&self, block: &BlockId, update: &BlockUpdate) -> Result<(), StoreError> {
        (**self).update_block(block, update).await
    }
}

/// Store decorator that bounds every call with a timeout
///
/// An elapsed timer surfaces as `StoreError::Timeout`, so one stalled page
/// cannot hold a concurrency slot forever.
#[derive(Debug, Clone)]
pub struct Bounded<S> {
    inner: S,
    limit: Duration,
}

impl<S> Bounded<S> {
    /// Wrap a store
    #[inline]
    #[must_use]
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    /// Per-call limit
    #[inline]
    #[must_use]
    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn bound<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                elapsed_ms: u64::try_from(self.limit.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for Bounded<S> {
    async fn query_progress(
        &self,
        source: &SourceId,
        property: &str,
    ) -> Result<Vec<ProgressRecord>, StoreError> {
        self.bound(self.inner.query_progress(source, property)).await
    }

    async fn list_children(&self, parent: &BlockId) -> Result<Vec<Block>, StoreError> {
        self.bound(self.inner.list_children(parent)).await
    }

    async fn update_block(&self, block: &BlockId, update: &BlockUpdate) -> Result<(), StoreError> {
        self.bound(self.inner.update_block(block, update)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockKind;

    struct Stalled;

    #[async_trait]
    impl DocumentStore for Stalled {
        async fn query_progress(
            &self,
            _source: &SourceId,
            _property: &str,
        ) -> Result<Vec<ProgressRecord>, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }

        async fn list_children(&self, _parent: &BlockId) -> Result<Vec<Block>, StoreError> {
            Ok(vec![Block::new("child", BlockKind::Image)])
        }

        async fn update_block(
            &self,
            _block: &BlockId,
            _update: &BlockUpdate,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_times_out_stalled_call() {
        let store = Bounded::new(Stalled, Duration::from_millis(250));
        let err = store
            .query_progress(&SourceId::new("db"), "Progress")
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Timeout { elapsed_ms: 250 });
    }

    #[tokio::test]
    async fn bounded_passes_through_fast_call() {
        let store = Bounded::new(Stalled, Duration::from_secs(5));
        let children = store.list_children(&BlockId::new("root")).await.unwrap();
        assert_eq!(children.len(), 1);
    }
}
