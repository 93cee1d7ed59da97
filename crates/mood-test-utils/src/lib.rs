//! Testing utilities for the budget mood workspace
//!
//! Shared fakes, fixtures, and block-tree builders.

#![allow(missing_docs)]

use async_trait::async_trait;
use mood_core::{
    Block, BlockId, BlockKind, BlockUpdate, DocumentStore, ImageTable, PageTarget, ProgressRecord,
    SourceId, StoreError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Call observed by [`InMemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    QueryProgress { source: SourceId, property: String },
    ListChildren(BlockId),
    UpdateBlock(BlockId, BlockUpdate),
}

/// Scriptable in-memory document store that records every call
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: HashMap<SourceId, Vec<ProgressRecord>>,
    children: HashMap<BlockId, Vec<Block>>,
    child_failures: HashMap<BlockId, StoreError>,
    update_failure: Option<StoreError>,
    delay: Option<Duration>,
    calls: Mutex<Vec<StoreCall>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Single record carrying `fraction`
    #[must_use]
    pub fn with_progress(self, source: &str, fraction: Option<f64>) -> Self {
        self.with_records(source, vec![ProgressRecord::new("record-0", fraction)])
    }

    #[must_use]
    pub fn with_records(mut self, source: &str, records: Vec<ProgressRecord>) -> Self {
        self.records.insert(SourceId::new(source), records);
        self
    }

    /// Children returned when `parent` is listed
    #[must_use]
    pub fn with_children(mut self, parent: &str, children: Vec<Block>) -> Self {
        self.children.insert(BlockId::new(parent), children);
        self
    }

    /// Listing `parent` fails with `error`
    #[must_use]
    pub fn failing_children(mut self, parent: &str, error: StoreError) -> Self {
        self.child_failures.insert(BlockId::new(parent), error);
        self
    }

    /// Every update fails with `error`
    #[must_use]
    pub fn failing_updates(mut self, error: StoreError) -> Self {
        self.update_failure = Some(error);
        self
    }

    /// Sleep before answering each call
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call in arrival order
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Blocks whose children were listed, in order
    #[must_use]
    pub fn listed(&self) -> Vec<BlockId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                StoreCall::ListChildren(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Updates that were attempted, in order
    #[must_use]
    pub fn updates(&self) -> Vec<(BlockId, BlockUpdate)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                StoreCall::UpdateBlock(id, update) => Some((id.clone(), update.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn not_found(what: impl std::fmt::Display) -> StoreError {
    StoreError::Status {
        status: 404,
        code: "object_not_found".to_string(),
        message: format!("could not find {what}"),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn query_progress(
        &self,
        source: &SourceId,
        property: &str,
    ) -> Result<Vec<ProgressRecord>, StoreError> {
        self.record(StoreCall::QueryProgress {
            source: source.clone(),
            property: property.to_string(),
        });
        self.pause().await;
        self.records
            .get(source)
            .cloned()
            .ok_or_else(|| not_found(format!("database {source}")))
    }

    async fn list_children(&self, parent: &BlockId) -> Result<Vec<Block>, StoreError> {
        self.record(StoreCall::ListChildren(parent.clone()));
        self.pause().await;
        if let Some(error) = self.child_failures.get(parent) {
            return Err(error.clone());
        }
        self.children
            .get(parent)
            .cloned()
            .ok_or_else(|| not_found(format!("block {parent}")))
    }

    async fn update_block(&self, block: &BlockId, update: &BlockUpdate) -> Result<(), StoreError> {
        self.record(StoreCall::UpdateBlock(block.clone(), update.clone()));
        self.pause().await;
        match &self.update_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Block builders
pub mod blocks {
    use super::{Block, BlockKind};

    #[must_use]
    pub fn image(id: &str) -> Block {
        Block::new(id, BlockKind::Image)
    }

    #[must_use]
    pub fn paragraph(id: &str) -> Block {
        Block::new(id, BlockKind::Paragraph)
    }

    /// Container whose children must be fetched
    #[must_use]
    pub fn column(id: &str) -> Block {
        Block::new(id, BlockKind::Column).unloaded()
    }

    /// Container with children already in memory
    #[must_use]
    pub fn toggle(id: &str, children: Vec<Block>) -> Block {
        Block::new(id, BlockKind::Toggle).with_children(children)
    }
}

/// Image table with short, predictable URLs: `https://img/mood-N.png`
#[must_use]
pub fn test_image_table() -> ImageTable {
    let names = (0..mood_core::BUCKET_COUNT).map(|i| format!("mood-{i}.png"));
    ImageTable::new("https://img/", names).expect("six names")
}

/// Page target on account `account`
#[must_use]
pub fn page(name: &str, account: &str, source: &str, page_id: &str) -> PageTarget {
    PageTarget::new(name, account, source, page_id)
}
