//! Block tree locator
//!
//! Depth-first, preorder, left-to-right search over a lazily loaded block
//! tree. Unloaded subtrees are expanded on demand, only along the path the
//! search actually walks, and the search stops at the first match.

use crate::error::StoreError;
use crate::store::DocumentStore;
use crate::types::{Block, BlockId, BlockKind, ChildState};
use async_trait::async_trait;
use std::collections::HashSet;

/// Fetches the direct children of a block whose children are not loaded
#[async_trait]
pub trait ExpandBlock: Send + Sync {
    /// Complete child set of `block`
    async fn expand(&self, block: &BlockId) -> Result<Vec<Block>, StoreError>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> ExpandBlock for S {
    async fn expand(&self, block: &BlockId) -> Result<Vec<Block>, StoreError> {
        self.list_children(block).await
    }
}

/// Target predicate for the mood image
#[inline]
#[must_use]
pub fn is_image(block: &Block) -> bool {
    block.kind == BlockKind::Image
}

/// Find the first block matching `predicate`
///
/// For each visited block: a match returns immediately; loaded children are
/// searched next; unloaded children are fetched through `expander` (once per
/// block) and searched; leaves are skipped.
///
/// A block id seen twice is not searched again, which keeps a malformed
/// document with back-edges from looping.
///
/// # Returns
/// `Ok(None)` when nothing matches. This is an expected outcome.
///
/// # Errors
/// The first expansion failure aborts the search.
pub async fn find_first<X, P>(
    roots: Vec<Block>,
    mut predicate: P,
    expander: &X,
) -> Result<Option<Block>, StoreError>
where
    X: ExpandBlock + ?Sized,
    P: FnMut(&Block) -> bool + Send,
{
    let mut visited: HashSet<BlockId> = HashSet::new();
    let mut stack: Vec<std::vec::IntoIter<Block>> = vec![roots.into_iter()];

    while let Some(level) = stack.last_mut() {
        let Some(block) = level.next() else {
            stack.pop();
            continue;
        };

        if !visited.insert(block.id.clone()) {
            tracing::warn!("Block {} reached twice, skipping repeated subtree", block.id);
            continue;
        }

        tracing::debug!("Checking block {} ({})", block.id, block.kind);
        if predicate(&block) {
            return Ok(Some(block));
        }

        let children = match block.children {
            ChildState::Leaf => continue,
            ChildState::Loaded(children) => children,
            ChildState::Unloaded => {
                tracing::debug!("Expanding block {}", block.id);
                expander.expand(&block.id).await?
            }
        };
        stack.push(children.into_iter());
    }

    Ok(None)
}
