//! Page processor
//!
//! Drives one page through
//! `FetchProgress -> Classify -> LocateBlock -> Mutate -> Done`.
//! Every step is sequential and every failure is terminal for the page only.

use crate::classifier::{progress_percentage, ImageRef, ImageTable};
use crate::error::PageError;
use crate::store::DocumentStore;
use crate::tree::{find_first, is_image};
use crate::types::{BlockId, BlockUpdate, PageTarget};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Stage a page reached before terminating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageStage {
    FetchProgress,
    Classify,
    LocateBlock,
    Mutate,
    Done,
}

/// Bounded retry for the single block mutation
///
/// The mutation sets an absolute external URL, so repeating it after an
/// ambiguous failure leaves the block in the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = no retry)
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each later one
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Single best-effort attempt
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        // attempt is the one that just failed, starting at 1
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Per-run processing options
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Record property holding the progress fraction
    pub progress_property: String,
    /// Mutation retry policy
    pub retry: RetryPolicy,
    /// Locate the block but skip the write
    pub dry_run: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            progress_property: "Progress".to_string(),
            retry: RetryPolicy::default(),
            dry_run: false,
        }
    }
}

/// Successful page result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageUpdate {
    /// Image block that was (or would be) rewritten
    pub block_id: BlockId,
    /// Progress percentage
    pub progress: f64,
    /// Chosen image
    pub image: ImageRef,
    /// URL the block pointed at before the write, if known
    pub previous_url: Option<String>,
    /// False in dry-run mode
    pub applied: bool,
    /// Write attempts used (0 in dry-run mode)
    pub attempts: u32,
}

/// Terminal outcome of one page
#[derive(Debug, Clone)]
pub struct PageReport {
    /// Page that was processed
    pub target: PageTarget,
    /// Last stage reached
    pub stage: PageStage,
    /// Result
    pub outcome: Result<PageUpdate, PageError>,
    /// Wall time spent on the page
    pub elapsed: Duration,
}

impl PageReport {
    /// True when the page reached `Done`
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Runs the page state machine against one store
#[derive(Debug)]
pub struct PageProcessor<'a, S: ?Sized> {
    store: &'a S,
    table: &'a ImageTable,
    options: &'a ProcessorOptions,
}

impl<'a, S: DocumentStore + ?Sized> PageProcessor<'a, S> {
    /// Create new processor
    #[inline]
    #[must_use]
    pub fn new(store: &'a S, table: &'a ImageTable, options: &'a ProcessorOptions) -> Self {
        Self {
            store,
            table,
            options,
        }
    }

    /// Process one page and log its terminal outcome
    pub async fn process(&self, target: &PageTarget) -> PageReport {
        let span = tracing::info_span!(
            "page",
            page = %target.name,
            page_id = %target.page_id
        );

        async {
            let start = Instant::now();
            let mut stage = PageStage::FetchProgress;
            let outcome = self.run_steps(target, &mut stage).await;
            let report = PageReport {
                target: target.clone(),
                stage,
                outcome,
                elapsed: start.elapsed(),
            };
            log_outcome(&report);
            report
        }
        .instrument(span)
        .await
    }

    async fn run_steps(
        &self,
        target: &PageTarget,
        stage: &mut PageStage,
    ) -> Result<PageUpdate, PageError> {
        tracing::info!("Checking balances in {}", target.source_id);
        let records = self
            .store
            .query_progress(&target.source_id, &self.options.progress_property)
            .await
            .map_err(|e| PageError::SourceUnavailable {
                source_id: target.source_id.clone(),
                reason: e.to_string(),
            })?;
        let progress = progress_percentage(&target.source_id, &records)?;
        tracing::info!("Found progress percentage: {}%", progress);

        *stage = PageStage::Classify;
        let image = self.table.resolve(progress);

        *stage = PageStage::LocateBlock;
        let root: BlockId = target.page_id.clone().into();
        let roots = self
            .store
            .list_children(&root)
            .await
            .map_err(PageError::ChildFetchFailed)?;
        tracing::debug!("Fetched {} top-level blocks", roots.len());

        let block = find_first(roots, is_image, self.store)
            .await
            .map_err(PageError::ChildFetchFailed)?
            .ok_or_else(|| PageError::NotFound {
                page_id: target.page_id.clone(),
            })?;

        *stage = PageStage::Mutate;
        let attempts = if self.options.dry_run {
            tracing::info!("Dry run, leaving block {} untouched", block.id);
            0
        } else {
            let update = BlockUpdate::ExternalImage {
                url: image.url.clone(),
            };
            self.apply_update(&block.id, &update).await?
        };

        *stage = PageStage::Done;
        Ok(PageUpdate {
            block_id: block.id,
            progress,
            image,
            previous_url: block.external_url,
            applied: !self.options.dry_run,
            attempts,
        })
    }

    /// Write `update` to `block_id`
    ///
    /// # Returns
    /// Number of attempts used
    ///
    /// # Errors
    /// `PageError::MutationFailed` once the retry policy is exhausted or the
    /// failure is not retryable.
    pub async fn apply_update(
        &self,
        block_id: &BlockId,
        update: &BlockUpdate,
    ) -> Result<u32, PageError> {
        let policy = self.options.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.store.update_block(block_id, update).await {
                Ok(()) => return Ok(attempt),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = policy.delay_before(attempt);
                    tracing::warn!(
                        "Update of block {} failed (attempt {}/{}): {}; retrying in {:?}",
                        block_id,
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(PageError::MutationFailed {
                        block_id: block_id.clone(),
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }
}

fn log_outcome(report: &PageReport) {
    let page = &report.target.name;
    let page_id = &report.target.page_id;
    match &report.outcome {
        Ok(update) if update.applied => tracing::info!(
            "Updated image block {} on page {} ({}) with URL: {}",
            update.block_id,
            page,
            page_id,
            update.image.url
        ),
        Ok(update) => tracing::info!(
            "Would update image block {} on page {} ({}) with URL: {}",
            update.block_id,
            page,
            page_id,
            update.image.url
        ),
        Err(e) if e.is_warning() => {
            tracing::warn!("Page {} ({}) skipped: {}", page, page_id, e);
        }
        Err(e) => tracing::error!(
            "Page {} ({}) failed at {:?}: {}",
            page,
            page_id,
            report.stage,
            e
        ),
    }
}
