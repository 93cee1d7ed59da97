//! Concurrent run over every tracked page
//!
//! Each page runs in its own tokio task, bounded by a semaphore. The only
//! state shared between tasks is the read-only account -> store map.

use crate::classifier::ImageTable;
use crate::error::{ConfigError, PageError};
use crate::processor::{PageProcessor, PageReport, PageStage, ProcessorOptions};
use crate::store::{Bounded, DocumentStore};
use crate::types::{PageTarget, RunId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Runner options
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Pages processed at the same time
    pub max_concurrent_pages: usize,
    /// Bound on every remote call
    pub request_timeout: Duration,
    /// Per-page processing options
    pub processor: ProcessorOptions,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_pages: 4,
            request_timeout: Duration::from_secs(30),
            processor: ProcessorOptions::default(),
        }
    }
}

/// Processes pages against their account's store
pub struct Runner {
    accounts: HashMap<String, Arc<dyn DocumentStore>>,
    table: Arc<ImageTable>,
    options: RunnerOptions,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("accounts", &self.accounts.keys().collect::<Vec<_>>())
            .field("table", &self.table)
            .field("options", &self.options)
            .finish()
    }
}

impl Runner {
    /// Create new runner
    #[inline]
    #[must_use]
    pub fn new(
        accounts: HashMap<String, Arc<dyn DocumentStore>>,
        table: ImageTable,
        options: RunnerOptions,
    ) -> Self {
        Self {
            accounts,
            table: Arc::new(table),
            options,
        }
    }

    /// Options in effect
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Process every page
    ///
    /// Page failures are recorded in the summary and never stop sibling
    /// pages.
    ///
    /// # Errors
    /// `ConfigError::UnknownAccount` if any page names an account with no
    /// store; checked before any page is attempted.
    pub async fn run(&self, pages: Vec<PageTarget>) -> Result<RunSummary, ConfigError> {
        let mut jobs = Vec::with_capacity(pages.len());
        for page in pages {
            let store = self.accounts.get(&page.account).cloned().ok_or_else(|| {
                ConfigError::UnknownAccount {
                    page: page.name.clone(),
                    account: page.account.clone(),
                }
            })?;
            jobs.push((page, store));
        }

        let run_id = RunId::new();
        let started_at = Utc::now();
        let span = tracing::info_span!("run", run_id = %run_id);
        tracing::info!(parent: &span, "Processing {} page(s)", jobs.len());

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_pages.max(1)));
        let processor_options = Arc::new(self.options.processor.clone());
        let timeout = self.options.request_timeout;

        let targets: Vec<PageTarget> = jobs.iter().map(|(page, _)| page.clone()).collect();
        let mut tasks = JoinSet::new();

        for (index, (page, store)) in jobs.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let table = Arc::clone(&self.table);
            let options = Arc::clone(&processor_options);

            tasks.spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (index, aborted(page, "concurrency limiter closed".to_string()));
                    };
                    let store = Bounded::new(store, timeout);
                    let report = PageProcessor::new(&store, &table, &options)
                        .process(&page)
                        .await;
                    (index, report)
                }
                .instrument(span.clone()),
            );
        }

        let mut slots: Vec<Option<PageReport>> = targets.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => tracing::error!(parent: &span, "Page task failed: {}", e),
            }
        }

        // A slot left empty belongs to a task that panicked or was cancelled.
        let reports = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| {
                    tracing::error!(parent: &span, "Page {} ({}) did not finish", target.name, target.page_id);
                    aborted(target, "task panicked or was cancelled".to_string())
                })
            })
            .collect();

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            reports,
        };
        tracing::info!(
            parent: &span,
            "Run finished: {} updated, {} not found, {} failed",
            summary.succeeded(),
            summary.not_found(),
            summary.failed()
        );
        Ok(summary)
    }
}

fn aborted(target: PageTarget, reason: String) -> PageReport {
    PageReport {
        target,
        stage: PageStage::FetchProgress,
        outcome: Err(PageError::Aborted(reason)),
        elapsed: Duration::ZERO,
    }
}

/// Outcome of one run, reports in input order
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: RunId,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the last page finished
    pub finished_at: DateTime<Utc>,
    /// One report per page
    pub reports: Vec<PageReport>,
}

impl RunSummary {
    /// Pages that reached `Done`
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    /// Pages without an image block
    #[must_use]
    pub fn not_found(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(&r.outcome, Err(e) if e.is_warning()))
            .count()
    }

    /// Pages that ended in an error
    #[must_use]
    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(&r.outcome, Err(e) if !e.is_warning()))
            .count()
    }

    /// True when every page reached `Done`
    #[inline]
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.reports.iter().all(PageReport::is_success)
    }

    /// Flat, serializable view of each page
    #[must_use]
    pub fn rows(&self) -> Vec<PageRow> {
        self.reports.iter().map(PageRow::from).collect()
    }
}

/// One line of a run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRow {
    pub name: String,
    pub page_id: String,
    pub status: &'static str,
    pub stage: PageStage,
    pub progress: Option<f64>,
    pub bucket: Option<usize>,
    pub image_url: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl From<&PageReport> for PageRow {
    fn from(report: &PageReport) -> Self {
        let (status, progress, bucket, image_url, error) = match &report.outcome {
            Ok(update) => (
                if update.applied { "updated" } else { "dry-run" },
                Some(update.progress),
                Some(update.image.bucket),
                Some(update.image.url.clone()),
                None,
            ),
            Err(e) => (e.kind(), None, None, None, Some(e.to_string())),
        };
        Self {
            name: report.target.name.clone(),
            page_id: report.target.page_id.to_string(),
            status,
            stage: report.stage,
            progress,
            bucket,
            image_url,
            error,
            elapsed_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::types::{Block, BlockId, BlockUpdate, ProgressRecord, SourceId};
    use async_trait::async_trait;

    /// Store that panics on progress queries
    struct Exploding;

    #[async_trait]
    impl DocumentStore for Exploding {
        async fn query_progress(
            &self,
            _source: &SourceId,
            _property: &str,
        ) -> Result<Vec<ProgressRecord>, StoreError> {
            panic!("store blew up");
        }

        async fn list_children(&self, _parent: &BlockId) -> Result<Vec<Block>, StoreError> {
            Ok(vec![])
        }

        async fn update_block(
            &self,
            _block: &BlockId,
            _update: &BlockUpdate,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn runner(accounts: HashMap<String, Arc<dyn DocumentStore>>) -> Runner {
        Runner::new(
            accounts,
            ImageTable::with_default_images("https://img/").unwrap(),
            RunnerOptions::default(),
        )
    }

    #[tokio::test]
    async fn unknown_account_halts_before_any_page() {
        let mut accounts: HashMap<String, Arc<dyn DocumentStore>> = HashMap::new();
        accounts.insert("a".into(), Arc::new(Exploding));
        let pages = vec![
            PageTarget::new("first", "a", "db", "p1"),
            PageTarget::new("second", "missing", "db", "p2"),
        ];

        let err = runner(accounts).run(pages).await.unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAccount { ref account, .. } if account == "missing"));
    }

    #[tokio::test]
    async fn panicking_page_is_reported_as_aborted() {
        let mut accounts: HashMap<String, Arc<dyn DocumentStore>> = HashMap::new();
        accounts.insert("a".into(), Arc::new(Exploding));
        let pages = vec![PageTarget::new("boom", "a", "db", "p1")];

        let summary = runner(accounts).run(pages).await.unwrap();
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(matches!(
            summary.reports[0].outcome,
            Err(PageError::Aborted(_))
        ));
        assert_eq!(summary.rows()[0].status, "aborted");
    }

    #[tokio::test]
    async fn empty_run_is_ok() {
        let summary = runner(HashMap::new()).run(vec![]).await.unwrap();
        assert!(summary.all_ok());
        assert_eq!(summary.succeeded(), 0);
    }
}
