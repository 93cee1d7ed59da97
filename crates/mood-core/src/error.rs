//! Error types for the budget mood pipeline
//!
//! Errors are split by blast radius:
//! - `ConfigError` halts the run before any page is attempted
//! - `PageError` is contained to the page that produced it
//! - `StoreError` is what the remote collaborator reports; the processor
//!   folds it into a `PageError`

use crate::types::{BlockId, PageId, SourceId};
use std::path::PathBuf;

/// Failure reported by a document store call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Remote answered with a non-success status
    #[error("remote returned {status} ({code}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Machine-readable error code reported by the store
        code: String,
        /// Human-readable message
        message: String,
    },

    /// Request never completed (DNS, connect, reset...)
    #[error("transport failure: {0}")]
    Transport(String),

    /// Call exceeded its time bound
    #[error("remote call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Response body did not have the expected shape
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Check if the failure is worth another attempt
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// Per-page failure; never escapes the page that produced it
#[derive(Debug, Clone, thiserror::Error)]
pub enum PageError {
    /// Progress query failed or returned no usable value
    #[error("progress source {source_id} unavailable: {reason}")]
    SourceUnavailable { source_id: SourceId, reason: String },

    /// No image block anywhere in the page tree
    #[error("no image block found under page {page_id}")]
    NotFound { page_id: PageId },

    /// Expanding a container block failed mid-search
    #[error("fetching children failed: {0}")]
    ChildFetchFailed(#[source] StoreError),

    /// Writing the new image reference failed
    #[error("update of block {block_id} failed after {attempts} attempt(s): {source}")]
    MutationFailed {
        block_id: BlockId,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// The page task died before reaching a terminal state
    #[error("page task aborted: {0}")]
    Aborted(String),
}

impl PageError {
    /// `NotFound` is an expected negative result, everything else is an error
    #[inline]
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short stable label used in summaries
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source-unavailable",
            Self::NotFound { .. } => "not-found",
            Self::ChildFetchFailed(_) => "child-fetch-failed",
            Self::MutationFailed { .. } => "mutation-failed",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// Configuration errors; fatal before any page is processed
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected shape
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Image table is unusable
    #[error("image table needs {expected} entries, got {actual}")]
    ImageTable { expected: usize, actual: usize },

    /// A required field is empty
    #[error("missing required field `{field}` in {context}")]
    MissingField { field: &'static str, context: String },

    /// A field has a value the pipeline cannot use
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// A page refers to an account that is not configured
    #[error("page `{page}` refers to unknown account `{account}`")]
    UnknownAccount { page: String, account: String },

    /// Account has no usable credentials
    #[error("account `{account}` has no API key: {reason}")]
    MissingApiKey { account: String, reason: String },

    /// Nothing to do
    #[error("no pages configured")]
    NoPages,
}
