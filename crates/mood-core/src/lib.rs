//! Budget Mood Core
//!
//! Keeps a "budget mood" image on a remote page in sync with a progress value:
//! - Reads the progress fraction from a remote record source
//! - Classifies it into one of six mood buckets
//! - Finds the first image block in the page's lazily loaded block tree
//! - Points that block at the bucket's image
//!
//! The remote store is consumed through the [`DocumentStore`] trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use mood_core::{ImageTable, PageProcessor, PageTarget, ProcessorOptions};
//!
//! # async fn example(store: &dyn mood_core::DocumentStore) -> Result<(), Box<dyn std::error::Error>> {
//! let table = ImageTable::with_default_images("https://me.github.io/moods/")?;
//! let options = ProcessorOptions::default();
//! let page = PageTarget::new("household", "personal", "db-id", "page-id");
//!
//! let report = PageProcessor::new(store, &table, &options).process(&page).await;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod classifier;
pub mod config;
pub mod error;
pub mod processor;
pub mod runner;
pub mod store;
pub mod tree;
pub mod types;

// Re-exports for convenience
pub use classifier::{classify, progress_percentage, ImageRef, ImageTable, BUCKET_COUNT, BUCKET_WIDTH};
pub use config::{AccountConfig, MoodConfig, PageConfig, RuntimeConfig};
pub use error::{ConfigError, PageError, StoreError};
pub use processor::{
    PageProcessor, PageReport, PageStage, PageUpdate, ProcessorOptions, RetryPolicy,
};
pub use runner::{PageRow, RunSummary, Runner, RunnerOptions};
pub use store::{Bounded, DocumentStore};
pub use tree::{find_first, is_image, ExpandBlock};
pub use types::{
    Block, BlockId, BlockKind, BlockUpdate, ChildState, PageId, PageTarget, ProgressRecord, RunId,
    SourceId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with budget mood
    pub use crate::{
        Block, BlockId, BlockKind, DocumentStore, ImageTable, MoodConfig, PageProcessor,
        PageTarget, ProcessorOptions, Runner, RunnerOptions,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
