//! Core types for budget mood
//!
//! Defines:
//! - Identifiers for blocks, pages and progress sources
//! - The block tree model with explicit loaded/unloaded child state
//! - Mutation payloads and progress records
//! - Fully resolved page targets

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier
            #[inline]
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the raw identifier
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

string_id!(
    /// Opaque block identifier, stable for the block's lifetime
    BlockId
);
string_id!(
    /// Page whose block tree holds the mood image
    PageId
);
string_id!(
    /// Record collection that supplies the progress value
    SourceId
);

impl From<PageId> for BlockId {
    // A page is the root block of its own tree.
    fn from(page: PageId) -> Self {
        Self(page.0)
    }
}

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content type tag of a block
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Image,
    Paragraph,
    Heading,
    Column,
    ColumnList,
    Toggle,
    Callout,
    SyncedBlock,
    ChildPage,
    /// Any tag this crate does not care about
    Other(String),
}

impl BlockKind {
    /// Parse the wire tag
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "image" => Self::Image,
            "paragraph" => Self::Paragraph,
            "heading_1" | "heading_2" | "heading_3" => Self::Heading,
            "column" => Self::Column,
            "column_list" => Self::ColumnList,
            "toggle" => Self::Toggle,
            "callout" => Self::Callout,
            "synced_block" => Self::SyncedBlock,
            "child_page" => Self::ChildPage,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire tag (headings collapse to `heading_1`)
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Image => "image",
            Self::Paragraph => "paragraph",
            Self::Heading => "heading_1",
            Self::Column => "column",
            Self::ColumnList => "column_list",
            Self::Toggle => "toggle",
            Self::Callout => "callout",
            Self::SyncedBlock => "synced_block",
            Self::ChildPage => "child_page",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What is known about a block's direct descendants
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ChildState {
    /// No descendants exist
    #[default]
    Leaf,
    /// Complete, final set of direct descendants as of the read
    Loaded(Vec<Block>),
    /// Descendants exist but have not been fetched
    Unloaded,
}

/// A node of a remote document's content tree
///
/// Transient: represents a point-in-time read and is discarded after
/// the traversal completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Block identifier
    pub id: BlockId,
    /// Content type
    pub kind: BlockKind,
    /// Child state
    pub children: ChildState,
    /// Current external URL (image blocks only)
    pub external_url: Option<String>,
}

impl Block {
    /// Create a leaf block
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<BlockId>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
            children: ChildState::Leaf,
            external_url: None,
        }
    }

    /// With already loaded children
    #[inline]
    #[must_use]
    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = ChildState::Loaded(children);
        self
    }

    /// Mark as having descendants that still need fetching
    #[inline]
    #[must_use]
    pub fn unloaded(mut self) -> Self {
        self.children = ChildState::Unloaded;
        self
    }

    /// With current external URL
    #[inline]
    #[must_use]
    pub fn with_external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = Some(url.into());
        self
    }

    /// True when descendants exist but are not in memory
    #[inline]
    #[must_use]
    pub fn has_unloaded_children(&self) -> bool {
        matches!(self.children, ChildState::Unloaded)
    }
}

/// Mutation sent to a single block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockUpdate {
    /// Point an image block at an external URL
    ExternalImage { url: String },
}

/// One record returned by the progress source
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    /// Record identifier
    pub id: String,
    /// Raw progress fraction, if the record carries one
    pub progress: Option<f64>,
}

impl ProgressRecord {
    /// Create new record
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, progress: Option<f64>) -> Self {
        Self {
            id: id.into(),
            progress,
        }
    }
}

/// A tracked page with every identifier resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTarget {
    /// Human label used in logs and summaries
    pub name: String,
    /// Key into the account/client map
    pub account: String,
    /// Progress source
    pub source_id: SourceId,
    /// Page holding the image block
    pub page_id: PageId,
}

impl PageTarget {
    /// Create new target
    #[inline]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        account: impl Into<String>,
        source_id: impl Into<SourceId>,
        page_id: impl Into<PageId>,
    ) -> Self {
        Self {
            name: name.into(),
            account: account.into(),
            source_id: source_id.into(),
            page_id: page_id.into(),
        }
    }
}
