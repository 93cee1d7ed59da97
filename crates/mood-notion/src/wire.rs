//! Notion JSON shapes and their mapping onto core types

use mood_core::{Block, BlockKind, BlockUpdate, ChildState, ProgressRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Paginated list envelope
#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse<T> {
    pub(crate) results: Vec<T>,
    #[serde(default)]
    pub(crate) has_more: bool,
    #[serde(default)]
    pub(crate) next_cursor: Option<String>,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) message: String,
}

/// Database row
#[derive(Debug, Deserialize)]
pub(crate) struct RawPage {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) properties: Map<String, Value>,
}

impl RawPage {
    /// Numeric value of `property`, whatever property type produced it
    ///
    /// Plain number properties, formulas and rollups all carry the value
    /// under a `number` key.
    pub(crate) fn number(&self, property: &str) -> Option<f64> {
        let prop = self.properties.get(property)?;
        prop.get("number")
            .or_else(|| prop.get("formula").and_then(|f| f.get("number")))
            .or_else(|| prop.get("rollup").and_then(|r| r.get("number")))
            .and_then(Value::as_f64)
    }

    pub(crate) fn into_record(self, property: &str) -> ProgressRecord {
        let progress = self.number(property);
        ProgressRecord::new(self.id, progress)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileUrl {
    pub(crate) url: String,
}

/// Image payload; either hosted by Notion or external
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawImage {
    #[serde(default)]
    pub(crate) external: Option<FileUrl>,
    #[serde(default)]
    pub(crate) file: Option<FileUrl>,
}

/// Block as listed by `GET /blocks/{id}/children`
#[derive(Debug, Deserialize)]
pub(crate) struct RawBlock {
    pub(crate) id: String,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) has_children: bool,
    #[serde(default)]
    pub(crate) image: Option<RawImage>,
}

impl From<RawBlock> for Block {
    fn from(raw: RawBlock) -> Self {
        let external_url = raw.image.and_then(|image| {
            image
                .external
                .or(image.file)
                .map(|file| file.url)
        });
        Block {
            id: raw.id.into(),
            kind: BlockKind::from_tag(&raw.kind),
            // Listed children never come with their own children inline.
            children: if raw.has_children {
                ChildState::Unloaded
            } else {
                ChildState::Leaf
            },
            external_url,
        }
    }
}

/// Database query body
#[derive(Debug, Serialize)]
pub(crate) struct QueryBody {
    pub(crate) page_size: u32,
}

/// `PATCH /blocks/{id}` body
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum UpdateBody {
    Image { image: ExternalImage },
}

#[derive(Debug, Serialize)]
pub(crate) struct ExternalImage {
    pub(crate) external: ExternalUrl,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExternalUrl {
    pub(crate) url: String,
}

impl From<&BlockUpdate> for UpdateBody {
    fn from(update: &BlockUpdate) -> Self {
        match update {
            BlockUpdate::ExternalImage { url } => Self::Image {
                image: ExternalImage {
                    external: ExternalUrl { url: url.clone() },
                },
            },
        }
    }
}
