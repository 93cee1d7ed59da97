//! Progress classifier
//!
//! Maps a progress percentage onto one of six mood buckets and resolves the
//! bucket to an image reference. Pure: no I/O, no state.

use crate::error::{ConfigError, PageError};
use crate::types::{ProgressRecord, SourceId};
use serde::Serialize;

/// Number of mood buckets
pub const BUCKET_COUNT: usize = 6;

/// Width of one bucket in percentage points
pub const BUCKET_WIDTH: f64 = 16.7;

const LAST_BUCKET: f64 = (BUCKET_COUNT - 1) as f64;

/// Bucket index in `0..BUCKET_COUNT` for a progress percentage
///
/// Values past the last boundary (including anything >= 100) land in the
/// last bucket; negative values land in the first. NaN is treated as 0.
#[must_use]
pub fn classify(progress: f64) -> usize {
    let raw = (progress / BUCKET_WIDTH).floor();
    if raw.is_nan() {
        return 0;
    }
    // Clamped to [0, 5] so the cast is exact.
    raw.clamp(0.0, LAST_BUCKET) as usize
}

/// Turn progress-source records into a percentage
///
/// Only the first record is consulted. The source stores a fraction, so the
/// value is scaled by 100.
///
/// # Errors
/// `PageError::SourceUnavailable` when there are no records, the first record
/// has no numeric value, or the value is not finite.
pub fn progress_percentage(
    source_id: &SourceId,
    records: &[ProgressRecord],
) -> Result<f64, PageError> {
    let unavailable = |reason: String| PageError::SourceUnavailable {
        source_id: source_id.clone(),
        reason,
    };

    let record = records
        .first()
        .ok_or_else(|| unavailable("source returned no records".to_string()))?;

    let fraction = record
        .progress
        .ok_or_else(|| unavailable(format!("record {} has no progress value", record.id)))?;

    if !fraction.is_finite() {
        return Err(unavailable(format!(
            "record {} has non-finite progress {fraction}",
            record.id
        )));
    }

    Ok(fraction * 100.0)
}

/// Resolved image for a progress value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    /// Bucket index
    pub bucket: usize,
    /// Full image URL
    pub url: String,
}

/// Fixed bucket -> image table, built once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTable {
    base_url: String,
    file_names: [String; BUCKET_COUNT],
}

impl ImageTable {
    /// Build table from a base URL and at least six file names
    ///
    /// Names past the sixth are ignored.
    ///
    /// # Errors
    /// `ConfigError::ImageTable` if fewer than six names are supplied.
    pub fn new<I, S>(base_url: impl Into<String>, file_names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = file_names.into_iter().map(Into::into).collect();
        let actual = names.len();
        if actual > BUCKET_COUNT {
            tracing::warn!(
                "Image table has {} entries, only the first {} are used",
                actual,
                BUCKET_COUNT
            );
        }

        let file_names: [String; BUCKET_COUNT] = names
            .into_iter()
            .take(BUCKET_COUNT)
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| ConfigError::ImageTable {
                expected: BUCKET_COUNT,
                actual,
            })?;

        Ok(Self {
            base_url: base_url.into(),
            file_names,
        })
    }

    /// Table using the stock mood images
    ///
    /// # Errors
    /// Never fails in practice; kept fallible to share `new`'s signature.
    pub fn with_default_images(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(base_url, Self::default_file_names())
    }

    /// The six stock mood image names, happiest first
    #[must_use]
    pub fn default_file_names() -> Vec<String> {
        [
            "1 - Lots of Money.png",
            "2 - Some Spending Money.png",
            "3 - Neutral.png",
            "4 - Anxious.png",
            "5 - Over budget Sad.png",
            "6 - Max Overbudget Dead.png",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    /// Base URL every file name is appended to
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Image for a bucket index (clamped to the last bucket)
    #[must_use]
    pub fn image_for_bucket(&self, bucket: usize) -> ImageRef {
        let bucket = bucket.min(BUCKET_COUNT - 1);
        ImageRef {
            bucket,
            url: format!("{}{}", self.base_url, self.file_names[bucket]),
        }
    }

    /// Classify a progress percentage and resolve its image
    #[must_use]
    pub fn resolve(&self, progress: f64) -> ImageRef {
        let image = self.image_for_bucket(classify(progress));
        tracing::info!("Progress {}% falls into section {}", progress, image.bucket);
        image
    }
}
