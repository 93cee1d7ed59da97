//! Static configuration
//!
//! Loaded once from a TOML file at startup. Everything here is validated
//! before any page is attempted; a bad config never reaches the pipeline.

use crate::classifier::ImageTable;
use crate::error::ConfigError;
use crate::processor::{ProcessorOptions, RetryPolicy};
use crate::types::PageTarget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoodConfig {
    /// Prefix every image file name is appended to
    pub asset_base_url: String,
    /// Six image file names, happiest first
    #[serde(default = "ImageTable::default_file_names")]
    pub images: Vec<String>,
    /// Runtime knobs
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Credentials by account key
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
    /// Tracked pages
    #[serde(default)]
    pub pages: Vec<PageConfig>,
}

/// Runtime knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Pages processed at the same time
    pub max_concurrent_pages: usize,
    /// Bound on every remote call
    pub request_timeout_secs: u64,
    /// Block update attempts (1 = no retry)
    pub mutation_attempts: u32,
    /// Delay before the first update retry
    pub retry_backoff_ms: u64,
    /// Record property holding the progress fraction
    pub progress_property: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pages: 4,
            request_timeout_secs: 30,
            mutation_attempts: 1,
            retry_backoff_ms: 500,
            progress_property: "Progress".to_string(),
        }
    }
}

/// Credentials for one account
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Inline API key
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
}

impl AccountConfig {
    /// Resolve the API key from the process environment
    ///
    /// # Errors
    /// `ConfigError::MissingApiKey` if neither source yields a non-empty key.
    pub fn resolve_api_key(&self, account: &str) -> Result<String, ConfigError> {
        self.resolve_api_key_with(account, |var| std::env::var(var).ok())
    }

    /// Resolve the API key with a custom environment lookup
    ///
    /// An inline key wins over the environment variable.
    ///
    /// # Errors
    /// `ConfigError::MissingApiKey` if neither source yields a non-empty key.
    pub fn resolve_api_key_with<F>(&self, account: &str, lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let missing = |reason: String| ConfigError::MissingApiKey {
            account: account.to_string(),
            reason,
        };

        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.to_string());
        }

        match self.api_key_env.as_deref() {
            Some(var) => lookup(var)
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| missing(format!("environment variable {var} is unset or empty"))),
            None => Err(missing("set `api_key` or `api_key_env`".to_string())),
        }
    }
}

/// One tracked page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageConfig {
    /// Label for logs; defaults to the page id
    pub name: Option<String>,
    /// Account key
    pub account: String,
    /// Database supplying the progress value
    pub database_id: String,
    /// Page holding the mood image
    pub page_id: String,
}

impl PageConfig {
    /// Resolved target
    #[must_use]
    pub fn target(&self) -> PageTarget {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| self.page_id.clone());
        PageTarget::new(
            name,
            self.account.clone(),
            self.database_id.as_str(),
            self.page_id.as_str(),
        )
    }
}

impl MoodConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed TOML, or any validation error.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, then as `from_toml_str`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&source)
    }

    /// Check every static precondition
    ///
    /// # Errors
    /// The first violated precondition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asset_base_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "asset_base_url",
                context: "root".to_string(),
            });
        }
        self.image_table()?;

        if self.runtime.max_concurrent_pages == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runtime.max_concurrent_pages",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.runtime.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runtime.request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.runtime.progress_property.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "progress_property",
                context: "runtime".to_string(),
            });
        }

        if self.pages.is_empty() {
            return Err(ConfigError::NoPages);
        }

        for (index, page) in self.pages.iter().enumerate() {
            let context = format!("pages[{index}]");
            for (field, value) in [
                ("account", &page.account),
                ("database_id", &page.database_id),
                ("page_id", &page.page_id),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::MissingField {
                        field,
                        context: context.clone(),
                    });
                }
            }
            if !self.accounts.contains_key(&page.account) {
                return Err(ConfigError::UnknownAccount {
                    page: page.target().name,
                    account: page.account.clone(),
                });
            }
        }

        Ok(())
    }

    /// Bucket -> image table
    ///
    /// # Errors
    /// `ConfigError::ImageTable` if fewer than six images are configured.
    pub fn image_table(&self) -> Result<ImageTable, ConfigError> {
        ImageTable::new(self.asset_base_url.clone(), self.images.iter().cloned())
    }

    /// Resolved page targets in config order
    #[must_use]
    pub fn targets(&self) -> Vec<PageTarget> {
        self.pages.iter().map(PageConfig::target).collect()
    }

    /// Options for the page processor
    #[must_use]
    pub fn processor_options(&self, dry_run: bool) -> ProcessorOptions {
        ProcessorOptions {
            progress_property: self.runtime.progress_property.clone(),
            retry: RetryPolicy {
                max_attempts: self.runtime.mutation_attempts.max(1),
                backoff: Duration::from_millis(self.runtime.retry_backoff_ms),
            },
            dry_run,
        }
    }

    /// Bound applied to every remote call
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime.request_timeout_secs)
    }
}
