//! Notion backend for budget mood
//!
//! [`NotionClient`] implements [`mood_core::DocumentStore`] against the
//! Notion REST API. One client per integration token; the runner maps
//! account names onto clients.

#![warn(unreachable_pub)]

pub mod client;
mod wire;

pub use client::{NotionClient, NotionOptions, DEFAULT_BASE_URL, MAX_PAGE_SIZE, NOTION_VERSION};
