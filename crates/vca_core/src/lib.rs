//! VCA Core - pipeline engine for Video Content Analyzer
//!
//! Takes a YouTube or Vimeo URL through download, scene extraction and AI
//! classification, stores the result, and syncs it to remote storage and
//! Notion. The crate has no UI dependencies; a CLI or GUI drives it
//! through `orchestrator::Coordinator`.

pub mod config;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod services;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
