//! Configuration management for the video content analyzer.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//!
//! # Example
//!
//! ```no_run
//! use vca_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/settings.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Temp root: {}", config.settings().paths.temp_root);
//!
//! config.settings_mut().cleanup.enabled = true;
//! config.update_section(ConfigSection::Cleanup).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AnalysisSettings, CleanupSettings, ConfigSection, LoggingSettings, NotionSettings,
    PathSettings, Settings, StorageSettings,
};
