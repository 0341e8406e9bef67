//! Configuration management for vidbox
//!
//! Layered configuration loaded from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! Environment overrides use the pattern `VIDBOX__<section>__<key>`, e.g.
//! `VIDBOX__SERVER__BIND_ADDR=0.0.0.0:9000` or
//! `VIDBOX__FETCHER__YTDLP_BIN=/usr/local/bin/yt-dlp`.
//!
//! By default the configuration file is `config/vidbox.toml`; override with
//! the `VIDBOX_CONFIG` environment variable.

mod models;
mod sources;

pub use models::{Config, FetcherConfig, ServerConfig, StorageConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    pub fn load() -> Result<Self, ConfigError> {
        Ok(sources::load()?)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        Ok(sources::load_from_sources(path)?)
    }
}
