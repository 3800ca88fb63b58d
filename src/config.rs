//! Engine configuration
//!
//! Configuration can be built in code with the `with_*` methods or loaded
//! from a TOML file:
//!
//! ```toml
//! strict_directives = true
//! duplicate_blocks = "reject"
//! fetch_timeout_ms = 2000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::parser::ParseOptions;

/// Errors that can occur when loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// How to treat two `block` directives with the same name in one template
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateBlocks {
    /// The later definition is the one block lookups resolve to
    #[default]
    LastWins,
    /// Fail compilation with a structure error
    Reject,
}

/// Configuration for the template engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Reject unknown directive keywords instead of ignoring them
    pub strict_directives: bool,

    /// Duplicate block name policy
    pub duplicate_blocks: DuplicateBlocks,

    /// Upper bound for a single backing-store fetch, in milliseconds
    pub fetch_timeout_ms: Option<u64>,
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_strict_directives(mut self, strict: bool) -> Self {
        self.strict_directives = strict;
        self
    }

    pub fn with_duplicate_blocks(mut self, policy: DuplicateBlocks) -> Self {
        self.duplicate_blocks = policy;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Compiler options derived from this configuration
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            strict_directives: self.strict_directives,
            duplicate_blocks: self.duplicate_blocks,
        }
    }
}
