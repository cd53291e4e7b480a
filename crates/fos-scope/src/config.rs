//! Scope tree configuration

use crate::ScopeError;
use serde::{Deserialize, Serialize};

/// Sweeps a digest may run while still dirty before it gives up
pub const DEFAULT_DIGEST_TTL: usize = 10;

/// Per-tree configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Livelock bound: maximum dirty sweeps in a single digest
    pub digest_ttl: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            digest_ttl: DEFAULT_DIGEST_TTL,
        }
    }
}

impl ScopeConfig {
    pub fn with_digest_ttl(mut self, ttl: usize) -> Self {
        self.digest_ttl = ttl;
        self
    }

    /// Load from a JSON document; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self, ScopeError> {
        let config: ScopeConfig =
            serde_json::from_str(text).map_err(|e| ScopeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScopeError> {
        if self.digest_ttl == 0 {
            return Err(ScopeError::Config("digest_ttl must be at least 1".into()));
        }
        Ok(())
    }
}
