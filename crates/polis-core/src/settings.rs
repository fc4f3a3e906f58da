// settings.rs — polis.toml workspace configuration.
//
// Example:
//
//   [operator]
//   address = "0x00000000000000000000000000000000000000aa"
//
//   [reader]
//   concurrency = 20
//   max_depth = 16
//
//   [[chains]]
//   name = "alpha"
//   domain_id = 1000
//   endpoint = "0x…"
//
// A missing file yields defaults: no chains, the zero operator.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::domain::{ChainMetadata, ChainRegistry};
use crate::error::ConfigError;

/// Top-level polis.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolisConfig {
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    /// Entries of the chain registry.
    #[serde(default)]
    pub chains: Vec<ChainMetadata>,
}

/// The identity that deploys modules and owns them until handoff.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default)]
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Maximum in-flight per-domain reads against one chain.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Recursion bound when walking nested modules.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_concurrency() -> usize {
    20
}

fn default_max_depth() -> usize {
    16
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_depth: default_max_depth(),
        }
    }
}

impl PolisConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config, returning defaults if the file doesn't exist.
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Build the chain registry from `[[chains]]`.
    pub fn registry(&self) -> Result<ChainRegistry, ConfigError> {
        ChainRegistry::from_chains(self.chains.iter().cloned())
    }
}
