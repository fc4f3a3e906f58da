// domain.rs — Domain identifiers and the chain registry.
//
// Policy documents name remote chains ("alpha", "beta"); on-chain storage is
// keyed by numeric domain ids. The ChainRegistry maps between the two. A name
// the registry doesn't know is never fatal: callers drop it with a warning.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::ConfigError;

/// Numeric identifier of a connected chain endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(pub u32);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One registry entry, as declared under `[[chains]]` in polis.toml.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMetadata {
    pub name: String,
    pub domain_id: DomainId,
    /// Dispatch endpoint that fallback routing modules and relayer checks
    /// on this chain bind to.
    #[serde(default)]
    pub endpoint: Address,
}

/// Bidirectional name ↔ domain id lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainRegistry {
    by_name: BTreeMap<String, ChainMetadata>,
    by_id: BTreeMap<DomainId, String>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, rejecting duplicate names or ids.
    pub fn from_chains(
        chains: impl IntoIterator<Item = ChainMetadata>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for chain in chains {
            registry.register(chain)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, chain: ChainMetadata) -> Result<(), ConfigError> {
        if self.by_name.contains_key(&chain.name) {
            return Err(ConfigError::RegistryConflict(format!(
                "chain name '{}' registered twice",
                chain.name
            )));
        }
        if let Some(existing) = self.by_id.get(&chain.domain_id) {
            return Err(ConfigError::RegistryConflict(format!(
                "domain {} claimed by both '{}' and '{}'",
                chain.domain_id, existing, chain.name
            )));
        }
        self.by_id.insert(chain.domain_id, chain.name.clone());
        self.by_name.insert(chain.name.clone(), chain);
        Ok(())
    }

    /// Resolve a chain name. `None` is the soft "domain not registered" case.
    pub fn try_domain_id(&self, name: &str) -> Option<DomainId> {
        self.by_name.get(name).map(|c| c.domain_id)
    }

    pub fn chain_name(&self, domain: DomainId) -> Option<&str> {
        self.by_id.get(&domain).map(String::as_str)
    }

    pub fn metadata(&self, name: &str) -> Option<&ChainMetadata> {
        self.by_name.get(name)
    }

    /// All registered chains, ordered by name.
    pub fn chains(&self) -> impl Iterator<Item = &ChainMetadata> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(name: &str, id: u32) -> ChainMetadata {
        ChainMetadata {
            name: name.to_string(),
            domain_id: DomainId(id),
            endpoint: Address::ZERO,
        }
    }

    #[test]
    fn resolves_both_directions() {
        let registry =
            ChainRegistry::from_chains(vec![chain("alpha", 1000), chain("beta", 2000)]).unwrap();
        assert_eq!(registry.try_domain_id("alpha"), Some(DomainId(1000)));
        assert_eq!(registry.chain_name(DomainId(2000)), Some("beta"));
        assert_eq!(registry.try_domain_id("ghostchain"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn rejects_duplicate_name() {
        let err = ChainRegistry::from_chains(vec![chain("alpha", 1), chain("alpha", 2)]).unwrap_err();
        assert!(matches!(err, ConfigError::RegistryConflict(_)));
    }

    #[test]
    fn rejects_duplicate_domain_id() {
        let err = ChainRegistry::from_chains(vec![chain("alpha", 1), chain("beta", 1)]).unwrap_err();
        assert!(err.to_string().contains("domain 1"));
    }

    #[test]
    fn chains_are_name_ordered() {
        let registry =
            ChainRegistry::from_chains(vec![chain("zeta", 3), chain("alpha", 9)]).unwrap();
        let names: Vec<_> = registry.chains().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
