// context.rs — Everything the reconciler needs to talk to one chain.

use std::sync::Arc;

use polis_chain::{
    DeterministicFactory, MemoryChain, ModuleCreator, ModuleIntrospection, TransactionSubmitter,
};
use polis_core::{Address, ChainRegistry, DomainId, ReaderConfig};

use crate::error::{ReconcileError, ReconcileResult};

/// Handles and settings for a single chain.
///
/// Cheap to clone; contexts for different chains share nothing mutable, so
/// reconciliations against different chains can run concurrently.
#[derive(Clone)]
pub struct ChainContext {
    /// Registry name of this chain.
    pub name: String,
    pub domain: DomainId,
    /// Dispatch endpoint that endpoint-bound modules are created against.
    pub endpoint: Address,
    pub registry: Arc<ChainRegistry>,
    pub introspection: Arc<dyn ModuleIntrospection>,
    pub factory: Arc<dyn DeterministicFactory>,
    pub creator: Arc<dyn ModuleCreator>,
    /// Operator submitter used during deployment. Its sender owns freshly
    /// created modules until ownership is handed off.
    pub submitter: Arc<dyn TransactionSubmitter>,
    pub read_concurrency: usize,
    pub max_depth: usize,
}

impl ChainContext {
    /// Context backed by a MemoryChain, acting as `operator`.
    pub fn in_memory(
        chain: &MemoryChain,
        name: &str,
        registry: Arc<ChainRegistry>,
        operator: Address,
    ) -> ReconcileResult<Self> {
        let metadata = registry
            .metadata(name)
            .ok_or_else(|| ReconcileError::UnknownChain(name.to_string()))?;
        let reader = ReaderConfig::default();
        Ok(Self {
            name: name.to_string(),
            domain: metadata.domain_id,
            endpoint: metadata.endpoint,
            introspection: Arc::new(chain.clone()),
            factory: Arc::new(chain.clone()),
            creator: Arc::new(chain.clone()),
            submitter: Arc::new(chain.submitter(operator)),
            registry,
            read_concurrency: reader.concurrency,
            max_depth: reader.max_depth,
        })
    }

    pub fn with_reader_config(mut self, reader: &ReaderConfig) -> Self {
        self.read_concurrency = reader.concurrency;
        self.max_depth = reader.max_depth;
        self
    }

    /// The identity deployments are performed as.
    pub fn operator(&self) -> Address {
        self.submitter.sender()
    }

    /// Every registered chain as `(name, domain)`, name-ordered.
    pub(crate) fn registered_domains(&self) -> Vec<(String, DomainId)> {
        self.registry
            .chains()
            .map(|c| (c.name.clone(), c.domain_id))
            .collect()
    }
}

impl std::fmt::Debug for ChainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainContext")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("endpoint", &self.endpoint)
            .field("registered_chains", &self.registry.len())
            .field("read_concurrency", &self.read_concurrency)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
