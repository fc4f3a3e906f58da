// error.rs — Error types for reading, deploying and reconciling policy trees.

use polis_chain::{ChainError, Mutation};
use polis_core::{Address, ModuleType, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The target config is malformed. Raised before any chain call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The chain name isn't in the registry.
    #[error("chain '{0}' is not in the chain registry")]
    UnknownChain(String),

    /// A module reported a type discriminant this reader can't interpret.
    #[error("unsupported module type {discriminant} at {address}")]
    UnsupportedType { address: Address, discriminant: u8 },

    /// A gas meter's oracles disagree on who owns them.
    #[error("gas meter {meter} has oracles with different owners: {owners:?}")]
    InconsistentOracleOwnership { meter: Address, owners: Vec<Address> },

    /// A creation or configuration write failed while deploying a subtree.
    /// Safe to retry: completed content-addressed leaves are reused.
    #[error("deploying {module_type} failed: {source}")]
    DeploymentFailure {
        module_type: ModuleType,
        #[source]
        source: ChainError,
    },

    /// A planned mutation failed. The first `applied` mutations are committed.
    #[error("mutation {index} ({mutation}) failed after {applied} applied: {source}")]
    MutationFailure {
        index: usize,
        applied: usize,
        mutation: Mutation,
        #[source]
        source: ChainError,
    },

    /// A read call failed at the chain boundary.
    #[error("reading {address} failed: {source}")]
    Read {
        address: Address,
        #[source]
        source: ChainError,
    },

    /// Module nesting is deeper than the configured bound (likely a cycle).
    #[error("module nesting at {address} exceeds max depth {max_depth}")]
    DepthExceeded { address: Address, max_depth: usize },
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
