// error.rs — Error types for chain reads and writes.

use std::path::PathBuf;

use polis_core::{Address, DomainId};
use thiserror::Error;

/// Errors raised at the chain boundary.
#[derive(Debug, Error)]
pub enum ChainError {
    /// No module is deployed at the address.
    #[error("no code at {address}")]
    NoCode { address: Address },

    /// The module exists but doesn't answer this call (wrong type).
    #[error("{address} does not implement {call}")]
    NotSupported { address: Address, call: &'static str },

    /// A permissioned write was sent by someone other than the owner.
    #[error("{sender} is not the owner of {module}")]
    Unauthorized { module: Address, sender: Address },

    /// No submitter can sign as the owner of a module.
    #[error("no signer for {owner}, owner of {module}")]
    NoSigner { module: Address, owner: Address },

    /// Domain has no entry on a module where one is required.
    #[error("domain {domain} not configured on {module}")]
    DomainNotConfigured { module: Address, domain: DomainId },

    /// The transaction executed and reverted.
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// Transport-level failure talking to the chain.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Reading or writing a chain snapshot file failed.
    #[error("snapshot I/O failed at {path}: {source}")]
    SnapshotIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A chain snapshot is not valid JSON for the expected schema.
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type ChainResult<T> = std::result::Result<T, ChainError>;
