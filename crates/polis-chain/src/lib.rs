//! # polis-chain
//!
//! The boundary between the reconciler and a chain. The reconciler only ever
//! sees the traits in [`interfaces`]; [`MemoryChain`] implements all of them
//! in-process for tests and the offline CLI.

pub mod error;
pub mod interfaces;
pub mod memory;
pub mod mutation;

pub use error::{ChainError, ChainResult};
pub use interfaces::{
    DeterministicFactory, ModuleCreator, ModuleInit, ModuleIntrospection, SignerSet,
    StaticSetKind, TransactionSubmitter, EMPTY_PROBE,
};
pub use memory::{ImpersonatedSubmitter, MemoryChain};
pub use mutation::{Mutation, Receipt};
