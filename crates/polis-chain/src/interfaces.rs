// interfaces.rs — The chain surfaces the reconciler depends on.
//
// Five seams, each a trait object so a live RPC client, a fork, or the
// in-memory chain can sit behind them:
//
//   ModuleIntrospection   read-only calls, per module type
//   DeterministicFactory  content-addressed static sets (multisig, aggregation)
//   ModuleCreator         one-off deployments of everything else
//   TransactionSubmitter  one mutation → one transaction; owns retry/backoff
//   SignerSet             a submitter per signing address

use std::sync::Arc;

use async_trait::async_trait;
use polis_core::{Address, DomainId};
use serde::{Deserialize, Serialize};

use crate::error::ChainResult;
use crate::mutation::{Mutation, Receipt};

/// Probe argument for the aggregation `children` call. Aggregations may
/// select children per message; the empty probe returns the full set.
pub const EMPTY_PROBE: &[u8] = &[];

/// Read surface of a deployed module.
///
/// Calls that don't apply to the module's type fail with
/// `ChainError::NotSupported`.
#[async_trait]
pub trait ModuleIntrospection: Send + Sync {
    /// Raw on-chain type discriminant (`typeTag()`).
    async fn module_type(&self, module: Address) -> ChainResult<u8>;

    async fn validators(&self, module: Address) -> ChainResult<Vec<Address>>;

    async fn threshold(&self, module: Address) -> ChainResult<u8>;

    async fn children(&self, module: Address, probe: &[u8]) -> ChainResult<Vec<Address>>;

    async fn owner(&self, module: Address) -> ChainResult<Address>;

    /// Submodule for `domain`, or `None` when the domain isn't enrolled.
    async fn submodule(&self, module: Address, domain: DomainId) -> ChainResult<Option<Address>>;

    async fn fallback_submodule(&self, module: Address) -> ChainResult<Address>;

    /// The dispatch endpoint a fallback routing module was bound to.
    async fn bound_endpoint(&self, module: Address) -> ChainResult<Address>;

    async fn paused(&self, module: Address) -> ChainResult<bool>;

    async fn beneficiary(&self, module: Address) -> ChainResult<Address>;

    async fn max_fee(&self, module: Address) -> ChainResult<u128>;

    async fn fee(&self, module: Address) -> ChainResult<u128>;

    async fn trusted_relayer(&self, module: Address) -> ChainResult<Address>;

    /// `(bridge, counterpart domain)` of a native bridge attestation.
    async fn native_bridge(&self, module: Address) -> ChainResult<(Address, DomainId)>;

    /// Destination gas overhead; 0 when the domain has no row.
    async fn overhead(&self, module: Address, domain: DomainId) -> ChainResult<u64>;

    /// Gas oracle for `domain`; the zero address when the domain has no row.
    async fn oracle_address(&self, module: Address, domain: DomainId) -> ChainResult<Address>;

    /// `(exchange rate, gas price)` stored on an oracle for `domain`.
    async fn exchange_rate_and_gas_price(
        &self,
        oracle: Address,
        domain: DomainId,
    ) -> ChainResult<(u128, u128)>;

    async fn has_code(&self, address: Address) -> ChainResult<bool>;
}

/// Which static-set factory a content-addressed deployment goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticSetKind {
    MerkleRootMultisig,
    MessageIdMultisig,
    AggregationPolicy,
    AggregationHook,
}

/// Factory for modules whose address is a pure function of their content.
///
/// `members` must already be sorted; the address is derived from the exact
/// byte sequence.
#[async_trait]
pub trait DeterministicFactory: Send + Sync {
    /// Side-effect-free address query.
    async fn get_address(
        &self,
        kind: StaticSetKind,
        members: &[Address],
        threshold: u8,
    ) -> ChainResult<Address>;

    /// Deploy at the deterministic address. Callers check `has_code` first.
    async fn deploy(
        &self,
        kind: StaticSetKind,
        members: &[Address],
        threshold: u8,
    ) -> ChainResult<Address>;
}

/// Constructor arguments for a non-content-addressed module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "module", rename_all = "snake_case")]
pub enum ModuleInit {
    Routing {
        owner: Address,
    },
    FallbackRouting {
        endpoint: Address,
        owner: Address,
        fallback: Address,
    },
    Pausable {
        owner: Address,
    },
    TrustedRelayer {
        endpoint: Address,
        relayer: Address,
    },
    NativeBridge {
        bridge: Address,
        counterpart: DomainId,
    },
    TestAlwaysPass,
    MerkleTree {
        endpoint: Address,
    },
    ProtocolFee {
        #[serde(with = "polis_core::amount")]
        max_fee: u128,
        #[serde(with = "polis_core::amount")]
        fee: u128,
        beneficiary: Address,
        owner: Address,
    },
    GasMeter {
        owner: Address,
        beneficiary: Address,
    },
    GasOracle {
        owner: Address,
    },
}

/// Deploys one module per call and returns its address.
#[async_trait]
pub trait ModuleCreator: Send + Sync {
    async fn create(&self, init: &ModuleInit) -> ChainResult<Address>;
}

/// Sends mutations as the identity returned by `sender()`.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    fn sender(&self) -> Address;

    async fn submit(&self, mutation: &Mutation) -> ChainResult<Receipt>;
}

/// Hands out submitters that sign as a given address.
///
/// Applying a plan can touch modules with different owners (a gas meter and
/// its oracle), so each write is signed by whoever owns its target.
pub trait SignerSet: Send + Sync {
    /// `None` when no key for `signer` is available.
    fn signer(&self, signer: Address) -> Option<Arc<dyn TransactionSubmitter>>;
}
