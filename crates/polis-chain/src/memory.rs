// memory.rs — In-process chain implementing every chain interface.
//
// MemoryChain keeps modules in a map behind an async mutex and behaves like a
// single-account view of a real chain:
//   - static sets live at sha256(kind, threshold, members); re-deploying the
//     same content is a no-op
//   - other modules get sha256(nonce) addresses, one per creation
//   - permissioned writes require the sender to be the module owner
//   - `fail_next_write` makes the next write (create, deploy or submit) revert
//
// State can be saved to and loaded from a JSON snapshot, which is how the CLI
// keeps a chain between invocations.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use polis_core::{Address, DomainId, ModuleType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::{ChainError, ChainResult};
use crate::interfaces::{
    DeterministicFactory, ModuleCreator, ModuleInit, ModuleIntrospection, SignerSet,
    StaticSetKind, TransactionSubmitter,
};
use crate::mutation::{Mutation, Receipt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct GasRow {
    overhead: u64,
    oracle: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct GasData {
    #[serde(with = "polis_core::amount")]
    exchange_rate: u128,
    #[serde(with = "polis_core::amount")]
    gas_price: u128,
}

/// Per-type storage of a deployed module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Body {
    Multisig {
        validators: Vec<Address>,
        threshold: u8,
    },
    Aggregation {
        children: Vec<Address>,
        threshold: u8,
    },
    Routing {
        domains: BTreeMap<DomainId, Address>,
        fallback: Option<Address>,
        endpoint: Option<Address>,
    },
    Pausable {
        paused: bool,
    },
    TrustedRelayer {
        relayer: Address,
        endpoint: Address,
    },
    NativeBridge {
        bridge: Address,
        counterpart: DomainId,
    },
    MerkleTree {
        endpoint: Address,
    },
    ProtocolFee {
        #[serde(with = "polis_core::amount")]
        max_fee: u128,
        #[serde(with = "polis_core::amount")]
        fee: u128,
        beneficiary: Address,
    },
    GasMeter {
        beneficiary: Address,
        rows: BTreeMap<DomainId, GasRow>,
    },
    GasOracle {
        data: BTreeMap<DomainId, GasData>,
    },
    /// No readable state beyond the type tag.
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Module {
    type_tag: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner: Option<Address>,
    body: Body,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    modules: BTreeMap<Address, Module>,
    nonce: u64,
    block: u64,
    creations: u64,
    #[serde(skip)]
    fail_next_write: Option<String>,
}

impl State {
    fn take_injected_failure(&mut self) -> ChainResult<()> {
        match self.fail_next_write.take() {
            Some(reason) => Err(ChainError::Reverted(reason)),
            None => Ok(()),
        }
    }

    fn next_address(&mut self) -> Address {
        let mut hasher = Sha256::new();
        hasher.update(b"polis/create");
        hasher.update(self.nonce.to_be_bytes());
        self.nonce += 1;
        Address::from_digest(&hasher.finalize())
    }

    fn insert_created(&mut self, address: Address, module: Module) {
        self.modules.insert(address, module);
        self.creations += 1;
        self.block += 1;
    }
}

fn static_set_address(kind: StaticSetKind, members: &[Address], threshold: u8) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"polis/static-set");
    hasher.update([kind as u8, threshold]);
    for member in members {
        hasher.update(member.as_bytes());
    }
    Address::from_digest(&hasher.finalize())
}

/// An in-memory chain. Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryChain {
    inner: Arc<Mutex<State>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A submitter that signs every write as `sender`.
    pub fn submitter(&self, sender: Address) -> ImpersonatedSubmitter {
        ImpersonatedSubmitter {
            chain: self.clone(),
            sender,
        }
    }

    /// Number of creation transactions executed so far.
    pub async fn creations(&self) -> u64 {
        self.inner.lock().await.creations
    }

    pub async fn module_count(&self) -> usize {
        self.inner.lock().await.modules.len()
    }

    /// Make the next write revert with `reason`. One-shot.
    pub async fn fail_next_write(&self, reason: impl Into<String>) {
        self.inner.lock().await.fail_next_write = Some(reason.into());
    }

    /// Install a module with an arbitrary type discriminant and no state.
    pub async fn install_raw(&self, type_tag: u8) -> Address {
        let mut state = self.inner.lock().await;
        let address = state.next_address();
        state.insert_created(
            address,
            Module {
                type_tag,
                owner: None,
                body: Body::Opaque,
            },
        );
        address
    }

    /// Load a snapshot written by `save`.
    pub fn load(path: &Path) -> ChainResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ChainError::SnapshotIo {
            path: path.to_path_buf(),
            source,
        })?;
        let state: State = serde_json::from_str(&content)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
        })
    }

    /// Load a snapshot, or start an empty chain if the file doesn't exist.
    pub fn load_or_new(path: &Path) -> ChainResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    pub async fn save(&self, path: &Path) -> ChainResult<()> {
        let state = self.inner.lock().await;
        let json = serde_json::to_string_pretty(&*state)?;
        std::fs::write(path, json).map_err(|source| ChainError::SnapshotIo {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn read<T, F>(&self, address: Address, call: &'static str, f: F) -> ChainResult<T>
    where
        F: FnOnce(&Module) -> Option<T> + Send,
        T: Send,
    {
        let state = self.inner.lock().await;
        let module = state
            .modules
            .get(&address)
            .ok_or(ChainError::NoCode { address })?;
        f(module).ok_or(ChainError::NotSupported { address, call })
    }

    async fn write(&self, sender: Address, mutation: &Mutation) -> ChainResult<Receipt> {
        let mut state = self.inner.lock().await;
        state.take_injected_failure()?;

        let target = mutation.target();
        let module = state
            .modules
            .get_mut(&target)
            .ok_or(ChainError::NoCode { address: target })?;
        if module.owner != Some(sender) {
            return Err(ChainError::Unauthorized {
                module: target,
                sender,
            });
        }

        match (mutation, &mut module.body) {
            (
                Mutation::SetSubmodule {
                    domain, submodule, ..
                },
                Body::Routing { domains, .. },
            ) => {
                domains.insert(*domain, *submodule);
            }
            (Mutation::RemoveDomain { domain, .. }, Body::Routing { domains, .. }) => {
                if domains.remove(domain).is_none() {
                    return Err(ChainError::DomainNotConfigured {
                        module: target,
                        domain: *domain,
                    });
                }
            }
            (Mutation::SetPaused { paused, .. }, Body::Pausable { paused: current }) => {
                *current = *paused;
            }
            (Mutation::TransferOwnership { new_owner, .. }, _) => {
                module.owner = Some(*new_owner);
            }
            (
                Mutation::SetOverheadAndOracle {
                    domain,
                    overhead,
                    oracle,
                    ..
                },
                Body::GasMeter { rows, .. },
            ) => {
                if oracle.is_zero() {
                    rows.remove(domain);
                } else {
                    rows.insert(
                        *domain,
                        GasRow {
                            overhead: *overhead,
                            oracle: *oracle,
                        },
                    );
                }
            }
            (
                Mutation::SetRemoteGasData {
                    domain,
                    exchange_rate,
                    gas_price,
                    ..
                },
                Body::GasOracle { data },
            ) => {
                data.insert(
                    *domain,
                    GasData {
                        exchange_rate: *exchange_rate,
                        gas_price: *gas_price,
                    },
                );
            }
            (Mutation::SetFee { fee, .. }, Body::ProtocolFee { max_fee, fee: current, .. }) => {
                if *fee > *max_fee {
                    return Err(ChainError::Reverted(format!(
                        "fee {} exceeds max fee {}",
                        fee, max_fee
                    )));
                }
                *current = *fee;
            }
            (
                Mutation::SetBeneficiary { beneficiary, .. },
                Body::ProtocolFee {
                    beneficiary: current,
                    ..
                }
                | Body::GasMeter {
                    beneficiary: current,
                    ..
                },
            ) => {
                *current = *beneficiary;
            }
            (other, _) => {
                return Err(ChainError::NotSupported {
                    address: target,
                    call: other.name(),
                })
            }
        }

        state.block += 1;
        let tx_hash = format!(
            "0x{:x}",
            Sha256::digest(format!("{}:{}:{}", state.block, sender, mutation).as_bytes())
        );
        tracing::debug!(%mutation, block = state.block, "applied write");
        Ok(Receipt {
            tx_hash,
            block: state.block,
        })
    }
}

#[async_trait]
impl ModuleIntrospection for MemoryChain {
    async fn module_type(&self, module: Address) -> ChainResult<u8> {
        self.read(module, "typeTag", |m| Some(m.type_tag)).await
    }

    async fn validators(&self, module: Address) -> ChainResult<Vec<Address>> {
        self.read(module, "validators", |m| match &m.body {
            Body::Multisig { validators, .. } => Some(validators.clone()),
            _ => None,
        })
        .await
    }

    async fn threshold(&self, module: Address) -> ChainResult<u8> {
        self.read(module, "threshold", |m| match &m.body {
            Body::Multisig { threshold, .. } | Body::Aggregation { threshold, .. } => {
                Some(*threshold)
            }
            _ => None,
        })
        .await
    }

    async fn children(&self, module: Address, _probe: &[u8]) -> ChainResult<Vec<Address>> {
        self.read(module, "children", |m| match &m.body {
            Body::Aggregation { children, .. } => Some(children.clone()),
            _ => None,
        })
        .await
    }

    async fn owner(&self, module: Address) -> ChainResult<Address> {
        self.read(module, "owner", |m| m.owner).await
    }

    async fn submodule(&self, module: Address, domain: DomainId) -> ChainResult<Option<Address>> {
        self.read(module, "submodule", |m| match &m.body {
            Body::Routing { domains, .. } => Some(domains.get(&domain).copied()),
            _ => None,
        })
        .await
    }

    async fn fallback_submodule(&self, module: Address) -> ChainResult<Address> {
        self.read(module, "fallbackSubmodule", |m| match &m.body {
            Body::Routing { fallback, .. } => *fallback,
            _ => None,
        })
        .await
    }

    async fn bound_endpoint(&self, module: Address) -> ChainResult<Address> {
        self.read(module, "boundEndpoint", |m| match &m.body {
            Body::Routing { endpoint, .. } => *endpoint,
            Body::TrustedRelayer { endpoint, .. } | Body::MerkleTree { endpoint } => {
                Some(*endpoint)
            }
            _ => None,
        })
        .await
    }

    async fn paused(&self, module: Address) -> ChainResult<bool> {
        self.read(module, "paused", |m| match &m.body {
            Body::Pausable { paused } => Some(*paused),
            _ => None,
        })
        .await
    }

    async fn beneficiary(&self, module: Address) -> ChainResult<Address> {
        self.read(module, "beneficiary", |m| match &m.body {
            Body::ProtocolFee { beneficiary, .. } | Body::GasMeter { beneficiary, .. } => {
                Some(*beneficiary)
            }
            _ => None,
        })
        .await
    }

    async fn max_fee(&self, module: Address) -> ChainResult<u128> {
        self.read(module, "maxFee", |m| match &m.body {
            Body::ProtocolFee { max_fee, .. } => Some(*max_fee),
            _ => None,
        })
        .await
    }

    async fn fee(&self, module: Address) -> ChainResult<u128> {
        self.read(module, "fee", |m| match &m.body {
            Body::ProtocolFee { fee, .. } => Some(*fee),
            _ => None,
        })
        .await
    }

    async fn trusted_relayer(&self, module: Address) -> ChainResult<Address> {
        self.read(module, "trustedRelayer", |m| match &m.body {
            Body::TrustedRelayer { relayer, .. } => Some(*relayer),
            _ => None,
        })
        .await
    }

    async fn native_bridge(&self, module: Address) -> ChainResult<(Address, DomainId)> {
        self.read(module, "nativeBridge", |m| match &m.body {
            Body::NativeBridge {
                bridge,
                counterpart,
            } => Some((*bridge, *counterpart)),
            _ => None,
        })
        .await
    }

    async fn overhead(&self, module: Address, domain: DomainId) -> ChainResult<u64> {
        self.read(module, "destinationGasOverhead", |m| match &m.body {
            Body::GasMeter { rows, .. } => Some(rows.get(&domain).map(|r| r.overhead).unwrap_or(0)),
            _ => None,
        })
        .await
    }

    async fn oracle_address(&self, module: Address, domain: DomainId) -> ChainResult<Address> {
        self.read(module, "gasOracle", |m| match &m.body {
            Body::GasMeter { rows, .. } => Some(
                rows.get(&domain)
                    .map(|r| r.oracle)
                    .unwrap_or(Address::ZERO),
            ),
            _ => None,
        })
        .await
    }

    async fn exchange_rate_and_gas_price(
        &self,
        oracle: Address,
        domain: DomainId,
    ) -> ChainResult<(u128, u128)> {
        self.read(oracle, "getExchangeRateAndGasPrice", |m| match &m.body {
            Body::GasOracle { data } => Some(
                data.get(&domain)
                    .map(|d| (d.exchange_rate, d.gas_price))
                    .unwrap_or((0, 0)),
            ),
            _ => None,
        })
        .await
    }

    async fn has_code(&self, address: Address) -> ChainResult<bool> {
        Ok(self.inner.lock().await.modules.contains_key(&address))
    }
}

#[async_trait]
impl DeterministicFactory for MemoryChain {
    async fn get_address(
        &self,
        kind: StaticSetKind,
        members: &[Address],
        threshold: u8,
    ) -> ChainResult<Address> {
        Ok(static_set_address(kind, members, threshold))
    }

    async fn deploy(
        &self,
        kind: StaticSetKind,
        members: &[Address],
        threshold: u8,
    ) -> ChainResult<Address> {
        let address = static_set_address(kind, members, threshold);
        let mut state = self.inner.lock().await;
        state.take_injected_failure()?;
        if state.modules.contains_key(&address) {
            return Ok(address);
        }

        let (type_tag, body) = match kind {
            StaticSetKind::MerkleRootMultisig | StaticSetKind::MessageIdMultisig => {
                let ty = if kind == StaticSetKind::MerkleRootMultisig {
                    ModuleType::MerkleRootMultisig
                } else {
                    ModuleType::MessageIdMultisig
                };
                (
                    ty.discriminant(),
                    Body::Multisig {
                        validators: members.to_vec(),
                        threshold,
                    },
                )
            }
            StaticSetKind::AggregationPolicy | StaticSetKind::AggregationHook => (
                ModuleType::Aggregation.discriminant(),
                Body::Aggregation {
                    children: members.to_vec(),
                    threshold,
                },
            ),
        };
        state.insert_created(
            address,
            Module {
                type_tag,
                owner: None,
                body,
            },
        );
        Ok(address)
    }
}

#[async_trait]
impl ModuleCreator for MemoryChain {
    async fn create(&self, init: &ModuleInit) -> ChainResult<Address> {
        let mut state = self.inner.lock().await;
        state.take_injected_failure()?;

        let (ty, owner, body) = match init {
            ModuleInit::Routing { owner } => (
                ModuleType::Routing,
                Some(*owner),
                Body::Routing {
                    domains: BTreeMap::new(),
                    fallback: None,
                    endpoint: None,
                },
            ),
            ModuleInit::FallbackRouting {
                endpoint,
                owner,
                fallback,
            } => (
                ModuleType::FallbackRouting,
                Some(*owner),
                Body::Routing {
                    domains: BTreeMap::new(),
                    fallback: Some(*fallback),
                    endpoint: Some(*endpoint),
                },
            ),
            ModuleInit::Pausable { owner } => (
                ModuleType::Pausable,
                Some(*owner),
                Body::Pausable { paused: false },
            ),
            ModuleInit::TrustedRelayer { endpoint, relayer } => (
                ModuleType::TrustedRelayer,
                None,
                Body::TrustedRelayer {
                    relayer: *relayer,
                    endpoint: *endpoint,
                },
            ),
            ModuleInit::NativeBridge {
                bridge,
                counterpart,
            } => (
                ModuleType::NativeBridgeAttestation,
                None,
                Body::NativeBridge {
                    bridge: *bridge,
                    counterpart: *counterpart,
                },
            ),
            ModuleInit::TestAlwaysPass => (ModuleType::TestAlwaysPass, None, Body::Opaque),
            ModuleInit::MerkleTree { endpoint } => (
                ModuleType::MerkleTree,
                None,
                Body::MerkleTree {
                    endpoint: *endpoint,
                },
            ),
            ModuleInit::ProtocolFee {
                max_fee,
                fee,
                beneficiary,
                owner,
            } => {
                if fee > max_fee {
                    return Err(ChainError::Reverted(format!(
                        "fee {} exceeds max fee {}",
                        fee, max_fee
                    )));
                }
                (
                    ModuleType::ProtocolFee,
                    Some(*owner),
                    Body::ProtocolFee {
                        max_fee: *max_fee,
                        fee: *fee,
                        beneficiary: *beneficiary,
                    },
                )
            }
            ModuleInit::GasMeter { owner, beneficiary } => (
                ModuleType::GasMeter,
                Some(*owner),
                Body::GasMeter {
                    beneficiary: *beneficiary,
                    rows: BTreeMap::new(),
                },
            ),
            ModuleInit::GasOracle { owner } => (
                ModuleType::GasOracle,
                Some(*owner),
                Body::GasOracle {
                    data: BTreeMap::new(),
                },
            ),
        };

        let address = state.next_address();
        state.insert_created(
            address,
            Module {
                type_tag: ty.discriminant(),
                owner,
                body,
            },
        );
        tracing::debug!(module_type = %ty, %address, "created module");
        Ok(address)
    }
}

/// Every address can be impersonated on an in-memory chain.
impl SignerSet for MemoryChain {
    fn signer(&self, signer: Address) -> Option<Arc<dyn TransactionSubmitter>> {
        Some(Arc::new(self.submitter(signer)))
    }
}

/// Submits writes to a MemoryChain as a fixed sender.
#[derive(Debug, Clone)]
pub struct ImpersonatedSubmitter {
    chain: MemoryChain,
    sender: Address,
}

#[async_trait]
impl TransactionSubmitter for ImpersonatedSubmitter {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn submit(&self, mutation: &Mutation) -> ChainResult<Receipt> {
        self.chain.write(self.sender, mutation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    #[tokio::test]
    async fn static_set_deploy_is_content_addressed() {
        let chain = MemoryChain::new();
        let members = [addr(1), addr(2)];
        let predicted = chain
            .get_address(StaticSetKind::MessageIdMultisig, &members, 2)
            .await
            .unwrap();
        assert!(!chain.has_code(predicted).await.unwrap());

        let first = chain
            .deploy(StaticSetKind::MessageIdMultisig, &members, 2)
            .await
            .unwrap();
        let second = chain
            .deploy(StaticSetKind::MessageIdMultisig, &members, 2)
            .await
            .unwrap();
        assert_eq!(first, predicted);
        assert_eq!(second, predicted);
        assert_eq!(chain.creations().await, 1);

        let other = chain
            .get_address(StaticSetKind::MerkleRootMultisig, &members, 2)
            .await
            .unwrap();
        assert_ne!(other, predicted);
    }

    #[tokio::test]
    async fn writes_require_owner() {
        let chain = MemoryChain::new();
        let owner = addr(0xaa);
        let module = chain.create(&ModuleInit::Pausable { owner }).await.unwrap();

        let pause = Mutation::SetPaused {
            module,
            paused: true,
        };
        let err = chain.submitter(addr(0xbb)).submit(&pause).await.unwrap_err();
        assert!(matches!(err, ChainError::Unauthorized { .. }));

        chain.submitter(owner).submit(&pause).await.unwrap();
        assert!(chain.paused(module).await.unwrap());
    }

    #[tokio::test]
    async fn injected_failure_is_one_shot() {
        let chain = MemoryChain::new();
        chain.fail_next_write("out of gas").await;
        let err = chain.create(&ModuleInit::TestAlwaysPass).await.unwrap_err();
        assert!(err.to_string().contains("out of gas"));
        assert!(chain.create(&ModuleInit::TestAlwaysPass).await.is_ok());
        assert_eq!(chain.creations().await, 1);
    }

    #[tokio::test]
    async fn zero_oracle_clears_gas_row() {
        let chain = MemoryChain::new();
        let owner = addr(0xaa);
        let meter = chain
            .create(&ModuleInit::GasMeter {
                owner,
                beneficiary: owner,
            })
            .await
            .unwrap();
        let submitter = chain.submitter(owner);
        submitter
            .submit(&Mutation::SetOverheadAndOracle {
                module: meter,
                domain: DomainId(7),
                overhead: 50_000,
                oracle: addr(3),
            })
            .await
            .unwrap();
        assert_eq!(chain.overhead(meter, DomainId(7)).await.unwrap(), 50_000);

        submitter
            .submit(&Mutation::SetOverheadAndOracle {
                module: meter,
                domain: DomainId(7),
                overhead: 0,
                oracle: Address::ZERO,
            })
            .await
            .unwrap();
        assert!(chain.oracle_address(meter, DomainId(7)).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn wrong_type_call_not_supported() {
        let chain = MemoryChain::new();
        let module = chain.create(&ModuleInit::TestAlwaysPass).await.unwrap();
        let err = chain.validators(module).await.unwrap_err();
        assert!(matches!(err, ChainError::NotSupported { call: "validators", .. }));
        let err = chain.owner(addr(0x42)).await.unwrap_err();
        assert!(matches!(err, ChainError::NoCode { .. }));
    }

    #[tokio::test]
    async fn snapshot_survives_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.json");

        let chain = MemoryChain::new();
        let owner = addr(0xaa);
        let routing = chain.create(&ModuleInit::Routing { owner }).await.unwrap();
        chain
            .submitter(owner)
            .submit(&Mutation::SetSubmodule {
                module: routing,
                domain: DomainId(1000),
                submodule: addr(5),
            })
            .await
            .unwrap();
        chain.save(&path).await.unwrap();

        let restored = MemoryChain::load(&path).unwrap();
        assert_eq!(
            restored.submodule(routing, DomainId(1000)).await.unwrap(),
            Some(addr(5))
        );
        assert_eq!(restored.owner(routing).await.unwrap(), owner);
        // Nonce survives, so new modules don't collide with old ones.
        let next = restored.create(&ModuleInit::TestAlwaysPass).await.unwrap();
        assert_ne!(next, routing);
    }
}
