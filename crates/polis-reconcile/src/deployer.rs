// deployer.rs — Materialize a PolicyConfig tree on-chain.
//
// Deployment is depth-first and strictly sequential: children exist before
// the parent that references them, and every write goes through the single
// operator submitter in order.
//
// Multisig and aggregation modules are content-addressed. The factory's
// address query is checked for code first, so re-running a deployment that
// failed half-way reuses every leaf that already made it on-chain.
//
// Ownable modules are created owned by the operator, configured, and only
// then handed to their configured owner.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::{BoxFuture, FutureExt};
use polis_chain::{ChainError, ModuleInit, Mutation, StaticSetKind};
use polis_core::{
    normalize, validate, Address, DomainId, Family, GasMeterConfig, GasParams, ModuleType,
    MultisigKind, Normalized, PolicyConfig,
};
use serde::{Deserialize, Serialize};

use crate::context::ChainContext;
use crate::error::{ReconcileError, ReconcileResult};

/// A config subtree and the address it lives at on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedPolicyModule {
    pub chain: String,
    pub address: Address,
    pub config: PolicyConfig,
}

pub struct PolicyDeployer<'a> {
    ctx: &'a ChainContext,
    family: Family,
    /// Creation transactions issued so far.
    created: AtomicUsize,
}

fn deploy_failure(module_type: ModuleType) -> impl FnOnce(ChainError) -> ReconcileError {
    move |source| ReconcileError::DeploymentFailure {
        module_type,
        source,
    }
}

impl<'a> PolicyDeployer<'a> {
    pub fn new(ctx: &'a ChainContext, family: Family) -> Self {
        Self {
            ctx,
            family,
            created: AtomicUsize::new(0),
        }
    }

    /// Validate, normalize against the registry, and deploy `config`.
    ///
    /// Unregistered domains are dropped with a warning; the returned config
    /// is the normalized tree that was actually deployed.
    pub async fn deploy(&self, config: &PolicyConfig) -> ReconcileResult<DeployedPolicyModule> {
        validate(config, self.family)?;
        let Normalized { config, .. } = normalize(config, &self.ctx.registry);
        let address = self.deploy_node(&config).await?;
        if let Some(ty) = config.module_type() {
            tracing::info!(chain = %self.ctx.name, module_type = %ty, %address, "deployed module tree");
        }
        Ok(DeployedPolicyModule {
            chain: self.ctx.name.clone(),
            address,
            config,
        })
    }

    /// Deploy a normalized subtree; the flag is true when nothing new was
    /// created because every module already existed.
    pub(crate) async fn deploy_tracked(
        &self,
        config: &PolicyConfig,
    ) -> ReconcileResult<(Address, bool)> {
        let before = self.created.load(Ordering::SeqCst);
        let address = self.deploy_node(config).await?;
        Ok((address, self.created.load(Ordering::SeqCst) == before))
    }

    /// Deploy an already normalized subtree and return its address.
    pub(crate) fn deploy_node<'b>(
        &'b self,
        config: &'b PolicyConfig,
    ) -> BoxFuture<'b, ReconcileResult<Address>> {
        async move {
            match config {
                PolicyConfig::AddressRef(address) => Ok(*address),
                PolicyConfig::Multisig(m) => {
                    let kind = match m.kind {
                        MultisigKind::RootBased => StaticSetKind::MerkleRootMultisig,
                        MultisigKind::MessageIdBased => StaticSetKind::MessageIdMultisig,
                    };
                    let mut validators = m.validators.clone();
                    validators.sort();
                    self.deploy_static_set(m.kind.module_type(), kind, &validators, m.threshold)
                        .await
                }
                PolicyConfig::Aggregation(a) => {
                    let mut children = Vec::with_capacity(a.children.len());
                    for child in &a.children {
                        children.push(self.deploy_node(child).await?);
                    }
                    children.sort();
                    let kind = match self.family {
                        Family::SecurityPolicy => StaticSetKind::AggregationPolicy,
                        Family::DispatchHook => StaticSetKind::AggregationHook,
                    };
                    self.deploy_static_set(ModuleType::Aggregation, kind, &children, a.threshold)
                        .await
                }
                PolicyConfig::Routing(r) => {
                    let ty = config.module_type().unwrap_or(ModuleType::Routing);
                    let mut routes: Vec<(DomainId, Address)> = Vec::new();
                    for (name, sub) in &r.domains {
                        let Some(domain) = self.ctx.registry.try_domain_id(name) else {
                            tracing::warn!(domain = %name, "domain not in chain registry, skipping");
                            continue;
                        };
                        routes.push((domain, self.deploy_node(sub).await?));
                    }

                    let operator = self.ctx.operator();
                    let init = match &r.fallback {
                        Some(fallback) => ModuleInit::FallbackRouting {
                            endpoint: self.ctx.endpoint,
                            owner: operator,
                            fallback: self.deploy_node(fallback).await?,
                        },
                        None => ModuleInit::Routing { owner: operator },
                    };
                    let module = self.create(ty, &init).await?;
                    for (domain, submodule) in routes {
                        self.write(
                            ty,
                            Mutation::SetSubmodule {
                                module,
                                domain,
                                submodule,
                            },
                        )
                        .await?;
                    }
                    self.hand_off(ty, module, r.owner).await?;
                    Ok(module)
                }
                PolicyConfig::Pausable(p) => {
                    let ty = ModuleType::Pausable;
                    let module = self
                        .create(ty, &ModuleInit::Pausable {
                            owner: self.ctx.operator(),
                        })
                        .await?;
                    if p.paused {
                        self.write(ty, Mutation::SetPaused { module, paused: true })
                            .await?;
                    }
                    self.hand_off(ty, module, p.owner).await?;
                    Ok(module)
                }
                PolicyConfig::TrustedRelayer(t) => {
                    self.create(
                        ModuleType::TrustedRelayer,
                        &ModuleInit::TrustedRelayer {
                            endpoint: self.ctx.endpoint,
                            relayer: t.relayer,
                        },
                    )
                    .await
                }
                PolicyConfig::NativeBridgeAttestation(n) => {
                    self.create(
                        ModuleType::NativeBridgeAttestation,
                        &ModuleInit::NativeBridge {
                            bridge: n.bridge,
                            counterpart: n.counterpart_domain,
                        },
                    )
                    .await
                }
                PolicyConfig::TestAlwaysPass => {
                    self.create(ModuleType::TestAlwaysPass, &ModuleInit::TestAlwaysPass)
                        .await
                }
                PolicyConfig::MerkleTree => {
                    self.create(
                        ModuleType::MerkleTree,
                        &ModuleInit::MerkleTree {
                            endpoint: self.ctx.endpoint,
                        },
                    )
                    .await
                }
                PolicyConfig::ProtocolFee(p) => {
                    self.create(
                        ModuleType::ProtocolFee,
                        &ModuleInit::ProtocolFee {
                            max_fee: p.max_fee,
                            fee: p.fee,
                            beneficiary: p.beneficiary,
                            owner: p.owner,
                        },
                    )
                    .await
                }
                PolicyConfig::GasMeter(g) => self.deploy_gas_meter(g).await,
            }
        }
        .boxed()
    }

    /// Content-addressed create-if-absent.
    async fn deploy_static_set(
        &self,
        ty: ModuleType,
        kind: StaticSetKind,
        members: &[Address],
        threshold: u8,
    ) -> ReconcileResult<Address> {
        let address = self
            .ctx
            .factory
            .get_address(kind, members, threshold)
            .await
            .map_err(deploy_failure(ty))?;
        let exists = self
            .ctx
            .introspection
            .has_code(address)
            .await
            .map_err(deploy_failure(ty))?;
        if exists {
            tracing::debug!(module_type = %ty, %address, members = members.len(), "recovered existing static set");
            return Ok(address);
        }
        let deployed = self
            .ctx
            .factory
            .deploy(kind, members, threshold)
            .await
            .map_err(deploy_failure(ty))?;
        self.created.fetch_add(1, Ordering::SeqCst);
        tracing::info!(module_type = %ty, address = %deployed, threshold, members = members.len(), "deployed static set");
        Ok(deployed)
    }

    async fn deploy_gas_meter(&self, g: &GasMeterConfig) -> ReconcileResult<Address> {
        let ty = ModuleType::GasMeter;
        let rows = self.resolve_gas_rows(g);
        let oracle = if rows.is_empty() {
            Address::ZERO
        } else {
            self.deploy_gas_oracle(&rows, g.oracle_owner).await?
        };

        let module = self
            .create(
                ty,
                &ModuleInit::GasMeter {
                    owner: self.ctx.operator(),
                    beneficiary: g.beneficiary,
                },
            )
            .await?;
        for (domain, params) in &rows {
            self.write(
                ty,
                Mutation::SetOverheadAndOracle {
                    module,
                    domain: *domain,
                    overhead: params.overhead_gas,
                    oracle,
                },
            )
            .await?;
        }
        self.hand_off(ty, module, g.owner).await?;
        Ok(module)
    }

    /// Target gas rows keyed by domain id. Unregistered names are skipped.
    pub(crate) fn resolve_gas_rows(&self, g: &GasMeterConfig) -> Vec<(DomainId, GasParams)> {
        g.remotes
            .iter()
            .filter_map(|(name, params)| {
                self.ctx
                    .registry
                    .try_domain_id(name)
                    .map(|domain| (domain, *params))
            })
            .collect()
    }

    /// Deploy a gas oracle pre-populated with `rows`, then hand it to
    /// `oracle_owner`.
    pub(crate) async fn deploy_gas_oracle(
        &self,
        rows: &[(DomainId, GasParams)],
        oracle_owner: Address,
    ) -> ReconcileResult<Address> {
        let ty = ModuleType::GasOracle;
        let oracle = self
            .create(
                ty,
                &ModuleInit::GasOracle {
                    owner: self.ctx.operator(),
                },
            )
            .await?;
        for (domain, params) in rows {
            self.write(
                ty,
                Mutation::SetRemoteGasData {
                    oracle,
                    domain: *domain,
                    exchange_rate: params.exchange_rate,
                    gas_price: params.gas_price,
                },
            )
            .await?;
        }
        self.hand_off(ty, oracle, oracle_owner).await?;
        Ok(oracle)
    }

    async fn create(&self, ty: ModuleType, init: &ModuleInit) -> ReconcileResult<Address> {
        let address = self
            .ctx
            .creator
            .create(init)
            .await
            .map_err(deploy_failure(ty))?;
        self.created.fetch_add(1, Ordering::SeqCst);
        tracing::info!(chain = %self.ctx.name, module_type = %ty, %address, "created module");
        Ok(address)
    }

    async fn write(&self, ty: ModuleType, mutation: Mutation) -> ReconcileResult<()> {
        self.ctx
            .submitter
            .submit(&mutation)
            .await
            .map_err(deploy_failure(ty))?;
        Ok(())
    }

    /// Transfer ownership from the operator to `owner`. Always the last write
    /// against a freshly created module.
    async fn hand_off(&self, ty: ModuleType, module: Address, owner: Address) -> ReconcileResult<()> {
        if owner == self.ctx.operator() {
            return Ok(());
        }
        self.write(
            ty,
            Mutation::TransferOwnership {
                module,
                new_owner: owner,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use polis_chain::{MemoryChain, ModuleIntrospection};
    use polis_core::{
        AggregationConfig, ChainMetadata, ChainRegistry, MultisigConfig, PausableConfig,
        RoutingConfig,
    };

    const OPERATOR: Address = Address::from_bytes([0xaa; 20]);

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn context(chain: &MemoryChain) -> ChainContext {
        let registry = ChainRegistry::from_chains(vec![
            ChainMetadata {
                name: "home".into(),
                domain_id: DomainId(1),
                endpoint: addr(0xe1),
            },
            ChainMetadata {
                name: "alpha".into(),
                domain_id: DomainId(1000),
                endpoint: Address::ZERO,
            },
        ])
        .unwrap();
        ChainContext::in_memory(chain, "home", Arc::new(registry), OPERATOR).unwrap()
    }

    fn multisig(validators: &[u8], threshold: u8) -> PolicyConfig {
        PolicyConfig::Multisig(MultisigConfig {
            kind: MultisigKind::RootBased,
            validators: validators.iter().map(|n| addr(*n)).collect(),
            threshold,
        })
    }

    #[tokio::test]
    async fn routing_is_handed_off_after_configuration() {
        let chain = MemoryChain::new();
        let ctx = context(&chain);
        let owner = addr(0x0b);
        let mut domains = BTreeMap::new();
        domains.insert("alpha".to_string(), multisig(&[1, 2], 2));
        let config = PolicyConfig::Routing(RoutingConfig {
            owner,
            domains,
            fallback: None,
        });

        let deployed = PolicyDeployer::new(&ctx, Family::SecurityPolicy)
            .deploy(&config)
            .await
            .unwrap();
        assert_eq!(chain.owner(deployed.address).await.unwrap(), owner);
        assert!(chain
            .submodule(deployed.address, DomainId(1000))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn failed_parent_leaves_children_reusable() {
        let chain = MemoryChain::new();
        let ctx = context(&chain);
        let config = PolicyConfig::Aggregation(AggregationConfig {
            children: vec![multisig(&[1], 1), multisig(&[2], 1)],
            threshold: 1,
        });
        let deployer = PolicyDeployer::new(&ctx, Family::SecurityPolicy);

        // Let both leaves land, then fail the aggregation itself.
        let leaf = deployer.deploy(&multisig(&[1], 1)).await.unwrap();
        deployer.deploy(&multisig(&[2], 1)).await.unwrap();
        chain.fail_next_write("reverted").await;
        let err = deployer.deploy(&config).await.unwrap_err();
        assert!(matches!(err, ReconcileError::DeploymentFailure { .. }));
        assert_eq!(chain.creations().await, 2);

        let retried = deployer.deploy(&config).await.unwrap();
        assert_eq!(chain.creations().await, 3);
        assert_eq!(
            chain.children(retried.address, &[]).await.unwrap().len(),
            2
        );
        assert!(chain.has_code(leaf.address).await.unwrap());
    }

    #[tokio::test]
    async fn paused_pausable_is_paused_before_handoff() {
        let chain = MemoryChain::new();
        let ctx = context(&chain);
        let config = PolicyConfig::Pausable(PausableConfig {
            owner: addr(0x0c),
            paused: true,
        });
        let deployed = PolicyDeployer::new(&ctx, Family::SecurityPolicy)
            .deploy(&config)
            .await
            .unwrap();
        assert!(chain.paused(deployed.address).await.unwrap());
        assert_eq!(chain.owner(deployed.address).await.unwrap(), addr(0x0c));
    }

    #[tokio::test]
    async fn family_violation_fails_before_any_write() {
        let chain = MemoryChain::new();
        let ctx = context(&chain);
        let err = PolicyDeployer::new(&ctx, Family::SecurityPolicy)
            .deploy(&PolicyConfig::MerkleTree)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(_)));
        assert_eq!(chain.creations().await, 0);
    }
}
