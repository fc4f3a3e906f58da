// reader.rs — Derive a PolicyConfig from a deployed module.
//
// The reader is a pure function of chain state: it holds no cache and every
// call re-queries the chain. Per-domain reads (routing submodules, gas meter
// rows) and aggregation children fan out with bounded concurrency; the
// result doesn't depend on completion order.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use futures_util::future::{try_join, try_join4, BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use polis_chain::{ChainResult, EMPTY_PROBE};
use polis_core::{
    Address, AggregationConfig, DomainId, GasMeterConfig, GasParams, ModuleType, MultisigConfig,
    MultisigKind, NativeBridgeConfig, PausableConfig, PolicyConfig, ProtocolFeeConfig,
    RoutingConfig, TrustedRelayerConfig,
};

use crate::context::ChainContext;
use crate::error::{ReconcileError, ReconcileResult};

async fn call<T>(
    address: Address,
    fut: impl Future<Output = ChainResult<T>>,
) -> ReconcileResult<T> {
    fut.await
        .map_err(|source| ReconcileError::Read { address, source })
}

/// One discovered gas meter row plus the owner of the oracle it points at.
type GasRow = (String, GasParams, Address);

/// Reads module trees from one chain.
pub struct PolicyReader<'a> {
    ctx: &'a ChainContext,
    opaque: BTreeSet<Address>,
}

impl<'a> PolicyReader<'a> {
    pub fn new(ctx: &'a ChainContext) -> Self {
        Self {
            ctx,
            opaque: BTreeSet::new(),
        }
    }

    /// Addresses to return as `AddressRef` without introspecting them.
    pub fn with_opaque(mut self, opaque: BTreeSet<Address>) -> Self {
        self.opaque = opaque;
        self
    }

    /// Recover the config of the module at `address`, recursively.
    pub async fn derive_config(&self, address: Address) -> ReconcileResult<PolicyConfig> {
        self.derive_at(address, 0).await
    }

    fn concurrency(&self) -> usize {
        self.ctx.read_concurrency.max(1)
    }

    fn derive_at(&self, address: Address, depth: usize) -> BoxFuture<'_, ReconcileResult<PolicyConfig>> {
        async move {
            if self.opaque.contains(&address) {
                return Ok(PolicyConfig::AddressRef(address));
            }
            if depth > self.ctx.max_depth {
                return Err(ReconcileError::DepthExceeded {
                    address,
                    max_depth: self.ctx.max_depth,
                });
            }

            let chain = &*self.ctx.introspection;
            let discriminant = call(address, chain.module_type(address)).await?;
            let ty = ModuleType::from_discriminant(discriminant).ok_or(
                ReconcileError::UnsupportedType {
                    address,
                    discriminant,
                },
            )?;
            tracing::debug!(%address, module_type = %ty, depth, "deriving config");

            let config = match ty {
                ModuleType::MerkleRootMultisig | ModuleType::MessageIdMultisig => {
                    let (validators, threshold) = try_join(
                        call(address, chain.validators(address)),
                        call(address, chain.threshold(address)),
                    )
                    .await?;
                    let kind = if ty == ModuleType::MerkleRootMultisig {
                        MultisigKind::RootBased
                    } else {
                        MultisigKind::MessageIdBased
                    };
                    PolicyConfig::Multisig(MultisigConfig {
                        kind,
                        validators,
                        threshold,
                    })
                }
                ModuleType::Aggregation => {
                    let (children, threshold) = try_join(
                        call(address, chain.children(address, EMPTY_PROBE)),
                        call(address, chain.threshold(address)),
                    )
                    .await?;
                    let children: Vec<PolicyConfig> = stream::iter(children)
                        .map(|child| self.derive_at(child, depth + 1))
                        .buffered(self.concurrency())
                        .try_collect()
                        .await?;
                    PolicyConfig::Aggregation(AggregationConfig { children, threshold })
                }
                ModuleType::Routing | ModuleType::FallbackRouting => {
                    let owner = call(address, chain.owner(address)).await?;
                    let domains = self.read_routes(address, depth).await?;
                    let fallback = if ty == ModuleType::FallbackRouting {
                        let fallback = call(address, chain.fallback_submodule(address)).await?;
                        Some(Box::new(self.derive_at(fallback, depth + 1).await?))
                    } else {
                        None
                    };
                    PolicyConfig::Routing(RoutingConfig {
                        owner,
                        domains,
                        fallback,
                    })
                }
                ModuleType::Pausable => {
                    let (owner, paused) = try_join(
                        call(address, chain.owner(address)),
                        call(address, chain.paused(address)),
                    )
                    .await?;
                    PolicyConfig::Pausable(PausableConfig { owner, paused })
                }
                ModuleType::TrustedRelayer => PolicyConfig::TrustedRelayer(TrustedRelayerConfig {
                    relayer: call(address, chain.trusted_relayer(address)).await?,
                }),
                ModuleType::NativeBridgeAttestation => {
                    let (bridge, counterpart_domain) =
                        call(address, chain.native_bridge(address)).await?;
                    PolicyConfig::NativeBridgeAttestation(NativeBridgeConfig {
                        bridge,
                        counterpart_domain,
                    })
                }
                ModuleType::TestAlwaysPass => PolicyConfig::TestAlwaysPass,
                ModuleType::MerkleTree => PolicyConfig::MerkleTree,
                ModuleType::ProtocolFee => {
                    let (owner, beneficiary, max_fee, fee) = try_join4(
                        call(address, chain.owner(address)),
                        call(address, chain.beneficiary(address)),
                        call(address, chain.max_fee(address)),
                        call(address, chain.fee(address)),
                    )
                    .await?;
                    PolicyConfig::ProtocolFee(ProtocolFeeConfig {
                        owner,
                        beneficiary,
                        max_fee,
                        fee,
                    })
                }
                ModuleType::GasMeter => self.read_gas_meter(address).await?,
                // An oracle is storage behind a meter, never a policy module.
                ModuleType::GasOracle => {
                    return Err(ReconcileError::UnsupportedType {
                        address,
                        discriminant,
                    })
                }
            };
            Ok(config)
        }
        .boxed()
    }

    async fn read_routes(
        &self,
        address: Address,
        depth: usize,
    ) -> ReconcileResult<BTreeMap<String, PolicyConfig>> {
        let routes: Vec<Option<(String, PolicyConfig)>> = stream::iter(self.ctx.registered_domains())
            .map(|(name, domain)| self.read_route(address, name, domain, depth))
            .buffer_unordered(self.concurrency())
            .try_collect()
            .await?;
        Ok(routes.into_iter().flatten().collect())
    }

    async fn read_route(
        &self,
        address: Address,
        name: String,
        domain: DomainId,
        depth: usize,
    ) -> ReconcileResult<Option<(String, PolicyConfig)>> {
        let chain = &*self.ctx.introspection;
        match call(address, chain.submodule(address, domain)).await? {
            Some(sub) if !sub.is_zero() => {
                let config = self.derive_at(sub, depth + 1).await?;
                Ok(Some((name, config)))
            }
            _ => Ok(None),
        }
    }

    async fn read_gas_meter(&self, address: Address) -> ReconcileResult<PolicyConfig> {
        let chain = &*self.ctx.introspection;
        let (owner, beneficiary) = try_join(
            call(address, chain.owner(address)),
            call(address, chain.beneficiary(address)),
        )
        .await?;

        let rows: Vec<Option<GasRow>> = stream::iter(self.ctx.registered_domains())
            .map(|(name, domain)| self.read_gas_row(address, name, domain))
            .buffer_unordered(self.concurrency())
            .try_collect()
            .await?;

        let mut remotes = BTreeMap::new();
        let mut oracle_owners = BTreeSet::new();
        for (name, params, oracle_owner) in rows.into_iter().flatten() {
            remotes.insert(name, params);
            oracle_owners.insert(oracle_owner);
        }
        if oracle_owners.len() > 1 {
            return Err(ReconcileError::InconsistentOracleOwnership {
                meter: address,
                owners: oracle_owners.into_iter().collect(),
            });
        }

        Ok(PolicyConfig::GasMeter(GasMeterConfig {
            owner,
            beneficiary,
            oracle_owner: oracle_owners.into_iter().next().unwrap_or(owner),
            remotes,
        }))
    }

    async fn read_gas_row(
        &self,
        meter: Address,
        name: String,
        domain: DomainId,
    ) -> ReconcileResult<Option<GasRow>> {
        let chain = &*self.ctx.introspection;
        let (overhead_gas, oracle) = try_join(
            call(meter, chain.overhead(meter, domain)),
            call(meter, chain.oracle_address(meter, domain)),
        )
        .await?;
        if oracle.is_zero() {
            return Ok(None);
        }
        let ((exchange_rate, gas_price), oracle_owner) = try_join(
            call(oracle, chain.exchange_rate_and_gas_price(oracle, domain)),
            call(oracle, chain.owner(oracle)),
        )
        .await?;
        Ok(Some((
            name,
            GasParams {
                overhead_gas,
                exchange_rate,
                gas_price,
            },
            oracle_owner,
        )))
    }
}
