// reconciler.rs — Converge a deployed module to a target config.
//
// reconcile(module, target):
//   1. validate + normalize the target (unregistered domains are dropped)
//   2. read the module's current config and normalize it
//   3. equal                     → Unchanged, no steps
//      target is an AddressRef   → adopt it, no deployment
//      type changed / immutable  → deploy the target, swap the reference
//      otherwise                 → type-specific in-place calls
//   4. if the owner differs, a single transfer_ownership goes last
//
// Deployments happen while planning (they're idempotent); in-place calls are
// returned as pending steps and submitted by `apply`, strictly in order,
// either through one submitter or signed per call by the target's owner.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::{join_all, try_join};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use polis_chain::{ChainError, Mutation, Receipt, SignerSet, TransactionSubmitter};
use polis_core::{
    normalize, normalized, validate, Address, DispatchHooks, DomainId, Family, GasMeterConfig,
    ModuleType, Normalized, PolicyConfig, PolicyFamily, RoutingConfig, SecurityPolicies,
};

use crate::context::ChainContext;
use crate::deployer::{DeployedPolicyModule, PolicyDeployer};
use crate::differ::{can_certainly_verify, equal, routing_delta, Delta, EndpointCheck};
use crate::error::{ReconcileError, ReconcileResult};
use crate::plan::{ModuleState, ReconcilePlan};
use crate::reader::PolicyReader;

/// Who signs the calls of a plan being applied.
#[derive(Clone, Copy)]
enum Signing<'a> {
    As(&'a dyn TransactionSubmitter),
    Owners(&'a dyn SignerSet),
}

/// Reconciler for one module family on one chain.
pub struct Reconciler<F: PolicyFamily> {
    ctx: ChainContext,
    _family: PhantomData<F>,
}

pub type SecurityPolicyReconciler = Reconciler<SecurityPolicies>;
pub type DispatchHookReconciler = Reconciler<DispatchHooks>;

impl<F: PolicyFamily> Reconciler<F> {
    pub fn new(ctx: ChainContext) -> Self {
        Self {
            ctx,
            _family: PhantomData,
        }
    }

    pub fn context(&self) -> &ChainContext {
        &self.ctx
    }

    /// Deploy a fresh module tree for `target`.
    pub async fn create(&self, target: &PolicyConfig) -> ReconcileResult<DeployedPolicyModule> {
        PolicyDeployer::new(&self.ctx, F::FAMILY).deploy(target).await
    }

    /// Current normalized config of `module`.
    pub async fn read(&self, module: Address) -> ReconcileResult<PolicyConfig> {
        let config = PolicyReader::new(&self.ctx).derive_config(module).await?;
        Ok(normalized(&config))
    }

    /// Plan the steps that converge `module` to `target`.
    pub async fn reconcile(
        &self,
        module: Address,
        target: &PolicyConfig,
    ) -> ReconcileResult<ReconcilePlan> {
        let family = F::FAMILY;
        validate(target, family)?;
        let Normalized {
            config: target,
            skipped_domains,
        } = normalize(target, &self.ctx.registry);

        let mut plan = ReconcilePlan::new(&self.ctx.name, family, module);
        plan.skipped_domains = skipped_domains;

        let current = PolicyReader::new(&self.ctx)
            .with_opaque(target.address_refs())
            .derive_config(module)
            .await?;
        let current = normalized(&current);

        if equal(&current, &target) {
            tracing::info!(chain = %self.ctx.name, %module, "module already matches target");
            return Ok(plan);
        }

        if let PolicyConfig::AddressRef(address) = &target {
            let address = *address;
            plan.module = address;
            plan.state = ModuleState::Redeployed;
            tracing::info!(chain = %self.ctx.name, from = %module, to = %address, "adopting referenced module");
            return Ok(plan);
        }

        let deployer = PolicyDeployer::new(&self.ctx, family);
        let same_type = current.module_type() == target.module_type();
        let mutable = target
            .module_type()
            .map(|ty| family.is_mutable(ty))
            .unwrap_or(false);
        if !same_type || !mutable {
            self.redeploy(&deployer, &target, &mut plan).await?;
            return Ok(plan);
        }

        match (&current, &target) {
            (PolicyConfig::Pausable(c), PolicyConfig::Pausable(t)) => {
                if c.paused != t.paused {
                    plan.push_call(Mutation::SetPaused {
                        module,
                        paused: t.paused,
                    });
                }
            }
            (PolicyConfig::Routing(c), PolicyConfig::Routing(t)) => {
                let endpoint = match t.fallback {
                    Some(_) => Some(EndpointCheck {
                        current: Some(self.bound_endpoint(module).await?),
                        expected: self.ctx.endpoint,
                    }),
                    None => None,
                };
                let delta = routing_delta(c, t, endpoint);
                if delta.requires_redeploy() {
                    self.redeploy(&deployer, &target, &mut plan).await?;
                    return Ok(plan);
                }
                self.apply_routing_delta(&deployer, module, t, &delta, &mut plan)
                    .await?;
            }
            (PolicyConfig::ProtocolFee(c), PolicyConfig::ProtocolFee(t)) => {
                if c.max_fee != t.max_fee {
                    self.redeploy(&deployer, &target, &mut plan).await?;
                    return Ok(plan);
                }
                if c.fee != t.fee {
                    plan.push_call(Mutation::SetFee { module, fee: t.fee });
                }
                if c.beneficiary != t.beneficiary {
                    plan.push_call(Mutation::SetBeneficiary {
                        module,
                        beneficiary: t.beneficiary,
                    });
                }
            }
            (PolicyConfig::GasMeter(c), PolicyConfig::GasMeter(t)) => {
                self.update_gas_meter(&deployer, module, c, t, &mut plan)
                    .await?;
            }
            _ => {
                self.redeploy(&deployer, &target, &mut plan).await?;
                return Ok(plan);
            }
        }

        if let (Some(current_owner), Some(new_owner)) = (current.owner(), target.owner()) {
            if current_owner != new_owner {
                plan.push_call(Mutation::TransferOwnership { module, new_owner });
            }
        }

        plan.state = if plan.steps.is_empty() {
            ModuleState::Unchanged
        } else {
            ModuleState::Mutated
        };
        tracing::info!("{}", plan.summary());
        Ok(plan)
    }

    /// Submit a plan's pending calls in order. Stops at the first failure;
    /// calls before it stay committed.
    pub async fn apply(
        &self,
        plan: &ReconcilePlan,
        submitter: &dyn TransactionSubmitter,
    ) -> ReconcileResult<Vec<Receipt>> {
        self.submit_all(plan, Signing::As(submitter)).await
    }

    /// Like [`apply`](Self::apply), but each call is signed by the owner of
    /// its target module at the time it is submitted. Needed when a plan
    /// spans modules with different owners, such as a gas meter and its
    /// oracle.
    pub async fn apply_as_owners(
        &self,
        plan: &ReconcilePlan,
        signers: &dyn SignerSet,
    ) -> ReconcileResult<Vec<Receipt>> {
        self.submit_all(plan, Signing::Owners(signers)).await
    }

    async fn submit_all(
        &self,
        plan: &ReconcilePlan,
        signing: Signing<'_>,
    ) -> ReconcileResult<Vec<Receipt>> {
        let mut receipts = Vec::new();
        for (index, mutation) in plan.mutations().enumerate() {
            let owned;
            let submitter: &dyn TransactionSubmitter = match signing {
                Signing::As(submitter) => submitter,
                Signing::Owners(signers) => match self.owner_signer(signers, mutation).await {
                    Ok(submitter) => {
                        owned = submitter;
                        owned.as_ref()
                    }
                    Err(source) => {
                        return Err(ReconcileError::MutationFailure {
                            index,
                            applied: receipts.len(),
                            mutation: mutation.clone(),
                            source,
                        })
                    }
                },
            };
            match submitter.submit(mutation).await {
                Ok(receipt) => {
                    tracing::debug!(%mutation, tx = %receipt.tx_hash, "submitted");
                    receipts.push(receipt);
                }
                Err(source) => {
                    tracing::warn!(%mutation, error = %source, index, "mutation failed, aborting plan");
                    return Err(ReconcileError::MutationFailure {
                        index,
                        applied: receipts.len(),
                        mutation: mutation.clone(),
                        source,
                    });
                }
            }
        }
        tracing::info!(chain = %self.ctx.name, plan_id = %plan.plan_id, applied = receipts.len(), "plan applied");
        Ok(receipts)
    }

    async fn owner_signer(
        &self,
        signers: &dyn SignerSet,
        mutation: &Mutation,
    ) -> Result<Arc<dyn TransactionSubmitter>, ChainError> {
        let module = mutation.target();
        let owner = self.ctx.introspection.owner(module).await?;
        tracing::debug!(%mutation, %owner, "signing as module owner");
        signers
            .signer(owner)
            .ok_or(ChainError::NoSigner { module, owner })
    }

    async fn redeploy(
        &self,
        deployer: &PolicyDeployer<'_>,
        target: &PolicyConfig,
        plan: &mut ReconcilePlan,
    ) -> ReconcileResult<()> {
        let (address, reused) = deployer.deploy_tracked(target).await?;
        if let Some(ty) = target.module_type() {
            plan.push_deploy(ty, address, reused);
        }
        plan.module = address;
        plan.state = ModuleState::Redeployed;
        tracing::info!(chain = %self.ctx.name, from = %plan.previous, to = %address, "redeployed module");
        Ok(())
    }

    async fn bound_endpoint(&self, module: Address) -> ReconcileResult<Address> {
        self.ctx
            .introspection
            .bound_endpoint(module)
            .await
            .map_err(|source| ReconcileError::Read {
                address: module,
                source,
            })
    }

    async fn apply_routing_delta(
        &self,
        deployer: &PolicyDeployer<'_>,
        module: Address,
        target: &RoutingConfig,
        delta: &Delta,
        plan: &mut ReconcilePlan,
    ) -> ReconcileResult<()> {
        for name in &delta.domains_to_enroll {
            let (Some(domain), Some(sub)) = (
                self.ctx.registry.try_domain_id(name),
                target.domains.get(name),
            ) else {
                continue;
            };
            let (submodule, reused) = deployer.deploy_tracked(sub).await?;
            if let Some(ty) = sub.module_type() {
                plan.push_deploy(ty, submodule, reused);
            }
            if F::FAMILY == Family::SecurityPolicy && !can_certainly_verify(sub, name) {
                tracing::warn!(domain = %name, %submodule, "submodule cannot be shown to verify messages from this origin");
            }
            plan.push_call(Mutation::SetSubmodule {
                module,
                domain,
                submodule,
            });
        }
        for name in &delta.domains_to_unenroll {
            if let Some(domain) = self.ctx.registry.try_domain_id(name) {
                plan.push_call(Mutation::RemoveDomain { module, domain });
            }
        }
        Ok(())
    }

    async fn update_gas_meter(
        &self,
        deployer: &PolicyDeployer<'_>,
        module: Address,
        current: &GasMeterConfig,
        target: &GasMeterConfig,
        plan: &mut ReconcilePlan,
    ) -> ReconcileResult<()> {
        if current.beneficiary != target.beneficiary {
            plan.push_call(Mutation::SetBeneficiary {
                module,
                beneficiary: target.beneficiary,
            });
        }

        let onchain = self.gas_rows(module).await?;
        let target_rows = deployer.resolve_gas_rows(target);

        // Reuse the oracle the meter already points at, if any.
        let existing = onchain
            .values()
            .map(|(_, oracle)| *oracle)
            .find(|oracle| !oracle.is_zero());
        let oracle = match existing {
            Some(oracle) => {
                for (domain, params) in &target_rows {
                    let unchanged = onchain.get(domain).map(|(_, o)| *o) == Some(oracle)
                        && self
                            .ctx
                            .registry
                            .chain_name(*domain)
                            .and_then(|name| current.remotes.get(name))
                            .map(|p| {
                                p.exchange_rate == params.exchange_rate
                                    && p.gas_price == params.gas_price
                            })
                            .unwrap_or(false);
                    if !unchanged {
                        plan.push_call(Mutation::SetRemoteGasData {
                            oracle,
                            domain: *domain,
                            exchange_rate: params.exchange_rate,
                            gas_price: params.gas_price,
                        });
                    }
                }
                oracle
            }
            None if !target_rows.is_empty() => {
                let oracle = deployer
                    .deploy_gas_oracle(&target_rows, target.oracle_owner)
                    .await?;
                plan.push_deploy(ModuleType::GasOracle, oracle, false);
                oracle
            }
            None => Address::ZERO,
        };

        for (domain, params) in &target_rows {
            let (overhead, row_oracle) = onchain
                .get(domain)
                .copied()
                .unwrap_or((0, Address::ZERO));
            if overhead != params.overhead_gas || row_oracle != oracle {
                plan.push_call(Mutation::SetOverheadAndOracle {
                    module,
                    domain: *domain,
                    overhead: params.overhead_gas,
                    oracle,
                });
            }
        }
        for (domain, (_, row_oracle)) in &onchain {
            let still_wanted = target_rows.iter().any(|(d, _)| d == domain);
            if !row_oracle.is_zero() && !still_wanted {
                plan.push_call(Mutation::SetOverheadAndOracle {
                    module,
                    domain: *domain,
                    overhead: 0,
                    oracle: Address::ZERO,
                });
            }
        }

        if let Some(oracle) = existing {
            if !target_rows.is_empty() && current.oracle_owner != target.oracle_owner {
                plan.push_call(Mutation::TransferOwnership {
                    module: oracle,
                    new_owner: target.oracle_owner,
                });
            }
        }
        Ok(())
    }

    /// On-chain `(overhead, oracle)` for every registered domain.
    async fn gas_rows(&self, meter: Address) -> ReconcileResult<BTreeMap<DomainId, (u64, Address)>> {
        let chain = &*self.ctx.introspection;
        let read_err = |source: ChainError| ReconcileError::Read {
            address: meter,
            source,
        };
        let rows: Vec<(DomainId, (u64, Address))> = stream::iter(self.ctx.registered_domains())
            .map(|(_, domain)| async move {
                let row = try_join(chain.overhead(meter, domain), chain.oracle_address(meter, domain))
                    .await
                    .map_err(read_err)?;
                Ok::<_, ReconcileError>((domain, row))
            })
            .buffer_unordered(self.ctx.read_concurrency.max(1))
            .try_collect()
            .await?;
        Ok(rows.into_iter().collect())
    }
}

/// Reconcile the same target against several chains concurrently.
///
/// Chains share no mutable state, so each job runs independently; results
/// come back in input order, labelled with the chain name.
pub async fn reconcile_many<F: PolicyFamily>(
    jobs: &[(&Reconciler<F>, Address)],
    target: &PolicyConfig,
) -> Vec<(String, ReconcileResult<ReconcilePlan>)> {
    join_all(jobs.iter().map(|(reconciler, module)| async move {
        (
            reconciler.context().name.clone(),
            reconciler.reconcile(*module, target).await,
        )
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use polis_chain::MemoryChain;
    use polis_core::{ChainMetadata, ChainRegistry, PausableConfig, ProtocolFeeConfig};

    const OPERATOR: Address = Address::from_bytes([0xaa; 20]);

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn context(chain: &MemoryChain) -> ChainContext {
        let registry = ChainRegistry::from_chains(vec![ChainMetadata {
            name: "home".into(),
            domain_id: DomainId(1),
            endpoint: addr(0xe1),
        }])
        .unwrap();
        ChainContext::in_memory(chain, "home", Arc::new(registry), OPERATOR).unwrap()
    }

    #[tokio::test]
    async fn type_change_redeploys() {
        let chain = MemoryChain::new();
        let reconciler = SecurityPolicyReconciler::new(context(&chain));
        let existing = reconciler
            .create(&PolicyConfig::TestAlwaysPass)
            .await
            .unwrap();

        let target = PolicyConfig::Pausable(PausableConfig {
            owner: OPERATOR,
            paused: false,
        });
        let plan = reconciler.reconcile(existing.address, &target).await.unwrap();
        assert_eq!(plan.state, ModuleState::Redeployed);
        assert_ne!(plan.module, existing.address);
        assert_eq!(plan.mutations().count(), 0);
        assert_eq!(reconciler.read(plan.module).await.unwrap(), target);
    }

    #[tokio::test]
    async fn address_ref_target_is_adopted() {
        let chain = MemoryChain::new();
        let reconciler = SecurityPolicyReconciler::new(context(&chain));
        let existing = reconciler
            .create(&PolicyConfig::TestAlwaysPass)
            .await
            .unwrap();
        let before = chain.creations().await;

        let plan = reconciler
            .reconcile(existing.address, &PolicyConfig::AddressRef(addr(0x42)))
            .await
            .unwrap();
        assert_eq!(plan.module, addr(0x42));
        assert!(plan.steps.is_empty());
        assert_eq!(chain.creations().await, before);
    }

    #[tokio::test]
    async fn protocol_fee_updates_in_place_unless_cap_changes() {
        let chain = MemoryChain::new();
        let reconciler = DispatchHookReconciler::new(context(&chain));
        let fee = |max_fee, fee, beneficiary| {
            PolicyConfig::ProtocolFee(ProtocolFeeConfig {
                owner: OPERATOR,
                beneficiary,
                max_fee,
                fee,
            })
        };
        let deployed = reconciler.create(&fee(100, 10, addr(1))).await.unwrap();

        let plan = reconciler
            .reconcile(deployed.address, &fee(100, 20, addr(2)))
            .await
            .unwrap();
        assert_eq!(plan.state, ModuleState::Mutated);
        let calls: Vec<_> = plan.mutations().map(Mutation::name).collect();
        assert_eq!(calls, vec!["set_fee", "set_beneficiary"]);

        let plan = reconciler
            .reconcile(deployed.address, &fee(200, 20, addr(2)))
            .await
            .unwrap();
        assert_eq!(plan.state, ModuleState::Redeployed);
    }

    #[tokio::test]
    async fn security_family_rejects_hook_targets() {
        let chain = MemoryChain::new();
        let reconciler = SecurityPolicyReconciler::new(context(&chain));
        let err = reconciler
            .reconcile(addr(1), &PolicyConfig::MerkleTree)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(_)));
    }
}
