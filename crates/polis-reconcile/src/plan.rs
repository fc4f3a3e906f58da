// plan.rs — The result of reconciling one module on one chain.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use polis_chain::Mutation;
use polis_core::{Address, Family, ModuleType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal state of a reconciled module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Already structurally equal to the target.
    Unchanged,
    /// Replaced by a module at a new address; the old one is abandoned.
    Redeployed,
    /// Converged in place by the plan's pending calls.
    Mutated,
}

/// One entry of a plan, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlanStep {
    /// A module tree deployed while planning. Already on-chain.
    Deploy {
        module_type: ModuleType,
        address: Address,
        /// The tree already existed and nothing was created.
        #[serde(default)]
        reused: bool,
    },
    /// A write still to be submitted by `apply`.
    Call(Mutation),
}

/// Ordered steps converging a module to its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    pub plan_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub chain: String,
    pub family: Family,
    pub state: ModuleState,
    /// The module that was reconciled.
    pub previous: Address,
    /// The module to reference after the plan is applied.
    pub module: Address,
    pub steps: Vec<PlanStep>,
    /// Target domains dropped because the chain registry doesn't know them.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub skipped_domains: BTreeSet<String>,
}

impl ReconcilePlan {
    pub(crate) fn new(chain: &str, family: Family, previous: Address) -> Self {
        Self {
            plan_id: Uuid::new_v4(),
            created_at: Utc::now(),
            chain: chain.to_string(),
            family,
            state: ModuleState::Unchanged,
            previous,
            module: previous,
            steps: Vec::new(),
            skipped_domains: BTreeSet::new(),
        }
    }

    /// Pending writes, in submission order.
    pub fn mutations(&self) -> impl Iterator<Item = &Mutation> {
        self.steps.iter().filter_map(|step| match step {
            PlanStep::Call(m) => Some(m),
            PlanStep::Deploy { .. } => None,
        })
    }

    pub fn is_noop(&self) -> bool {
        self.steps.is_empty() && self.module == self.previous
    }

    pub(crate) fn push_call(&mut self, mutation: Mutation) {
        self.steps.push(PlanStep::Call(mutation));
    }

    pub(crate) fn push_deploy(
        &mut self,
        module_type: ModuleType,
        address: Address,
        reused: bool,
    ) {
        self.steps.push(PlanStep::Deploy {
            module_type,
            address,
            reused,
        });
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let (mut deployed, mut reused) = (0, 0);
        for step in &self.steps {
            match step {
                PlanStep::Deploy { reused: true, .. } => reused += 1,
                PlanStep::Deploy { reused: false, .. } => deployed += 1,
                PlanStep::Call(_) => {}
            }
        }
        format!(
            "{} on {}: {:?} {} -> {} ({} deployed, {} reused, {} pending calls)",
            self.family,
            self.chain,
            self.state,
            self.previous,
            self.module,
            deployed,
            reused,
            self.mutations().count()
        )
    }
}
