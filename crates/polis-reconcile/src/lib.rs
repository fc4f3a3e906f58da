//! # polis-reconcile
//!
//! Converges deployed policy modules to declared targets.
//!
//! - [`PolicyReader`] derives a [`PolicyConfig`](polis_core::PolicyConfig) from
//!   chain state, with no local cache.
//! - [`differ`] decides structural equality and computes routing deltas.
//! - [`PolicyDeployer`] deploys config trees depth-first, reusing
//!   content-addressed leaves.
//! - [`Reconciler`] ties them together into a [`ReconcilePlan`] and applies
//!   it, instantiated per module family as [`SecurityPolicyReconciler`] and
//!   [`DispatchHookReconciler`].

pub mod context;
pub mod deployer;
pub mod differ;
pub mod error;
pub mod plan;
pub mod reader;
pub mod reconciler;

pub use context::ChainContext;
pub use deployer::{DeployedPolicyModule, PolicyDeployer};
pub use differ::{can_certainly_verify, collect_validators, equal, routing_delta, Delta, EndpointCheck};
pub use error::{ReconcileError, ReconcileResult};
pub use plan::{ModuleState, PlanStep, ReconcilePlan};
pub use reader::PolicyReader;
pub use reconciler::{
    reconcile_many, DispatchHookReconciler, Reconciler, SecurityPolicyReconciler,
};
