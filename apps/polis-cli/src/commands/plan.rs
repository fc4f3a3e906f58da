// plan.rs — Reconcile a module to a target, optionally applying the plan.
//
// With --apply each call is signed by the owner of its target module.
// Planning can deploy modules (deployments are idempotent), so the snapshot
// is saved even without --apply.

use std::path::Path;

use polis_core::{DispatchHooks, Family, PolicyFamily, PolisConfig, SecurityPolicies};
use polis_reconcile::Reconciler;

use super::{load_target, open_chain, parse_address, save_chain, ChainArgs};

pub async fn execute(
    settings: &PolisConfig,
    args: &ChainArgs,
    module: &str,
    target: &Path,
    apply: bool,
) -> anyhow::Result<()> {
    match args.family {
        Family::SecurityPolicy => run::<SecurityPolicies>(settings, args, module, target, apply).await,
        Family::DispatchHook => run::<DispatchHooks>(settings, args, module, target, apply).await,
    }
}

async fn run<F: PolicyFamily>(
    settings: &PolisConfig,
    args: &ChainArgs,
    module: &str,
    target: &Path,
    apply: bool,
) -> anyhow::Result<()> {
    let module = parse_address(module)?;
    let config = load_target(target, F::FAMILY)?;
    let (chain, ctx) = open_chain(settings, args)?;
    let reconciler = Reconciler::<F>::new(ctx);

    let plan = reconciler.reconcile(module, &config).await?;
    save_chain(&chain, args).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    eprintln!("{}", plan.summary());

    if !apply || plan.mutations().next().is_none() {
        return Ok(());
    }

    // A gas meter and its oracle may have different owners; each call is
    // signed by the current owner of the module it targets.
    let receipts = reconciler.apply_as_owners(&plan, &chain).await?;
    save_chain(&chain, args).await?;
    eprintln!(
        "Applied {} call(s); module is now {}",
        receipts.len(),
        plan.module
    );
    Ok(())
}
