// deploy.rs — Deploy a fresh module tree into the snapshot.

use std::path::Path;

use polis_core::{DispatchHooks, Family, PolicyFamily, PolisConfig, SecurityPolicies};
use polis_reconcile::Reconciler;

use super::{load_target, open_chain, save_chain, ChainArgs};

pub async fn execute(settings: &PolisConfig, args: &ChainArgs, target: &Path) -> anyhow::Result<()> {
    match args.family {
        Family::SecurityPolicy => run::<SecurityPolicies>(settings, args, target).await,
        Family::DispatchHook => run::<DispatchHooks>(settings, args, target).await,
    }
}

async fn run<F: PolicyFamily>(
    settings: &PolisConfig,
    args: &ChainArgs,
    target: &Path,
) -> anyhow::Result<()> {
    let config = load_target(target, F::FAMILY)?;
    let (chain, ctx) = open_chain(settings, args)?;
    let deployed = Reconciler::<F>::new(ctx).create(&config).await?;
    save_chain(&chain, args).await?;

    println!("{}", deployed.address);
    Ok(())
}
