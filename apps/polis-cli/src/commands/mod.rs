// mod.rs — Shared plumbing for polis subcommands.

pub mod deploy;
pub mod plan;
pub mod read;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use polis_chain::MemoryChain;
use polis_core::{parse_policy, Address, Family, PolicyConfig, PolisConfig};
use polis_reconcile::ChainContext;

/// Which snapshot and chain a command runs against.
#[derive(Args, Debug, Clone)]
pub struct ChainArgs {
    /// Chain snapshot file (created on first deploy).
    #[arg(long)]
    pub state: PathBuf,
    /// Chain name from polis.toml `[[chains]]`.
    #[arg(long)]
    pub chain: String,
    /// Module family: security or hook.
    #[arg(long, default_value = "security")]
    pub family: Family,
}

/// Read and validate a target document.
pub fn load_target(path: &Path, family: Family) -> anyhow::Result<PolicyConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading target {}", path.display()))?;
    parse_policy(&content, family).with_context(|| format!("invalid target {}", path.display()))
}

pub fn parse_address(input: &str) -> anyhow::Result<Address> {
    input
        .parse()
        .with_context(|| format!("invalid module address '{}'", input))
}

/// Open the snapshot and build a context acting as the configured operator.
pub fn open_chain(
    settings: &PolisConfig,
    args: &ChainArgs,
) -> anyhow::Result<(MemoryChain, ChainContext)> {
    let chain = MemoryChain::load_or_new(&args.state)
        .with_context(|| format!("loading snapshot {}", args.state.display()))?;
    let registry = Arc::new(settings.registry()?);
    let ctx = ChainContext::in_memory(&chain, &args.chain, registry, settings.operator.address)?
        .with_reader_config(&settings.reader);
    Ok((chain, ctx))
}

pub async fn save_chain(chain: &MemoryChain, args: &ChainArgs) -> anyhow::Result<()> {
    chain
        .save(&args.state)
        .await
        .with_context(|| format!("saving snapshot {}", args.state.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polis_core::{ChainMetadata, DomainId};
    use tempfile::tempdir;

    fn settings() -> PolisConfig {
        PolisConfig {
            chains: vec![ChainMetadata {
                name: "alpha".into(),
                domain_id: DomainId(1000),
                endpoint: Address::from_bytes([0xe1; 20]),
            }],
            ..PolisConfig::default()
        }
    }

    #[test]
    fn load_target_rejects_wrong_family() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hook.yaml");
        std::fs::write(&path, "type: merkle_tree\n").unwrap();

        assert!(load_target(&path, Family::DispatchHook).is_ok());
        let err = load_target(&path, Family::SecurityPolicy).unwrap_err();
        assert!(err.to_string().contains("invalid target"));
    }

    #[test]
    fn open_chain_requires_registered_name() {
        let dir = tempdir().unwrap();
        let args = ChainArgs {
            state: dir.path().join("chain.json"),
            chain: "nowhere".into(),
            family: Family::SecurityPolicy,
        };
        assert!(open_chain(&settings(), &args).is_err());

        let args = ChainArgs {
            chain: "alpha".into(),
            ..args
        };
        let (_, ctx) = open_chain(&settings(), &args).unwrap();
        assert_eq!(ctx.domain, DomainId(1000));
    }
}
