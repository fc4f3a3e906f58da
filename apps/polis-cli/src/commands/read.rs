// read.rs — Derive a deployed module's config from the snapshot.

use polis_core::{normalized, PolisConfig};
use polis_reconcile::{collect_validators, PolicyReader};

use super::{open_chain, parse_address, ChainArgs};

pub async fn execute(settings: &PolisConfig, args: &ChainArgs, module: &str) -> anyhow::Result<()> {
    let module = parse_address(module)?;
    let (_chain, ctx) = open_chain(settings, args)?;

    let config = normalized(&PolicyReader::new(&ctx).derive_config(module).await?);
    print!("{}", serde_yaml::to_string(&config)?);

    // Trailing comments keep the output valid YAML.
    for chain in ctx.registry.chains() {
        let validators = collect_validators(&config, &chain.name);
        if validators.is_empty() {
            continue;
        }
        println!("# from {}: {} validator(s)", chain.name, validators.len());
        for validator in validators {
            println!("#   {}", validator);
        }
    }
    Ok(())
}
