// validate.rs — Validate a target document and print its canonical form.

use std::path::Path;

use polis_core::{normalize, Family, PolisConfig};

use super::load_target;

pub fn execute(settings: &PolisConfig, target: &Path, family: Family) -> anyhow::Result<()> {
    let config = load_target(target, family)?;
    let registry = settings.registry()?;
    let normalized = normalize(&config, &registry);

    for name in &normalized.skipped_domains {
        eprintln!("note: domain '{}' is not in the chain registry and will be skipped", name);
    }
    println!("{}", normalized.config.canonical_json());
    Ok(())
}
