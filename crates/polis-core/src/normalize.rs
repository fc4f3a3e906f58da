// normalize.rs — Canonical ordering and registry filtering.
//
// Two structurally equivalent configs must compare equal regardless of the
// order their collections were written in. `normalized` sorts validator sets
// and aggregation children into a canonical order; `retain_registered` drops
// routing and gas-meter domains the chain registry can't resolve.

use std::collections::BTreeSet;

use crate::config::{AggregationConfig, GasMeterConfig, MultisigConfig, PolicyConfig, RoutingConfig};
use crate::domain::ChainRegistry;

/// A normalized config plus the domain names dropped on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub config: PolicyConfig,
    pub skipped_domains: BTreeSet<String>,
}

/// Filter against `registry`, then canonicalize ordering.
pub fn normalize(config: &PolicyConfig, registry: &ChainRegistry) -> Normalized {
    let mut skipped_domains = BTreeSet::new();
    let filtered = retain_registered(config, registry, &mut skipped_domains);
    Normalized {
        config: normalized(&filtered),
        skipped_domains,
    }
}

/// Canonical form of `config`. Pure; does not consult any registry.
pub fn normalized(config: &PolicyConfig) -> PolicyConfig {
    match config {
        PolicyConfig::Multisig(m) => {
            let mut validators = m.validators.clone();
            validators.sort();
            PolicyConfig::Multisig(MultisigConfig {
                kind: m.kind,
                validators,
                threshold: m.threshold,
            })
        }
        PolicyConfig::Aggregation(a) => {
            let mut keyed: Vec<(String, PolicyConfig)> = a
                .children
                .iter()
                .map(|c| {
                    let n = normalized(c);
                    (n.canonical_json(), n)
                })
                .collect();
            keyed.sort_by(|x, y| x.0.cmp(&y.0));
            PolicyConfig::Aggregation(AggregationConfig {
                children: keyed.into_iter().map(|(_, c)| c).collect(),
                threshold: a.threshold,
            })
        }
        PolicyConfig::Routing(r) => PolicyConfig::Routing(RoutingConfig {
            owner: r.owner,
            domains: r
                .domains
                .iter()
                .map(|(name, sub)| (name.clone(), normalized(sub)))
                .collect(),
            fallback: r.fallback.as_deref().map(|f| Box::new(normalized(f))),
        }),
        // A meter with no remote rows has no oracle to own; its oracle owner
        // reads back as the meter owner.
        PolicyConfig::GasMeter(g) if g.remotes.is_empty() => PolicyConfig::GasMeter(GasMeterConfig {
            oracle_owner: g.owner,
            ..g.clone()
        }),
        PolicyConfig::AddressRef(_)
        | PolicyConfig::Pausable(_)
        | PolicyConfig::TrustedRelayer(_)
        | PolicyConfig::NativeBridgeAttestation(_)
        | PolicyConfig::TestAlwaysPass
        | PolicyConfig::MerkleTree
        | PolicyConfig::ProtocolFee(_)
        | PolicyConfig::GasMeter(_) => config.clone(),
    }
}

/// Copy of `config` with every domain key the registry doesn't know removed.
/// Each dropped name is logged once and recorded in `skipped`.
pub fn retain_registered(
    config: &PolicyConfig,
    registry: &ChainRegistry,
    skipped: &mut BTreeSet<String>,
) -> PolicyConfig {
    let mut keep = |name: &str| -> bool {
        if registry.try_domain_id(name).is_some() {
            return true;
        }
        if skipped.insert(name.to_string()) {
            tracing::warn!(domain = %name, "domain not in chain registry, skipping");
        }
        false
    };

    match config {
        PolicyConfig::Routing(r) => {
            let names: Vec<&String> = r.domains.keys().filter(|n| keep(n.as_str())).collect();
            let domains = names
                .into_iter()
                .map(|name| (name.clone(), retain_registered(&r.domains[name], registry, skipped)))
                .collect();
            let fallback = r
                .fallback
                .as_deref()
                .map(|f| Box::new(retain_registered(f, registry, skipped)));
            PolicyConfig::Routing(RoutingConfig {
                owner: r.owner,
                domains,
                fallback,
            })
        }
        PolicyConfig::Aggregation(a) => PolicyConfig::Aggregation(AggregationConfig {
            children: a
                .children
                .iter()
                .map(|c| retain_registered(c, registry, skipped))
                .collect(),
            threshold: a.threshold,
        }),
        PolicyConfig::GasMeter(g) => PolicyConfig::GasMeter(GasMeterConfig {
            remotes: g
                .remotes
                .iter()
                .filter(|(name, _)| keep(name.as_str()))
                .map(|(name, params)| (name.clone(), *params))
                .collect(),
            ..g.clone()
        }),
        PolicyConfig::AddressRef(_)
        | PolicyConfig::Multisig(_)
        | PolicyConfig::Pausable(_)
        | PolicyConfig::TrustedRelayer(_)
        | PolicyConfig::NativeBridgeAttestation(_)
        | PolicyConfig::TestAlwaysPass
        | PolicyConfig::MerkleTree
        | PolicyConfig::ProtocolFee(_) => config.clone(),
    }
}
