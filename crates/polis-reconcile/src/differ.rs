// differ.rs — Structural equality and routing deltas between two configs.
//
// Both sides are expected to be normalized already. Aggregation children are
// compared as a multiset with a greedy remove-on-match bijection, which is
// plenty for the single-digit fan-outs seen in practice.

use std::collections::BTreeSet;

use polis_core::{Address, PolicyConfig, RoutingConfig};
use serde::{Deserialize, Serialize};

/// Whether two configs describe the same module tree.
pub fn equal(a: &PolicyConfig, b: &PolicyConfig) -> bool {
    match (a, b) {
        (PolicyConfig::AddressRef(x), PolicyConfig::AddressRef(y)) => x == y,
        (PolicyConfig::Multisig(x), PolicyConfig::Multisig(y)) => {
            if x.kind != y.kind || x.threshold != y.threshold {
                return false;
            }
            let mut xs = x.validators.clone();
            let mut ys = y.validators.clone();
            xs.sort();
            ys.sort();
            xs == ys
        }
        (PolicyConfig::Aggregation(x), PolicyConfig::Aggregation(y)) => {
            x.threshold == y.threshold && bijection(&x.children, &y.children)
        }
        (PolicyConfig::Routing(x), PolicyConfig::Routing(y)) => {
            x.owner == y.owner
                && x.domains.len() == y.domains.len()
                && x.domains.iter().all(|(name, sub)| {
                    y.domains
                        .get(name)
                        .map(|other| equal(sub, other))
                        .unwrap_or(false)
                })
                && fallback_equal(x, y)
        }
        (PolicyConfig::Pausable(x), PolicyConfig::Pausable(y)) => x == y,
        (PolicyConfig::TrustedRelayer(x), PolicyConfig::TrustedRelayer(y)) => x == y,
        (PolicyConfig::NativeBridgeAttestation(x), PolicyConfig::NativeBridgeAttestation(y)) => {
            x == y
        }
        (PolicyConfig::TestAlwaysPass, PolicyConfig::TestAlwaysPass) => true,
        (PolicyConfig::MerkleTree, PolicyConfig::MerkleTree) => true,
        (PolicyConfig::ProtocolFee(x), PolicyConfig::ProtocolFee(y)) => x == y,
        (PolicyConfig::GasMeter(x), PolicyConfig::GasMeter(y)) => x == y,
        _ => false,
    }
}

/// Pair every child of `xs` with a distinct, equal child of `ys`.
fn bijection(xs: &[PolicyConfig], ys: &[PolicyConfig]) -> bool {
    if xs.len() != ys.len() {
        return false;
    }
    let mut remaining: Vec<&PolicyConfig> = ys.iter().collect();
    for x in xs {
        match remaining.iter().position(|y| equal(x, y)) {
            Some(i) => {
                remaining.swap_remove(i);
            }
            None => return false,
        }
    }
    remaining.is_empty()
}

fn fallback_equal(x: &RoutingConfig, y: &RoutingConfig) -> bool {
    match (&x.fallback, &y.fallback) {
        (None, None) => true,
        (Some(a), Some(b)) => equal(a, b),
        _ => false,
    }
}

/// Changes needed to bring a routing module from `current` to `target`.
/// Domains are chain names, resolved through the registry when applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub domains_to_enroll: BTreeSet<String>,
    pub domains_to_unenroll: BTreeSet<String>,
    pub owner_change: Option<Address>,
    pub fallback_changed: bool,
    pub bound_endpoint_changed: Option<Address>,
}

impl Delta {
    /// Whether the module must be redeployed rather than mutated.
    pub fn requires_redeploy(&self) -> bool {
        self.fallback_changed || self.bound_endpoint_changed.is_some()
    }
}

/// Bound-endpoint comparison input for fallback routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointCheck {
    /// Endpoint the deployed module is bound to, if it is endpoint-bound.
    pub current: Option<Address>,
    /// Endpoint the chain's modules should be bound to.
    pub expected: Address,
}

/// Routing-family delta.
pub fn routing_delta(
    current: &RoutingConfig,
    target: &RoutingConfig,
    endpoint: Option<EndpointCheck>,
) -> Delta {
    let domains_to_unenroll = current
        .domains
        .keys()
        .filter(|name| !target.domains.contains_key(*name))
        .cloned()
        .collect();

    let domains_to_enroll = target
        .domains
        .iter()
        .filter(|(name, sub)| {
            current
                .domains
                .get(*name)
                .map(|deployed| !equal(deployed, sub))
                .unwrap_or(true)
        })
        .map(|(name, _)| name.clone())
        .collect();

    let fallback_changed = target.fallback.is_some() && !fallback_equal(current, target);

    let bound_endpoint_changed = match (target.fallback.is_some(), endpoint) {
        (true, Some(check)) if check.current != Some(check.expected) => Some(check.expected),
        _ => None,
    };

    Delta {
        domains_to_enroll,
        domains_to_unenroll,
        owner_change: (current.owner != target.owner).then_some(target.owner),
        fallback_changed,
        bound_endpoint_changed,
    }
}

/// Conservative check that `config` would accept a well-formed message from
/// `origin`. May return false for a module that would verify; never returns
/// true for one that can't.
pub fn can_certainly_verify(config: &PolicyConfig, origin: &str) -> bool {
    match config {
        PolicyConfig::Multisig(m) => m.threshold > 0 && !m.validators.is_empty(),
        PolicyConfig::Aggregation(a) => {
            let verifiable = a
                .children
                .iter()
                .filter(|c| can_certainly_verify(c, origin))
                .count();
            a.threshold > 0 && verifiable >= usize::from(a.threshold)
        }
        PolicyConfig::Routing(r) => match (r.domains.get(origin), &r.fallback) {
            (Some(sub), _) => can_certainly_verify(sub, origin),
            (None, Some(fallback)) => can_certainly_verify(fallback, origin),
            (None, None) => false,
        },
        PolicyConfig::NativeBridgeAttestation(n) => !n.bridge.is_zero(),
        PolicyConfig::TrustedRelayer(t) => !t.relayer.is_zero(),
        PolicyConfig::Pausable(p) => !p.paused,
        PolicyConfig::TestAlwaysPass => true,
        PolicyConfig::AddressRef(_)
        | PolicyConfig::MerkleTree
        | PolicyConfig::ProtocolFee(_)
        | PolicyConfig::GasMeter(_) => false,
    }
}

/// Every validator whose signature could be required for a message from
/// `origin`.
pub fn collect_validators(config: &PolicyConfig, origin: &str) -> BTreeSet<Address> {
    let mut out = BTreeSet::new();
    collect_into(config, origin, &mut out);
    out
}

fn collect_into(config: &PolicyConfig, origin: &str, out: &mut BTreeSet<Address>) {
    match config {
        PolicyConfig::Multisig(m) => out.extend(m.validators.iter().copied()),
        PolicyConfig::Aggregation(a) => {
            for child in &a.children {
                collect_into(child, origin, out);
            }
        }
        PolicyConfig::Routing(r) => {
            if let Some(sub) = r.domains.get(origin) {
                collect_into(sub, origin, out);
            } else if let Some(fallback) = &r.fallback {
                collect_into(fallback, origin, out);
            }
        }
        PolicyConfig::AddressRef(_)
        | PolicyConfig::Pausable(_)
        | PolicyConfig::TrustedRelayer(_)
        | PolicyConfig::NativeBridgeAttestation(_)
        | PolicyConfig::TestAlwaysPass
        | PolicyConfig::MerkleTree
        | PolicyConfig::ProtocolFee(_)
        | PolicyConfig::GasMeter(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use polis_core::{AggregationConfig, MultisigConfig, MultisigKind, PausableConfig};

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn multisig(validators: &[u8], threshold: u8) -> PolicyConfig {
        PolicyConfig::Multisig(MultisigConfig {
            kind: MultisigKind::MessageIdBased,
            validators: validators.iter().map(|n| addr(*n)).collect(),
            threshold,
        })
    }

    fn aggregation(children: Vec<PolicyConfig>, threshold: u8) -> PolicyConfig {
        PolicyConfig::Aggregation(AggregationConfig { children, threshold })
    }

    fn routing(owner: u8, domains: Vec<(&str, PolicyConfig)>) -> RoutingConfig {
        RoutingConfig {
            owner: addr(owner),
            domains: domains
                .into_iter()
                .map(|(n, c)| (n.to_string(), c))
                .collect::<BTreeMap<_, _>>(),
            fallback: None,
        }
    }

    #[test]
    fn multisig_equality_ignores_order() {
        assert!(equal(&multisig(&[1, 2, 3], 2), &multisig(&[3, 2, 1], 2)));
        assert!(!equal(&multisig(&[1, 2, 3], 2), &multisig(&[1, 2, 3], 3)));
        assert!(!equal(&multisig(&[1, 2], 1), &multisig(&[1, 2, 3], 1)));
    }

    #[test]
    fn aggregation_needs_a_bijection() {
        let a = aggregation(vec![multisig(&[1], 1), multisig(&[1], 1)], 1);
        let b = aggregation(vec![multisig(&[1], 1), multisig(&[2], 1)], 1);
        assert!(!equal(&a, &b));
        assert!(!equal(&b, &a));

        let c = aggregation(vec![PolicyConfig::TestAlwaysPass, multisig(&[2], 1)], 1);
        let d = aggregation(vec![multisig(&[2], 1), PolicyConfig::TestAlwaysPass], 1);
        assert!(equal(&c, &d));
    }

    #[test]
    fn different_variants_never_equal() {
        assert!(!equal(&PolicyConfig::TestAlwaysPass, &PolicyConfig::MerkleTree));
        assert!(!equal(
            &PolicyConfig::AddressRef(addr(1)),
            &multisig(&[1], 1)
        ));
    }

    #[test]
    fn delta_enrolls_new_and_changed_domains() {
        let current = routing(9, vec![("alpha", multisig(&[1], 1)), ("gamma", multisig(&[3], 1))]);
        let target = routing(
            9,
            vec![("alpha", multisig(&[1], 1)), ("beta", multisig(&[2], 1))],
        );
        let delta = routing_delta(&current, &target, None);
        assert_eq!(delta.domains_to_enroll, BTreeSet::from(["beta".to_string()]));
        assert_eq!(delta.domains_to_unenroll, BTreeSet::from(["gamma".to_string()]));
        assert_eq!(delta.owner_change, None);
        assert!(!delta.requires_redeploy());

        let changed = routing(9, vec![("alpha", multisig(&[1, 2], 1))]);
        let delta = routing_delta(&current, &changed, None);
        assert!(delta.domains_to_enroll.contains("alpha"));
    }

    #[test]
    fn delta_flags_owner_and_fallback() {
        let mut current = routing(1, vec![]);
        current.fallback = Some(Box::new(PolicyConfig::TestAlwaysPass));
        let mut target = routing(2, vec![]);
        target.fallback = Some(Box::new(multisig(&[1], 1)));

        let delta = routing_delta(
            &current,
            &target,
            Some(EndpointCheck {
                current: Some(addr(0xe1)),
                expected: addr(0xe1),
            }),
        );
        assert_eq!(delta.owner_change, Some(addr(2)));
        assert!(delta.fallback_changed);
        assert_eq!(delta.bound_endpoint_changed, None);
    }

    #[test]
    fn delta_flags_rebound_endpoint() {
        let mut current = routing(1, vec![]);
        current.fallback = Some(Box::new(PolicyConfig::TestAlwaysPass));
        let target = current.clone();
        let delta = routing_delta(
            &current,
            &target,
            Some(EndpointCheck {
                current: Some(addr(0xe1)),
                expected: addr(0xe2),
            }),
        );
        assert_eq!(delta.bound_endpoint_changed, Some(addr(0xe2)));
        assert!(delta.requires_redeploy());
    }

    #[test]
    fn verification_check_is_conservative() {
        let route = PolicyConfig::Routing(routing(1, vec![("alpha", multisig(&[1, 2], 2))]));
        assert!(can_certainly_verify(&route, "alpha"));
        assert!(!can_certainly_verify(&route, "beta"));

        let paused = PolicyConfig::Pausable(PausableConfig {
            owner: addr(1),
            paused: true,
        });
        let agg = aggregation(vec![paused, PolicyConfig::TestAlwaysPass], 2);
        assert!(!can_certainly_verify(&agg, "alpha"));
        assert!(!can_certainly_verify(&PolicyConfig::AddressRef(addr(4)), "alpha"));
    }

    #[test]
    fn validators_follow_origin_route() {
        let mut r = routing(1, vec![("alpha", multisig(&[1, 2], 1))]);
        r.fallback = Some(Box::new(aggregation(
            vec![multisig(&[3], 1), multisig(&[4], 1)],
            1,
        )));
        let config = PolicyConfig::Routing(r);
        assert_eq!(
            collect_validators(&config, "alpha"),
            BTreeSet::from([addr(1), addr(2)])
        );
        assert_eq!(
            collect_validators(&config, "beta"),
            BTreeSet::from([addr(3), addr(4)])
        );
    }
}
