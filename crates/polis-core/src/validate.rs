// validate.rs — Semantic checks on a parsed PolicyConfig.
//
// Parsing (config.rs) guarantees shape; this module guarantees the rules a
// deployer relies on: thresholds in range, no duplicate validators, every
// variant admitted by the family being configured, fees within their cap.
// All checks are recursive and run before any chain is touched.

use std::collections::BTreeSet;

use crate::config::PolicyConfig;
use crate::error::ValidationError;
use crate::family::Family;
use crate::module_type::ModuleType;

/// Parse a YAML/JSON document and validate it for `family`.
pub fn parse_policy(input: &str, family: Family) -> Result<PolicyConfig, ValidationError> {
    let config = PolicyConfig::from_yaml_str(input)?;
    validate(&config, family)?;
    Ok(config)
}

/// Recursively validate `config` as a member of `family`.
pub fn validate(config: &PolicyConfig, family: Family) -> Result<(), ValidationError> {
    if let Some(ty) = config.module_type() {
        if !family.admits(ty) {
            return Err(ValidationError::NotInFamily {
                module_type: ty,
                family,
            });
        }
    }

    match config {
        PolicyConfig::AddressRef(_) => Ok(()),
        PolicyConfig::Multisig(m) => {
            check_threshold(m.kind.module_type(), m.threshold, m.validators.len())?;
            let mut seen = BTreeSet::new();
            for v in &m.validators {
                if !seen.insert(*v) {
                    return Err(ValidationError::DuplicateValidator { address: *v });
                }
            }
            Ok(())
        }
        PolicyConfig::Aggregation(a) => {
            check_threshold(ModuleType::Aggregation, a.threshold, a.children.len())?;
            a.children.iter().try_for_each(|c| validate(c, family))
        }
        PolicyConfig::Routing(r) => {
            for sub in r.domains.values() {
                validate(sub, family)?;
            }
            match &r.fallback {
                Some(fallback) => validate(fallback, family),
                None => Ok(()),
            }
        }
        PolicyConfig::ProtocolFee(p) if p.fee > p.max_fee => Err(ValidationError::malformed(
            ModuleType::ProtocolFee.tag(),
            format!("fee {} exceeds max_fee {}", p.fee, p.max_fee),
        )),
        PolicyConfig::Pausable(_)
        | PolicyConfig::TrustedRelayer(_)
        | PolicyConfig::NativeBridgeAttestation(_)
        | PolicyConfig::TestAlwaysPass
        | PolicyConfig::MerkleTree
        | PolicyConfig::ProtocolFee(_)
        | PolicyConfig::GasMeter(_) => Ok(()),
    }
}

fn check_threshold(
    module_type: ModuleType,
    threshold: u8,
    cardinality: usize,
) -> Result<(), ValidationError> {
    if threshold == 0 || usize::from(threshold) > cardinality {
        return Err(ValidationError::ThresholdOutOfRange {
            module_type,
            threshold,
            cardinality,
        });
    }
    Ok(())
}
