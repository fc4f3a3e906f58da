// config.rs — The PolicyConfig tree.
//
// A PolicyConfig is a closed, recursive tagged union describing what a policy
// module (and everything it references) should look like. Values are
// immutable: every consumer (reader, differ, deployer) matches exhaustively,
// so adding a variant is a compile error everywhere it matters.
//
// Serialized form:
//   - AddressRef       → bare "0x…" string
//   - everything else  → object with a snake_case `type` discriminant
//
// Parsing goes through `serde_json::Value` so YAML and JSON documents share
// one code path and unknown discriminants produce a typed error instead of
// serde's generic "did not match any variant".

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::address::Address;
use crate::domain::DomainId;
use crate::error::ValidationError;
use crate::module_type::ModuleType;

/// Which commitment a multisig's validators sign over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultisigKind {
    /// Validators sign a merkle root; metadata carries an inclusion proof.
    RootBased,
    /// Validators sign the message id directly.
    MessageIdBased,
}

impl MultisigKind {
    pub fn module_type(self) -> ModuleType {
        match self {
            MultisigKind::RootBased => ModuleType::MerkleRootMultisig,
            MultisigKind::MessageIdBased => ModuleType::MessageIdMultisig,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigConfig {
    pub kind: MultisigKind,
    pub validators: Vec<Address>,
    pub threshold: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationConfig {
    pub children: Vec<PolicyConfig>,
    pub threshold: u8,
}

/// Per-domain routing. `fallback: Some(_)` is the fallback-routing variant;
/// `None` is strict routing (unknown origins are rejected).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub owner: Address,
    /// Keyed by chain name; resolved through the ChainRegistry.
    pub domains: BTreeMap<String, PolicyConfig>,
    pub fallback: Option<Box<PolicyConfig>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PausableConfig {
    pub owner: Address,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustedRelayerConfig {
    pub relayer: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NativeBridgeConfig {
    pub bridge: Address,
    pub counterpart_domain: DomainId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolFeeConfig {
    pub owner: Address,
    pub beneficiary: Address,
    #[serde(with = "crate::amount")]
    pub max_fee: u128,
    #[serde(with = "crate::amount")]
    pub fee: u128,
}

/// Gas parameters for one remote domain of a gas meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GasParams {
    pub overhead_gas: u64,
    #[serde(with = "crate::amount")]
    pub exchange_rate: u128,
    #[serde(with = "crate::amount")]
    pub gas_price: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GasMeterConfig {
    pub owner: Address,
    pub beneficiary: Address,
    /// Holder of the storage gas oracle(s) the meter reads prices from.
    pub oracle_owner: Address,
    /// Keyed by chain name; resolved through the ChainRegistry.
    #[serde(default)]
    pub remotes: BTreeMap<String, GasParams>,
}

/// A declarative policy module tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyConfig {
    /// An externally managed module. Never introspected further.
    AddressRef(Address),
    Multisig(MultisigConfig),
    Aggregation(AggregationConfig),
    Routing(RoutingConfig),
    Pausable(PausableConfig),
    TrustedRelayer(TrustedRelayerConfig),
    NativeBridgeAttestation(NativeBridgeConfig),
    TestAlwaysPass,
    MerkleTree,
    ProtocolFee(ProtocolFeeConfig),
    GasMeter(GasMeterConfig),
}

impl PolicyConfig {
    /// The on-chain type this config deploys as. `None` for AddressRef.
    pub fn module_type(&self) -> Option<ModuleType> {
        let ty = match self {
            PolicyConfig::AddressRef(_) => return None,
            PolicyConfig::Multisig(m) => m.kind.module_type(),
            PolicyConfig::Aggregation(_) => ModuleType::Aggregation,
            PolicyConfig::Routing(r) if r.fallback.is_some() => ModuleType::FallbackRouting,
            PolicyConfig::Routing(_) => ModuleType::Routing,
            PolicyConfig::Pausable(_) => ModuleType::Pausable,
            PolicyConfig::TrustedRelayer(_) => ModuleType::TrustedRelayer,
            PolicyConfig::NativeBridgeAttestation(_) => ModuleType::NativeBridgeAttestation,
            PolicyConfig::TestAlwaysPass => ModuleType::TestAlwaysPass,
            PolicyConfig::MerkleTree => ModuleType::MerkleTree,
            PolicyConfig::ProtocolFee(_) => ModuleType::ProtocolFee,
            PolicyConfig::GasMeter(_) => ModuleType::GasMeter,
        };
        Some(ty)
    }

    /// Human-readable kind, including "address" for references.
    pub fn kind_name(&self) -> &'static str {
        self.module_type().map(ModuleType::tag).unwrap_or("address")
    }

    /// The configured owner, for ownable variants.
    pub fn owner(&self) -> Option<Address> {
        match self {
            PolicyConfig::Routing(r) => Some(r.owner),
            PolicyConfig::Pausable(p) => Some(p.owner),
            PolicyConfig::ProtocolFee(p) => Some(p.owner),
            PolicyConfig::GasMeter(g) => Some(g.owner),
            PolicyConfig::AddressRef(_)
            | PolicyConfig::Multisig(_)
            | PolicyConfig::Aggregation(_)
            | PolicyConfig::TrustedRelayer(_)
            | PolicyConfig::NativeBridgeAttestation(_)
            | PolicyConfig::TestAlwaysPass
            | PolicyConfig::MerkleTree => None,
        }
    }

    pub fn as_address_ref(&self) -> Option<Address> {
        match self {
            PolicyConfig::AddressRef(a) => Some(*a),
            _ => None,
        }
    }

    /// Every address referenced via AddressRef anywhere in the tree.
    pub fn address_refs(&self) -> BTreeSet<Address> {
        let mut out = BTreeSet::new();
        self.collect_address_refs(&mut out);
        out
    }

    fn collect_address_refs(&self, out: &mut BTreeSet<Address>) {
        match self {
            PolicyConfig::AddressRef(a) => {
                out.insert(*a);
            }
            PolicyConfig::Aggregation(a) => {
                for child in &a.children {
                    child.collect_address_refs(out);
                }
            }
            PolicyConfig::Routing(r) => {
                for sub in r.domains.values() {
                    sub.collect_address_refs(out);
                }
                if let Some(fallback) = &r.fallback {
                    fallback.collect_address_refs(out);
                }
            }
            PolicyConfig::Multisig(_)
            | PolicyConfig::Pausable(_)
            | PolicyConfig::TrustedRelayer(_)
            | PolicyConfig::NativeBridgeAttestation(_)
            | PolicyConfig::TestAlwaysPass
            | PolicyConfig::MerkleTree
            | PolicyConfig::ProtocolFee(_)
            | PolicyConfig::GasMeter(_) => {}
        }
    }

    // ── Parsing ──

    /// Parse a YAML (or JSON, which is valid YAML) policy document.
    pub fn from_yaml_str(input: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_yaml::from_str(input)
            .map_err(|e| ValidationError::malformed("policy document", e))?;
        Self::from_value(&value)
    }

    pub fn from_json_str(input: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| ValidationError::malformed("policy document", e))?;
        Self::from_value(&value)
    }

    /// Parse the tagged structure. Only shape is checked here; semantic
    /// rules (thresholds, duplicates, family) live in `validate`.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let map = match value {
            Value::String(s) => return Ok(PolicyConfig::AddressRef(s.parse()?)),
            Value::Object(map) => map,
            other => {
                return Err(ValidationError::malformed(
                    "policy config",
                    format!("expected address string or object, found {}", other),
                ))
            }
        };

        let tag = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::malformed("policy config", "missing `type` field"))?;

        let config = match tag {
            "merkle_root_multisig" => parse_multisig(MultisigKind::RootBased, map)?,
            "message_id_multisig" => parse_multisig(MultisigKind::MessageIdBased, map)?,
            "aggregation" => parse_aggregation(map)?,
            "routing" => parse_routing(false, map)?,
            "fallback_routing" => parse_routing(true, map)?,
            "pausable" => PolicyConfig::Pausable(parse_payload(ModuleType::Pausable, map)?),
            "trusted_relayer" => {
                PolicyConfig::TrustedRelayer(parse_payload(ModuleType::TrustedRelayer, map)?)
            }
            "native_bridge_attestation" => PolicyConfig::NativeBridgeAttestation(parse_payload(
                ModuleType::NativeBridgeAttestation,
                map,
            )?),
            "test_always_pass" => {
                expect_no_fields(ModuleType::TestAlwaysPass, map)?;
                PolicyConfig::TestAlwaysPass
            }
            "merkle_tree" => {
                expect_no_fields(ModuleType::MerkleTree, map)?;
                PolicyConfig::MerkleTree
            }
            "protocol_fee" => PolicyConfig::ProtocolFee(parse_payload(ModuleType::ProtocolFee, map)?),
            "gas_meter" => PolicyConfig::GasMeter(parse_payload(ModuleType::GasMeter, map)?),
            other => {
                return Err(ValidationError::UnknownType {
                    tag: other.to_string(),
                })
            }
        };
        Ok(config)
    }

    // ── Serialization ──

    pub fn to_value(&self) -> Value {
        match self {
            PolicyConfig::AddressRef(a) => Value::String(a.to_string()),
            PolicyConfig::Multisig(m) => json!({
                "type": m.kind.module_type().tag(),
                "validators": m.validators.iter().map(Address::to_string).collect::<Vec<_>>(),
                "threshold": m.threshold,
            }),
            PolicyConfig::Aggregation(a) => json!({
                "type": ModuleType::Aggregation.tag(),
                "children": a.children.iter().map(PolicyConfig::to_value).collect::<Vec<_>>(),
                "threshold": a.threshold,
            }),
            PolicyConfig::Routing(r) => {
                let domains: Map<String, Value> = r
                    .domains
                    .iter()
                    .map(|(name, sub)| (name.clone(), sub.to_value()))
                    .collect();
                let mut obj = json!({
                    "type": self.kind_name(),
                    "owner": r.owner.to_string(),
                    "domains": domains,
                });
                if let (Some(fallback), Value::Object(map)) = (&r.fallback, &mut obj) {
                    map.insert("fallback".to_string(), fallback.to_value());
                }
                obj
            }
            PolicyConfig::Pausable(p) => json!({
                "type": ModuleType::Pausable.tag(),
                "owner": p.owner.to_string(),
                "paused": p.paused,
            }),
            PolicyConfig::TrustedRelayer(t) => json!({
                "type": ModuleType::TrustedRelayer.tag(),
                "relayer": t.relayer.to_string(),
            }),
            PolicyConfig::NativeBridgeAttestation(n) => json!({
                "type": ModuleType::NativeBridgeAttestation.tag(),
                "bridge": n.bridge.to_string(),
                "counterpart_domain": n.counterpart_domain.0,
            }),
            PolicyConfig::TestAlwaysPass => json!({ "type": ModuleType::TestAlwaysPass.tag() }),
            PolicyConfig::MerkleTree => json!({ "type": ModuleType::MerkleTree.tag() }),
            PolicyConfig::ProtocolFee(p) => json!({
                "type": ModuleType::ProtocolFee.tag(),
                "owner": p.owner.to_string(),
                "beneficiary": p.beneficiary.to_string(),
                "max_fee": p.max_fee.to_string(),
                "fee": p.fee.to_string(),
            }),
            PolicyConfig::GasMeter(g) => {
                let remotes: Map<String, Value> = g
                    .remotes
                    .iter()
                    .map(|(name, params)| {
                        (
                            name.clone(),
                            json!({
                                "overhead_gas": params.overhead_gas,
                                "exchange_rate": params.exchange_rate.to_string(),
                                "gas_price": params.gas_price.to_string(),
                            }),
                        )
                    })
                    .collect();
                json!({
                    "type": ModuleType::GasMeter.tag(),
                    "owner": g.owner.to_string(),
                    "beneficiary": g.beneficiary.to_string(),
                    "oracle_owner": g.oracle_owner.to_string(),
                    "remotes": remotes,
                })
            }
        }
    }

    /// Canonical JSON text. Object keys are sorted (serde_json's default map),
    /// so this is stable and usable as a sort key.
    pub fn canonical_json(&self) -> String {
        self.to_value().to_string()
    }
}

impl Serialize for PolicyConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PolicyConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        PolicyConfig::from_value(&value).map_err(serde::de::Error::custom)
    }
}

// ── Parse helpers ──

fn without_type(map: &Map<String, Value>) -> Map<String, Value> {
    let mut m = map.clone();
    m.remove("type");
    m
}

fn parse_payload<T: DeserializeOwned>(
    ty: ModuleType,
    map: &Map<String, Value>,
) -> Result<T, ValidationError> {
    serde_json::from_value(Value::Object(without_type(map)))
        .map_err(|e| ValidationError::malformed(ty.tag(), e))
}

fn expect_no_fields(ty: ModuleType, map: &Map<String, Value>) -> Result<(), ValidationError> {
    match without_type(map).keys().next() {
        Some(extra) => Err(ValidationError::malformed(
            ty.tag(),
            format!("unexpected field `{}`", extra),
        )),
        None => Ok(()),
    }
}

fn field<'a>(ty: ModuleType, map: &'a Map<String, Value>, name: &str) -> Result<&'a Value, ValidationError> {
    map.get(name)
        .ok_or_else(|| ValidationError::malformed(ty.tag(), format!("missing field `{}`", name)))
}

fn parse_address_field(
    ty: ModuleType,
    map: &Map<String, Value>,
    name: &str,
) -> Result<Address, ValidationError> {
    match field(ty, map, name)? {
        Value::String(s) => s.parse(),
        other => Err(ValidationError::malformed(
            ty.tag(),
            format!("`{}` must be an address string, found {}", name, other),
        )),
    }
}

fn parse_threshold(ty: ModuleType, value: &Value) -> Result<u8, ValidationError> {
    value
        .as_u64()
        .and_then(|t| u8::try_from(t).ok())
        .ok_or_else(|| {
            ValidationError::malformed(ty.tag(), format!("threshold must fit in 0..=255, found {}", value))
        })
}

fn parse_multisig(kind: MultisigKind, map: &Map<String, Value>) -> Result<PolicyConfig, ValidationError> {
    let ty = kind.module_type();
    let validators = match field(ty, map, "validators")? {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.parse::<Address>(),
                other => Err(ValidationError::malformed(
                    ty.tag(),
                    format!("validator must be an address string, found {}", other),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(ValidationError::malformed(
                ty.tag(),
                format!("`validators` must be a list, found {}", other),
            ))
        }
    };
    let threshold = parse_threshold(ty, field(ty, map, "threshold")?)?;
    if let Some(extra) = without_type(map)
        .keys()
        .find(|k| *k != "validators" && *k != "threshold")
    {
        return Err(ValidationError::malformed(ty.tag(), format!("unexpected field `{}`", extra)));
    }
    Ok(PolicyConfig::Multisig(MultisigConfig {
        kind,
        validators,
        threshold,
    }))
}

fn parse_aggregation(map: &Map<String, Value>) -> Result<PolicyConfig, ValidationError> {
    let ty = ModuleType::Aggregation;
    // `modules` and `hooks` are accepted as synonyms for `children`.
    let raw_children = ["children", "modules", "hooks"]
        .iter()
        .find_map(|k| map.get(*k))
        .ok_or_else(|| ValidationError::malformed(ty.tag(), "missing field `children`"))?;
    let children = match raw_children {
        Value::Array(items) => items
            .iter()
            .map(PolicyConfig::from_value)
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(ValidationError::malformed(
                ty.tag(),
                format!("`children` must be a list, found {}", other),
            ))
        }
    };
    // Omitted threshold means every child must approve.
    let threshold = match map.get("threshold") {
        Some(v) => parse_threshold(ty, v)?,
        None => u8::try_from(children.len()).map_err(|_| {
            ValidationError::malformed(ty.tag(), "more than 255 children")
        })?,
    };
    Ok(PolicyConfig::Aggregation(AggregationConfig { children, threshold }))
}

fn parse_routing(with_fallback: bool, map: &Map<String, Value>) -> Result<PolicyConfig, ValidationError> {
    let ty = if with_fallback {
        ModuleType::FallbackRouting
    } else {
        ModuleType::Routing
    };
    let owner = parse_address_field(ty, map, "owner")?;

    let mut domains = BTreeMap::new();
    match map.get("domains") {
        None | Some(Value::Null) => {}
        Some(Value::Object(entries)) => {
            for (name, sub) in entries {
                domains.insert(name.clone(), PolicyConfig::from_value(sub)?);
            }
        }
        Some(other) => {
            return Err(ValidationError::malformed(
                ty.tag(),
                format!("`domains` must be a map of chain name to config, found {}", other),
            ))
        }
    }

    let fallback = match (with_fallback, map.get("fallback")) {
        (true, Some(v)) => Some(Box::new(PolicyConfig::from_value(v)?)),
        (true, None) => {
            return Err(ValidationError::malformed(ty.tag(), "missing field `fallback`"))
        }
        (false, Some(_)) => {
            return Err(ValidationError::malformed(
                ty.tag(),
                "`fallback` is only valid on fallback_routing",
            ))
        }
        (false, None) => None,
    };

    Ok(PolicyConfig::Routing(RoutingConfig {
        owner,
        domains,
        fallback,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = "0x1111111111111111111111111111111111111111";
    const V2: &str = "0x2222222222222222222222222222222222222222";
    const OWNER: &str = "0x00000000000000000000000000000000000000aa";

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn parses_nested_yaml_document() {
        let doc = format!(
            r#"
type: fallback_routing
owner: "{OWNER}"
domains:
  alpha:
    type: aggregation
    threshold: 1
    children:
      - type: message_id_multisig
        validators: ["{V1}", "{V2}"]
        threshold: 2
      - type: test_always_pass
  beta: "{V1}"
fallback:
  type: trusted_relayer
  relayer: "{V2}"
"#
        );
        let config = PolicyConfig::from_yaml_str(&doc).unwrap();
        assert_eq!(config.module_type(), Some(ModuleType::FallbackRouting));
        assert_eq!(config.owner(), Some(addr(OWNER)));

        let PolicyConfig::Routing(routing) = &config else {
            panic!("expected routing, got {:?}", config);
        };
        assert_eq!(routing.domains.len(), 2);
        assert_eq!(routing.domains["beta"], PolicyConfig::AddressRef(addr(V1)));
        assert!(matches!(
            routing.fallback.as_deref(),
            Some(PolicyConfig::TrustedRelayer(_))
        ));
    }

    #[test]
    fn unknown_discriminant_is_typed_error() {
        let err = PolicyConfig::from_json_str(r#"{"type":"legacy_multisig"}"#).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownType {
                tag: "legacy_multisig".to_string()
            }
        );
    }

    #[test]
    fn unknown_discriminant_nested_keeps_type() {
        let doc = format!(
            r#"{{"type":"routing","owner":"{OWNER}","domains":{{"alpha":{{"type":"mystery"}}}}}}"#
        );
        let err = PolicyConfig::from_json_str(&doc).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownType { .. }));
    }

    #[test]
    fn fallback_only_on_fallback_routing() {
        let doc = format!(
            r#"{{"type":"routing","owner":"{OWNER}","domains":{{}},"fallback":"{V1}"}}"#
        );
        assert!(PolicyConfig::from_json_str(&doc).is_err());

        let doc = format!(r#"{{"type":"fallback_routing","owner":"{OWNER}","domains":{{}}}}"#);
        assert!(PolicyConfig::from_json_str(&doc).is_err());
    }

    #[test]
    fn hook_aggregation_threshold_defaults_to_all() {
        let config = PolicyConfig::from_yaml_str(
            "type: aggregation\nhooks:\n  - type: merkle_tree\n  - type: merkle_tree\n",
        )
        .unwrap();
        let PolicyConfig::Aggregation(agg) = config else {
            panic!("expected aggregation");
        };
        assert_eq!(agg.threshold, 2);
    }

    #[test]
    fn leaf_rejects_unknown_fields() {
        let doc = format!(r#"{{"type":"pausable","owner":"{OWNER}","pasued":true}}"#);
        let err = PolicyConfig::from_json_str(&doc).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { .. }));

        let err = PolicyConfig::from_json_str(r#"{"type":"merkle_tree","extra":1}"#).unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn serialize_then_parse_gas_meter_preserves_amounts() {
        let mut remotes = BTreeMap::new();
        remotes.insert(
            "alpha".to_string(),
            GasParams {
                overhead_gas: 150_000,
                exchange_rate: 10_000_000_000,
                gas_price: u128::MAX,
            },
        );
        let config = PolicyConfig::GasMeter(GasMeterConfig {
            owner: addr(OWNER),
            beneficiary: addr(V1),
            oracle_owner: addr(V2),
            remotes,
        });
        let json = serde_json::to_string(&config).unwrap();
        let back: PolicyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn address_refs_are_collected_recursively() {
        let doc = format!(
            r#"{{"type":"aggregation","threshold":1,"children":["{V1}",{{"type":"routing","owner":"{OWNER}","domains":{{"alpha":"{V2}"}}}}]}}"#
        );
        let config = PolicyConfig::from_json_str(&doc).unwrap();
        let refs = config.address_refs();
        assert!(refs.contains(&addr(V1)));
        assert!(refs.contains(&addr(V2)));
        assert!(!refs.contains(&addr(OWNER)));
    }

    #[test]
    fn address_ref_has_no_module_type() {
        let config = PolicyConfig::from_json_str(&format!("\"{V1}\"")).unwrap();
        assert_eq!(config.module_type(), None);
        assert_eq!(config.kind_name(), "address");
        assert_eq!(config.as_address_ref(), Some(addr(V1)));
    }
}
