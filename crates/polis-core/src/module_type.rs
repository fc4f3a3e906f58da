// module_type.rs — On-chain type discriminants.
//
// Every deployed policy module answers `typeTag()` with one of these values.
// The numbering is part of the on-chain ABI and must never be reused:
// 3 was the legacy multisig and is deliberately unsupported.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The concrete kind of a policy module, as reported on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Routing,
    Aggregation,
    MerkleRootMultisig,
    MessageIdMultisig,
    FallbackRouting,
    Pausable,
    TrustedRelayer,
    NativeBridgeAttestation,
    TestAlwaysPass,
    MerkleTree,
    ProtocolFee,
    GasMeter,
    /// Not a policy module itself: the storage oracle a gas meter points at.
    GasOracle,
}

impl ModuleType {
    /// Decode the on-chain discriminant. `None` means unsupported.
    pub fn from_discriminant(tag: u8) -> Option<Self> {
        let ty = match tag {
            1 => ModuleType::Routing,
            2 => ModuleType::Aggregation,
            4 => ModuleType::MerkleRootMultisig,
            5 => ModuleType::MessageIdMultisig,
            7 => ModuleType::FallbackRouting,
            8 => ModuleType::Pausable,
            9 => ModuleType::TrustedRelayer,
            10 => ModuleType::NativeBridgeAttestation,
            11 => ModuleType::TestAlwaysPass,
            12 => ModuleType::MerkleTree,
            13 => ModuleType::ProtocolFee,
            14 => ModuleType::GasMeter,
            15 => ModuleType::GasOracle,
            _ => return None,
        };
        Some(ty)
    }

    pub fn discriminant(self) -> u8 {
        match self {
            ModuleType::Routing => 1,
            ModuleType::Aggregation => 2,
            ModuleType::MerkleRootMultisig => 4,
            ModuleType::MessageIdMultisig => 5,
            ModuleType::FallbackRouting => 7,
            ModuleType::Pausable => 8,
            ModuleType::TrustedRelayer => 9,
            ModuleType::NativeBridgeAttestation => 10,
            ModuleType::TestAlwaysPass => 11,
            ModuleType::MerkleTree => 12,
            ModuleType::ProtocolFee => 13,
            ModuleType::GasMeter => 14,
            ModuleType::GasOracle => 15,
        }
    }

    /// The serialized `type` tag used in policy documents.
    pub fn tag(self) -> &'static str {
        match self {
            ModuleType::Routing => "routing",
            ModuleType::Aggregation => "aggregation",
            ModuleType::MerkleRootMultisig => "merkle_root_multisig",
            ModuleType::MessageIdMultisig => "message_id_multisig",
            ModuleType::FallbackRouting => "fallback_routing",
            ModuleType::Pausable => "pausable",
            ModuleType::TrustedRelayer => "trusted_relayer",
            ModuleType::NativeBridgeAttestation => "native_bridge_attestation",
            ModuleType::TestAlwaysPass => "test_always_pass",
            ModuleType::MerkleTree => "merkle_tree",
            ModuleType::ProtocolFee => "protocol_fee",
            ModuleType::GasMeter => "gas_meter",
            ModuleType::GasOracle => "gas_oracle",
        }
    }

    /// Whether modules of this type have an `owner()`.
    pub fn is_ownable(self) -> bool {
        matches!(
            self,
            ModuleType::Routing
                | ModuleType::FallbackRouting
                | ModuleType::Pausable
                | ModuleType::ProtocolFee
                | ModuleType::GasMeter
                | ModuleType::GasOracle
        )
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[ModuleType] = &[
        ModuleType::Routing,
        ModuleType::Aggregation,
        ModuleType::MerkleRootMultisig,
        ModuleType::MessageIdMultisig,
        ModuleType::FallbackRouting,
        ModuleType::Pausable,
        ModuleType::TrustedRelayer,
        ModuleType::NativeBridgeAttestation,
        ModuleType::TestAlwaysPass,
        ModuleType::MerkleTree,
        ModuleType::ProtocolFee,
        ModuleType::GasMeter,
        ModuleType::GasOracle,
    ];

    #[test]
    fn discriminants_are_stable() {
        for ty in ALL {
            assert_eq!(ModuleType::from_discriminant(ty.discriminant()), Some(*ty));
        }
    }

    #[test]
    fn legacy_and_unknown_discriminants_unsupported() {
        assert_eq!(ModuleType::from_discriminant(0), None);
        assert_eq!(ModuleType::from_discriminant(3), None);
        assert_eq!(ModuleType::from_discriminant(200), None);
    }

    #[test]
    fn tag_matches_serde() {
        for ty in ALL {
            let json = serde_json::to_string(ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.tag()));
        }
    }
}
