// mutation.rs — The write surface: one variant per atomic module transaction.

use std::fmt;

use polis_core::{Address, DomainId};
use serde::{Deserialize, Serialize};

/// A single state-changing call against an existing module.
///
/// Each mutation is one transaction; ordering across a list of mutations is
/// significant and must be preserved by whoever submits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Mutation {
    /// Point `domain` at `submodule` on a routing module.
    SetSubmodule {
        module: Address,
        domain: DomainId,
        submodule: Address,
    },
    /// Drop `domain` from a routing module.
    RemoveDomain { module: Address, domain: DomainId },
    SetPaused { module: Address, paused: bool },
    TransferOwnership { module: Address, new_owner: Address },
    /// Gas meter row. A zero `oracle` clears the row.
    SetOverheadAndOracle {
        module: Address,
        domain: DomainId,
        overhead: u64,
        oracle: Address,
    },
    /// Gas oracle row.
    SetRemoteGasData {
        oracle: Address,
        domain: DomainId,
        #[serde(with = "polis_core::amount")]
        exchange_rate: u128,
        #[serde(with = "polis_core::amount")]
        gas_price: u128,
    },
    SetFee {
        module: Address,
        #[serde(with = "polis_core::amount")]
        fee: u128,
    },
    SetBeneficiary { module: Address, beneficiary: Address },
}

impl Mutation {
    /// The contract the transaction is sent to.
    pub fn target(&self) -> Address {
        match self {
            Mutation::SetSubmodule { module, .. }
            | Mutation::RemoveDomain { module, .. }
            | Mutation::SetPaused { module, .. }
            | Mutation::TransferOwnership { module, .. }
            | Mutation::SetOverheadAndOracle { module, .. }
            | Mutation::SetFee { module, .. }
            | Mutation::SetBeneficiary { module, .. } => *module,
            Mutation::SetRemoteGasData { oracle, .. } => *oracle,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::SetSubmodule { .. } => "set_submodule",
            Mutation::RemoveDomain { .. } => "remove_domain",
            Mutation::SetPaused { .. } => "set_paused",
            Mutation::TransferOwnership { .. } => "transfer_ownership",
            Mutation::SetOverheadAndOracle { .. } => "set_overhead_and_oracle",
            Mutation::SetRemoteGasData { .. } => "set_remote_gas_data",
            Mutation::SetFee { .. } => "set_fee",
            Mutation::SetBeneficiary { .. } => "set_beneficiary",
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::SetSubmodule {
                module,
                domain,
                submodule,
            } => write!(f, "{}.set_submodule({}, {})", module, domain, submodule),
            Mutation::RemoveDomain { module, domain } => {
                write!(f, "{}.remove_domain({})", module, domain)
            }
            Mutation::SetPaused { module, paused } => write!(f, "{}.set_paused({})", module, paused),
            Mutation::TransferOwnership { module, new_owner } => {
                write!(f, "{}.transfer_ownership({})", module, new_owner)
            }
            Mutation::SetOverheadAndOracle {
                module,
                domain,
                overhead,
                oracle,
            } => write!(
                f,
                "{}.set_overhead_and_oracle({}, {}, {})",
                module, domain, overhead, oracle
            ),
            Mutation::SetRemoteGasData {
                oracle,
                domain,
                exchange_rate,
                gas_price,
            } => write!(
                f,
                "{}.set_remote_gas_data({}, {}, {})",
                oracle, domain, exchange_rate, gas_price
            ),
            Mutation::SetFee { module, fee } => write!(f, "{}.set_fee({})", module, fee),
            Mutation::SetBeneficiary {
                module,
                beneficiary,
            } => write!(f, "{}.set_beneficiary({})", module, beneficiary),
        }
    }
}

/// Inclusion receipt for a submitted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub block: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_json_form() {
        let m = Mutation::SetFee {
            module: Address::from_bytes([1; 20]),
            fee: 7,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["call"], "set_fee");
        assert_eq!(json["fee"], "7");
    }

    #[test]
    fn oracle_write_targets_oracle() {
        let oracle = Address::from_bytes([9; 20]);
        let m = Mutation::SetRemoteGasData {
            oracle,
            domain: DomainId(1),
            exchange_rate: 1,
            gas_price: 2,
        };
        assert_eq!(m.target(), oracle);
        assert!(m.to_string().contains("set_remote_gas_data(1, 1, 2)"));
    }
}
