// family.rs — The two module families the reconciler is instantiated over.
//
// Security policies and dispatch hooks share one PolicyConfig type and one
// reconcile algorithm, but admit different leaf sets and differ in which
// kinds can be updated in place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::module_type::ModuleType;

/// Runtime name of a module family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Consulted before an incoming message is accepted.
    SecurityPolicy,
    /// Invoked when a message is sent.
    DispatchHook,
}

impl Family {
    /// Whether a config of this type may appear anywhere in this family's tree.
    pub fn admits(self, ty: ModuleType) -> bool {
        use ModuleType::*;
        match self {
            Family::SecurityPolicy => matches!(
                ty,
                MerkleRootMultisig
                    | MessageIdMultisig
                    | Aggregation
                    | Routing
                    | FallbackRouting
                    | Pausable
                    | TrustedRelayer
                    | NativeBridgeAttestation
                    | TestAlwaysPass
            ),
            Family::DispatchHook => matches!(
                ty,
                Aggregation
                    | Routing
                    | FallbackRouting
                    | Pausable
                    | MerkleTree
                    | ProtocolFee
                    | GasMeter
            ),
        }
    }

    /// Whether an existing module of this type can be converged with
    /// mutation calls instead of a fresh deployment.
    pub fn is_mutable(self, ty: ModuleType) -> bool {
        use ModuleType::*;
        match self {
            Family::SecurityPolicy => matches!(ty, Pausable | Routing | FallbackRouting),
            Family::DispatchHook => {
                matches!(ty, Pausable | Routing | FallbackRouting | ProtocolFee | GasMeter)
            }
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::SecurityPolicy => write!(f, "security policy"),
            Family::DispatchHook => write!(f, "dispatch hook"),
        }
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "security" | "security_policy" | "ism" => Ok(Family::SecurityPolicy),
            "hook" | "dispatch_hook" => Ok(Family::DispatchHook),
            other => Err(format!("unknown family '{}': expected security or hook", other)),
        }
    }
}

/// Compile-time family marker; `Reconciler<F>` is generic over it.
pub trait PolicyFamily: Send + Sync + 'static {
    const FAMILY: Family;
}

/// Marker for security policy reconciliation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityPolicies;

/// Marker for dispatch hook reconciliation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchHooks;

impl PolicyFamily for SecurityPolicies {
    const FAMILY: Family = Family::SecurityPolicy;
}

impl PolicyFamily for DispatchHooks {
    const FAMILY: Family = Family::DispatchHook;
}
