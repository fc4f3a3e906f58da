// error.rs — Error types for the policy configuration model.
//
// ValidationError covers everything that can be wrong with a declared target
// before any chain is touched. ConfigError covers loading polis.toml.

use std::path::PathBuf;

use thiserror::Error;

use crate::address::Address;
use crate::family::Family;
use crate::module_type::ModuleType;

/// A malformed policy configuration.
///
/// Always surfaced before any chain interaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The `type` discriminant names no known variant.
    #[error("unknown policy type '{tag}'")]
    UnknownType { tag: String },

    /// The document is structurally wrong (missing field, wrong shape).
    #[error("malformed {context}: {reason}")]
    Malformed { context: String, reason: String },

    /// A string could not be parsed as a 20-byte hex address.
    #[error("invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    /// Threshold outside `[1, cardinality]`.
    #[error("{module_type} threshold {threshold} out of range 1..={cardinality}")]
    ThresholdOutOfRange {
        module_type: ModuleType,
        threshold: u8,
        cardinality: usize,
    },

    /// The same validator appears twice in one multisig set.
    #[error("duplicate validator {address}")]
    DuplicateValidator { address: Address },

    /// The variant is not admitted by the family being configured
    /// (e.g. a gas meter inside a security policy).
    #[error("{module_type} is not a valid {family}")]
    NotInFamily {
        module_type: ModuleType,
        family: Family,
    },
}

impl ValidationError {
    pub(crate) fn malformed(context: impl Into<String>, reason: impl ToString) -> Self {
        ValidationError::Malformed {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors loading the workspace configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected schema.
    #[error("failed to parse config at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Two registry entries claim the same name or domain id.
    #[error("chain registry conflict: {0}")]
    RegistryConflict(String),
}
