//! # polis-core
//!
//! The declarative policy model: a recursive [`PolicyConfig`] tree describing
//! security policies (consulted before a message is accepted) and dispatch
//! hooks (run when a message is sent), plus the rules that make two trees
//! comparable.
//!
//! - [`config`]: the tagged union and its YAML/JSON form
//! - [`validate`]: thresholds, duplicate validators, family admission
//! - [`normalize`]: canonical ordering and chain-registry filtering
//! - [`domain`]: domain ids and the [`ChainRegistry`]
//! - [`settings`]: the `polis.toml` workspace file
//!
//! Nothing here talks to a chain; see `polis-chain` and `polis-reconcile`.

pub mod address;
pub mod amount;
pub mod config;
pub mod domain;
pub mod error;
pub mod family;
pub mod module_type;
pub mod normalize;
pub mod settings;
pub mod validate;

pub use address::Address;
pub use config::{
    AggregationConfig, GasMeterConfig, GasParams, MultisigConfig, MultisigKind,
    NativeBridgeConfig, PausableConfig, PolicyConfig, ProtocolFeeConfig, RoutingConfig,
    TrustedRelayerConfig,
};
pub use domain::{ChainMetadata, ChainRegistry, DomainId};
pub use error::{ConfigError, ValidationError};
pub use family::{DispatchHooks, Family, PolicyFamily, SecurityPolicies};
pub use module_type::ModuleType;
pub use normalize::{normalize, normalized, Normalized};
pub use settings::{OperatorConfig, PolisConfig, ReaderConfig};
pub use validate::{parse_policy, validate};
