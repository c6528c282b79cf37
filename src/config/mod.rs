//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, or legacy flat JSON)
//!     → loader.rs (parse & deserialize; legacy.rs converts flat JSON)
//!     → command-line overrides (binary only)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed by value / Arc to each component constructor
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; no component reads global state
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod legacy;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{
    ArchiveConfig, FallbackMode, GatewayConfig, InterpreterConfig, LegacyConfig, MimeConfig,
    MimeTable, ObservabilityConfig, ProxyListenerConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
