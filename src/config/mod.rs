//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or ClientConfig built in code
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → handed to RequestExecutor, which builds pool/breaker/timeouts/retry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a component is built from it
//! - All fields have public defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, ClientConfig, ObservabilityConfig, PoolConfig, RetryConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
