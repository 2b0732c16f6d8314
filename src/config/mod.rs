//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → passed by reference to LoadBalancer / RetryHandler / Context constructors
//! ```
//!
//! # Design Decisions
//! - Config is a plain value handed to constructors, never a process global
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ClientConfig;
pub use schema::ObservabilityConfig;
pub use schema::PingStrategyKind;
pub use schema::RuleKind;
