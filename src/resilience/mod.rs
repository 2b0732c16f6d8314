//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call completes with an error:
//!     → retries.rs (classify: circuit-tripping? retriable here / elsewhere?)
//!     → failure_window.rs (count the failure in the sliding window)
//!     → circuit_breaker.rs (streak + blackout decide whether the server trips)
//! ```
//!
//! # Design Decisions
//! - Classification is pure and deterministic for a given error value
//! - Retries only for idempotent calls unless configured otherwise
//! - Application errors never penalize a server's circuit
//! - Timeouts belong to the transport; nothing here enforces one

pub mod circuit_breaker;
pub mod failure_window;
pub mod retries;
