//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Scheduler tick (LoadBalancer ping loop)
//!     → strategy.rs (serial or parallel fan-out)
//!     → ping.rs (URL ping / no-op)
//!     → LoadBalancer updates its ping-dead set
//!
//! Passive health checks (client::context):
//!     Call outcome observed
//!     → ServerStats failure counters
//!     → circuit breaker may mark the server temp-down
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are orthogonal; selection requires both to agree
//! - Ping liveness is driven solely by the latest probe result
//! - Probe errors mean "not alive" and never reach callers

pub mod active;
pub mod ping;
pub mod strategy;
