//! Client-side load balancing with circuit breaking and retry classification.
//!
//! # Architecture Overview
//!
//! ```text
//!     caller ──► client::LoadBalancerCommand ──► client::LoadBalancerContext
//!                                                    │
//!                    ┌───────────────────────────────┼──────────────────────────┐
//!                    ▼                               ▼                          ▼
//!          load_balancer::LoadBalancer     load_balancer::ServerStats   resilience::RetryHandler
//!           (Rule over reachable set)       (counters, window, breaker)   (classification, budget)
//!                    │
//!        ┌───────────┴────────────┐
//!        ▼                        ▼
//!   lifecycle::Scheduler    lifecycle::Scheduler
//!   (server-list refresh)   (health probing)
//!        │                        │
//!        ▼                        ▼
//!   discovery::ServerListSource  health::{PingStrategy, Ping}
//! ```
//!
//! The transport that executes calls, service discovery backends and
//! configuration sources stay outside the crate; everything here consumes a
//! resolved `ClientConfig`.

// Core subsystems
pub mod config;
pub mod error;
pub mod load_balancer;

// Health and membership
pub mod discovery;
pub mod health;

// Per-call orchestration
pub mod client;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use client::{CommandError, LoadBalancerCommand, LoadBalancerContext};
pub use config::ClientConfig;
pub use error::{BalancerError, CallError, ErrorClass};
pub use lifecycle::Scheduler;
pub use load_balancer::{LoadBalancer, Server, ServerStats};
pub use resilience::retries::{DefaultRetryHandler, RetryHandler};
