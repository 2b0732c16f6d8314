//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! LoadBalancer::start
//!     → scheduler.rs (server-list refresh loop)
//!     → scheduler.rs (health probe loop)
//!
//! LoadBalancer::shutdown / drop
//!     → Scheduler::cancel on both loops
//! ```
//!
//! # Design Decisions
//! - Background loops are owned by the component that starts them
//! - Shutdown is explicit and deterministic, never tied to collection
//! - A loop never blocks on the work it dispatches

pub mod scheduler;

pub use scheduler::{OverlapPolicy, Scheduler};
