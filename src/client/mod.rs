//! Per-call orchestration.
//!
//! # Data Flow
//! ```text
//! caller
//!     → context.rs get_server_from_load_balancer (explicit host, or LoadBalancer::choose_server)
//!     → context.rs note_open_connection (active count +1)
//!     → transport call (outside this crate)
//!     → context.rs note_request_completion / note_error
//!         → ServerStats (counters, failure window, streak)
//!         → RetryHandler classification
//!         → LoadBalancer mark_server_temp_down / mark_server_ready
//!
//! command.rs wraps the whole sequence with the retry budget.
//! ```
//!
//! # Design Decisions
//! - The context owns no server state, only handles to the balancer and handler
//! - Resolution failures are always surfaced, never replaced by another server

pub mod command;
pub mod context;

pub use command::{CommandError, LoadBalancerCommand};
pub use context::LoadBalancerContext;
