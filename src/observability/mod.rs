//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing macros (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers (installed by the binary only):
//!     → logging.rs (fmt subscriber with env filter)
//!     → metrics.rs init_metrics (Prometheus scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber or recorder itself
//! - Without a recorder every metric call is a no-op
//! - Labels are the client name and the server `host:port`

pub mod logging;
pub mod metrics;
