//! Server-list discovery.
//!
//! # Data Flow
//! ```text
//! refresh tick
//!     → ServerListSource::server_list
//!         - static_list.rs (configured entries)
//!         - file_list.rs (TOML file, re-read every call)
//!     → parse_entries (invalid entries skipped with a warning)
//!     → LoadBalancer::set_servers
//! ```
//!
//! # Design Decisions
//! - The balancer only consumes a source; it never discovers servers itself
//! - A failing source leaves the current membership untouched

pub mod file_list;
pub mod static_list;

use std::sync::Arc;
use async_trait::async_trait;

use crate::config::ClientConfig;
use crate::error::DiscoveryError;
use crate::load_balancer::Server;

pub use file_list::FileServerList;
pub use static_list::StaticServerList;

/// Yields the current set of servers for one client.
#[async_trait]
pub trait ServerListSource: Send + Sync + std::fmt::Debug {
    async fn server_list(&self) -> Result<Vec<Server>, DiscoveryError>;
}

/// Parse discovery entries, skipping (and logging) the invalid ones.
/// Entries without a port take `default_port` when set.
pub fn parse_entries<S: AsRef<str>>(entries: &[S], default_port: Option<u16>) -> Vec<Server> {
    let mut servers: Vec<Server> = Vec::with_capacity(entries.len());
    for entry in entries {
        match Server::parse_with_default_port(entry.as_ref(), default_port) {
            Ok(server) => {
                if !servers.contains(&server) {
                    servers.push(server);
                }
            }
            Err(e) => {
                tracing::warn!(entry = %entry.as_ref(), error = %e, "Skipping invalid server entry");
            }
        }
    }
    servers
}

/// Build the source named by configuration: the server-list file when set,
/// the static list otherwise.
pub fn source_from_config(config: &ClientConfig) -> Arc<dyn ServerListSource> {
    match &config.server_list_file {
        Some(path) => Arc::new(FileServerList::new(path).with_default_port(config.default_port)),
        None => Arc::new(StaticServerList::from_config(config)),
    }
}
