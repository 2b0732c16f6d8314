//! Fixed server list.

use async_trait::async_trait;

use crate::config::ClientConfig;
use crate::discovery::{parse_entries, ServerListSource};
use crate::error::DiscoveryError;
use crate::load_balancer::Server;

/// A server list that never changes.
#[derive(Debug, Clone, Default)]
pub struct StaticServerList {
    servers: Vec<Server>,
}

impl StaticServerList {
    pub fn new(servers: Vec<Server>) -> Self {
        Self { servers }
    }

    /// Parse `list_of_servers` from the client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(parse_entries(&config.list_of_servers, config.default_port))
    }
}

#[async_trait]
impl ServerListSource for StaticServerList {
    async fn server_list(&self) -> Result<Vec<Server>, DiscoveryError> {
        Ok(self.servers.clone())
    }
}
