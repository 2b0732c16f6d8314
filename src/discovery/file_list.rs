//! Server list read from a TOML file.
//!
//! ```toml
//! servers = ["10.0.0.1:8080", "https://10.0.0.2"]
//! ```

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde::Deserialize;

use crate::discovery::{parse_entries, ServerListSource};
use crate::error::DiscoveryError;
use crate::load_balancer::Server;

/// `servers` is required: an empty or truncated file is a parse error and
/// leaves the current membership untouched.
#[derive(Debug, Deserialize)]
struct ServerListFile {
    servers: Vec<String>,
}

/// Re-reads its file on every call, so edits show up on the next refresh.
#[derive(Debug, Clone)]
pub struct FileServerList {
    path: PathBuf,
    default_port: Option<u16>,
}

impl FileServerList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_port: None,
        }
    }

    /// Port for entries that do not name one.
    pub fn with_default_port(mut self, port: Option<u16>) -> Self {
        self.default_port = port;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ServerListSource for FileServerList {
    async fn server_list(&self) -> Result<Vec<Server>, DiscoveryError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let file: ServerListFile = toml::from_str(&content)?;
        Ok(parse_entries(&file.servers, self.default_port))
    }
}
