//! Active liveness check of a single server.
//!
//! # Responsibilities
//! - Define the `Ping` capability (is this server alive?)
//! - Provide the URL ping (real HTTP call) and a no-op ping
//!
//! # Design Decisions
//! - A probe never errors: any transport failure or timeout means "not alive"
//! - The probe may block on network I/O; it only ever runs on the probe loop

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::config::ClientConfig;
use crate::load_balancer::server::Server;

/// Determines whether a server is alive.
#[async_trait]
pub trait Ping: Send + Sync + fmt::Debug {
    async fn is_alive(&self, server: &Server) -> bool;
}

/// Reports every server as alive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpPing;

#[async_trait]
impl Ping for NoOpPing {
    async fn is_alive(&self, _server: &Server) -> bool {
        true
    }
}

/// Health-check ping: a real HTTP `GET` against `scheme://host:port{suffix}`.
///
/// Without expected content a `200 OK` is alive; with expected content the
/// body must match it exactly.
#[derive(Debug, Clone)]
pub struct UrlPing {
    client: Client,
    url_suffix: String,
    expected_content: Option<String>,
    timeout: Duration,
}

impl UrlPing {
    pub fn new(url_suffix: impl Into<String>, expected_content: Option<String>, timeout: Duration) -> Self {
        Self {
            // Probes go straight to the server, never through a proxy
            client: Client::builder().no_proxy().build().unwrap_or_default(),
            url_suffix: url_suffix.into(),
            expected_content: expected_content.filter(|c| !c.is_empty()),
            timeout,
        }
    }

    fn ping_url(&self, server: &Server) -> String {
        format!("{}://{}{}", server.scheme(), server.host_port(), self.url_suffix)
    }
}

#[async_trait]
impl Ping for UrlPing {
    async fn is_alive(&self, server: &Server) -> bool {
        let url = self.ping_url(server);
        let response = match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(server = %server, error = %e, "Ping failed: transport error");
                return false;
            }
        };

        let expected = match &self.expected_content {
            None => return response.status() == StatusCode::OK,
            Some(expected) => expected,
        };

        match response.text().await {
            Ok(body) => body == *expected,
            Err(e) => {
                tracing::debug!(server = %server, error = %e, "Ping failed: unreadable body");
                false
            }
        }
    }
}

/// Build the ping configured for a client.
pub fn ping_from_config(config: &ClientConfig) -> Arc<dyn Ping> {
    match &config.ping_url_suffix {
        Some(suffix) => Arc::new(UrlPing::new(
            suffix.clone(),
            config.ping_expected_content.clone(),
            config.ping_timeout(),
        )),
        None => Arc::new(NoOpPing),
    }
}
