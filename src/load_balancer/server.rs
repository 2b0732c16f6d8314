//! Server identity.
//!
//! # Responsibilities
//! - Represent a single destination server (scheme, host, port)
//! - Provide the `host:port` key used for equality and lookups everywhere
//! - Parse discovery entries (`host`, `host:port`, `scheme://host[:port]`)

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::Ipv6Addr;
use url::Url;

use crate::error::BalancerError;

/// Scheme assumed when an entry does not carry one.
pub const DEFAULT_SCHEME: &str = "http";

/// A single destination server. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Server {
    scheme: String,
    host: String,
    port: u16,
    /// Pre-calculated `host:port` key.
    id: String,
}

impl Server {
    /// Create a new server. A bare IPv6 literal is bracketed so the key
    /// matches the one parsed from a URL.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let mut host = host.into();
        if host.parse::<Ipv6Addr>().is_ok() {
            host = format!("[{}]", host);
        }
        let id = format!("{}:{}", host, port);
        Self {
            scheme: scheme.into(),
            host,
            port,
            id,
        }
    }

    /// Parse a discovery entry.
    pub fn parse(entry: &str) -> Result<Self, BalancerError> {
        Self::parse_with_default_port(entry, None)
    }

    /// Parse a discovery entry. An entry without an explicit port takes
    /// `default_port` when set, the scheme's well-known port otherwise.
    pub fn parse_with_default_port(entry: &str, default_port: Option<u16>) -> Result<Self, BalancerError> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(BalancerError::InvalidServer("empty server entry".to_string()));
        }

        let with_scheme = if entry.contains("://") {
            entry.to_string()
        } else {
            format!("{}://{}", DEFAULT_SCHEME, entry)
        };
        let url = Url::parse(&with_scheme).map_err(|source| BalancerError::InvalidUri {
            uri: entry.to_string(),
            source,
        })?;
        let server = Self::from_url(&url)?;
        match default_port {
            Some(port) if !has_explicit_port(&with_scheme) => Ok(Self::new(server.scheme, server.host, port)),
            _ => Ok(server),
        }
    }

    /// Build a server from the scheme and authority of a URL.
    pub fn from_url(url: &Url) -> Result<Self, BalancerError> {
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h,
            _ => return Err(BalancerError::NoHost(url.to_string())),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| BalancerError::InvalidServer(format!("no port for {}", url)))?;
        Ok(Self::new(url.scheme(), host, port))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The `host:port` key.
    pub fn host_port(&self) -> &str {
        &self.id
    }

    /// Base URL of this server (`scheme://host:port/`).
    pub fn base_url(&self) -> Result<Url, BalancerError> {
        let raw = format!("{}://{}/", self.scheme, self.id);
        Url::parse(&raw).map_err(|source| BalancerError::InvalidUri { uri: raw, source })
    }
}

/// Whether the authority of `url` spells out a port. `Url::port` cannot
/// tell, since it drops a port equal to the scheme default.
fn has_explicit_port(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    // Only look past the closing bracket of an IPv6 literal
    let tail = host_port.rsplit(']').next().unwrap_or(host_port);
    tail.contains(':')
}

impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Server {}

impl Hash for Server {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
