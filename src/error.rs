//! Error types shared across the balancer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while resolving a destination server.
///
/// Every variant means "unavailable" to the caller: the balancer never falls
/// back to an arbitrary server on its own.
#[derive(Debug, Error)]
pub enum BalancerError {
    /// The load balancer had nothing eligible to offer.
    #[error("load balancer does not have available server for client {client} ({known} known)")]
    NoServerAvailable { client: String, known: usize },

    /// Neither the request target nor the balancer supplied a host.
    #[error("request contains no host to talk to: {0}")]
    NoHost(String),

    /// A resolved server cannot be addressed.
    #[error("invalid server: {0}")]
    InvalidServer(String),

    /// The request target could not be parsed.
    #[error("invalid uri '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },
}

/// Broad failure class of a remote call, used for circuit and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The connection could not be established or was torn down.
    Connect,
    /// The server did not answer in time.
    Timeout,
    /// The server asked us to back off (429/503).
    Throttled,
    /// Anything else: the server answered, the answer was an error.
    Application,
}

/// Transport-neutral call failure.
///
/// Transports are free to return their own error types; returning (or
/// wrapping) a `CallError` lets the retry handler classify the failure exactly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("server throttled: {0}")]
    Throttled(String),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("application error: {0}")]
    Application(String),
}

impl CallError {
    /// The failure class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            CallError::Connect(_) => ErrorClass::Connect,
            CallError::Timeout => ErrorClass::Timeout,
            CallError::Throttled(_) => ErrorClass::Throttled,
            CallError::Status(429) | CallError::Status(503) => ErrorClass::Throttled,
            CallError::Status(_) | CallError::Application(_) => ErrorClass::Application,
        }
    }
}

/// Errors from a server-list source.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read server list: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse server list: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("server list source unavailable: {0}")]
    Unavailable(String),
}
