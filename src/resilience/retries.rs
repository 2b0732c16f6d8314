//! Retry classification.
//!
//! # Responsibilities
//! - Decide whether a call error counts toward a server's circuit breaker
//! - Decide whether a failed call may be retried on the same or another server
//! - Expose the per-client retry budget
//!
//! # Design Decisions
//! - Errors are classified by walking the `source()` chain, so transports can
//!   wrap `CallError`, `std::io::Error`, `reqwest::Error` or a Tokio timeout
//! - Connection and timeout failures are retriable anywhere; throttling only
//!   on another server; application errors never

use std::collections::HashSet;
use std::error::Error;
use std::fmt::Debug;

use crate::config::ClientConfig;
use crate::error::{CallError, ErrorClass};

/// Advisory retry policy consumed by the calling layer.
pub trait RetryHandler: Send + Sync + Debug {
    /// Whether `err` counts against the server's circuit breaker.
    fn is_circuit_tripping_exception(&self, err: &(dyn Error + 'static)) -> bool;

    /// Whether a call that failed with `err` may be retried, either on the
    /// same server or on the next one.
    fn is_retriable_exception(&self, err: &(dyn Error + 'static), same_server: bool) -> bool;

    /// Retries allowed on the server that failed (first attempt excluded).
    fn max_retries_on_same_server(&self) -> u32;

    /// Number of other servers to try after the first one gives up.
    fn max_retries_on_next_server(&self) -> u32;

    /// Whether non-idempotent calls may be retried too.
    fn is_ok_to_retry_on_all_operations(&self) -> bool;
}

/// Retry handler driven by `ClientConfig`.
#[derive(Debug, Clone)]
pub struct DefaultRetryHandler {
    max_retries_same_server: u32,
    max_retries_next_server: u32,
    ok_to_retry_on_all_operations: bool,
    circuit_tripping: HashSet<ErrorClass>,
}

impl DefaultRetryHandler {
    pub fn new(
        max_retries_same_server: u32,
        max_retries_next_server: u32,
        ok_to_retry_on_all_operations: bool,
        circuit_tripping: impl IntoIterator<Item = ErrorClass>,
    ) -> Self {
        Self {
            max_retries_same_server,
            max_retries_next_server,
            ok_to_retry_on_all_operations,
            circuit_tripping: circuit_tripping.into_iter().collect(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.max_auto_retries,
            config.max_auto_retries_next_server,
            config.ok_to_retry_on_all_operations,
            config.circuit_tripping_errors.iter().copied(),
        )
    }
}

impl Default for DefaultRetryHandler {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl RetryHandler for DefaultRetryHandler {
    fn is_circuit_tripping_exception(&self, err: &(dyn Error + 'static)) -> bool {
        self.circuit_tripping.contains(&classify(err))
    }

    fn is_retriable_exception(&self, err: &(dyn Error + 'static), same_server: bool) -> bool {
        match classify(err) {
            ErrorClass::Connect | ErrorClass::Timeout => true,
            // Hammering a server that asked us to back off does not help
            ErrorClass::Throttled => !same_server,
            ErrorClass::Application => false,
        }
    }

    fn max_retries_on_same_server(&self) -> u32 {
        self.max_retries_same_server
    }

    fn max_retries_on_next_server(&self) -> u32 {
        self.max_retries_next_server
    }

    fn is_ok_to_retry_on_all_operations(&self) -> bool {
        self.ok_to_retry_on_all_operations
    }
}

/// Failure class of `err`, taken from the first recognised error in its
/// `source()` chain. Unrecognised errors are application errors.
pub fn classify(err: &(dyn Error + 'static)) -> ErrorClass {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(class) = classify_one(e) {
            return class;
        }
        current = e.source();
    }
    ErrorClass::Application
}

fn classify_one(e: &(dyn Error + 'static)) -> Option<ErrorClass> {
    if let Some(call) = e.downcast_ref::<CallError>() {
        return Some(call.class());
    }

    if e.is::<tokio::time::error::Elapsed>() {
        return Some(ErrorClass::Timeout);
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        use std::io::ErrorKind::*;
        return match io.kind() {
            TimedOut => Some(ErrorClass::Timeout),
            ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected
            | AddrNotAvailable | BrokenPipe | UnexpectedEof => Some(ErrorClass::Connect),
            _ => None,
        };
    }

    if let Some(http) = e.downcast_ref::<reqwest::Error>() {
        if http.is_timeout() {
            return Some(ErrorClass::Timeout);
        }
        if http.is_connect() {
            return Some(ErrorClass::Connect);
        }
        return match http.status().map(|s| s.as_u16()) {
            Some(429) | Some(503) => Some(ErrorClass::Throttled),
            Some(_) => Some(ErrorClass::Application),
            None => None,
        };
    }

    None
}
