//! Retrying call executor.
//!
//! Runs a caller-supplied async operation against servers resolved through a
//! `LoadBalancerContext`, recording every attempt and retrying within the
//! retry handler's budget:
//!
//! ```text
//! choose server ──► attempt ──ok──► return
//!                     │ err
//!                     ├─ retriable here, same-server budget left  ──► attempt again
//!                     ├─ retriable elsewhere, next-server budget left ──► choose server
//!                     └─ otherwise ──► CommandError::Exhausted
//! ```
//!
//! Retries only happen for idempotent calls unless the handler allows
//! retrying every operation.

use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::client::context::LoadBalancerContext;
use crate::error::BalancerError;
use crate::load_balancer::Server;
use crate::resilience::retries::RetryHandler;

/// Failure of a command.
#[derive(Debug, Error)]
pub enum CommandError<E> {
    /// No server could be resolved for the first attempt.
    #[error(transparent)]
    NoServer(#[from] BalancerError),

    /// The last attempt failed and no retry was left, allowed or possible.
    #[error("call failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
}

/// One logical call, possibly spanning several attempts.
#[derive(Debug, Clone)]
pub struct LoadBalancerCommand<'a> {
    context: &'a LoadBalancerContext,
    retry_handler: Option<Arc<dyn RetryHandler>>,
    target: Option<String>,
    routing_key: Option<String>,
    idempotent: bool,
}

impl<'a> LoadBalancerCommand<'a> {
    pub fn new(context: &'a LoadBalancerContext) -> Self {
        Self {
            context,
            retry_handler: None,
            target: None,
            routing_key: None,
            idempotent: true,
        }
    }

    /// Request target; an absolute URI with a host bypasses the balancer.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    /// Mark the call non-idempotent to disable retries (unless the handler
    /// allows retrying every operation).
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Override the context's retry handler for this call.
    pub fn retry_handler(mut self, handler: Arc<dyn RetryHandler>) -> Self {
        self.retry_handler = Some(handler);
        self
    }

    fn handler(&self) -> &dyn RetryHandler {
        match &self.retry_handler {
            Some(handler) => handler.as_ref(),
            None => self.context.retry_handler(),
        }
    }

    /// Run `operation` until it succeeds or the retry budget is spent.
    pub async fn submit<T, E, F, Fut>(&self, mut operation: F) -> Result<T, CommandError<E>>
    where
        F: FnMut(Arc<Server>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        let handler = self.handler();
        let retries_allowed = self.idempotent || handler.is_ok_to_retry_on_all_operations();
        let max_same = handler.max_retries_on_same_server();
        let max_next = handler.max_retries_on_next_server();

        let mut attempts = 0u32;
        let mut next_server_retries = 0u32;
        let mut last_err: Option<E> = None;

        loop {
            let server = match self
                .context
                .get_server_from_load_balancer(self.target.as_deref(), self.routing_key.as_deref())
            {
                Ok(server) => server,
                // A failed re-selection reports the call error that led to it
                Err(e) => {
                    return Err(match last_err {
                        Some(source) => CommandError::Exhausted { attempts, source },
                        None => CommandError::NoServer(e),
                    })
                }
            };
            let stats = self.context.get_server_stats(&server);
            let mut same_server_retries = 0u32;

            loop {
                attempts += 1;
                self.context.note_open_connection(stats.as_deref());
                let started = Instant::now();
                let result = operation(server.clone()).await;
                self.context
                    .note_request_completion(stats.as_deref(), &result, started.elapsed(), Some(handler));

                let err = match result {
                    Ok(value) => return Ok(value),
                    Err(err) => err,
                };

                if !retries_allowed {
                    return Err(CommandError::Exhausted { attempts, source: err });
                }

                if same_server_retries < max_same && handler.is_retriable_exception(&err, true) {
                    same_server_retries += 1;
                    tracing::debug!(
                        client = %self.context.client_name(),
                        server = %server,
                        retry = same_server_retries,
                        error = %err,
                        "Retrying on same server"
                    );
                    continue;
                }

                if next_server_retries < max_next && handler.is_retriable_exception(&err, false) {
                    next_server_retries += 1;
                    tracing::debug!(
                        client = %self.context.client_name(),
                        server = %server,
                        retry = next_server_retries,
                        error = %err,
                        "Retrying on next server"
                    );
                    last_err = Some(err);
                    break;
                }

                return Err(CommandError::Exhausted { attempts, source: err });
            }
        }
    }
}
