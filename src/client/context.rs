//! Load balancer context.
//!
//! # Responsibilities
//! - Resolve the destination server of a call
//! - Rewrite a request target to point at the resolved server
//! - Feed call outcomes into the server's stats and circuit breaker
//! - Mark servers temp-down when their circuit trips, ready when they recover

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::config::ClientConfig;
use crate::error::BalancerError;
use crate::load_balancer::server::DEFAULT_SCHEME;
use crate::load_balancer::{LoadBalancer, Server, ServerStats};
use crate::observability::metrics;
use crate::resilience::retries::{DefaultRetryHandler, RetryHandler};

/// Per-client facade tying the balancer, the stats and the retry handler
/// together. Created once per logical client.
#[derive(Debug, Clone)]
pub struct LoadBalancerContext {
    client_name: String,
    load_balancer: Option<Arc<LoadBalancer>>,
    retry_handler: Arc<dyn RetryHandler>,
}

impl LoadBalancerContext {
    pub fn new(config: &ClientConfig, load_balancer: Arc<LoadBalancer>) -> Self {
        Self {
            client_name: config.client_name.clone(),
            load_balancer: Some(load_balancer),
            retry_handler: Arc::new(DefaultRetryHandler::from_config(config)),
        }
    }

    /// A context that only ever talks to explicit hosts.
    pub fn without_load_balancer(config: &ClientConfig) -> Self {
        Self {
            client_name: config.client_name.clone(),
            load_balancer: None,
            retry_handler: Arc::new(DefaultRetryHandler::from_config(config)),
        }
    }

    pub fn with_retry_handler(mut self, handler: Arc<dyn RetryHandler>) -> Self {
        self.retry_handler = handler;
        self
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn load_balancer(&self) -> Option<&Arc<LoadBalancer>> {
        self.load_balancer.as_ref()
    }

    pub fn retry_handler(&self) -> &dyn RetryHandler {
        self.retry_handler.as_ref()
    }

    /// Call right before dispatch.
    pub fn note_open_connection(&self, stats: Option<&ServerStats>) {
        if let Some(stats) = stats {
            stats.increment_active_requests_count();
        }
    }

    /// Call after the call returned, successfully or not. `error_handler`
    /// overrides the context's retry handler for this call.
    pub fn note_request_completion<T, E>(
        &self,
        stats: Option<&ServerStats>,
        result: &Result<T, E>,
        response_time: Duration,
        error_handler: Option<&dyn RetryHandler>,
    ) where
        E: Error + 'static,
    {
        let stats = match stats {
            Some(stats) => stats,
            None => return,
        };
        self.record_stats(stats, response_time);

        match result {
            Ok(_) => self.record_success(stats),
            Err(err) => {
                let handler = error_handler.unwrap_or(self.retry_handler.as_ref());
                self.record_failure(stats, err, handler);
            }
        }
    }

    /// Error-only variant of `note_request_completion`, for calls that never
    /// produced a response. Uses the context's retry handler.
    pub fn note_error<E>(&self, stats: Option<&ServerStats>, err: &E, response_time: Duration)
    where
        E: Error + 'static,
    {
        let stats = match stats {
            Some(stats) => stats,
            None => return,
        };
        self.record_stats(stats, response_time);
        self.record_failure(stats, err, self.retry_handler.as_ref());
    }

    fn record_stats(&self, stats: &ServerStats, response_time: Duration) {
        stats.decrement_active_requests_count();
        stats.increment_num_requests();
        stats.note_response_time(response_time);
        metrics::record_response_time(stats.server().host_port(), response_time);
    }

    fn record_success(&self, stats: &ServerStats) {
        stats.clear_successive_connection_failure_count();
        if let Some(lb) = &self.load_balancer {
            lb.mark_server_ready(stats.server());
        }
    }

    fn record_failure(&self, stats: &ServerStats, err: &(dyn Error + 'static), handler: &dyn RetryHandler) {
        let now = Instant::now();
        stats.add_to_failure_count(now);

        if !handler.is_circuit_tripping_exception(err) {
            self.record_success(stats);
            return;
        }

        stats.increment_successive_connection_failure_count(now);
        if !stats.is_circuit_breaker_tripped(now) {
            return;
        }

        if let Some(lb) = &self.load_balancer {
            let server = stats.server();
            if !lb.load_balancer_stats().is_temporarily_down(server) {
                tracing::warn!(
                    client = %self.client_name,
                    server = %server,
                    successive_failures = stats.successive_connection_failure_count(),
                    blackout_ms = stats.circuit_breaker_remaining(now).as_millis() as u64,
                    error = %err,
                    "Server circuit breaker tripped"
                );
                metrics::record_circuit_tripped(&self.client_name, server.host_port());
            }
            lb.mark_server_temp_down(server);
        }
    }

    /// Resolve the server for a call.
    ///
    /// A target carrying an explicit host is used verbatim and bypasses the
    /// balancer. A path-only (or absent) target is resolved through
    /// `LoadBalancer::choose_server`.
    pub fn get_server_from_load_balancer(
        &self,
        target: Option<&str>,
        routing_key: Option<&str>,
    ) -> Result<Arc<Server>, BalancerError> {
        if let Some(url) = target.map(parse_absolute).transpose()?.flatten() {
            return Server::from_url(&url).map(Arc::new);
        }

        let lb = self
            .load_balancer
            .as_ref()
            .ok_or_else(|| BalancerError::NoHost(target.unwrap_or_default().to_string()))?;

        let server = lb.choose_server(routing_key)?;
        if server.host().is_empty() {
            return Err(BalancerError::InvalidServer(server.to_string()));
        }
        Ok(server)
    }

    /// Point `original` at `server`, keeping its path, query and fragment.
    /// A target that already addresses `server` is returned unchanged.
    pub fn reconstruct_uri_with_server(&self, server: &Server, original: &str) -> Result<Url, BalancerError> {
        let base = server.base_url()?;
        match parse_absolute(original)? {
            Some(url) => {
                if url.scheme() == server.scheme()
                    && url.host_str() == Some(server.host())
                    && url.port_or_known_default() == Some(server.port())
                {
                    return Ok(url);
                }
                let mut rebuilt = base;
                rebuilt.set_path(url.path());
                rebuilt.set_query(url.query());
                rebuilt.set_fragment(url.fragment());
                Ok(rebuilt)
            }
            None => base.join(original).map_err(|source| BalancerError::InvalidUri {
                uri: original.to_string(),
                source,
            }),
        }
    }

    /// Stats of `server` from the balancer's current snapshot.
    pub fn get_server_stats(&self, server: &Server) -> Option<Arc<ServerStats>> {
        self.load_balancer.as_ref()?.single_server_stats(server)
    }
}

/// Parse a target that carries a host. Path-only targets yield `None`.
/// A scheme-relative target (`//host:port/path`) takes the default scheme.
fn parse_absolute(target: &str) -> Result<Option<Url>, BalancerError> {
    let parsed = match Url::parse(target) {
        Err(url::ParseError::RelativeUrlWithoutBase) if target.starts_with("//") => {
            Url::parse(&format!("{}:{}", DEFAULT_SCHEME, target))
        }
        other => other,
    };
    match parsed {
        Ok(url) if url.host_str().map_or(false, |h| !h.is_empty()) => Ok(Some(url)),
        Ok(_) => Ok(None),
        Err(url::ParseError::RelativeUrlWithoutBase) | Err(url::ParseError::EmptyHost) => Ok(None),
        Err(source) => Err(BalancerError::InvalidUri {
            uri: target.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CallError, ErrorClass};

    fn setup(threshold: u32) -> (ClientConfig, Arc<LoadBalancer>, LoadBalancerContext) {
        let mut config = ClientConfig::for_client("orders");
        config.connection_failure_threshold = threshold;
        let lb = Arc::new(LoadBalancer::new(config.clone()));
        lb.set_servers(vec![
            Server::new("http", "10.0.0.1", 8080),
            Server::new("http", "10.0.0.2", 8080),
        ]);
        let ctx = LoadBalancerContext::new(&config, lb.clone());
        (config, lb, ctx)
    }

    fn first_server() -> Server {
        Server::new("http", "10.0.0.1", 8080)
    }

    #[test]
    fn test_open_and_complete_balance_active_count() {
        let (_, _, ctx) = setup(3);
        let stats = ctx.get_server_stats(&first_server()).unwrap();
        ctx.note_open_connection(Some(&*stats));
        assert_eq!(stats.active_requests_count(), 1);

        let ok: Result<(), CallError> = Ok(());
        ctx.note_request_completion(Some(&*stats), &ok, Duration::from_millis(5), None);
        assert_eq!(stats.active_requests_count(), 0);
        assert_eq!(stats.total_requests_count(), 1);
        assert_eq!(stats.average_response_time(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_absent_stats_is_noop() {
        let (_, _, ctx) = setup(3);
        ctx.note_open_connection(None);
        let err: Result<(), CallError> = Err(CallError::Timeout);
        ctx.note_request_completion(None, &err, Duration::ZERO, None);
        ctx.note_error(None, &CallError::Timeout, Duration::ZERO);
    }

    #[test]
    fn test_tripping_failures_mark_server_down() {
        let (_, lb, ctx) = setup(3);
        let server = first_server();
        let stats = ctx.get_server_stats(&server).unwrap();
        let err: Result<(), CallError> = Err(CallError::Connect("refused".into()));

        for _ in 0..2 {
            ctx.note_open_connection(Some(&*stats));
            ctx.note_request_completion(Some(&*stats), &err, Duration::from_millis(1), None);
        }
        assert!(!lb.load_balancer_stats().is_temporarily_down(&server));

        ctx.note_open_connection(Some(&*stats));
        ctx.note_request_completion(Some(&*stats), &err, Duration::from_millis(1), None);
        assert!(lb.load_balancer_stats().is_temporarily_down(&server));
        assert_eq!(stats.failure_count(Instant::now()), 3);
        for _ in 0..20 {
            assert_ne!(*lb.choose_server(None).unwrap(), server);
        }

        // success clears the streak and restores the server
        let ok: Result<(), CallError> = Ok(());
        ctx.note_request_completion(Some(&*stats), &ok, Duration::from_millis(1), None);
        assert_eq!(stats.successive_connection_failure_count(), 0);
        assert!(!lb.load_balancer_stats().is_temporarily_down(&server));
    }

    #[test]
    fn test_application_error_does_not_penalize_server() {
        let (_, lb, ctx) = setup(1);
        let server = first_server();
        let stats = ctx.get_server_stats(&server).unwrap();
        stats.increment_successive_connection_failure_count(Instant::now());
        lb.mark_server_temp_down(&server);

        let err: Result<(), CallError> = Err(CallError::Application("bad input".into()));
        ctx.note_request_completion(Some(&*stats), &err, Duration::ZERO, None);
        assert_eq!(stats.successive_connection_failure_count(), 0);
        assert_eq!(stats.failure_count(Instant::now()), 1);
        assert!(!lb.load_balancer_stats().is_temporarily_down(&server));
    }

    #[test]
    fn test_call_supplied_handler_overrides_default() {
        let (_, lb, ctx) = setup(1);
        let server = first_server();
        let stats = ctx.get_server_stats(&server).unwrap();
        let only_timeouts = DefaultRetryHandler::new(0, 0, false, [ErrorClass::Timeout]);

        let err: Result<(), CallError> = Err(CallError::Connect("refused".into()));
        ctx.note_request_completion(Some(&*stats), &err, Duration::ZERO, Some(&only_timeouts));
        assert!(!lb.load_balancer_stats().is_temporarily_down(&server));

        ctx.note_request_completion(Some(&*stats), &err, Duration::ZERO, None);
        assert!(lb.load_balancer_stats().is_temporarily_down(&server));
    }

    #[test]
    fn test_note_error_proceeds_when_stats_present() {
        let (_, lb, ctx) = setup(2);
        let server = first_server();
        let stats = ctx.get_server_stats(&server).unwrap();
        ctx.note_open_connection(Some(&*stats));
        ctx.note_error(Some(&*stats), &CallError::Timeout, Duration::from_millis(2));
        ctx.note_open_connection(Some(&*stats));
        ctx.note_error(Some(&*stats), &CallError::Timeout, Duration::from_millis(2));

        assert_eq!(stats.active_requests_count(), 0);
        assert_eq!(stats.total_requests_count(), 2);
        assert_eq!(stats.successive_connection_failure_count(), 2);
        assert!(lb.load_balancer_stats().is_temporarily_down(&server));
    }

    #[test]
    fn test_explicit_host_bypasses_balancer() {
        let config = ClientConfig::for_client("empty");
        let lb = Arc::new(LoadBalancer::new(config.clone()));
        let ctx = LoadBalancerContext::new(&config, lb);

        let server = ctx
            .get_server_from_load_balancer(Some("https://api.example.com:8443/v1/items?x=1"), None)
            .unwrap();
        assert_eq!(server.host(), "api.example.com");
        assert_eq!(server.port(), 8443);
        assert_eq!(server.scheme(), "https");

        let server = ctx.get_server_from_load_balancer(Some("http://api.example.com/v1"), None).unwrap();
        assert_eq!(server.port(), 80);
    }

    #[test]
    fn test_scheme_relative_target_uses_its_host() {
        let (_, _, ctx) = setup(3);
        let server = ctx
            .get_server_from_load_balancer(Some("//explicit.host:9000/v1"), None)
            .unwrap();
        assert_eq!(server.host_port(), "explicit.host:9000");
        assert_eq!(server.scheme(), "http");

        let server = Server::new("http", "10.0.0.1", 8080);
        let url = ctx.reconstruct_uri_with_server(&server, "//explicit.host:9000/v1?q=1").unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.1:8080/v1?q=1");
    }

    #[test]
    fn test_ipv6_server_uri() {
        let (_, _, ctx) = setup(3);
        let server = Server::new("http", "::1", 8080);
        let url = ctx.reconstruct_uri_with_server(&server, "/v1").unwrap();
        assert_eq!(url.as_str(), "http://[::1]:8080/v1");

        let same = "http://[::1]:8080/v1";
        assert_eq!(ctx.reconstruct_uri_with_server(&server, same).unwrap().as_str(), same);
    }

    #[test]
    fn test_path_only_with_no_servers_is_unavailable() {
        let config = ClientConfig::for_client("empty");
        let lb = Arc::new(LoadBalancer::new(config.clone()));
        let ctx = LoadBalancerContext::new(&config, lb);
        assert!(matches!(
            ctx.get_server_from_load_balancer(Some("/v1/items"), None),
            Err(BalancerError::NoServerAvailable { .. })
        ));
        assert!(matches!(
            ctx.get_server_from_load_balancer(None, None),
            Err(BalancerError::NoServerAvailable { .. })
        ));
    }

    #[test]
    fn test_path_only_uses_balancer() {
        let (_, _, ctx) = setup(3);
        let server = ctx.get_server_from_load_balancer(Some("/v1/items"), Some("k")).unwrap();
        assert_eq!(server.port(), 8080);
    }

    #[test]
    fn test_no_balancer_and_no_host() {
        let ctx = LoadBalancerContext::without_load_balancer(&ClientConfig::default());
        assert!(matches!(
            ctx.get_server_from_load_balancer(Some("/v1"), None),
            Err(BalancerError::NoHost(_))
        ));
        assert!(ctx.get_server_stats(&first_server()).is_none());
    }

    #[test]
    fn test_reconstruct_uri() {
        let (_, _, ctx) = setup(3);
        let server = Server::new("https", "10.0.0.9", 9443);

        let url = ctx.reconstruct_uri_with_server(&server, "/v1/items?id=7").unwrap();
        assert_eq!(url.as_str(), "https://10.0.0.9:9443/v1/items?id=7");

        let url = ctx
            .reconstruct_uri_with_server(&server, "http://old.host:80/v1/items?id=7#top")
            .unwrap();
        assert_eq!(url.as_str(), "https://10.0.0.9:9443/v1/items?id=7#top");

        let same = "https://10.0.0.9:9443/already/here";
        assert_eq!(ctx.reconstruct_uri_with_server(&server, same).unwrap().as_str(), same);
    }
}
