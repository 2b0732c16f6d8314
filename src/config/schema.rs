//! Configuration schema definitions.
//!
//! One `ClientConfig` describes one logical client: its transport budget, its
//! retry policy, its circuit breaker and the cadence of its background loops.
//! Several independently configured clients can live in one process.

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ErrorClass;
use crate::lifecycle::scheduler::OverlapPolicy;

/// Selection policy applied to the reachable servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum RuleKind {
    #[default]
    #[serde(alias = "RandomRule")]
    Random,
    #[serde(alias = "RoundRobinRule")]
    RoundRobin,
    #[serde(alias = "LeastConnectionsRule")]
    LeastConnections,
    #[serde(alias = "KeyHashRule")]
    KeyHash,
}

/// How a probe pass walks the known servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum PingStrategyKind {
    #[default]
    #[serde(alias = "SerialPingStrategy")]
    Serial,
    #[serde(alias = "ParallelPingStrategy")]
    Parallel,
}

/// Root configuration for a load-balanced client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client identifier for logging/metrics.
    pub client_name: String,

    /// Enable pooled transport connections.
    pub enable_connection_pool: bool,

    /// Transport pool size per host (consumed by the transport).
    pub max_connections_per_host: usize,

    /// Transport pool size overall (consumed by the transport).
    pub max_total_connections: usize,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Socket read/write timeout in milliseconds.
    pub read_write_timeout_ms: u64,

    /// Whole-request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Retries on the server that just failed.
    pub max_auto_retries: u32,

    /// Retries on other servers after the first one is given up.
    pub max_auto_retries_next_server: u32,

    /// Allow retrying non-idempotent operations.
    pub ok_to_retry_on_all_operations: bool,

    /// Error classes that count toward the circuit breaker.
    pub circuit_tripping_errors: Vec<ErrorClass>,

    /// Successive tripping failures before the circuit opens.
    pub connection_failure_threshold: u32,

    /// Blackout seconds added per successive failure.
    pub circuit_tripped_timeout_factor_secs: u64,

    /// Upper bound on the blackout, in seconds.
    pub circuit_trip_max_timeout_secs: u64,

    /// Rolling window for failure counting, in milliseconds.
    pub failure_count_sliding_window_interval_ms: u64,

    /// Probe cadence in milliseconds.
    pub ping_interval_ms: u64,

    /// Probe fan-out.
    pub ping_strategy: PingStrategyKind,

    /// Path appended to `scheme://host:port` for the URL ping.
    /// No suffix means every server is considered alive.
    pub ping_url_suffix: Option<String>,

    /// Exact body the URL ping expects; empty means "any 200".
    pub ping_expected_content: Option<String>,

    /// Timeout of a single probe in milliseconds.
    pub ping_timeout_ms: u64,

    /// Selection policy.
    pub load_balancer_rule: RuleKind,

    /// Routing-key namespace; defaults to the client name.
    pub load_balancer_key: Option<String>,

    /// Server-list refresh cadence in milliseconds.
    pub list_of_servers_polling_interval_ms: u64,

    /// Static server list (`host`, `host:port` or `scheme://host:port`).
    pub list_of_servers: Vec<String>,

    /// Port for server entries that do not name one. Unset means the
    /// scheme's well-known port.
    pub default_port: Option<u16>,

    /// Optional TOML file re-read on every refresh instead of the static list.
    pub server_list_file: Option<String>,

    /// What the background loops do when a tick fires while the previous
    /// dispatch is still running.
    pub scheduler_overlap: OverlapPolicy,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: "default".to_string(),
            enable_connection_pool: true,
            max_connections_per_host: 50,
            max_total_connections: 200,
            connect_timeout_ms: 200,
            read_write_timeout_ms: 500,
            request_timeout_ms: 500,
            max_auto_retries: 0,
            max_auto_retries_next_server: 1,
            ok_to_retry_on_all_operations: false,
            circuit_tripping_errors: vec![
                ErrorClass::Connect,
                ErrorClass::Timeout,
                ErrorClass::Throttled,
            ],
            connection_failure_threshold: 5,
            circuit_tripped_timeout_factor_secs: 10,
            circuit_trip_max_timeout_secs: 30,
            failure_count_sliding_window_interval_ms: 10_000,
            ping_interval_ms: 5_000,
            ping_strategy: PingStrategyKind::Serial,
            ping_url_suffix: None,
            ping_expected_content: None,
            ping_timeout_ms: 2_000,
            load_balancer_rule: RuleKind::Random,
            load_balancer_key: None,
            list_of_servers_polling_interval_ms: 30_000,
            list_of_servers: Vec::new(),
            default_port: None,
            server_list_file: None,
            scheduler_overlap: OverlapPolicy::Skip,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a default configuration for the named client.
    pub fn for_client(name: impl Into<String>) -> Self {
        Self {
            client_name: name.into(),
            ..Self::default()
        }
    }

    /// Routing-key namespace, falling back to the client name.
    pub fn load_balancer_key(&self) -> &str {
        self.load_balancer_key.as_deref().unwrap_or(&self.client_name)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_write_timeout(&self) -> Duration {
        Duration::from_millis(self.read_write_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn circuit_tripped_timeout_factor(&self) -> Duration {
        Duration::from_secs(self.circuit_tripped_timeout_factor_secs)
    }

    pub fn circuit_trip_max_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_trip_max_timeout_secs)
    }

    pub fn failure_count_sliding_window_interval(&self) -> Duration {
        Duration::from_millis(self.failure_count_sliding_window_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn list_of_servers_polling_interval(&self) -> Duration {
        Duration::from_millis(self.list_of_servers_polling_interval_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
