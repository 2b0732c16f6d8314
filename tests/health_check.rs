//! Active health checking against live mock backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use client_balancer::config::PingStrategyKind;
use client_balancer::health::ping::{Ping, UrlPing};
use client_balancer::LoadBalancer;

mod common;

fn ping(suffix: &str, expected: Option<&str>) -> UrlPing {
    UrlPing::new(suffix, expected.map(str::to_string), Duration::from_millis(500))
}

#[tokio::test]
async fn test_url_ping_status() {
    let healthy = common::start_mock_backend(200, "up").await;
    let failing = common::start_mock_backend(500, "down").await;
    let closed = common::closed_port().await;

    let p = ping("/", None);
    assert!(p.is_alive(&common::server_at(healthy)).await);
    assert!(!p.is_alive(&common::server_at(failing)).await);
    assert!(!p.is_alive(&common::server_at(closed)).await);
}

#[tokio::test]
async fn test_url_ping_expected_content() {
    let addr = common::start_mock_backend(200, "OK").await;
    let server = common::server_at(addr);

    assert!(ping("/", Some("OK")).is_alive(&server).await);
    assert!(!ping("/", Some("READY")).is_alive(&server).await);
}

#[tokio::test]
async fn test_url_ping_uses_suffix() {
    let addr = common::start_programmable_backend(|path| async move {
        if path == "/healthz" {
            (200, "ok".to_string())
        } else {
            (404, "missing".to_string())
        }
    })
    .await;
    let server = common::server_at(addr);

    assert!(ping("/healthz", None).is_alive(&server).await);
    assert!(!ping("/status", None).is_alive(&server).await);
}

#[tokio::test]
async fn test_probe_pass_excludes_dead_servers() {
    for strategy in [PingStrategyKind::Serial, PingStrategyKind::Parallel] {
        let healthy = common::start_mock_backend(200, "ok").await;
        let failing = common::start_mock_backend(503, "busy").await;

        let mut config = common::test_config("probe");
        config.ping_url_suffix = Some("/healthz".to_string());
        config.ping_strategy = strategy;
        let lb = LoadBalancer::new(config);
        lb.set_servers(vec![common::server_at(healthy), common::server_at(failing)]);

        lb.ping_servers().await;
        let view = lb.load_balancer_stats();
        assert_eq!(view.reachable_count(), 1, "strategy {:?}", strategy);
        assert!(view.is_ping_dead(&common::server_at(failing)));

        for _ in 0..10 {
            assert_eq!(*lb.choose_server(None).unwrap(), common::server_at(healthy));
        }
    }
}

#[tokio::test]
async fn test_probe_loop_tracks_liveness() {
    let up = Arc::new(AtomicBool::new(true));
    let flag = up.clone();
    let addr = common::start_programmable_backend(move |_path| {
        let alive = flag.load(Ordering::SeqCst);
        async move {
            if alive {
                (200, "ok".to_string())
            } else {
                (500, "fail".to_string())
            }
        }
    })
    .await;
    let server = common::server_at(addr);

    let mut config = common::test_config("probe-loop");
    config.ping_url_suffix = Some("/".to_string());
    config.list_of_servers = vec![addr.to_string()];
    let lb = LoadBalancer::new(config);
    lb.start().await;
    assert_eq!(lb.load_balancer_stats().server_count(), 1);

    up.store(false, Ordering::SeqCst);
    assert!(common::eventually(Duration::from_secs(3), || lb.load_balancer_stats().is_ping_dead(&server)).await);
    assert!(lb.choose_server(None).is_err());

    up.store(true, Ordering::SeqCst);
    assert!(common::eventually(Duration::from_secs(3), || !lb.load_balancer_stats().is_ping_dead(&server)).await);
    assert!(lb.choose_server(None).is_ok());

    lb.shutdown();
}
