mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tower::ServiceExt;

use wallet_ledger::api::{create_router, AppState};
use wallet_ledger::observability::{
    init_logging, init_metrics, mask_amount, AggregatedHealth, DependencyHealth, HealthChecker,
    HealthStatus, LatencyTimer, LogConfig, LogFormat,
};
use wallet_ledger::repositories::InMemoryLedgerStore;

#[test]
fn test_log_config_default() {
    let config = LogConfig::default();
    assert_eq!(config.level, "info");
    assert_eq!(config.format, LogFormat::Pretty);
    assert!(config.include_target);
    assert!(!config.include_file);
    assert!(!config.include_line);
}

#[test]
fn test_logger_installs_once() {
    let config = LogConfig {
        format: LogFormat::Compact,
        ..LogConfig::default()
    };
    assert!(init_logging(&config).is_ok());
    assert!(init_logging(&config).is_err());
}

#[test]
fn test_mask_amount_negative() {
    assert_eq!(mask_amount(&Decimal::from(-5_000_000)), "***M+");
    assert_eq!(mask_amount(&dec!(-0.01)), "***");
}

#[test]
fn test_latency_timer() {
    let timer = LatencyTimer::new();
    std::thread::sleep(std::time::Duration::from_millis(10));
    let elapsed = timer.elapsed_ms();
    assert!(elapsed >= 10.0);
}

#[test]
fn test_aggregated_health_serialization() {
    let dependencies = vec![DependencyHealth::healthy("storage", 5.5)];
    let health = AggregatedHealth::new("1.0.0".to_string(), 100, dependencies);
    let json = serde_json::to_string(&health).unwrap();

    assert!(json.contains("\"status\":\"healthy\""));
    assert!(json.contains("\"version\":\"1.0.0\""));
    assert!(json.contains("\"uptime_seconds\":100"));
    assert!(json.contains("\"latency_ms\":5.5"));
}

#[tokio::test]
async fn test_health_checker_uptime_and_readiness() {
    let checker = HealthChecker::new(Arc::new(InMemoryLedgerStore::new()));
    assert_eq!(checker.uptime_seconds(), 0);

    let storage = checker.check_storage().await;
    assert_eq!(storage.status, HealthStatus::Healthy);
    assert!(storage.latency_ms.is_some());
    assert!(checker.is_ready().await);
}

/// The Prometheus recorder is process-global, so everything that depends on
/// it lives in this one test.
#[tokio::test]
async fn test_prometheus_exposition() {
    let handle = init_metrics().unwrap();
    let again = init_metrics().unwrap();

    let (_store, service) = common::memory_ledger(&[(1, dec!(10)), (2, dec!(0))]);
    service.deposit(1, dec!(5)).await.unwrap();
    service.transfer(2, 1, dec!(1)).await.unwrap_err();
    service.recent_transactions(1, 10).await.unwrap();

    let app = create_router(AppState::new(service, 10).with_metrics(handle));
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/users/1/balance").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("ledger_operations_committed_total"));
    assert!(text.contains("reason=\"INSUFFICIENT_FUNDS\""));
    assert!(text.contains("ledger_history_records_returned"));
    assert!(text.contains("path=\"/users/:id/balance\""));
    assert!(again.render().contains("ledger_operations_committed_total"));
}
