//! Application wiring: config loading, HTTP surface and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use common::{target, MockIssuer};
use vault_cert_manager::api::{build_router, ApiState};
use vault_cert_manager::app::refresh_metrics;
use vault_cert_manager::certs::{CertificateService, LifecycleManager};
use vault_cert_manager::health::SyncChecker;
use vault_cert_manager::observability::CertificateMetrics;
use vault_cert_manager::{config, App};

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let conf_dir = dir.path().join("conf.d");
    std::fs::create_dir_all(&conf_dir).unwrap();

    std::fs::write(
        conf_dir.join("00-main.yml"),
        r#"
vault:
  address: http://127.0.0.1:8200
  auth:
    token:
      value: s.static
prometheus:
  refresh_interval: 1s
"#,
    )
    .unwrap();

    std::fs::write(
        conf_dir.join("10-web.yaml"),
        format!(
            r#"
certificates:
  - name: web
    role: web-role
    common_name: web.example.com
    certificate: {dir}/web/web.crt
    key: {dir}/web/web.key
    ttl: 24h
  - name: proxy
    role: web-role
    common_name: proxy.example.com
    certificate: {dir}/proxy.pem
    key: {dir}/proxy.pem
"#,
            dir = dir.path().display()
        ),
    )
    .unwrap();

    conf_dir
}

#[tokio::test]
async fn app_serves_status_and_stops() {
    let dir = TempDir::new().unwrap();
    let mut config = config::load(write_config(&dir)).unwrap();
    assert_eq!(config.certificates.len(), 2);
    config.prometheus.port = 0;

    let issuer = Arc::new(MockIssuer::new());
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let mut app = App::from_parts(config, issuer.clone(), None, handle).unwrap();

    app.process_once().await.unwrap();
    assert_eq!(issuer.calls(), 2);
    assert!(dir.path().join("web/web.key").exists());
    assert!(dir.path().join("proxy.pem").exists());

    app.start_background_tasks().await.unwrap();
    let port = app.local_addr().unwrap().port();
    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();

    let statuses: Value =
        client.get(format!("{}/api/status", base)).send().await.unwrap().json().await.unwrap();
    let names: Vec<_> = statuses.as_array().unwrap().iter().map(|s| s["name"].clone()).collect();
    assert_eq!(names, vec!["proxy", "web"]);
    assert_eq!(statuses[1]["status"], "critical");
    assert!(!statuses[1]["fingerprint"].as_str().unwrap().is_empty());

    let response = client.post(format!("{}/api/rotate/web", base)).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "web");
    assert_eq!(issuer.calls(), 3);

    let response = client.post(format!("{}/api/rotate/nope", base)).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let response = client.get(format!("{}/metrics", base)).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    drop(client);
    app.stop().await;
}

async fn status_within(router: &axum::Router, limit: Duration) -> Value {
    let response = tokio::time::timeout(
        limit,
        router.clone().oneshot(Request::get("/api/status").body(Body::empty()).unwrap()),
    )
    .await
    .expect("status request waited on the rotation")
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn status_and_metrics_answer_during_rotation() {
    let dir = TempDir::new().unwrap();
    let issuer = Arc::new(MockIssuer::new().with_delay(Duration::from_secs(2)));
    let metrics = CertificateMetrics::new();
    let mut manager = LifecycleManager::new(issuer.clone(), metrics.clone());

    let mut web = target(dir.path(), "web", Duration::from_secs(3_600), false);
    web.on_change = Some("sleep 3".to_string());
    manager.register_with_jitter(web, Duration::ZERO).unwrap();

    let certificates = CertificateService::new(manager);
    let router = build_router(ApiState {
        certificates: certificates.clone(),
        metrics: PrometheusBuilder::new().build_recorder().handle(),
    });

    let rotation = tokio::spawn({
        let certificates = certificates.clone();
        async move { certificates.force_rotate("web").await }
    });

    // Vault request in flight.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(issuer.calls(), 1);
    let body = status_within(&router, Duration::from_secs(1)).await;
    assert_eq!(body[0]["status"], "unknown");

    let checker = SyncChecker::new().unwrap();
    tokio::time::timeout(
        Duration::from_secs(1),
        refresh_metrics(certificates.view(), &checker, &metrics),
    )
    .await
    .expect("metrics refresh waited on the rotation");

    // Material written, on_change still running.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(4);
    while certificates.view().get("web").and_then(|m| m.current).is_none() {
        assert!(tokio::time::Instant::now() < deadline, "certificate never published");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!rotation.is_finished());

    let body = status_within(&router, Duration::from_secs(1)).await;
    assert_eq!(body[0]["fingerprint"], issuer.last_fingerprint("web").unwrap());

    rotation.await.unwrap().unwrap();
}
