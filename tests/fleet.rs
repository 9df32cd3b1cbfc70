//! Fleet aggregator against wiremock Consul and peer instances.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vault_cert_manager::fleet::{build_router, AggregatorState, FleetAggregator};
use vault_cert_manager::Error;

fn catalog_entry(node: &str, peer: &MockServer) -> Value {
    json!({
        "Node": node,
        "Address": "10.255.255.1",
        "ServiceAddress": "127.0.0.1",
        "ServicePort": peer.address().port()
    })
}

async fn healthy_peer(cert: &str) -> MockServer {
    let peer = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "name": cert,
            "common_name": format!("{}.example.com", cert),
            "not_after": "2030-01-01T00:00:00Z",
            "days_left": 1000,
            "fingerprint": "aa",
            "out_of_sync": false,
            "last_renewed": "2026-01-01T00:00:00Z",
            "status": "healthy"
        }])))
        .mount(&peer)
        .await;
    peer
}

async fn consul_with(entries: Vec<Value>) -> MockServer {
    let consul = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog/service/vault-cert-manager"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(entries)))
        .mount(&consul)
        .await;
    consul
}

fn aggregator(consul: &MockServer) -> FleetAggregator {
    FleetAggregator::new(consul.uri(), "vault-cert-manager", Duration::from_secs(10)).unwrap()
}

#[tokio::test]
async fn poll_all_keeps_failed_peers_and_sorts() {
    let peer_a = healthy_peer("web").await;
    let peer_c = healthy_peer("db").await;
    let peer_b = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&peer_b)
        .await;

    let consul = consul_with(vec![
        catalog_entry("node-c", &peer_c),
        catalog_entry("node-a", &peer_a),
        catalog_entry("node-b", &peer_b),
    ])
    .await;

    let statuses = aggregator(&consul).poll_all().await.unwrap();

    let nodes: Vec<_> = statuses.iter().map(|s| s.node.as_str()).collect();
    assert_eq!(nodes, vec!["node-a", "node-b", "node-c"]);

    let failed: Vec<_> = statuses.iter().filter(|s| s.error.is_some()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].node, "node-b");
    assert_eq!(failed[0].error.as_deref(), Some("status 500: boom"));

    assert_eq!(statuses[0].certs[0].name, "web");
    assert_eq!(statuses[2].certs[0].name, "db");
    assert_eq!(statuses[0].address, format!("127.0.0.1:{}", peer_a.address().port()));
}

#[tokio::test]
async fn undecodable_status_is_reported() {
    let peer = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&peer)
        .await;
    let consul = consul_with(vec![catalog_entry("node-a", &peer)]).await;

    let statuses = aggregator(&consul).poll_all().await.unwrap();
    assert!(statuses[0].error.as_deref().unwrap().starts_with("decode error:"));
}

#[tokio::test]
async fn consul_failure_is_discovery_error() {
    let consul = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog/service/vault-cert-manager"))
        .respond_with(ResponseTemplate::new(503).set_body_string("no leader"))
        .mount(&consul)
        .await;

    let err = aggregator(&consul).poll_all().await.unwrap_err();
    assert!(matches!(err, Error::Discovery(_)));
    assert!(err.to_string().contains("no leader"));
}

#[tokio::test]
async fn proxy_rotate_relays_peer_response() {
    let peer = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rotate/web"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "pki down" })))
        .expect(1)
        .mount(&peer)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/rotate/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .expect(1)
        .mount(&peer)
        .await;
    let consul = consul_with(vec![catalog_entry("node-a", &peer)]).await;
    let aggregator = aggregator(&consul);

    let relayed = aggregator.proxy_rotate("node-a", Some("web")).await.unwrap();
    assert_eq!(relayed.status, 500);
    let body: Value = serde_json::from_slice(&relayed.body).unwrap();
    assert_eq!(body["error"], "pki down");

    let relayed = aggregator.proxy_rotate("node-a", None).await.unwrap();
    assert_eq!(relayed.status, 200);

    let err = aggregator.proxy_rotate("node-z", None).await.unwrap_err();
    assert!(matches!(err, Error::UnknownPeer(_)));
}

#[tokio::test]
async fn router_maps_errors_to_status_codes() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_port = listener.local_addr().unwrap().port();
    drop(listener);

    let consul = consul_with(vec![json!({
        "Node": "node-dead",
        "Address": "127.0.0.1",
        "ServiceAddress": "",
        "ServicePort": dead_port
    })])
    .await;
    let router = build_router(AggregatorState { aggregator: Arc::new(aggregator(&consul)) });

    let response = router
        .clone()
        .oneshot(Request::post("/api/rotate/node-x").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .clone()
        .oneshot(Request::post("/api/rotate/node-dead/web").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = router
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body[0]["node"], "node-dead");
    assert!(body[0]["error"].is_string());
}
