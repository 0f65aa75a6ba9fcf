//! Health checks, request ids, malformed bodies and auth rate limiting.

#![allow(clippy::unwrap_used)]

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use serde_json::json;

use iutcart_integration_tests::TestApp;
use iutcart_server::config::ServerConfig;

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();

    let res = app.get("/health", None).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text, "ok");
}

#[tokio::test]
async fn test_readiness_follows_store() {
    let app = TestApp::new();

    assert_eq!(app.get("/health/ready", None).await.status, StatusCode::OK);

    app.store.set_unavailable(true);
    assert_eq!(
        app.get("/health/ready", None).await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let app = TestApp::new();

    let res = app.get("/health", None).await;

    let id = res.headers.get("x-request-id").unwrap().to_str().unwrap();
    assert!(!id.is_empty());
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::new();
    let request = Request::get("/health")
        .header("x-request-id", "trace-me-123")
        .body(Body::empty())
        .unwrap();

    let res = app.send(request).await;

    assert_eq!(res.headers.get("x-request-id").unwrap(), "trace-me-123");
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let app = TestApp::new();
    let request = Request::post("/api/users/signin")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\": "))
        .unwrap();

    let res = app.send(request).await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.body["message"].is_string());
}

#[tokio::test]
async fn test_missing_fields_are_a_bad_request() {
    let app = TestApp::new();

    let res = app
        .post("/api/users/signin", None, json!({ "email": "ada@example.com" }))
        .await;

    assert!(res.status.is_client_error());
    assert!(res.body["message"].is_string());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::new();

    let res = app.get("/api/nothing-here", None).await;

    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

fn signin_from(peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder =
        Request::post("/api/users/signin").header(header::CONTENT_TYPE, "application/json");
    if let Some(forwarded_for) = forwarded_for {
        builder = builder.header("x-forwarded-for", forwarded_for);
    }
    let mut request = builder
        .body(Body::from(
            json!({ "email": "nobody@example.com", "password": "x" }).to_string(),
        ))
        .unwrap();
    let peer: SocketAddr = format!("{peer}:40000").parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

#[tokio::test]
async fn test_auth_routes_are_rate_limited_per_client() {
    let mut config = ServerConfig::for_tests();
    config.rate_limit_auth = true;
    let app = TestApp::with_config(config);

    // The burst allowance goes through, then the client is throttled
    for _ in 0..5 {
        let res = app.send(signin_from("203.0.113.7", None)).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }
    let throttled = app.send(signin_from("203.0.113.7", None)).await;
    assert_eq!(throttled.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        throttled.body["message"],
        "Too many requests, please try again later"
    );

    // Another client has its own allowance
    let other = app.send(signin_from("198.51.100.2", None)).await;
    assert_eq!(other.status, StatusCode::UNAUTHORIZED);

    // Order routes are not limited
    let orders = app.get("/api/orders/mine", None).await;
    assert_eq!(orders.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_reset_the_limit() {
    let mut config = ServerConfig::for_tests();
    config.rate_limit_auth = true;
    let app = TestApp::with_config(config);

    // A direct client cannot pick its own key through the header
    for i in 0..5 {
        let forged = format!("10.9.0.{i}");
        let res = app.send(signin_from("203.0.113.7", Some(&forged))).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }
    let res = app.send(signin_from("203.0.113.7", Some("10.9.0.99"))).await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_trusted_proxy_limits_the_rightmost_client_hop() {
    let mut config = ServerConfig::for_tests();
    config.rate_limit_auth = true;
    config.trusted_proxies = vec![IpAddr::from([10, 0, 0, 2])];
    let app = TestApp::with_config(config);

    // The first hop is client supplied; the proxy appends the real address
    for i in 0..5 {
        let chain = format!("10.9.0.{i}, 198.51.100.2");
        let res = app.send(signin_from("10.0.0.2", Some(&chain))).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }
    let res = app
        .send(signin_from("10.0.0.2", Some("10.9.0.42, 198.51.100.2")))
        .await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        res.headers.get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    // A different client behind the same proxy is unaffected
    let res = app.send(signin_from("10.0.0.2", Some("198.51.100.3"))).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}
