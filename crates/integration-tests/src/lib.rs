//! Integration tests for the IUTCart API.
//!
//! Every test drives the real router from [`iutcart_server::app`] in
//! process, backed by the in-memory stores and a mailer that records what
//! it sends. No database or SMTP relay is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p iutcart-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `auth` - sign up, sign in and bearer token checks
//! - `password_reset` - forgot/reset password flow
//! - `orders` - checkout, seller listing, delivery and summary
//! - `operations` - health checks, request ids, rate limiting

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use iutcart_core::{Roles, UserId};
use iutcart_server::app;
use iutcart_server::config::ServerConfig;
use iutcart_server::db::memory::MemoryStore;
use iutcart_server::services::testing::RecordingMailer;
use iutcart_server::services::{NotificationQueue, OutgoingEmail};
use iutcart_server::state::AppState;

/// How long to wait for the notification worker in tests.
pub const EMAIL_WAIT: Duration = Duration::from_secs(2);

/// A router wired to fresh in-memory state.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub config: ServerConfig,
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON body, or `Value::Null` when the body is not JSON.
    pub body: Value,
    pub text: String,
}

/// A signed-up user and their session token.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: UserId,
    pub email: String,
    pub password: String,
    pub token: String,
}

impl TestApp {
    /// Must be called inside a Tokio runtime; it spawns the email worker.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::for_tests())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::default());
        let (notifier, _worker) = NotificationQueue::spawn(mailer.clone(), config.notifications);
        let state = AppState::new(config.clone(), store.stores(), notifier);

        Self {
            router: app(state),
            store,
            mailer,
            config,
        }
    }

    /// Send a request through the full middleware stack.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// Send a prepared request.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::PUT, uri, token, None).await
    }

    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> TestUser {
        let res = self
            .post(
                "/api/users/signup",
                None,
                json!({ "name": name, "email": email, "password": password }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "signup failed: {}", res.text);

        TestUser {
            id: UserId::new(res.body["_id"].as_i64().unwrap()),
            email: email.to_string(),
            password: password.to_string(),
            token: res.body["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/api/users/signin",
            None,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Sign up a user, grant seller rights and return a fresh token that
    /// carries them.
    pub async fn seller(&self, email: &str) -> TestUser {
        let mut user = self.sign_up("Seller", email, "seller-pass").await;
        assert!(
            self.store
                .set_roles(user.id, Roles::new(false, true))
                .await
        );
        let res = self.sign_in(email, "seller-pass").await;
        assert_eq!(res.status, StatusCode::OK);
        user.token = res.body["token"].as_str().unwrap().to_string();
        user
    }

    /// Place an order for `buyer` and return the created order.
    pub async fn place_order(&self, buyer: &TestUser, total: f64) -> Value {
        let res = self
            .post("/api/orders", Some(&buyer.token), order_payload(total))
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "create failed: {}", res.text);
        res.body["order"].clone()
    }

    /// Emails sent once at least `count` arrived (or the wait timed out).
    pub async fn emails(&self, count: usize) -> Vec<OutgoingEmail> {
        self.mailer.wait_for(count, EMAIL_WAIT).await
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// A checkout body with one line and the given total.
pub fn order_payload(total: f64) -> Value {
    json!({
        "orderItems": [{
            "_id": 7,
            "name": "Linen Shirt",
            "slug": "linen-shirt",
            "image": "/images/linen-shirt.jpg",
            "quantity": 2,
            "price": 10.5
        }],
        "shippingAddress": {
            "fullName": "Ada Buyer",
            "address": "12 Rue Victor Hugo",
            "city": "Lyon",
            "postalCode": "69002",
            "country": "France"
        },
        "paymentMethod": "PayPal",
        "itemsPrice": 21,
        "shippingPrice": 5,
        "taxPrice": 3.15,
        "totalPrice": total
    })
}

/// The token at the end of the reset link in a password reset email.
pub fn reset_token_from(email: &OutgoingEmail) -> String {
    let (_, rest) = email.text.split_once("/reset-password/").unwrap();
    rest.split_whitespace().next().unwrap().to_string()
}
