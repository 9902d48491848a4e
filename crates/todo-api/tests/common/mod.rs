//! Shared helpers for driving the router in-process.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Value, json};
use tower::ServiceExt;

use todo_api::{AppState, AppStateInner, router};
use todo_crypto::keys::generate_secret_key;
use todo_crypto::{HashParams, Hasher, TokenCipher};
use todo_db::Database;

pub fn create_test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().expect("Failed to create test database"),
        cipher: TokenCipher::new(&generate_secret_key().expect("Failed to generate key")),
        hasher: Hasher::new(HashParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        })
        .expect("Failed to build hasher"),
        session_ttl: chrono::Duration::hours(1),
    })
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let state = create_test_state();
        let router = router::build(Arc::clone(&state));
        Self { state, router }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        TestResponse::read(response).await
    }

    pub async fn call(&self, method: Method, uri: &str, auth: Auth<'_>, body: Option<Value>) -> TestResponse {
        self.send(request(method, uri, auth, body)).await
    }

    /// Register a user and return `(user_id, token)`.
    pub async fn register(&self, username: &str, password: &str) -> (i64, String) {
        let res = self
            .call(
                Method::POST,
                "/users",
                Auth::None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "register failed: {}", res.body);
        (
            res.body["userId"].as_i64().unwrap(),
            res.body["token"].as_str().unwrap().to_string(),
        )
    }

    pub async fn create_list(&self, auth: Auth<'_>, name: &str) -> i64 {
        let res = self
            .call(Method::POST, "/lists", auth, Some(json!({ "name": name })))
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "create list failed: {}", res.body);
        res.body["listId"].as_i64().unwrap()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    None,
    Bearer(&'a str),
    Basic(&'a str, &'a str),
}

pub fn request(method: Method, uri: &str, auth: Auth<'_>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    match auth {
        Auth::None => {}
        Auth::Bearer(token) => {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        Auth::Basic(username, password) => {
            let encoded = BASE64.encode(format!("{username}:{password}"));
            builder = builder.header(header::AUTHORIZATION, format!("Basic {encoded}"));
        }
    }

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestResponse {
    async fn read(response: Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}
