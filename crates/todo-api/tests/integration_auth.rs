//! Registration, sessions and authentication over HTTP.

mod common;

use axum::http::{Method, StatusCode, header};
use chrono::Utc;
use serde_json::json;

use common::{Auth, TestApp, request};
use todo_api::state::Ctx;
use todo_db::queries;

#[tokio::test]
async fn register_then_fetch_profile() {
    let app = TestApp::new();
    let (user_id, token) = app.register("alice", "secret").await;

    let res = app.call(Method::GET, "/users", Auth::Bearer(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], true);
    assert_eq!(
        res.body["user"],
        json!({ "id": user_id, "username": "alice", "firstName": null, "lastName": null })
    );
}

#[tokio::test]
async fn register_response_carries_expiration() {
    let app = TestApp::new();
    let res = app
        .call(
            Method::POST,
            "/users",
            Auth::None,
            Some(json!({ "username": "alice", "password": "secret", "firstName": "Alice" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert!(res.body["expirationDate"].is_string());
    assert!(res.body["token"].is_string());
}

#[tokio::test]
async fn duplicate_username_is_conflict() {
    let app = TestApp::new();
    app.register("alice", "secret").await;

    let res = app
        .call(
            Method::POST,
            "/users",
            Auth::None,
            Some(json!({ "username": "alice", "password": "other" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.code(), "username-taken");
}

#[tokio::test]
async fn username_with_colon_is_rejected() {
    let app = TestApp::new();
    let res = app
        .call(
            Method::POST,
            "/users",
            Auth::None,
            Some(json!({ "username": "a:b", "password": "secret" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.code(), "invalid-body");
}

#[tokio::test]
async fn login_with_credentials_issues_token() {
    let app = TestApp::new();
    app.register("alice", "secret").await;

    let res = app
        .call(Method::POST, "/sessions", Auth::Basic("alice", "secret"), None)
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let token = res.body["token"].as_str().unwrap().to_string();

    let res = app.call(Method::GET, "/users", Auth::Bearer(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["username"], "alice");
}

#[tokio::test]
async fn bad_credentials_are_distinct_401s_with_challenge() {
    let app = TestApp::new();
    app.register("alice", "secret").await;

    let res = app
        .call(Method::POST, "/sessions", Auth::Basic("bob", "secret"), None)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "missing-user");
    assert!(res.headers.contains_key(header::WWW_AUTHENTICATE));

    let res = app
        .call(Method::POST, "/sessions", Auth::Basic("alice", "wrong"), None)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "invalid-password");
}

#[tokio::test]
async fn api_clients_get_no_challenge() {
    let app = TestApp::new();
    let mut req = request(Method::GET, "/users", Auth::None, None);
    req.headers_mut()
        .insert("x-requested-with", "XMLHttpRequest".parse().unwrap());

    let res = app.send(req).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "auth-required");
    assert!(!res.headers.contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn session_creation_rejects_tokens() {
    let app = TestApp::new();
    let (_, token) = app.register("alice", "secret").await;

    let res = app.call(Method::POST, "/sessions", Auth::Bearer(&token), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "auth-required");
}

#[tokio::test]
async fn tampered_token_is_invalid_auth() {
    let app = TestApp::new();
    let (_, token) = app.register("alice", "secret").await;

    let mut chars: Vec<char> = token.chars().collect();
    let i = chars.len() / 2;
    chars[i] = if chars[i] == 'A' { 'B' } else { 'A' };
    let tampered: String = chars.into_iter().collect();

    let res = app.call(Method::GET, "/users", Auth::Bearer(&tampered), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "invalid-auth");
}

#[tokio::test]
async fn expired_session_is_rejected() {
    let app = TestApp::new();
    let (user_id, _) = app.register("alice", "secret").await;

    // a session that expired a second ago, sealed like any other
    let session = todo_api::state::run(&app.state, move |ctx: &Ctx<'_>| {
        let past = Ctx {
            state: ctx.state,
            conn: ctx.conn,
            now: Utc::now() - chrono::Duration::hours(1) - chrono::Duration::seconds(1),
        };
        past.open_session(user_id)
    })
    .await
    .unwrap();

    let res = app
        .call(Method::GET, "/users", Auth::Bearer(&session.token), None)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "expired-session");
}

#[tokio::test]
async fn logout_ends_only_the_current_session() {
    let app = TestApp::new();
    let (_, first) = app.register("alice", "secret").await;
    let res = app
        .call(Method::POST, "/sessions", Auth::Basic("alice", "secret"), None)
        .await;
    let second = res.body["token"].as_str().unwrap().to_string();

    let res = app.call(Method::DELETE, "/sessions", Auth::Bearer(&first), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["removed"], 1);

    let res = app.call(Method::GET, "/users", Auth::Bearer(&first), None).await;
    assert_eq!(res.code(), "expired-session");
    let res = app.call(Method::GET, "/users", Auth::Bearer(&second), None).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn credential_logout_ends_every_session() {
    let app = TestApp::new();
    let (_, first) = app.register("alice", "secret").await;
    app.call(Method::POST, "/sessions", Auth::Basic("alice", "secret"), None)
        .await;

    let res = app
        .call(Method::DELETE, "/sessions", Auth::Basic("alice", "secret"), None)
        .await;
    assert_eq!(res.body["removed"], 2);

    let res = app.call(Method::GET, "/users", Auth::Bearer(&first), None).await;
    assert_eq!(res.code(), "expired-session");
}

#[tokio::test]
async fn password_change_takes_effect() {
    let app = TestApp::new();
    let (user_id, token) = app.register("alice", "secret").await;

    let before = app
        .state
        .db
        .with_conn(|conn| queries::find_user_by_id(conn, user_id))
        .unwrap()
        .unwrap();

    let res = app
        .call(
            Method::PUT,
            "/users",
            Auth::Bearer(&token),
            Some(json!({ "password": "new-secret", "lastName": "Liddell" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["lastName"], "Liddell");

    let after = app
        .state
        .db
        .with_conn(|conn| queries::find_user_by_id(conn, user_id))
        .unwrap()
        .unwrap();
    assert_ne!(before.salt, after.salt);

    let res = app
        .call(Method::POST, "/sessions", Auth::Basic("alice", "secret"), None)
        .await;
    assert_eq!(res.code(), "invalid-password");
    let res = app
        .call(Method::POST, "/sessions", Auth::Basic("alice", "new-secret"), None)
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
}

#[tokio::test]
async fn rename_onto_taken_username_is_conflict() {
    let app = TestApp::new();
    app.register("alice", "secret").await;
    let (_, bob) = app.register("bob", "secret").await;

    let res = app
        .call(Method::PUT, "/users", Auth::Bearer(&bob), Some(json!({ "username": "alice" })))
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.code(), "username-taken");
}

#[tokio::test]
async fn account_deletion_needs_credentials_and_cascades() {
    let app = TestApp::new();
    let (_, token) = app.register("alice", "secret").await;

    let res = app.call(Method::DELETE, "/users", Auth::Bearer(&token), None).await;
    assert_eq!(res.code(), "auth-required");

    let res = app
        .call(Method::DELETE, "/users", Auth::Basic("alice", "secret"), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app.call(Method::GET, "/users", Auth::Bearer(&token), None).await;
    assert_eq!(res.code(), "expired-session");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let app = TestApp::new();
    let res = app.call(Method::GET, "/nope", Auth::None, None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.code(), "not-found");
    assert_eq!(res.body["success"], false);
}

#[tokio::test]
async fn health_is_open() {
    let app = TestApp::new();
    let res = app.call(Method::GET, "/health", Auth::None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!({ "success": true, "status": "ok" }));
}
