//! Contract Test: Admin API Client
//!
//! Constraints verified:
//! - One probe is exactly one GET, and only 2xx counts as ready
//! - The credential update authenticates with the bootstrap identity first
//! - The update carries the bearer token and the full replacement body
//! - Rejections surface as errors, and nothing is retried
//!
//! If this test fails, the handshake agent may report success it never had.

mod common;

use bastion_admin_http::HttpAdminApi;
use bastion_core::traits::{AdminApi, CredentialUpdate};
use bastion_core::{Error, HandshakeAgent, HandshakeOutcome};
use bastion_core::config::HandshakeSettings;
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn probe_succeeds_on_2xx() {
    let server = StubAdminServer::ready().await;
    let api = HttpAdminApi::from_settings(&server.settings()).unwrap();

    api.probe().await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/api/");
}

#[tokio::test]
async fn probe_fails_on_error_status() {
    let server = StubAdminServer::start(&[("GET", "/api/", 502, "bad gateway")]).await;
    let api = HttpAdminApi::from_settings(&server.settings()).unwrap();

    let err = api.probe().await.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
}

#[tokio::test]
async fn probe_fails_when_nothing_listens() {
    let server = StubAdminServer::ready().await;
    let mut settings = server.settings();
    // Port 9 (discard) is closed on any test host
    settings.api_url = "http://127.0.0.1:9".to_string();
    let api = HttpAdminApi::from_settings(&settings).unwrap();

    assert!(api.probe().await.is_err());
}

#[tokio::test]
async fn credentials_replaced_with_bearer_token() {
    let server = StubAdminServer::ready().await;
    let settings = server.settings();
    let api = HttpAdminApi::from_settings(&settings).unwrap();

    let response = api
        .replace_credentials(&CredentialUpdate::from_settings(&settings))
        .await
        .unwrap();
    assert_eq!(response["id"], 1);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);

    let token_request = &requests[0];
    assert_eq!(token_request.method, "POST");
    assert_eq!(token_request.path, "/api/tokens");
    assert_eq!(token_request.json()["identity"], "admin@example.com");
    assert_eq!(token_request.json()["secret"], "changeme");

    let update = &requests[1];
    assert_eq!(update.method, "PUT");
    assert_eq!(update.path, "/api/users/1");
    assert_eq!(update.authorization.as_deref(), Some("Bearer bearer-abc"));

    let body = update.json();
    assert_eq!(body["email"], "a@b.com");
    assert_eq!(body["name"], "Administrator");
    assert_eq!(body["nickname"], "Admin");
    assert_eq!(body["password"], "secret123");
    assert_eq!(body["roles"], serde_json::json!(["admin"]));
}

#[tokio::test]
async fn rejected_default_credentials_stop_before_update() {
    let server = StubAdminServer::start(&[
        ("GET", "/api/", 200, "{}"),
        ("POST", "/api/tokens", 401, r#"{"error":"invalid credentials"}"#),
    ])
    .await;
    let settings = server.settings();
    let api = HttpAdminApi::from_settings(&settings).unwrap();

    let err = api
        .replace_credentials(&CredentialUpdate::from_settings(&settings))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Mutation(_)));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn missing_user_endpoint_fails_the_update() {
    let server = StubAdminServer::start(&[
        ("GET", "/api/", 200, "{}"),
        ("POST", "/api/tokens", 200, r#"{"token":"bearer-abc"}"#),
    ])
    .await;
    let settings = server.settings();
    let api = HttpAdminApi::from_settings(&settings).unwrap();

    let err = api
        .replace_credentials(&CredentialUpdate::from_settings(&settings))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Mutation(_)));
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].method, "PUT");
    assert_eq!(requests[1].path, "/api/users/1");
    assert_eq!(requests[1].authorization.as_deref(), Some("Bearer bearer-abc"));
}

#[tokio::test]
async fn handshake_over_http_succeeds_once() {
    let server = StubAdminServer::ready().await;
    let settings = server.settings();
    let api: Arc<dyn AdminApi> = Arc::new(HttpAdminApi::from_settings(&settings).unwrap());

    let (agent, _events) = HandshakeAgent::new(
        api,
        CredentialUpdate::from_settings(&settings),
        &HandshakeSettings {
            max_attempts: 3,
            delay_secs: 0,
        },
    );
    let outcome = agent.spawn().join().await.unwrap();

    assert_eq!(
        outcome,
        HandshakeOutcome::Succeeded {
            user_id: "1".to_string()
        }
    );
    let puts = server
        .requests()
        .iter()
        .filter(|r| r.method == "PUT")
        .count();
    assert_eq!(puts, 1);
}
