mod common;

use chrono::Duration;
use common::{harness, token, valid_pair};
use hms_core::TokenSet;
use hms_http::ClientError;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn login_stores_both_tokens_with_absolute_expiry() {
    let h = harness(|_| TokenSet::default()).await;

    Mock::given(method("POST"))
        .and(path("/account/login"))
        .and(body_json(json!({ "health_id": "H123", "password": "secret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A",
            "expires_in": 900,
            "refresh_token": "R",
            "refresh_expires_in": 86400,
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    h.client.login("H123", "secret").await.unwrap();

    let tokens = h.tokens();
    let access = tokens.access.unwrap();
    let refresh = tokens.refresh.unwrap();
    assert_eq!(access.value, "A");
    assert_eq!(access.expires_at, h.now + Duration::seconds(900));
    assert_eq!(refresh.value, "R");
    assert_eq!(refresh.expires_at, h.now + Duration::seconds(86400));

    let received = h.server.received_requests().await.unwrap();
    assert!(!received[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn failed_login_leaves_the_store_untouched() {
    let h = harness(|_| TokenSet::default()).await;

    Mock::given(method("POST"))
        .and(path("/account/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid credentials" })),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h.client.login("H123", "wrong").await.unwrap_err();

    match err {
        ClientError::AuthenticationFailed(message) => assert_eq!(message, "Invalid credentials"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.tokens().is_empty());
    assert!(h.navigator.routes().is_empty());
}

#[tokio::test]
async fn logout_clears_tokens() {
    let h = harness(valid_pair).await;
    assert!(h.client.is_authenticated().unwrap());

    h.client.logout().unwrap();

    assert!(h.tokens().is_empty());
    assert!(!h.client.is_authenticated().unwrap());
}

#[tokio::test]
async fn session_with_only_a_live_refresh_token_is_authenticated() {
    let h = harness(|now| TokenSet {
        access: Some(token("A", now - Duration::hours(1))),
        refresh: Some(token("R", now + Duration::hours(1))),
    })
    .await;
    assert!(h.client.is_authenticated().unwrap());

    h.clock.advance(Duration::hours(2));
    assert!(!h.client.is_authenticated().unwrap());
}

#[tokio::test]
async fn permissions_are_fetched_with_the_bearer_token() {
    let h = harness(valid_pair).await;

    Mock::given(method("GET"))
        .and(path("/me/permissions"))
        .and(header("authorization", "Bearer A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "permissions": ["patients.read", "patients.write"],
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let permissions = h.client.permissions().await.unwrap();
    assert!(permissions.can("patients.write"));
    assert!(!permissions.can("users.write"));
}

#[tokio::test]
async fn session_reports_the_stored_pair() {
    let h = harness(valid_pair).await;
    assert_eq!(h.client.session().unwrap(), valid_pair(h.now));
}

#[tokio::test]
async fn login_with_out_of_range_expiry_is_refused() {
    let h = harness(|_| TokenSet::default()).await;

    Mock::given(method("POST"))
        .and(path("/account/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A",
            "expires_in": 9_000_000_000_000_000_i64,
            "refresh_token": "R",
            "refresh_expires_in": 86400,
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.client.login("H123", "secret").await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidResponse(_)));
    assert!(h.tokens().is_empty());
}
