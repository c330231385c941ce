//! Shared fixtures for the client integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use hms_core::{StoredToken, TokenSet};
use hms_http::{HmsClient, HmsClientBuilder, ManualClock, MemoryTokenStore, Navigator};
use serde_json::json;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Navigator that remembers every redirect
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}

pub struct Harness {
    pub server: MockServer,
    pub client: HmsClient,
    pub store: Arc<MemoryTokenStore>,
    pub clock: Arc<ManualClock>,
    pub navigator: Arc<RecordingNavigator>,
    pub now: DateTime<Utc>,
}

impl Harness {
    pub fn tokens(&self) -> TokenSet {
        use hms_http::TokenStore;
        self.store.get().unwrap()
    }

    /// Mount a refresh endpoint that expects `refresh_token` and hands out `access_token`
    pub async fn mock_refresh(&self, refresh_token: &str, access_token: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/token/refresh"))
            .and(body_json(json!({ "refresh_token": refresh_token })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "expires_in": 900,
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }
}

pub fn token(value: &str, expires_at: DateTime<Utc>) -> StoredToken {
    StoredToken::new(value, expires_at)
}

/// Access token "A" valid for 15 minutes, refresh token "R" valid for a day
pub fn valid_pair(now: DateTime<Utc>) -> TokenSet {
    TokenSet {
        access: Some(token("A", now + Duration::minutes(15))),
        refresh: Some(token("R", now + Duration::days(1))),
    }
}

/// Access token "A" that expired a second ago, refresh token "R" still valid
pub fn expired_access(now: DateTime<Utc>) -> TokenSet {
    TokenSet {
        access: Some(token("A", now - Duration::milliseconds(1000))),
        refresh: Some(token("R", now + Duration::days(1))),
    }
}

pub async fn harness(tokens: impl FnOnce(DateTime<Utc>) -> TokenSet) -> Harness {
    harness_with(tokens, |builder| builder).await
}

pub async fn harness_with(
    tokens: impl FnOnce(DateTime<Utc>) -> TokenSet,
    configure: impl FnOnce(HmsClientBuilder) -> HmsClientBuilder,
) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let server = MockServer::start().await;
    let now = Utc::now();
    let store = Arc::new(MemoryTokenStore::with_tokens(tokens(now)));
    let clock = Arc::new(ManualClock::new(now));
    let navigator = Arc::new(RecordingNavigator::default());

    let builder = HmsClient::builder()
        .base_url(server.uri())
        .token_store(store.clone())
        .clock(clock.clone())
        .navigator(navigator.clone())
        .refresh_retry(3, std::time::Duration::from_millis(10));
    let client = configure(builder).build().unwrap();

    Harness {
        server,
        client,
        store,
        clock,
        navigator,
        now,
    }
}
