//! Authenticated request gateway
//!
//! Attaches the stored access token, renews it up front when its recorded
//! expiry has passed, and renews-and-resends once when the backend answers
//! 401. Renewal is serialized: callers that queue up behind an in-flight
//! renewal reuse its result instead of hitting the refresh endpoint again.

use super::error::{ClientError, error_message};
use super::navigator::LOGIN_ROUTE;
use super::{ApiRequest, HmsClient};
use crate::types::{RefreshRequest, RefreshResponse};
use chrono::{DateTime, Duration, Utc};
use hms_core::{StoredToken, TokenSet};
use reqwest::{Method, Response, StatusCode, header};

pub(crate) const REFRESH_PATH: &str = "/token/refresh";

/// Why the refresh endpoint did not hand out a new token
enum RenewalError {
    /// The backend answered and refused; the session cannot continue
    Rejected(String),
    /// The endpoint could not be reached
    Transport(reqwest::Error),
}

impl HmsClient {
    /// Send a request with the stored bearer token.
    ///
    /// Returns whatever the backend answered, including error statuses; only
    /// a 401 is acted upon, by refreshing and resending at most once. A 401
    /// that cannot be recovered (no refresh token stored) is returned as is.
    ///
    /// Fails with [`ClientError::SessionExpired`] when the refresh token is
    /// expired or rejected; the stored tokens are cleared and the navigator
    /// is sent to the login route before returning.
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, ClientError> {
        let mut bearer = self.inner.store.get()?.access;

        if bearer.as_ref().is_some_and(|token| self.is_stale(token)) {
            debug!(path = %request.path, "access token expired locally, refreshing before send");
            let seen = bearer.as_ref().map(|token| token.value.clone());
            if let Some(fresh) = self.refresh_access_token(seen.as_deref()).await? {
                bearer = Some(fresh);
            }
        }

        let bearer = bearer.map(|token| token.value);
        let response = self.dispatch(request, bearer.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path = %request.path, "request rejected with 401, refreshing");
        match self.refresh_access_token(bearer.as_deref()).await? {
            Some(fresh) => self.dispatch(request, Some(&fresh.value)).await,
            None => Ok(response),
        }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<Response, ClientError> {
        let mut builder = self
            .request(request.method.clone(), &request.path)
            .headers(request.headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        Ok(builder.send().await?)
    }

    fn is_stale(&self, token: &StoredToken) -> bool {
        token.is_expired_at(self.inner.clock.now(), self.inner.expiry_margin)
    }

    /// Obtain a usable access token after `seen` turned out to be stale.
    ///
    /// `Ok(None)` means no refresh token is stored and nothing was changed.
    async fn refresh_access_token(
        &self,
        seen: Option<&str>,
    ) -> Result<Option<StoredToken>, ClientError> {
        let _guard = self.inner.refresh_lock.lock().await;

        let tokens = self.inner.store.get()?;
        if let Some(current) = &tokens.access {
            if seen != Some(current.value.as_str()) && !self.is_stale(current) {
                debug!("access token already renewed by a concurrent call");
                return Ok(Some(current.clone()));
            }
        }

        let Some(refresh) = tokens.refresh else {
            debug!("no refresh token stored, cannot renew");
            return Ok(None);
        };

        if refresh.is_expired_at(self.inner.clock.now(), Duration::zero()) {
            warn!("refresh token expired");
            return Err(self.end_session());
        }

        let outcome = self.renew(&refresh.value).await;
        match outcome {
            Ok(renewed) => {
                let now = self.inner.clock.now();
                let Some((access, refresh)) = renewed_pair(renewed, refresh, now) else {
                    warn!("refresh response carries an out-of-range expiry");
                    return Err(self.end_session());
                };
                self.inner.store.set(&TokenSet {
                    access: Some(access.clone()),
                    refresh: Some(refresh),
                })?;
                info!(expires_at = %access.expires_at, "access token renewed");
                Ok(Some(access))
            }
            Err(RenewalError::Rejected(reason)) => {
                warn!(%reason, "refresh token rejected");
                Err(self.end_session())
            }
            Err(RenewalError::Transport(e)) => {
                warn!(error = %e, "refresh endpoint unreachable, keeping session");
                Err(ClientError::Request(e))
            }
        }
    }

    /// Exchange the refresh token, retrying with linear backoff while the
    /// endpoint is unreachable. Any answer other than 2xx is final.
    async fn renew(&self, refresh_token: &str) -> Result<RefreshResponse, RenewalError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let attempts = self.inner.refresh_attempts;
        let mut attempt = 1;

        loop {
            let result = self
                .request(Method::POST, REFRESH_PATH)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let text = response.text().await.unwrap_or_default();
                        return Err(RenewalError::Rejected(error_message(status, &text)));
                    }
                    let bytes = response.bytes().await.map_err(RenewalError::Transport)?;
                    return serde_json::from_slice(&bytes).map_err(|e| {
                        RenewalError::Rejected(format!("unreadable refresh response: {e}"))
                    });
                }
                Err(e) if attempt < attempts => {
                    let delay = backoff_delay(self.inner.refresh_backoff, attempt);
                    warn!(
                        attempt,
                        error = %e,
                        "refresh request failed, retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(RenewalError::Transport(e)),
            }
        }
    }

    /// Forced logout: drop both tokens and send the user to the login route
    fn end_session(&self) -> ClientError {
        if let Err(e) = self.inner.store.clear() {
            error!(error = %e, "failed to clear stored tokens");
        }
        self.inner.navigator.redirect(LOGIN_ROUTE);
        ClientError::SessionExpired
    }
}

/// Tokens to store after a successful renewal. Without rotation the
/// previous refresh token is kept; `None` if an expiry is out of range.
fn renewed_pair(
    renewed: RefreshResponse,
    previous: StoredToken,
    now: DateTime<Utc>,
) -> Option<(StoredToken, StoredToken)> {
    let access = StoredToken::issued(renewed.access_token, now, renewed.expires_in)?;
    let refresh = match (renewed.refresh_token, renewed.refresh_expires_in) {
        (Some(value), Some(secs)) => StoredToken::issued(value, now, secs)?,
        (Some(value), None) => StoredToken { value, ..previous },
        (None, _) => previous,
    };
    Some((access, refresh))
}

/// Linear backoff: `step * attempt`, saturating
fn backoff_delay(step: std::time::Duration, attempt: u32) -> std::time::Duration {
    step.saturating_mul(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::store::mock::MockTokenStore;
    use hms_core::CoreError;
    use std::sync::Arc;

    #[tokio::test]
    async fn store_failures_surface_before_any_request() {
        let mut store = MockTokenStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|| Err(CoreError::storage_error("disk unplugged")));

        // Nothing listens here; reaching the network would fail differently
        let client = HmsClient::builder()
            .base_url("http://127.0.0.1:9")
            .token_store(Arc::new(store))
            .build()
            .unwrap();

        let err = client.send(&ApiRequest::get("/patients")).await.unwrap_err();
        assert!(matches!(err, ClientError::Storage(CoreError::Storage { .. })));
    }

    #[tokio::test]
    async fn failed_clear_still_ends_the_session() {
        let expired = StoredToken::issued("R", Utc::now() - Duration::days(2), 60).unwrap();
        let mut store = MockTokenStore::new();
        store.expect_get().returning(move || {
            Ok(TokenSet {
                access: None,
                refresh: Some(expired.clone()),
            })
        });
        store
            .expect_clear()
            .times(1)
            .returning(|| Err(CoreError::storage_error("read-only")));

        let client = HmsClient::builder()
            .base_url("http://127.0.0.1:9")
            .token_store(Arc::new(store))
            .build()
            .unwrap();

        let err = client.refresh_access_token(None).await.unwrap_err();
        assert!(matches!(err, ClientError::SessionExpired));
    }

    #[test]
    fn backoff_grows_linearly_and_saturates() {
        let step = std::time::Duration::from_millis(500);
        assert_eq!(backoff_delay(step, 1), step);
        assert_eq!(backoff_delay(step, 3), std::time::Duration::from_millis(1500));
        assert_eq!(
            backoff_delay(std::time::Duration::MAX, 2),
            std::time::Duration::MAX
        );
    }

    #[test]
    fn renewal_without_rotation_keeps_the_refresh_token() {
        let now = Utc::now();
        let previous = StoredToken::issued("R", now - Duration::hours(1), 86_400).unwrap();
        let renewed = RefreshResponse {
            access_token: "A2".into(),
            expires_in: 900,
            refresh_token: None,
            refresh_expires_in: None,
        };

        let (access, refresh) = renewed_pair(renewed, previous.clone(), now).unwrap();
        assert_eq!(access.expires_at, now + Duration::seconds(900));
        assert_eq!(refresh, previous);
    }

    #[test]
    fn renewal_with_out_of_range_expiry_is_unusable() {
        let now = Utc::now();
        let previous = StoredToken::issued("R", now, 86_400).unwrap();
        let renewed = RefreshResponse {
            access_token: "A2".into(),
            expires_in: 900,
            refresh_token: Some("R2".into()),
            refresh_expires_in: Some(i64::MAX),
        };

        assert!(renewed_pair(renewed, previous, now).is_none());
    }
}
