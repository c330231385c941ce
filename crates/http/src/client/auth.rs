//! Session management: sign-in, sign-out and the signed-in user's grants

use super::{ApiRequest, ClientError, HmsClient};
use crate::types::{LoginRequest, LoginResponse};
use chrono::Duration;
use hms_core::{Permissions, StoredToken, TokenSet};
use reqwest::Method;

pub(crate) const LOGIN_PATH: &str = "/account/login";
pub(crate) const PERMISSIONS_PATH: &str = "/me/permissions";

impl HmsClient {
    /// Sign in with a health ID and password and store the issued token pair
    pub async fn login(&self, health_id: &str, password: &str) -> Result<(), ClientError> {
        let request = self.request(Method::POST, LOGIN_PATH).json(&LoginRequest {
            health_id: health_id.to_string(),
            password: password.to_string(),
        });
        let response: LoginResponse = self.execute_public(request).await?;

        let now = self.inner.clock.now();
        let access = StoredToken::issued(response.access_token, now, response.expires_in)
            .ok_or_else(|| unusable_expiry("expires_in", response.expires_in))?;
        let refresh =
            StoredToken::issued(response.refresh_token, now, response.refresh_expires_in)
                .ok_or_else(|| unusable_expiry("refresh_expires_in", response.refresh_expires_in))?;
        self.inner.store.set(&TokenSet {
            access: Some(access),
            refresh: Some(refresh),
        })?;

        info!("signed in");
        Ok(())
    }

    /// Drop the stored token pair
    pub fn logout(&self) -> Result<(), ClientError> {
        self.inner.store.clear()?;
        info!("signed out");
        Ok(())
    }

    /// The token pair as currently stored
    pub fn session(&self) -> Result<TokenSet, ClientError> {
        Ok(self.inner.store.get()?)
    }

    /// Whether a token that can still authorize or renew the session is stored
    pub fn is_authenticated(&self) -> Result<bool, ClientError> {
        let now = self.inner.clock.now();
        let tokens = self.inner.store.get()?;
        let live = |token: &Option<StoredToken>| {
            token
                .as_ref()
                .is_some_and(|t| !t.is_expired_at(now, Duration::zero()))
        };
        Ok(live(&tokens.access) || live(&tokens.refresh))
    }

    /// Permissions granted to the signed-in user
    pub async fn permissions(&self) -> Result<Permissions, ClientError> {
        self.execute(&ApiRequest::get(PERMISSIONS_PATH)).await
    }
}

fn unusable_expiry(field: &str, secs: i64) -> ClientError {
    ClientError::InvalidResponse(format!("{field} of {secs}s is out of range"))
}
