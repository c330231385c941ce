//! Bearer token model
//!
//! The client keeps at most one access token and one refresh token. Expiry
//! timestamps are computed locally from the `expires_in` the backend reports
//! and are advisory only: the backend's 401 is what actually ends a token.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A bearer credential together with its locally computed expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
    /// When the token was handed out, if known
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Token with a known expiry and unknown issue time
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
            issued_at: None,
        }
    }

    /// Build a token that expires `expires_in_secs` after `issued_at`.
    ///
    /// Returns `None` when the expiry cannot be represented.
    pub fn issued(
        value: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_in_secs: i64,
    ) -> Option<Self> {
        let lifetime = Duration::try_seconds(expires_in_secs)?;
        let expires_at = issued_at.checked_add_signed(lifetime)?;
        Some(Self {
            value: value.into(),
            expires_at,
            issued_at: Some(issued_at),
        })
    }

    /// Whether the token should be considered expired at `now`.
    ///
    /// `margin` brings the expiry forward to absorb clock skew between the
    /// client and the backend. It never exceeds half the token's lifetime, so
    /// a freshly issued short-lived token is not stale on arrival.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = match self.issued_at {
            Some(issued_at) => {
                let half_life = (self.expires_at - issued_at) / 2;
                margin.min(half_life).max(Duration::zero())
            }
            None => margin,
        };
        now.checked_add_signed(margin)
            .is_none_or(|deadline| deadline >= self.expires_at)
    }
}

/// The access/refresh pair as held by a token store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access: Option<StoredToken>,
    pub refresh: Option<StoredToken>,
}

impl TokenSet {
    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}
