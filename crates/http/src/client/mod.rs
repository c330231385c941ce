//! HMS API client

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
mod gateway;
pub mod navigator;
mod request;
pub mod resources;
pub mod store;

pub use request::ApiRequest;
pub use resources::ResourceClient;

use clock::{Clock, SystemClock};
use config::ClientConfig;
use error::{ClientError, error_message};
use navigator::{LogNavigator, Navigator};
use reqwest::{Client, ClientBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use store::{MemoryTokenStore, TokenStore};

struct ClientInner {
    http: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    navigator: Arc<dyn Navigator>,
    expiry_margin: chrono::Duration,
    refresh_attempts: u32,
    refresh_backoff: Duration,
    /// Serializes token renewal across clones of the client
    refresh_lock: tokio::sync::Mutex<()>,
}

/// HMS API client. Cheap to clone; clones share tokens and the refresh guard.
#[derive(Clone)]
pub struct HmsClient {
    inner: Arc<ClientInner>,
}

impl HmsClient {
    /// Create a new client with default configuration and in-memory tokens
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> HmsClientBuilder {
        HmsClientBuilder::default()
    }

    /// Builder pre-filled from a loaded [`ClientConfig`]
    pub fn from_config(config: &ClientConfig) -> HmsClientBuilder {
        let mut builder = Self::builder()
            .base_url(config.base_url.clone())
            .user_agent(config.user_agent.clone())
            .expiry_margin(config.expiry_margin())
            .refresh_retry(config.refresh_attempts, config.refresh_backoff());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        builder
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.inner.base_url, path)
        } else {
            format!("{}/{}", self.inner.base_url, path)
        }
    }

    /// Create a request builder without authentication
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.inner.http.request(method, self.url(path))
    }

    /// Send through the gateway and decode a JSON body
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        let response = ensure_success(self.send(request).await?).await?;
        decode(response).await
    }

    /// Send through the gateway, discarding the response body
    pub async fn execute_empty(&self, request: &ApiRequest) -> Result<(), ClientError> {
        ensure_success(self.send(request).await?).await?;
        Ok(())
    }

    /// Execute an unauthenticated request and handle common errors
    async fn execute_public<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = ensure_success(request.send().await?).await?;
        decode(response).await
    }
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    debug!(status = status.as_u16(), %message, "request failed");
    Err(ClientError::from_status(status, message))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Builder for HmsClient
#[derive(Default)]
pub struct HmsClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    store: Option<Arc<dyn TokenStore>>,
    clock: Option<Arc<dyn Clock>>,
    navigator: Option<Arc<dyn Navigator>>,
    expiry_margin: Option<Duration>,
    refresh_attempts: Option<u32>,
    refresh_backoff: Option<Duration>,
}

impl HmsClientBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Where the token pair lives. Defaults to an in-memory store.
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Receiver of the forced-logout redirect
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Treat access tokens as expired this long before their recorded expiry
    pub fn expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = Some(margin);
        self
    }

    /// Attempts and linear backoff step for reaching the refresh endpoint
    pub fn refresh_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.refresh_attempts = Some(attempts);
        self.refresh_backoff = Some(backoff);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<HmsClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        url::Url::parse(&base_url)
            .map_err(|e| ClientError::Configuration(format!("invalid base_url {base_url:?}: {e}")))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let defaults = ClientConfig::default();
        let expiry_margin = self.expiry_margin.unwrap_or_else(|| defaults.expiry_margin());
        let expiry_margin = chrono::Duration::from_std(expiry_margin)
            .map_err(|_| ClientError::Configuration("expiry margin out of range".into()))?;

        let mut client_builder = ClientBuilder::new()
            .user_agent(self.user_agent.unwrap_or(defaults.user_agent.clone()));

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let http = client_builder.build()?;

        Ok(HmsClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(MemoryTokenStore::new())),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                navigator: self.navigator.unwrap_or_else(|| Arc::new(LogNavigator)),
                expiry_margin,
                refresh_attempts: self
                    .refresh_attempts
                    .unwrap_or(defaults.refresh_attempts)
                    .max(1),
                refresh_backoff: self
                    .refresh_backoff
                    .unwrap_or_else(|| defaults.refresh_backoff()),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }
}
