//! HMS HTTP client
//!
//! An authenticated REST client for the hospital administration backend.
//! Every resource call goes through [`HmsClient::send`], which attaches the
//! stored bearer token, renews it when it is known to be expired, and resends
//! once after a 401.

#[macro_use]
extern crate tracing;

pub mod client;
pub mod types;

pub use client::{
    ApiRequest, HmsClient, HmsClientBuilder, ResourceClient,
    clock::{Clock, ManualClock, SystemClock},
    config::ClientConfig,
    error::ClientError,
    navigator::{LOGIN_ROUTE, LogNavigator, Navigator},
    store::{FileTokenStore, MemoryTokenStore, StorageKeys, TokenStore},
};
