//! CRUD access to the backend collections

use super::{ApiRequest, ClientError, HmsClient};
use hms_core::resource::TOGGLE_STATUS;
use hms_core::{ListQuery, Location, LocationLevel, Page, Resource};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::marker::PhantomData;

/// Client for one collection, e.g. `/patients`. Every call goes through the
/// authenticated gateway.
pub struct ResourceClient<R> {
    client: HmsClient,
    path: Cow<'static, str>,
    toggle_action: &'static str,
    _marker: PhantomData<fn() -> R>,
}

impl<R> Clone for ResourceClient<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            path: self.path.clone(),
            toggle_action: self.toggle_action,
            _marker: PhantomData,
        }
    }
}

impl HmsClient {
    /// Typed client for a known collection
    pub fn resource<R: Resource>(&self) -> ResourceClient<R> {
        ResourceClient {
            client: self.clone(),
            path: Cow::Borrowed(R::PATH),
            toggle_action: R::TOGGLE_ACTION,
            _marker: PhantomData,
        }
    }

    /// Untyped client for any collection path, yielding raw JSON rows
    pub fn collection(&self, path: impl Into<String>) -> ResourceClient<JsonValue> {
        let path: String = path.into();
        ResourceClient {
            client: self.clone(),
            path: Cow::Owned(path.trim_matches('/').to_string()),
            toggle_action: TOGGLE_STATUS,
            _marker: PhantomData,
        }
    }

    /// Locations at one administrative level, optionally under a parent
    pub async fn locations(
        &self,
        level: LocationLevel,
        parent_id: Option<&str>,
    ) -> Result<Vec<Location>, ClientError> {
        let mut request = ApiRequest::get(format!("/location/{}", level.path_segment()));
        if let Some(parent_id) = parent_id {
            request = request.query("parent_id", parent_id);
        }
        let body: LocationsBody = self.execute(&request).await?;
        Ok(match body {
            LocationsBody::Page(page) => page.data,
            LocationsBody::List(list) => list,
        })
    }
}

/// Location endpoints answer either with a page or a bare array
#[derive(Deserialize)]
#[serde(untagged)]
enum LocationsBody {
    Page(Page<Location>),
    List(Vec<Location>),
}

impl<R: DeserializeOwned> ResourceClient<R> {
    /// Collection path without slashes, e.g. `hospital-staff`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Override the toggle action segment
    pub fn with_toggle_action(mut self, action: &'static str) -> Self {
        self.toggle_action = action;
        self
    }

    /// Same collection, raw JSON rows
    pub fn untyped(self) -> ResourceClient<JsonValue> {
        ResourceClient {
            client: self.client,
            path: self.path,
            toggle_action: self.toggle_action,
            _marker: PhantomData,
        }
    }

    fn item_path(&self, id: &str) -> Result<String, ClientError> {
        if id.is_empty() || id.contains(['/', '?', '#']) {
            return Err(ClientError::BadRequest(format!("invalid identifier {id:?}")));
        }
        Ok(format!("/{}/{}", self.path, id))
    }

    fn action_path(&self, id: &str, action: &str) -> Result<String, ClientError> {
        Ok(format!("{}/{}", self.item_path(id)?, action))
    }

    /// `GET /{path}` with paging, search, sort and filters
    pub async fn list(&self, query: &ListQuery) -> Result<Page<R>, ClientError> {
        let request = ApiRequest::get(format!("/{}", self.path)).query_pairs(query.to_pairs());
        self.client.execute(&request).await
    }

    pub async fn get(&self, id: &str) -> Result<R, ClientError> {
        self.client.execute(&ApiRequest::get(self.item_path(id)?)).await
    }

    pub async fn create<B: Serialize + ?Sized>(&self, body: &B) -> Result<R, ClientError> {
        let request = ApiRequest::post(format!("/{}", self.path)).json(body)?;
        self.client.execute(&request).await
    }

    pub async fn update<B: Serialize + ?Sized>(&self, id: &str, body: &B) -> Result<R, ClientError> {
        let request = ApiRequest::put(self.item_path(id)?).json(body)?;
        self.client.execute(&request).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.client
            .execute_empty(&ApiRequest::delete(self.item_path(id)?))
            .await
    }

    /// Flip the active flag (`toggle-status`, or `toggle-activation` for users)
    pub async fn toggle(&self, id: &str) -> Result<(), ClientError> {
        let path = self.action_path(id, self.toggle_action)?;
        self.client.execute_empty(&ApiRequest::patch(path)).await
    }

    pub async fn soft_delete(&self, id: &str) -> Result<(), ClientError> {
        let path = self.action_path(id, "soft-delete")?;
        self.client.execute_empty(&ApiRequest::patch(path)).await
    }

    pub async fn restore(&self, id: &str) -> Result<(), ClientError> {
        let path = self.action_path(id, "restore")?;
        self.client.execute_empty(&ApiRequest::patch(path)).await
    }
}
