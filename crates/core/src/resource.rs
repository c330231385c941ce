use serde::{Serialize, de::DeserializeOwned};

/// Action segment used by collections that toggle an `is_active` flag
pub const TOGGLE_STATUS: &str = "toggle-status";
/// Action segment used by the user collection
pub const TOGGLE_ACTIVATION: &str = "toggle-activation";

/// A REST collection exposed by the backend.
///
/// `PATH` is the collection root without a leading slash, e.g. `patients`
/// for `GET /patients` and `GET /patients/{id}`.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + 'static {
    const PATH: &'static str;

    /// Action segment for `PATCH /{PATH}/{id}/{TOGGLE_ACTION}`
    const TOGGLE_ACTION: &'static str = TOGGLE_STATUS;

    /// Backend identifier of this row
    fn id(&self) -> &str;
}
