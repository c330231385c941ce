//! HMS core types and utilities

pub mod auth;
pub mod error;
pub mod query;
pub mod resource;
pub mod types;

pub use auth::{StoredToken, TokenSet};
pub use error::{CoreError, CoreResult};
pub use query::{ListQuery, Page, SortOrder};
pub use resource::Resource;
pub use types::{
    Appointment, AppointmentStatus, Consultation, Department, HealthFacility, HospitalStaff,
    InsuranceCompany, LabResult, Location, LocationLevel, Patient, Permissions, User,
};
