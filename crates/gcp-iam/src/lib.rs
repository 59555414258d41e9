//! gcp-iam - Local cache for Google Cloud IAM roles, permissions and services
//!
//! The catalog is pulled from the IAM API and the gcloud CLI into a SQLite
//! file, then queried offline:
//! - [`store::IamStore`] holds roles, (permission, role) pairs and services
//! - [`iam::IamClient`] and [`services::GcloudServiceLister`] fetch the catalog
//! - [`sync::Synchronizer`] reconciles the two, tolerating per-item failures

pub mod catalog;
pub mod compare;
pub mod config;
pub mod credentials;
pub mod error;
pub mod iam;
pub mod services;
pub mod store;
pub mod sync;

pub use catalog::{normalize_role_name, qualified_role_name, RoleCatalog};
pub use config::Config;
pub use error::{CatalogError, SyncError};
pub use store::{IamStore, PermissionSummary, Role, Service};
pub use sync::Synchronizer;
