//! Dashboard-side sync for Workforce.
//!
//! A [`Session`] keeps a [`Store`] current from three sources: the push
//! channel, a periodic reconciliation poll of `/api/tasks`, and explicit
//! user actions through [`ApiClient`].

pub mod api;
pub mod backoff;
pub mod config;
pub mod dispatch;
pub mod notifications;
pub mod push;
pub mod reconcile;
pub mod session;
pub mod store;

pub use api::{ApiClient, ApiError};
pub use config::SyncConfig;
pub use push::ConnectionState;
pub use session::{Session, SyncError};
pub use store::{SharedStore, Store};
