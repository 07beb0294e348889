//! # camhub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the [`DeviceStore`](camhub_app::ports::DeviceStore) port
//! - Manage the `SQLite` connection pool lifecycle
//! - Run database migrations (sqlx embedded migrations)
//!
//! ## Dependency rule
//! Depends on `camhub-app` (for port traits) and `camhub-domain` (for
//! domain types). The `app` and `domain` crates must never reference this
//! adapter.

pub mod device_store;
pub mod error;
pub mod pool;

pub use device_store::SqliteDeviceStore;
pub use error::StorageError;
pub use pool::{Config, Database};
