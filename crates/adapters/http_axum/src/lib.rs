//! # camhub-adapter-http-axum
//!
//! HTTP adapter using [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Expose the public callback endpoint the recorder's rules target
//! - Correlate inbound callbacks through the app-layer correlator
//! - Answer quickly and idempotently — the recorder retries on its own
//!   schedule and duplicate deliveries must stay harmless
//!
//! ## Dependency rule
//! Depends on `camhub-app` and `camhub-domain`. The `app` and `domain`
//! crates must never reference this adapter.

pub mod router;
pub mod state;

pub use state::AppState;
