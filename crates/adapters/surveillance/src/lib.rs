//! # camhub-adapter-surveillance
//!
//! HTTP transport adapter for the recorder's query-parameter web API.
//!
//! ## Responsibilities
//! - Implement the [`ApiTransport`](camhub_app::ports::ApiTransport) port
//!   on top of [reqwest](https://docs.rs/reqwest)
//! - Classify response bodies: JSON envelopes are decoded, binary bodies
//!   (snapshots, streams) are passed through unparsed
//! - Map client errors into the domain's transport error taxonomy
//!
//! No session or retry logic lives here — that is the request gateway's
//! job in `camhub-app`. This adapter performs exactly one round trip per
//! call.
//!
//! ## Dependency rule
//! Depends on `camhub-app` (for port traits) and `camhub-domain`.

pub mod config;
pub mod transport;

pub use config::TransportConfig;
pub use transport::ReqwestTransport;
