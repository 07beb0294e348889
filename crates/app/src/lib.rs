//! # camhub-app
//!
//! Application layer — the session & rule reconciliation engine and the
//! **port definitions** (traits) its adapters implement.
//!
//! ## Responsibilities
//! - Define **port traits** (driven/outbound ports):
//!   - `ApiTransport` — one authenticated HTTP round trip
//!   - `CredentialCipher` — credential encryption at rest
//!   - `DeviceStore` — per-device durable key/value storage
//!   - `EventPublisher` — in-process event delivery
//!   - `ApiCall` — the narrow gateway surface the rule synchronizer runs on
//! - Implement the engine on top of those ports:
//!   - `SessionManager` — single-flight login, session loss detection
//!   - `RequestGateway` — envelope decoding and the retry-once policy
//!   - `RuleSynchronizer` — create-then-match reconciliation of event rules
//!   - `HubRegistry` — station readiness and the session cascade
//!   - webhook correlation and the motion debounce state machine
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `camhub-domain` only (plus `tokio::sync`/`tokio::time`).
//! Never imports adapter crates. Adapters depend on *this* crate, not the
//! reverse.

pub mod event_bus;
pub mod ports;

pub mod callback;
pub mod devices;
pub mod gateway;
pub mod motion;
pub mod registry;
pub mod rules;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
