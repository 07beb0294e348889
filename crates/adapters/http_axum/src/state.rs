//! Shared application state for axum handlers.

use std::sync::Arc;

use camhub_app::ports::{ApiTransport, CredentialCipher, DeviceStore, EventPublisher};
use camhub_app::registry::HubRegistry;

/// Application state shared across all axum handlers.
///
/// Generic over the port types to avoid dynamic dispatch; `Clone` is
/// implemented manually so the port types themselves do not need to be
/// `Clone` — only the `Arc` wrapper is cloned.
pub struct AppState<T, C, S, P> {
    /// Registry of live devices, the correlator's lookup surface.
    pub registry: Arc<HubRegistry<T, C, S, P>>,
}

impl<T, C, S, P> Clone for AppState<T, C, S, P> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T, C, S, P> AppState<T, C, S, P>
where
    T: ApiTransport + 'static,
    C: CredentialCipher + 'static,
    S: DeviceStore + 'static,
    P: EventPublisher + 'static,
{
    /// Create the handler state over a device registry.
    pub fn new(registry: Arc<HubRegistry<T, C, S, P>>) -> Self {
        Self { registry }
    }
}
