//! Event bus port — publish domain events without knowing the transport.

use std::future::Future;

use camhub_domain::error::HubError;
use camhub_domain::event::Event;

/// Publishes domain events to whoever is listening.
pub trait EventPublisher: Send + Sync {
    /// Publish one event. Implementations should succeed even when nobody
    /// is listening.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HubError>> + Send;
}
