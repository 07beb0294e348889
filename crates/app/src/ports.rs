//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside
//! world. They are defined here (in `app`) so that both the engine and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod credential_cipher;
pub mod device_store;
pub mod event_bus;
pub mod transport;

pub use credential_cipher::CredentialCipher;
pub use device_store::{DeviceStore, StoreId, keys};
pub use event_bus::EventPublisher;
pub use transport::{ApiCall, ApiTransport, TransportBody};
