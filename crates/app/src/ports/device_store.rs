//! Device store port — per-device durable key/value storage.
//!
//! Holds everything a device must keep across restarts: pair data,
//! encrypted credentials, the session token, remote rule ids, the
//! station's registration lists, and the schema version gate.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde_json::Value;

use camhub_domain::error::HubError;
use camhub_domain::id::{CameraId, StationId};

/// Well-known store keys. Rule-id keys come from
/// [`RuleKind::store_key`](camhub_domain::rule::RuleKind::store_key) and
/// registration lists from
/// [`CameraKind::registry_store_key`](camhub_domain::device::CameraKind::registry_store_key).
pub mod keys {
    /// Last known good session id.
    pub const SID: &str = "sid";
    /// Device token issued by a remembered two-factor login.
    pub const DEVICE_TOKEN: &str = "device_token";
    /// Pair data: scheme used to reach the recorder.
    pub const PROTOCOL: &str = "protocol";
    /// Pair data: recorder hostname or address.
    pub const HOST: &str = "host";
    /// Pair data: recorder port.
    pub const PORT: &str = "port";
    /// Encrypted credential blob.
    pub const CREDENTIAL: &str = "credential";
    /// Display name used in rule labels.
    pub const NAME: &str = "name";
    /// Camera kind discriminator.
    pub const KIND: &str = "kind";
    /// Schema version gate for one-time migrations.
    pub const VERSION: &str = "version";
    /// Per-camera motion alarm timeout in seconds.
    pub const MOTION_TIMEOUT: &str = "motion_timeout";
}

/// Storage identity of one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreId {
    Station(StationId),
    Camera(StationId, CameraId),
}

impl StoreId {
    /// The station this device belongs to (itself, for a station).
    #[must_use]
    pub fn station(&self) -> &StationId {
        match self {
            Self::Station(station) | Self::Camera(station, _) => station,
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Station(station) => write!(f, "station/{station}"),
            Self::Camera(station, camera) => write!(f, "camera/{station}/{camera}"),
        }
    }
}

impl FromStr for StoreId {
    type Err = InvalidStoreId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let id = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("station"), Some(station), None, _) => {
                Self::Station(StationId::new(station))
            }
            (Some("camera"), Some(station), Some(camera), None) => {
                let camera = camera
                    .parse()
                    .map_err(|_| InvalidStoreId(s.to_string()))?;
                Self::Camera(StationId::new(station), camera)
            }
            _ => return Err(InvalidStoreId(s.to_string())),
        };
        Ok(id)
    }
}

/// Error returned for a malformed store identity.
#[derive(Debug, thiserror::Error)]
#[error("invalid store id: {0}")]
pub struct InvalidStoreId(String);

/// Durable per-device key/value storage.
pub trait DeviceStore: Send + Sync {
    /// Read one value, `None` when the key was never written.
    fn get(
        &self,
        device: &StoreId,
        key: &str,
    ) -> impl Future<Output = Result<Option<Value>, HubError>> + Send;

    /// Write one value, replacing any previous one.
    fn put(
        &self,
        device: &StoreId,
        key: &str,
        value: Value,
    ) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Remove one key; removing an absent key is a no-op.
    fn delete(
        &self,
        device: &StoreId,
        key: &str,
    ) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Remove every key of a device (device removal).
    fn remove_device(&self, device: &StoreId)
    -> impl Future<Output = Result<(), HubError>> + Send;

    /// Enumerate every device that has stored values.
    fn list_devices(&self) -> impl Future<Output = Result<Vec<StoreId>, HubError>> + Send;
}
