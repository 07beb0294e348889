//! Event — an immutable record of something that happened on the bridge.
//!
//! Events are produced by the session manager (restored/lost), by webhook
//! callbacks (motion, enable/disable, connection, home mode), and consumed
//! by the cascade task and any external notifier.

use serde::{Deserialize, Serialize};

use crate::device::UnavailableReason;
use crate::id::{CameraId, StationId};
use crate::time::{Timestamp, now};

/// A timestamped domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub at: Timestamp,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Stamp an event with the current time.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self { at: now(), kind }
    }
}

/// The payload of an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A login succeeded; dependents may refresh their data links.
    SessionRestored { station: StationId },
    /// The session could not be refreshed; dependents become unavailable.
    SessionLost {
        station: StationId,
        reason: UnavailableReason,
    },
    /// Motion alarm state changed for a camera.
    MotionAlarm {
        station: StationId,
        camera: CameraId,
        active: bool,
    },
    /// A camera was enabled or disabled on the recorder.
    CameraEnabled {
        station: StationId,
        camera: CameraId,
        enabled: bool,
    },
    /// A camera's connection to the recorder changed.
    CameraConnection {
        station: StationId,
        camera: CameraId,
        connected: bool,
    },
    /// The station's home mode was switched.
    HomeModeChanged { station: StationId, on: bool },
}
