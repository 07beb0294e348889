//! Device-facing value types: camera kinds and availability.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two camera flavours a station can own.
///
/// PTZ command handling lives outside this engine; the kind only matters
/// for callback routing and registration bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraKind {
    Camera,
    PtzCamera,
}

impl CameraKind {
    /// The path segment and store discriminator for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::PtzCamera => "ptz-camera",
        }
    }

    /// Device-store key of the station's registration list for this kind.
    #[must_use]
    pub fn registry_store_key(self) -> &'static str {
        match self {
            Self::Camera => "cameras",
            Self::PtzCamera => "ptz_cameras",
        }
    }
}

impl fmt::Display for CameraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraKind {
    type Err = UnknownCameraKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "camera" => Ok(Self::Camera),
            "ptz-camera" => Ok(Self::PtzCamera),
            other => Err(UnknownCameraKind(other.to_string())),
        }
    }
}

/// Error returned when a path segment is not a camera kind.
#[derive(Debug, thiserror::Error)]
#[error("unknown camera kind: {0}")]
pub struct UnknownCameraKind(String);

/// Snapshot quality profile, mapped to the recorder's numeric codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotProfile {
    High,
    #[default]
    Balanced,
    Low,
}

impl SnapshotProfile {
    /// The recorder's `profileType` code.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::High => 0,
            Self::Balanced => 1,
            Self::Low => 2,
        }
    }
}

/// Whether a device is currently usable, with a user-visible reason when
/// it is not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Available,
    Unavailable(UnavailableReason),
}

impl Availability {
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Human-readable reasons shown to the user instead of raw error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The device has not finished its startup sequence yet.
    Initializing,
    /// A session refresh failed; the stored credentials need repair.
    AuthenticationFailed,
    /// The camera's recording station never became ready.
    StationNotFound,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Initializing => "initializing",
            Self::AuthenticationFailed => "authentication failed",
            Self::StationNotFound => "recording station not found",
        };
        f.write_str(text)
    }
}
