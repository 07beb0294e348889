//! Device orchestration — the station and its dependent cameras.
//!
//! The shared session behaviour both device types need is the
//! [`SessionedDevice`] capability trait — a flat seam instead of an
//! inheritance chain. The station additionally owns the session manager
//! and the camera registration lists; cameras borrow the station's
//! gateway once it becomes ready.

use std::future::Future;

use camhub_domain::device::{Availability, UnavailableReason};
use camhub_domain::error::HubError;

pub mod camera;
pub mod station;

pub use camera::CameraDevice;
pub use station::StationDevice;

/// Behaviour shared by every device that depends on a recorder session.
pub trait SessionedDevice {
    /// Current availability, with a user-visible reason when unavailable.
    fn availability(&self) -> Availability;

    /// React to a freshly restored session: re-assert availability and
    /// refresh any session-derived data links.
    fn handle_new_session(&self) -> impl Future<Output = Result<(), HubError>> + Send;

    /// React to a lost session: become unavailable with `reason`.
    fn handle_session_fail(&self, reason: UnavailableReason)
    -> impl Future<Output = ()> + Send;
}
