//! Webhook correlation — inbound callbacks routed to devices.
//!
//! The recorder calls back with the rule kind and the target device
//! encoded in the path. Correlation is a registry lookup by
//! (kind, station, camera), with the camera id alone as fallback for
//! registrations predating station scoping. Handlers must stay quick and
//! idempotent — the level-triggered updates in the devices take care of
//! duplicate deliveries.

use std::str::FromStr;

use camhub_domain::error::{HubError, NotFoundError};
use camhub_domain::id::{CameraId, StationId};
use camhub_domain::rule::RuleKind;

use crate::ports::{ApiTransport, CredentialCipher, DeviceStore, EventPublisher};
use crate::registry::HubRegistry;

/// One inbound callback, decoded from its path.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackEvent {
    pub kind: RuleKind,
    pub station: Option<StationId>,
    pub camera: Option<CameraId>,
}

impl CallbackEvent {
    /// A station-owned event (home mode transitions).
    #[must_use]
    pub fn for_station(station: StationId, kind: RuleKind) -> Self {
        Self {
            kind,
            station: Some(station),
            camera: None,
        }
    }

    /// A camera-owned event with full station scoping.
    #[must_use]
    pub fn for_camera(station: StationId, camera: CameraId, kind: RuleKind) -> Self {
        Self {
            kind,
            station: Some(station),
            camera: Some(camera),
        }
    }

    /// A legacy callback whose path carries only the event name and one
    /// id: the station id for station kinds, the camera id otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] when a camera id is not numeric.
    pub fn legacy(kind: RuleKind, raw_id: &str) -> Result<Self, HubError> {
        if kind.is_station_kind() {
            return Ok(Self::for_station(StationId::new(raw_id), kind));
        }
        let camera = CameraId::from_str(raw_id).map_err(|_| NotFoundError {
            entity: "camera",
            id: raw_id.to_string(),
        })?;
        Ok(Self {
            kind,
            station: None,
            camera: Some(camera),
        })
    }
}

/// Correlate one callback to its device and drive the matching handler.
///
/// # Errors
///
/// Returns [`HubError::NotFound`] when no device matches; callers answer
/// the webhook with success regardless, since delivery is best-effort.
pub async fn dispatch<T, C, S, P>(
    registry: &HubRegistry<T, C, S, P>,
    event: &CallbackEvent,
) -> Result<(), HubError>
where
    T: ApiTransport,
    C: CredentialCipher,
    S: DeviceStore,
    P: EventPublisher + 'static,
{
    if event.kind.is_station_kind() {
        let station_id = event.station.as_ref().ok_or(NotFoundError {
            entity: "station",
            id: "<none>".to_string(),
        })?;
        let station = registry.station(station_id).ok_or_else(|| NotFoundError {
            entity: "station",
            id: station_id.to_string(),
        })?;
        station
            .handle_home_mode_changed(event.kind == RuleKind::HomeModeOn)
            .await;
        return Ok(());
    }

    let camera_id = event.camera.ok_or(NotFoundError {
        entity: "camera",
        id: "<none>".to_string(),
    })?;
    let camera = registry
        .camera(event.station.as_ref(), camera_id)
        .ok_or_else(|| NotFoundError {
            entity: "camera",
            id: camera_id.to_string(),
        })?;

    match event.kind {
        RuleKind::Motion => camera.handle_motion().await,
        RuleKind::Enabled => camera.handle_enabled(true).await,
        RuleKind::Disabled => camera.handle_enabled(false).await,
        RuleKind::ConnectionLost => camera.handle_connection(false).await,
        RuleKind::ConnectionNormal => camera.handle_connection(true).await,
        RuleKind::HomeModeOn | RuleKind::HomeModeOff => unreachable!("station kinds handled above"),
    }
    Ok(())
}
