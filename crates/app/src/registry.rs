//! Hub registry — station readiness and the session cascade.
//!
//! An explicit registry object owned by the hub lifecycle, queried by
//! cameras through a defined interface instead of ambient global state.
//! It also drives the cascade: a session outcome on a station is fanned
//! out to every registered camera, best-effort per camera.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use camhub_domain::device::UnavailableReason;
use camhub_domain::event::{Event, EventKind};
use camhub_domain::id::{CameraId, StationId};

use crate::devices::{CameraDevice, SessionedDevice, StationDevice};
use crate::ports::{ApiTransport, CredentialCipher, DeviceStore, EventPublisher};

/// How often a camera polls for its station at startup.
pub const STATION_READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How many polls before a camera gives up on its station.
pub const STATION_READY_ATTEMPTS: u32 = 60;

/// Registry of live devices and ready stations.
pub struct HubRegistry<T, C, S, P> {
    ready: RwLock<HashSet<StationId>>,
    stations: RwLock<HashMap<StationId, Arc<StationDevice<T, C, S, P>>>>,
    cameras: RwLock<HashMap<(StationId, CameraId), Arc<CameraDevice<T, C, S, P>>>>,
}

impl<T, C, S, P> Default for HubRegistry<T, C, S, P> {
    fn default() -> Self {
        Self {
            ready: RwLock::new(HashSet::new()),
            stations: RwLock::new(HashMap::new()),
            cameras: RwLock::new(HashMap::new()),
        }
    }
}

impl<T, C, S, P> HubRegistry<T, C, S, P>
where
    T: ApiTransport,
    C: CredentialCipher,
    S: DeviceStore,
    P: EventPublisher + 'static,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a station device.
    pub fn insert_station(&self, station: Arc<StationDevice<T, C, S, P>>) {
        self.stations
            .write()
            .unwrap()
            .insert(station.id().clone(), station);
    }

    /// Remove a station and its readiness mark.
    pub fn remove_station(&self, station: &StationId) {
        self.stations.write().unwrap().remove(station);
        self.ready.write().unwrap().remove(station);
    }

    /// Look up a station device.
    #[must_use]
    pub fn station(&self, station: &StationId) -> Option<Arc<StationDevice<T, C, S, P>>> {
        self.stations.read().unwrap().get(station).cloned()
    }

    /// Add (or replace) a camera device.
    pub fn insert_camera(&self, camera: Arc<CameraDevice<T, C, S, P>>) {
        self.cameras
            .write()
            .unwrap()
            .insert((camera.station_id().clone(), camera.id()), camera);
    }

    /// Remove a camera device.
    pub fn remove_camera(&self, station: &StationId, camera: CameraId) {
        self.cameras
            .write()
            .unwrap()
            .remove(&(station.clone(), camera));
    }

    /// Look up a camera, preferring the (station, camera) key and falling
    /// back to the camera id alone for registrations predating station
    /// scoping.
    #[must_use]
    pub fn camera(
        &self,
        station: Option<&StationId>,
        camera: CameraId,
    ) -> Option<Arc<CameraDevice<T, C, S, P>>> {
        let cameras = self.cameras.read().unwrap();
        if let Some(station) = station {
            if let Some(device) = cameras.get(&(station.clone(), camera)) {
                return Some(Arc::clone(device));
            }
        }
        cameras
            .iter()
            .find(|((_, id), _)| *id == camera)
            .map(|(_, device)| Arc::clone(device))
    }

    /// Mark a station as ready for its cameras.
    pub fn mark_ready(&self, station: &StationId) {
        self.ready.write().unwrap().insert(station.clone());
    }

    /// Whether a station has finished initializing.
    #[must_use]
    pub fn is_ready(&self, station: &StationId) -> bool {
        self.ready.read().unwrap().contains(station)
    }

    /// Poll for a station to become ready: once per second, a minute at
    /// most. A bounded loop with no external cancellation — it either
    /// succeeds or times out.
    pub async fn wait_for_station(&self, station: &StationId) -> bool {
        for attempt in 0..STATION_READY_ATTEMPTS {
            if self.is_ready(station) {
                return true;
            }
            if attempt + 1 < STATION_READY_ATTEMPTS {
                tokio::time::sleep(STATION_READY_POLL_INTERVAL).await;
            }
        }
        false
    }

    /// React to a bus event; only session outcomes are cascaded.
    pub async fn handle_event(&self, event: &Event) {
        match &event.kind {
            EventKind::SessionRestored { station } => {
                self.cascade_session_restored(station).await;
            }
            EventKind::SessionLost { station, reason } => {
                self.cascade_session_lost(station, *reason).await;
            }
            _ => {}
        }
    }

    /// Deliver "session restored" to a station and each registered
    /// camera. Delivery is best-effort: a vanished camera is skipped and
    /// one camera's failure does not stop the rest.
    #[tracing::instrument(skip(self))]
    pub async fn cascade_session_restored(&self, station_id: &StationId) {
        let Some(station) = self.station(station_id) else {
            tracing::debug!(station = %station_id, "cascade for unknown station");
            return;
        };
        if let Err(err) = station.handle_new_session().await {
            tracing::warn!(station = %station_id, error = %err, "station session-restored handler failed");
        }
        for (_, camera_id) in station.registered_cameras().await {
            let Some(camera) = self.camera(Some(station_id), camera_id) else {
                tracing::debug!(camera = %camera_id, "registered camera vanished, skipping");
                continue;
            };
            if let Err(err) = camera.handle_new_session().await {
                tracing::warn!(camera = %camera_id, error = %err, "camera session-restored handler failed");
            }
        }
    }

    /// Deliver "session lost" to a station and each registered camera.
    #[tracing::instrument(skip(self))]
    pub async fn cascade_session_lost(&self, station_id: &StationId, reason: UnavailableReason) {
        let Some(station) = self.station(station_id) else {
            return;
        };
        station.handle_session_fail(reason).await;
        for (_, camera_id) in station.registered_cameras().await {
            let Some(camera) = self.camera(Some(station_id), camera_id) else {
                continue;
            };
            camera.handle_session_fail(reason).await;
        }
    }
}
