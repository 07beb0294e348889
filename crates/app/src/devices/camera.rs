//! The camera device — a leaf depending on its station's session.
//!
//! A camera stores only its station's id. At startup it polls the
//! readiness registry for that station, registers itself, reconciles its
//! rules, and only then exposes the capabilities whose rules are in sync.
//! Capabilities whose rules cannot be reconciled are withheld — partial
//! functionality beats total unavailability.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use camhub_domain::device::{Availability, CameraKind, SnapshotProfile, UnavailableReason};
use camhub_domain::error::{HubError, NotFoundError, ReconciliationError, TransportError};
use camhub_domain::event::{Event, EventKind};
use camhub_domain::id::{CameraId, StationId};
use camhub_domain::protocol::{self, ENTRY_PATH};
use camhub_domain::rule::RuleKind;

use crate::devices::SessionedDevice;
use crate::gateway::RequestGateway;
use crate::motion::{self, MotionAlarm};
use crate::ports::{
    ApiTransport, CredentialCipher, DeviceStore, EventPublisher, StoreId, keys,
};
use crate::registry::HubRegistry;
use crate::rules::RuleSynchronizer;

/// Gateway and rule synchronizer, wired once the station becomes ready.
struct CameraLink<T, C, S, P> {
    gateway: Arc<RequestGateway<T, C, S, P>>,
    rules: RuleSynchronizer<RequestGateway<T, C, S, P>, S>,
}

/// Which capabilities survived rule reconciliation.
#[derive(Debug, Clone, Copy, Default)]
struct Capabilities {
    motion_alarm: bool,
    enabled_toggle: bool,
}

/// One camera (fixed or PTZ) owned by a station.
pub struct CameraDevice<T, C, S, P> {
    id: CameraId,
    kind: CameraKind,
    station_id: StationId,
    name: String,
    store_id: StoreId,
    store: Arc<S>,
    events: Arc<P>,
    link: OnceLock<CameraLink<T, C, S, P>>,
    availability: Mutex<Availability>,
    capabilities: Mutex<Capabilities>,
    enabled: Mutex<Option<bool>>,
    connected: Mutex<Option<bool>>,
    motion: MotionAlarm<P>,
    motion_timeout: Mutex<Duration>,
}

impl<T, C, S, P> CameraDevice<T, C, S, P>
where
    T: ApiTransport,
    C: CredentialCipher,
    S: DeviceStore,
    P: EventPublisher + 'static,
{
    /// Create a camera device for already-paired store data.
    pub fn new(
        station_id: StationId,
        id: CameraId,
        kind: CameraKind,
        name: impl Into<String>,
        store: Arc<S>,
        events: Arc<P>,
    ) -> Self {
        Self {
            store_id: StoreId::Camera(station_id.clone(), id),
            motion: MotionAlarm::new(station_id.clone(), id, Arc::clone(&events)),
            id,
            kind,
            station_id,
            name: name.into(),
            store,
            events,
            link: OnceLock::new(),
            availability: Mutex::new(Availability::Unavailable(UnavailableReason::Initializing)),
            capabilities: Mutex::new(Capabilities::default()),
            enabled: Mutex::new(None),
            connected: Mutex::new(None),
            motion_timeout: Mutex::new(motion::DEFAULT_MOTION_TIMEOUT),
        }
    }

    #[must_use]
    pub fn id(&self) -> CameraId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> CameraKind {
        self.kind
    }

    #[must_use]
    pub fn station_id(&self) -> &StationId {
        &self.station_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current enabled capability value, once known.
    #[must_use]
    pub fn enabled(&self) -> Option<bool> {
        *self.enabled.lock().unwrap()
    }

    /// Last reported connection state, once known.
    #[must_use]
    pub fn connected(&self) -> Option<bool> {
        *self.connected.lock().unwrap()
    }

    /// Whether the motion alarm is currently raised.
    #[must_use]
    pub fn motion_active(&self) -> bool {
        self.motion.is_active()
    }

    /// Bring the camera up once its station is ready.
    ///
    /// Waits up to a minute for the station, registers with it, reconciles
    /// the connection rules, then the capability-gating rules, and finally
    /// reads the current camera state. A station that never becomes ready
    /// leaves the camera unavailable with a "station not found" reason,
    /// without automatic retry — repair is a user action.
    #[tracing::instrument(skip(self, registry), fields(camera = %self.id, station = %self.station_id))]
    pub async fn initialize(&self, registry: &HubRegistry<T, C, S, P>) {
        self.set_availability(Availability::Unavailable(UnavailableReason::Initializing));
        self.migrate().await;
        self.load_motion_timeout().await;

        if !registry.wait_for_station(&self.station_id).await {
            tracing::warn!(camera = %self.id, "station never became ready");
            self.set_availability(Availability::Unavailable(UnavailableReason::StationNotFound));
            return;
        }
        let Some(station) = registry.station(&self.station_id) else {
            self.set_availability(Availability::Unavailable(UnavailableReason::StationNotFound));
            return;
        };

        if let Err(err) = station.register_camera(self.kind, self.id).await {
            tracing::warn!(camera = %self.id, error = %err, "could not register with station");
        }

        let link = self.link.get_or_init(|| {
            let gateway = station.gateway();
            let rules = RuleSynchronizer::for_camera(
                self.station_id.clone(),
                self.kind,
                self.id,
                self.name.clone(),
                station.callback_base(),
                Arc::clone(&gateway),
                Arc::clone(&self.store),
            );
            CameraLink { gateway, rules }
        });

        // Connection rules carry no capability; sync failures only log.
        for kind in [RuleKind::ConnectionLost, RuleKind::ConnectionNormal] {
            if !link.rules.synchronize(kind).await {
                tracing::warn!(camera = %self.id, %kind, "connection rule out of sync");
            }
        }

        // Capability-gating rules: a kind that cannot be reconciled
        // withholds its capability instead of failing the device.
        let motion_alarm = link.rules.synchronize(RuleKind::Motion).await;
        let enabled_toggle = link.rules.synchronize(RuleKind::Enabled).await
            && link.rules.synchronize(RuleKind::Disabled).await;
        *self.capabilities.lock().unwrap() = Capabilities {
            motion_alarm,
            enabled_toggle,
        };

        match self.read_current_state().await {
            Ok(enabled) => {
                *self.enabled.lock().unwrap() = Some(enabled);
                self.set_availability(Availability::Available);
            }
            Err(err) => {
                tracing::warn!(camera = %self.id, error = %err, "could not read camera state");
            }
        }
    }

    /// Schema version gate; one-time migrations hook in here.
    async fn migrate(&self) {
        let current = env!("CARGO_PKG_VERSION");
        let stored = self
            .store
            .get(&self.store_id, keys::VERSION)
            .await
            .ok()
            .flatten()
            .and_then(|value| value.as_str().map(ToString::to_string));
        if stored.as_deref() == Some(current) {
            return;
        }
        if let Err(err) = self
            .store
            .put(
                &self.store_id,
                keys::VERSION,
                serde_json::Value::from(current),
            )
            .await
        {
            tracing::warn!(error = %err, "failed to store schema version");
        }
    }

    /// Pick up the stored motion timeout; a missing or out-of-range value
    /// falls back to the default (the settings boundary rejects bad values
    /// before they are stored, so this only guards legacy data).
    async fn load_motion_timeout(&self) {
        let stored = self
            .store
            .get(&self.store_id, keys::MOTION_TIMEOUT)
            .await
            .ok()
            .flatten()
            .and_then(|value| value.as_u64());
        if let Some(secs) = stored {
            if let Ok(timeout) = motion::validate_motion_timeout(secs) {
                *self.motion_timeout.lock().unwrap() = timeout;
            }
        }
    }

    /// Change the motion timeout setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MotionTimeoutOutOfRange`] for values
    /// outside the accepted window — rejected, not clamped.
    ///
    /// [`ConfigurationError::MotionTimeoutOutOfRange`]: camhub_domain::error::ConfigurationError::MotionTimeoutOutOfRange
    pub async fn update_motion_timeout(&self, secs: u64) -> Result<(), HubError> {
        let timeout = motion::validate_motion_timeout(secs)?;
        self.store
            .put(
                &self.store_id,
                keys::MOTION_TIMEOUT,
                serde_json::Value::from(secs),
            )
            .await?;
        *self.motion_timeout.lock().unwrap() = timeout;
        Ok(())
    }

    /// Handle a motion callback: debounced through the motion alarm.
    /// Ignored while the device is unavailable or the alarm capability
    /// was withheld.
    pub async fn handle_motion(&self) {
        if !self.availability().is_available() {
            tracing::debug!(camera = %self.id, "motion ignored, device not ready");
            return;
        }
        if !self.capabilities.lock().unwrap().motion_alarm {
            return;
        }
        let timeout = *self.motion_timeout.lock().unwrap();
        self.motion.trigger(timeout).await;
    }

    /// Handle an enabled/disabled callback. Level-triggered and
    /// idempotent: an unchanged value fires nothing.
    pub async fn handle_enabled(&self, enabled: bool) {
        if !self.capabilities.lock().unwrap().enabled_toggle {
            return;
        }
        {
            let mut current = self.enabled.lock().unwrap();
            if *current == Some(enabled) {
                return;
            }
            *current = Some(enabled);
        }
        self.publish(EventKind::CameraEnabled {
            station: self.station_id.clone(),
            camera: self.id,
            enabled,
        })
        .await;
    }

    /// Handle a connection lost/normal callback. Level-triggered and
    /// idempotent.
    pub async fn handle_connection(&self, connected: bool) {
        {
            let mut current = self.connected.lock().unwrap();
            if *current == Some(connected) {
                return;
            }
            *current = Some(connected);
        }
        self.publish(EventKind::CameraConnection {
            station: self.station_id.clone(),
            camera: self.id,
            connected,
        })
        .await;
    }

    /// Enable or disable the camera on the recorder; the resulting state
    /// lands through the enabled/disabled callback.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's failure.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), HubError> {
        let method = if enabled {
            protocol::CAMERA_ENABLE
        } else {
            protocol::CAMERA_DISABLE
        };
        let mut query = method.query();
        query.push(("idList".to_string(), self.id.to_string()));
        self.link()?.gateway.execute(ENTRY_PATH, &query).await?;
        Ok(())
    }

    /// Whether the recorder currently sees this camera.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's failure or a malformed payload.
    pub async fn is_connected(&self) -> Result<bool, HubError> {
        let mut query = protocol::CAMERA_LIST.query();
        query.push(("idList".to_string(), self.id.to_string()));
        query.push(("basic".to_string(), "true".to_string()));
        let data = self.link()?.gateway.execute(ENTRY_PATH, &query).await?;
        protocol::parse_camera_connected(&data).ok_or_else(|| malformed("camera list"))
    }

    /// One snapshot frame, passed through as raw bytes.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's failure.
    pub async fn snapshot(&self, profile: SnapshotProfile) -> Result<Vec<u8>, HubError> {
        let mut query = protocol::CAMERA_SNAPSHOT.query();
        query.push(("id".to_string(), self.id.to_string()));
        query.push(("profileType".to_string(), profile.code().to_string()));
        self.link()?.gateway.execute_raw(ENTRY_PATH, &query).await
    }

    /// Start or stop an external recording on the recorder.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's failure.
    pub async fn external_record(&self, start: bool) -> Result<(), HubError> {
        let mut query = protocol::EXTERNAL_RECORD.query();
        query.push(("cameraId".to_string(), self.id.to_string()));
        query.push((
            "action".to_string(),
            if start { "start" } else { "stop" }.to_string(),
        ));
        self.link()?.gateway.execute(ENTRY_PATH, &query).await?;
        Ok(())
    }

    /// Re-run rule reconciliation for every camera kind on user request.
    ///
    /// # Errors
    ///
    /// Returns [`ReconciliationError::SyncFailed`] for the first kind that
    /// stays out of sync.
    pub async fn repair_rules(&self) -> Result<(), HubError> {
        let link = self.link()?;
        for kind in RuleKind::CAMERA {
            if !link.rules.synchronize(kind).await {
                return Err(ReconciliationError::SyncFailed { kind }.into());
            }
        }
        let motion_alarm = link.rules.stored_rule_id(RuleKind::Motion).await.is_some();
        let enabled_toggle = link.rules.stored_rule_id(RuleKind::Enabled).await.is_some()
            && link.rules.stored_rule_id(RuleKind::Disabled).await.is_some();
        *self.capabilities.lock().unwrap() = Capabilities {
            motion_alarm,
            enabled_toggle,
        };
        Ok(())
    }

    /// Drop the remote rules and recreate them against the current
    /// callback base (used after the public address changed).
    ///
    /// # Errors
    ///
    /// As [`repair_rules`](Self::repair_rules), plus the delete call's
    /// failure.
    pub async fn rebuild_rules(&self) -> Result<(), HubError> {
        self.link()?.rules.delete_rules(&RuleKind::CAMERA).await?;
        self.repair_rules().await
    }

    /// Tear the camera down on removal: drop its rules on the recorder
    /// and wipe the device store entry.
    pub async fn remove(&self) {
        if let Ok(link) = self.link() {
            if let Err(err) = link.rules.delete_rules(&RuleKind::CAMERA).await {
                tracing::warn!(camera = %self.id, error = %err, "failed to delete camera rules");
            }
        }
        if let Err(err) = self.store.remove_device(&self.store_id).await {
            tracing::warn!(camera = %self.id, error = %err, "failed to wipe device store");
        }
    }

    async fn read_current_state(&self) -> Result<bool, HubError> {
        let mut query = protocol::CAMERA_INFO.query();
        query.push(("cameraIds".to_string(), self.id.to_string()));
        query.push(("basic".to_string(), "true".to_string()));
        let data = self.link()?.gateway.execute(ENTRY_PATH, &query).await?;
        protocol::parse_camera_enabled(&data).ok_or_else(|| malformed("camera info"))
    }

    fn link(&self) -> Result<&CameraLink<T, C, S, P>, HubError> {
        self.link.get().ok_or_else(|| {
            NotFoundError {
                entity: "station link for camera",
                id: self.id.to_string(),
            }
            .into()
        })
    }

    fn set_availability(&self, availability: Availability) {
        *self.availability.lock().unwrap() = availability;
    }

    async fn publish(&self, kind: EventKind) {
        if let Err(err) = self.events.publish(Event::new(kind)).await {
            tracing::warn!(error = %err, "failed to publish camera event");
        }
    }
}

impl<T, C, S, P> SessionedDevice for CameraDevice<T, C, S, P>
where
    T: ApiTransport,
    C: CredentialCipher,
    S: DeviceStore,
    P: EventPublisher + 'static,
{
    fn availability(&self) -> Availability {
        self.availability.lock().unwrap().clone()
    }

    /// Refresh session-derived state and re-assert availability. Fails
    /// when the recorder cannot be reached; the cascade logs and moves on.
    async fn handle_new_session(&self) -> Result<(), HubError> {
        if self.link.get().is_some() {
            let enabled = self.read_current_state().await?;
            *self.enabled.lock().unwrap() = Some(enabled);
        }
        self.set_availability(Availability::Available);
        Ok(())
    }

    async fn handle_session_fail(&self, reason: UnavailableReason) {
        self.set_availability(Availability::Unavailable(reason));
    }
}

fn malformed(what: &str) -> HubError {
    HubError::Transport(TransportError::Decode(serde::de::Error::custom(format!(
        "{what} payload carried no usable state"
    ))))
}
