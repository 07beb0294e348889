//! The station device — owner of the session and the camera registry.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use camhub_domain::credential::Credential;
use camhub_domain::device::{Availability, CameraKind, UnavailableReason};
use camhub_domain::error::{HubError, ReconciliationError, TransportError};
use camhub_domain::event::{Event, EventKind};
use camhub_domain::id::{CameraId, StationId};
use camhub_domain::protocol::{self, ENTRY_PATH};
use camhub_domain::rule::RuleKind;

use crate::devices::SessionedDevice;
use crate::gateway::RequestGateway;
use crate::ports::{
    ApiTransport, CredentialCipher, DeviceStore, EventPublisher, StoreId, keys,
};
use crate::registry::HubRegistry;
use crate::rules::RuleSynchronizer;
use crate::session::SessionManager;

/// The device representing the recording station.
///
/// Owns the session manager and gateway its cameras call through, the
/// home-mode rule pair, and the per-kind camera registration lists.
pub struct StationDevice<T, C, S, P> {
    id: StationId,
    name: String,
    callback_base: String,
    store_id: StoreId,
    store: Arc<S>,
    events: Arc<P>,
    sessions: Arc<SessionManager<T, C, S, P>>,
    gateway: Arc<RequestGateway<T, C, S, P>>,
    rules: RuleSynchronizer<RequestGateway<T, C, S, P>, S>,
    availability: Mutex<Availability>,
    home_mode: Mutex<Option<bool>>,
}

impl<T, C, S, P> StationDevice<T, C, S, P>
where
    T: ApiTransport,
    C: CredentialCipher,
    S: DeviceStore,
    P: EventPublisher + 'static,
{
    /// Create a station device for already-paired store data.
    pub fn new(
        id: StationId,
        name: impl Into<String>,
        callback_base: impl Into<String>,
        transport: Arc<T>,
        cipher: Arc<C>,
        store: Arc<S>,
        events: Arc<P>,
    ) -> Self {
        let name = name.into();
        let callback_base = callback_base.into();
        let sessions = Arc::new(SessionManager::new(
            id.clone(),
            Arc::clone(&transport),
            cipher,
            Arc::clone(&store),
            Arc::clone(&events),
        ));
        let gateway = Arc::new(RequestGateway::new(
            id.clone(),
            transport,
            Arc::clone(&store),
            Arc::clone(&sessions),
        ));
        let rules = RuleSynchronizer::for_station(
            id.clone(),
            name.clone(),
            callback_base.clone(),
            Arc::clone(&gateway),
            Arc::clone(&store),
        );
        Self {
            store_id: StoreId::Station(id.clone()),
            id,
            name,
            callback_base,
            store,
            events,
            sessions,
            gateway,
            rules,
            availability: Mutex::new(Availability::Unavailable(UnavailableReason::Initializing)),
            home_mode: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> &StationId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Public base URL the recorder calls back on.
    #[must_use]
    pub fn callback_base(&self) -> &str {
        &self.callback_base
    }

    /// The authenticated gateway cameras call through.
    #[must_use]
    pub fn gateway(&self) -> Arc<RequestGateway<T, C, S, P>> {
        Arc::clone(&self.gateway)
    }

    /// Current home-mode capability value, once known.
    #[must_use]
    pub fn home_mode(&self) -> Option<bool> {
        *self.home_mode.lock().unwrap()
    }

    /// Bring the station up: migrate the store schema, reconcile the
    /// home-mode rules, read the current home-mode state, and mark the
    /// station ready so waiting cameras can proceed.
    #[tracing::instrument(skip(self, registry), fields(station = %self.id))]
    pub async fn initialize(&self, registry: &HubRegistry<T, C, S, P>) {
        self.set_availability(Availability::Unavailable(UnavailableReason::Initializing));
        self.migrate().await;

        if !self.sync_home_mode_rules().await {
            tracing::warn!(station = %self.id, "home mode rules could not be synchronized");
        }

        match self.read_home_mode().await {
            Ok(on) => {
                *self.home_mode.lock().unwrap() = Some(on);
                self.set_availability(Availability::Available);
            }
            Err(err) => {
                tracing::warn!(station = %self.id, error = %err, "could not read home mode state");
            }
        }

        // Ready even when degraded: cameras fail their own calls with a
        // precise reason instead of waiting for a station that never comes.
        registry.mark_ready(&self.id);
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
            .put(&self.store_id, keys::VERSION, Value::from(current))
            .await
        {
            tracing::warn!(error = %err, "failed to store schema version");
        }
    }

    async fn sync_home_mode_rules(&self) -> bool {
        self.rules.synchronize(RuleKind::HomeModeOn).await
            && self.rules.synchronize(RuleKind::HomeModeOff).await
    }

    async fn read_home_mode(&self) -> Result<bool, HubError> {
        let data = self
            .gateway
            .execute(ENTRY_PATH, &protocol::HOME_MODE_INFO.query())
            .await?;
        protocol::parse_home_mode_on(&data).ok_or_else(|| {
            HubError::Transport(TransportError::Decode(serde::de::Error::custom(
                "home mode payload carried no state",
            )))
        })
    }

    /// Switch the recorder's home mode; the resulting state lands through
    /// the home-mode callback.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's failure.
    pub async fn set_home_mode(&self, on: bool) -> Result<(), HubError> {
        let mut query = protocol::HOME_MODE_SWITCH.query();
        query.push(("on".to_string(), on.to_string()));
        self.gateway.execute(ENTRY_PATH, &query).await?;
        Ok(())
    }

    /// Handle a home-mode callback. Level-triggered and idempotent:
    /// an unchanged value fires nothing.
    pub async fn handle_home_mode_changed(&self, on: bool) {
        {
            let mut current = self.home_mode.lock().unwrap();
            if *current == Some(on) {
                return;
            }
            *current = Some(on);
        }
        let event = Event::new(EventKind::HomeModeChanged {
            station: self.id.clone(),
            on,
        });
        if let Err(err) = self.events.publish(event).await {
            tracing::warn!(error = %err, "failed to publish home mode event");
        }
    }

    /// Register a camera with this station. Idempotent: re-adding an
    /// already-registered id is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn register_camera(&self, kind: CameraKind, camera: CameraId) -> Result<(), HubError> {
        let key = kind.registry_store_key();
        let mut ids = self.stored_camera_ids(key).await;
        if ids.contains(&camera.as_i64()) {
            return Ok(());
        }
        ids.push(camera.as_i64());
        self.store
            .put(&self.store_id, key, Value::from(ids))
            .await
    }

    /// Every camera registered with this station, per kind.
    pub async fn registered_cameras(&self) -> Vec<(CameraKind, CameraId)> {
        let mut cameras = Vec::new();
        for kind in [CameraKind::Camera, CameraKind::PtzCamera] {
            for id in self.stored_camera_ids(kind.registry_store_key()).await {
                cameras.push((kind, CameraId::new(id)));
            }
        }
        cameras
    }

    async fn stored_camera_ids(&self, key: &str) -> Vec<i64> {
        self.store
            .get(&self.store_id, key)
            .await
            .ok()
            .flatten()
            .and_then(|value| {
                value
                    .as_array()
                    .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
            })
            .unwrap_or_default()
    }

    /// Re-run home-mode rule reconciliation on user request.
    ///
    /// # Errors
    ///
    /// Returns [`ReconciliationError::SyncFailed`] when a rule stays out
    /// of sync.
    pub async fn repair_rules(&self) -> Result<(), HubError> {
        if !self.rules.synchronize(RuleKind::HomeModeOn).await {
            return Err(ReconciliationError::SyncFailed {
                kind: RuleKind::HomeModeOn,
            }
            .into());
        }
        if !self.rules.synchronize(RuleKind::HomeModeOff).await {
            return Err(ReconciliationError::SyncFailed {
                kind: RuleKind::HomeModeOff,
            }
            .into());
        }
        Ok(())
    }

    /// Validate repaired credentials, store them, and adopt the session.
    ///
    /// # Errors
    ///
    /// Propagates validation failures ([`AuthError::OtpRequired`] when the
    /// account asks for a one-time password) and storage errors.
    ///
    /// [`AuthError::OtpRequired`]: camhub_domain::error::AuthError::OtpRequired
    pub async fn repair_credentials(
        &self,
        credential: &Credential,
        otp_code: Option<&str>,
    ) -> Result<(), HubError> {
        let session = self
            .sessions
            .validate_credentials(credential, otp_code)
            .await?;
        self.sessions.adopt(credential, session).await?;
        self.set_availability(Availability::Available);
        Ok(())
    }

    /// Recorder build/version information.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's failure.
    pub async fn station_info(&self) -> Result<Value, HubError> {
        self.gateway
            .execute(ENTRY_PATH, &protocol::STATION_INFO.query())
            .await
    }

    /// Tear the station down on removal: drop the home-mode rules on the
    /// recorder and wipe the device store entry.
    pub async fn remove(&self) {
        if let Err(err) = self.rules.delete_rules(&RuleKind::STATION).await {
            tracing::warn!(station = %self.id, error = %err, "failed to delete home mode rules");
        }
        if let Err(err) = self.store.remove_device(&self.store_id).await {
            tracing::warn!(station = %self.id, error = %err, "failed to wipe device store");
        }
    }

    fn set_availability(&self, availability: Availability) {
        *self.availability.lock().unwrap() = availability;
    }
}

impl<T, C, S, P> SessionedDevice for StationDevice<T, C, S, P>
where
    T: ApiTransport,
    C: CredentialCipher,
    S: DeviceStore,
    P: EventPublisher + 'static,
{
    fn availability(&self) -> Availability {
        self.availability.lock().unwrap().clone()
    }

    async fn handle_new_session(&self) -> Result<(), HubError> {
        self.set_availability(Availability::Available);
        Ok(())
    }

    async fn handle_session_fail(&self, reason: UnavailableReason) {
        self.set_availability(Availability::Unavailable(reason));
    }
}
