//! Session manager — owns the authenticated session of one station.
//!
//! Validity is empirical: a session is "last known good" until an API call
//! proves otherwise. The one hard concurrency requirement of the engine
//! lives here: at most one outstanding login per station. Concurrent
//! refreshers serialize on a login gate and re-check a generation counter
//! after acquiring it, so whoever loses the race adopts the winner's
//! session instead of logging in again.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use camhub_domain::credential::{Credential, EncryptedCredential};
use camhub_domain::error::{AuthError, CredentialError, HubError, TransportError};
use camhub_domain::event::{Event, EventKind};
use camhub_domain::id::StationId;
use camhub_domain::protocol::{self, Envelope};
use camhub_domain::session::Session;

use crate::gateway::PairAddress;
use camhub_domain::device::UnavailableReason;

use crate::ports::{ApiTransport, CredentialCipher, DeviceStore, EventPublisher, StoreId, keys};

/// Wall-clock bound for credential validation during pairing/repair.
/// Hitting it is a transport problem, not an auth failure.
pub const CREDENTIAL_VALIDATION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Default)]
struct SessionState {
    current: Option<Session>,
    /// Bumped on every state change; lets a caller detect that someone
    /// else already refreshed while it waited on the login gate.
    generation: u64,
    tried_restore: bool,
}

/// Owns and refreshes the session of one station.
pub struct SessionManager<T, C, S, P> {
    station: StationId,
    store_id: StoreId,
    transport: Arc<T>,
    cipher: Arc<C>,
    store: Arc<S>,
    events: Arc<P>,
    state: Mutex<SessionState>,
    login_gate: Mutex<()>,
}

impl<T, C, S, P> SessionManager<T, C, S, P>
where
    T: ApiTransport,
    C: CredentialCipher,
    S: DeviceStore,
    P: EventPublisher,
{
    /// Create a manager for `station`, reading pair data and credentials
    /// from the device store.
    pub fn new(
        station: StationId,
        transport: Arc<T>,
        cipher: Arc<C>,
        store: Arc<S>,
        events: Arc<P>,
    ) -> Self {
        let store_id = StoreId::Station(station.clone());
        Self {
            station,
            store_id,
            transport,
            cipher,
            store,
            events,
            state: Mutex::new(SessionState::default()),
            login_gate: Mutex::new(()),
        }
    }

    /// The last known good session, if any.
    pub async fn current(&self) -> Option<Session> {
        self.state.lock().await.current.clone()
    }

    /// Return a valid session, logging in when none is held.
    ///
    /// Also returns the generation at which the session was observed; the
    /// gateway passes it back to [`refresh`](Self::refresh) so a refresh
    /// triggered by a stale observation can be skipped.
    ///
    /// # Errors
    ///
    /// Propagates login failures ([`HubError::Auth`],
    /// [`HubError::Credential`]) and transport errors.
    pub async fn ensure(&self) -> Result<(Session, u64), HubError> {
        {
            let state = self.state.lock().await;
            if let Some(session) = &state.current {
                return Ok((session.clone(), state.generation));
            }
        }
        self.acquire().await
    }

    /// Refresh the session after an auth failure observed at `observed`.
    ///
    /// Serialized on the login gate. When the generation advanced while
    /// waiting, another caller already refreshed and its session is
    /// returned without a second login.
    ///
    /// # Errors
    ///
    /// Propagates login failures; a failed login also announces
    /// session loss.
    pub async fn refresh(&self, observed: u64) -> Result<Session, HubError> {
        let _gate = self.login_gate.lock().await;
        {
            let state = self.state.lock().await;
            if state.generation != observed {
                if let Some(session) = &state.current {
                    return Ok(session.clone());
                }
            }
        }
        self.login_and_commit().await
    }

    /// Drop the current session and announce the loss.
    ///
    /// Called by the gateway when a freshly refreshed session is rejected
    /// again — stale or revoked credentials that need user repair.
    pub async fn invalidate(&self) {
        self.commit_failure().await;
    }

    /// Validate credentials against the recorder without touching state.
    ///
    /// Used by pairing and repair flows; bounded by
    /// [`CREDENTIAL_VALIDATION_TIMEOUT`]. A one-time-password challenge is
    /// surfaced as [`AuthError::OtpRequired`] so the flow can prompt.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] when the bound is hit, or the
    /// login failure itself.
    pub async fn validate_credentials(
        &self,
        credential: &Credential,
        otp_code: Option<&str>,
    ) -> Result<Session, HubError> {
        let login = self.login_call(credential, None, otp_code);
        match tokio::time::timeout(CREDENTIAL_VALIDATION_TIMEOUT, login).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout.into()),
        }
    }

    /// Store a repaired credential and adopt the session it produced.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Encrypt`] or a storage error.
    pub async fn adopt(&self, credential: &Credential, session: Session) -> Result<(), HubError> {
        let blob = self.cipher.encrypt(credential)?;
        self.store
            .put(
                &self.store_id,
                keys::CREDENTIAL,
                Value::String(blob.as_str().to_string()),
            )
            .await?;
        self.persist(&session).await;
        self.commit_success(session, true).await;
        Ok(())
    }

    /// Serialized slow path of [`ensure`](Self::ensure): restore the
    /// persisted session once per process, otherwise log in.
    async fn acquire(&self) -> Result<(Session, u64), HubError> {
        let _gate = self.login_gate.lock().await;
        let try_restore = {
            let mut state = self.state.lock().await;
            if let Some(session) = &state.current {
                return Ok((session.clone(), state.generation));
            }
            !std::mem::replace(&mut state.tried_restore, true)
        };

        if try_restore {
            if let Some(session) = self.load_persisted().await {
                // Restoring is not a login, so nothing is announced; a
                // stale restored sid is caught by the gateway's retry.
                let generation = self.commit_success(session.clone(), false).await;
                return Ok((session, generation));
            }
        }

        let session = self.login_and_commit().await?;
        let generation = self.state.lock().await.generation;
        Ok((session, generation))
    }

    #[tracing::instrument(skip(self), fields(station = %self.station))]
    async fn login_and_commit(&self) -> Result<Session, HubError> {
        let attempt = async {
            let credential = self.stored_credential().await?;
            let device_token = self.stored_device_token().await?;
            self.login_call(&credential, device_token.as_deref(), None)
                .await
        };
        match attempt.await {
            Ok(session) => {
                self.persist(&session).await;
                self.commit_success(session.clone(), true).await;
                tracing::info!(station = %self.station, "session refreshed");
                Ok(session)
            }
            Err(err) => {
                tracing::warn!(station = %self.station, error = %err, "login failed");
                self.commit_failure().await;
                Err(err)
            }
        }
    }

    async fn login_call(
        &self,
        credential: &Credential,
        device_token: Option<&str>,
        otp_code: Option<&str>,
    ) -> Result<Session, HubError> {
        let address = PairAddress::load(self.store.as_ref(), &self.store_id).await?;
        let query = protocol::login_query(credential, device_token, otp_code);
        let url = address.url_for(protocol::AUTH_PATH, &query, None)?;

        let body = self.transport.get(&url).await?;
        let value = body.into_json().map_err(HubError::Transport)?;
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|err| HubError::Transport(TransportError::Decode(err)))?;

        if !envelope.success {
            let code = envelope.error_code().unwrap_or(0);
            if code == protocol::OTP_REQUIRED_CODE {
                return Err(AuthError::OtpRequired.into());
            }
            return Err(AuthError::LoginFailed { code }.into());
        }

        let data = envelope.data.unwrap_or(Value::Null);
        protocol::parse_login(&data).ok_or_else(|| AuthError::MissingSid.into())
    }

    async fn commit_success(&self, session: Session, announce: bool) -> u64 {
        let generation = {
            let mut state = self.state.lock().await;
            state.current = Some(session);
            state.generation += 1;
            state.generation
        };
        if announce {
            self.announce(EventKind::SessionRestored {
                station: self.station.clone(),
            })
            .await;
        }
        generation
    }

    async fn commit_failure(&self) {
        {
            let mut state = self.state.lock().await;
            state.current = None;
            state.generation += 1;
        }
        if let Err(err) = self.store.delete(&self.store_id, keys::SID).await {
            tracing::warn!(error = %err, "failed to drop persisted session id");
        }
        self.announce(EventKind::SessionLost {
            station: self.station.clone(),
            reason: UnavailableReason::AuthenticationFailed,
        })
        .await;
    }

    async fn announce(&self, kind: EventKind) {
        if let Err(err) = self.events.publish(Event::new(kind)).await {
            tracing::warn!(error = %err, "failed to publish session event");
        }
    }

    /// Best-effort persistence; the in-memory session stays authoritative.
    async fn persist(&self, session: &Session) {
        let sid = Value::String(session.sid.clone());
        if let Err(err) = self.store.put(&self.store_id, keys::SID, sid).await {
            tracing::warn!(error = %err, "failed to persist session id");
        }
        if let Some(token) = &session.device_token {
            let token = Value::String(token.clone());
            if let Err(err) = self
                .store
                .put(&self.store_id, keys::DEVICE_TOKEN, token)
                .await
            {
                tracing::warn!(error = %err, "failed to persist device token");
            }
        }
    }

    async fn load_persisted(&self) -> Option<Session> {
        let sid = self
            .store
            .get(&self.store_id, keys::SID)
            .await
            .ok()
            .flatten()?;
        let sid = sid.as_str()?.to_string();
        let device_token = self
            .store
            .get(&self.store_id, keys::DEVICE_TOKEN)
            .await
            .ok()
            .flatten()
            .and_then(|value| value.as_str().map(ToString::to_string));
        Some(Session::new(sid, device_token))
    }

    async fn stored_credential(&self) -> Result<Credential, HubError> {
        let blob = self
            .store
            .get(&self.store_id, keys::CREDENTIAL)
            .await?
            .and_then(|value| value.as_str().map(EncryptedCredential::new))
            .ok_or(CredentialError::Missing)?;
        Ok(self.cipher.decrypt(&blob)?)
    }

    async fn stored_device_token(&self) -> Result<Option<String>, HubError> {
        let token = self
            .store
            .get(&self.store_id, keys::DEVICE_TOKEN)
            .await?
            .and_then(|value| value.as_str().map(ToString::to_string));
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        MemoryStore, PlainCipher, RecordingBus, ScriptedTransport, error_envelope, ok_envelope,
    };
    use serde_json::json;

    type Manager = SessionManager<ScriptedTransport, PlainCipher, MemoryStore, RecordingBus>;

    fn station() -> StationId {
        StationId::new("st-1")
    }

    async fn paired_manager(transport: ScriptedTransport) -> (Arc<Manager>, Arc<RecordingBus>) {
        let store = Arc::new(MemoryStore::new());
        let cipher = Arc::new(PlainCipher);
        let bus = Arc::new(RecordingBus::new());
        let store_id = StoreId::Station(station());

        for (key, value) in [
            (keys::PROTOCOL, json!("https")),
            (keys::HOST, json!("nas.local")),
            (keys::PORT, json!(5001)),
        ] {
            store.put(&store_id, key, value).await.unwrap();
        }
        let blob = cipher.encrypt(&Credential::new("admin", "secret")).unwrap();
        store
            .put(&store_id, keys::CREDENTIAL, json!(blob.as_str()))
            .await
            .unwrap();

        let manager = Arc::new(SessionManager::new(
            station(),
            Arc::new(transport),
            cipher,
            store,
            Arc::clone(&bus),
        ));
        (manager, bus)
    }

    fn login_ok(sid: &str) -> Value {
        ok_envelope(json!({"sid": sid}))
    }

    #[tokio::test]
    async fn should_login_and_persist_session_when_none_stored() {
        let transport = ScriptedTransport::new();
        transport.push_json(login_ok("sid-1"));
        let (manager, bus) = paired_manager(transport).await;

        let (session, _) = manager.ensure().await.unwrap();
        assert_eq!(session.sid, "sid-1");

        let stored = manager.load_persisted().await.unwrap();
        assert_eq!(stored.sid, "sid-1");
        assert_eq!(
            bus.kinds(),
            vec![EventKind::SessionRestored { station: station() }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_perform_single_login_for_concurrent_ensure_calls() {
        let transport = ScriptedTransport::with_latency(Duration::from_millis(50));
        transport.push_json(login_ok("sid-1"));
        let (manager, _) = paired_manager(transport).await;

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.ensure().await })
            })
            .collect();
        for task in tasks {
            let (session, _) = task.await.unwrap().unwrap();
            assert_eq!(session.sid, "sid-1");
        }

        let transport = &manager.transport;
        assert_eq!(transport.calls_to(protocol::AUTH_PATH), 1);
    }

    #[tokio::test]
    async fn should_restore_persisted_session_without_logging_in() {
        let transport = ScriptedTransport::new();
        let (manager, bus) = paired_manager(transport).await;
        manager
            .store
            .put(&manager.store_id, keys::SID, json!("sid-old"))
            .await
            .unwrap();

        let (session, _) = manager.ensure().await.unwrap();
        assert_eq!(session.sid, "sid-old");
        assert_eq!(manager.transport.calls().len(), 0);
        // restoring is not a login, nothing is announced
        assert!(bus.kinds().is_empty());
    }

    #[tokio::test]
    async fn should_skip_second_login_when_generation_advanced() {
        let transport = ScriptedTransport::new();
        transport.push_json(login_ok("sid-1"));
        let (manager, _) = paired_manager(transport).await;

        let (_, generation) = manager.ensure().await.unwrap();
        // A gateway that observed an older generation asks for a refresh;
        // the session from the completed login is reused instead.
        let session = manager.refresh(generation - 1).await.unwrap();
        assert_eq!(session.sid, "sid-1");
        assert_eq!(manager.transport.calls_to(protocol::AUTH_PATH), 1);
    }

    #[tokio::test]
    async fn should_announce_session_lost_when_login_rejected() {
        let transport = ScriptedTransport::new();
        transport.push_json(error_envelope(400));
        let (manager, bus) = paired_manager(transport).await;

        let result = manager.ensure().await;
        assert!(matches!(
            result,
            Err(HubError::Auth(AuthError::LoginFailed { code: 400 }))
        ));
        assert_eq!(
            bus.kinds(),
            vec![EventKind::SessionLost {
                station: station(),
                reason: UnavailableReason::AuthenticationFailed,
            }]
        );
    }

    #[tokio::test]
    async fn should_surface_otp_challenge_distinctly() {
        let transport = ScriptedTransport::new();
        transport.push_json(error_envelope(protocol::OTP_REQUIRED_CODE));
        let (manager, _) = paired_manager(transport).await;

        let result = manager
            .validate_credentials(&Credential::new("admin", "secret"), None)
            .await;
        assert!(matches!(result, Err(HubError::Auth(AuthError::OtpRequired))));
    }

    #[tokio::test]
    async fn should_replay_device_token_on_login() {
        let transport = ScriptedTransport::new();
        transport.push_json(login_ok("sid-2"));
        let (manager, _) = paired_manager(transport).await;
        manager
            .store
            .put(&manager.store_id, keys::DEVICE_TOKEN, json!("did-9"))
            .await
            .unwrap();

        manager.ensure().await.unwrap();

        let url = &manager.transport.calls()[0];
        assert!(url.contains("device_id=did-9"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_treat_validation_timeout_as_transport_failure() {
        let transport =
            ScriptedTransport::with_latency(CREDENTIAL_VALIDATION_TIMEOUT + Duration::from_secs(5));
        transport.push_json(login_ok("sid-1"));
        let (manager, _) = paired_manager(transport).await;

        let result = manager
            .validate_credentials(&Credential::new("admin", "secret"), None)
            .await;
        assert!(matches!(
            result,
            Err(HubError::Transport(TransportError::Timeout))
        ));
    }

    #[tokio::test]
    async fn should_fail_with_missing_credentials_when_store_empty() {
        let transport = ScriptedTransport::new();
        let (manager, _) = paired_manager(transport).await;
        manager
            .store
            .delete(&manager.store_id, keys::CREDENTIAL)
            .await
            .unwrap();

        let result = manager.ensure().await;
        assert!(matches!(
            result,
            Err(HubError::Credential(CredentialError::Missing))
        ));
    }
}
