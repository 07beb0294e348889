//! Request gateway — one authenticated call with the retry-once policy.
//!
//! Every device operation funnels through here: the gateway attaches the
//! current session id, decodes the recorder's envelope, and on a
//! session-invalid error code asks the session manager for one synchronous
//! refresh before retrying exactly once. A second consecutive rejection is
//! unrecoverable without user intervention and escalates through the
//! session-fail path instead of surfacing a bare error.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use camhub_domain::error::{AuthError, HubError, NotFoundError, TransportError};
use camhub_domain::id::StationId;
use camhub_domain::protocol::{Envelope, Query};

use crate::ports::{
    ApiCall, ApiTransport, CredentialCipher, DeviceStore, EventPublisher, StoreId, TransportBody,
    keys,
};
use crate::session::SessionManager;

/// How to reach the recorder, as captured at pairing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairAddress {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl PairAddress {
    /// Load the pair data of `device` from the store.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] when the device was never paired.
    pub async fn load<S: DeviceStore>(store: &S, device: &StoreId) -> Result<Self, HubError> {
        let missing = || NotFoundError {
            entity: "pair data",
            id: device.to_string(),
        };

        let protocol = store
            .get(device, keys::PROTOCOL)
            .await?
            .and_then(|value| value.as_str().map(ToString::to_string))
            .ok_or_else(missing)?;
        let host = store
            .get(device, keys::HOST)
            .await?
            .and_then(|value| value.as_str().map(ToString::to_string))
            .ok_or_else(missing)?;
        let port = store
            .get(device, keys::PORT)
            .await?
            .and_then(|value| value.as_u64())
            .and_then(|port| u16::try_from(port).ok())
            .ok_or_else(missing)?;

        Ok(Self {
            protocol,
            host,
            port,
        })
    }

    /// Persist pair data for `device`.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub async fn save<S: DeviceStore>(
        &self,
        store: &S,
        device: &StoreId,
    ) -> Result<(), HubError> {
        store
            .put(device, keys::PROTOCOL, Value::String(self.protocol.clone()))
            .await?;
        store
            .put(device, keys::HOST, Value::String(self.host.clone()))
            .await?;
        store
            .put(device, keys::PORT, Value::from(u64::from(self.port)))
            .await?;
        Ok(())
    }

    /// Build a full request URL for `path`, appending `query` and, when
    /// given, the session id as `_sid`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] when the stored pair data
    /// does not form a valid URL.
    pub fn url_for(
        &self,
        path: &str,
        query: &Query,
        sid: Option<&str>,
    ) -> Result<String, HubError> {
        let base = format!("{}://{}:{}", self.protocol, self.host, self.port);
        let mut url = Url::parse(&base)
            .map_err(|err| HubError::Transport(TransportError::InvalidUrl(Box::new(err))))?;
        url.set_path(path);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            if let Some(sid) = sid {
                pairs.append_pair("_sid", sid);
            }
        }
        Ok(url.into())
    }
}

enum Attempted {
    Done(Outcome),
    AuthFailure(i64),
}

enum Outcome {
    Data(Value),
    Raw(Vec<u8>),
}

/// Issues authenticated calls for one station.
pub struct RequestGateway<T, C, S, P> {
    station: StationId,
    store_id: StoreId,
    transport: Arc<T>,
    store: Arc<S>,
    sessions: Arc<SessionManager<T, C, S, P>>,
}

impl<T, C, S, P> RequestGateway<T, C, S, P>
where
    T: ApiTransport,
    C: CredentialCipher,
    S: DeviceStore,
    P: EventPublisher,
{
    /// Create a gateway bound to `station`'s session manager.
    pub fn new(
        station: StationId,
        transport: Arc<T>,
        store: Arc<S>,
        sessions: Arc<SessionManager<T, C, S, P>>,
    ) -> Self {
        let store_id = StoreId::Station(station.clone());
        Self {
            station,
            store_id,
            transport,
            store,
            sessions,
        }
    }

    /// The session manager this gateway refreshes through.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager<T, C, S, P>> {
        &self.sessions
    }

    /// Perform one authenticated call and return the envelope's `data`.
    ///
    /// # Errors
    ///
    /// [`HubError::Transport`] for network/decoding failures (not
    /// retried), [`HubError::Api`] for non-auth recorder errors, and
    /// [`HubError::Auth`] when a refreshed session is rejected again.
    #[tracing::instrument(skip(self, query), fields(station = %self.station, path))]
    pub async fn execute(&self, path: &str, query: &Query) -> Result<Value, HubError> {
        match self.request(path, query).await? {
            Outcome::Data(data) => Ok(data),
            Outcome::Raw(_) => Err(HubError::Transport(TransportError::Decode(
                serde::de::Error::custom("expected a JSON envelope, got a raw body"),
            ))),
        }
    }

    /// Perform one authenticated call and return the raw response bytes.
    ///
    /// Snapshot and stream endpoints answer with binary bodies that are
    /// passed through unparsed.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute); additionally fails when the recorder
    /// answers with a JSON body where bytes were expected.
    pub async fn execute_raw(&self, path: &str, query: &Query) -> Result<Vec<u8>, HubError> {
        match self.request(path, query).await? {
            Outcome::Raw(bytes) => Ok(bytes),
            Outcome::Data(_) => Err(HubError::Transport(TransportError::Decode(
                serde::de::Error::custom("expected a raw body, got a JSON envelope"),
            ))),
        }
    }

    async fn request(&self, path: &str, query: &Query) -> Result<Outcome, HubError> {
        let (session, generation) = self.sessions.ensure().await?;
        match self.attempt(path, query, &session.sid).await? {
            Attempted::Done(outcome) => Ok(outcome),
            Attempted::AuthFailure(code) => {
                tracing::debug!(code, "session rejected, refreshing once");
                let session = self.sessions.refresh(generation).await?;
                match self.attempt(path, query, &session.sid).await? {
                    Attempted::Done(outcome) => Ok(outcome),
                    Attempted::AuthFailure(code) => {
                        // A freshly refreshed session was rejected again:
                        // stale or revoked credentials, needs user repair.
                        self.sessions.invalidate().await;
                        Err(AuthError::SessionInvalid { code }.into())
                    }
                }
            }
        }
    }

    async fn attempt(&self, path: &str, query: &Query, sid: &str) -> Result<Attempted, HubError> {
        let address = PairAddress::load(self.store.as_ref(), &self.store_id).await?;
        let url = address.url_for(path, query, Some(sid))?;

        let body = self.transport.get(&url).await?;
        match body {
            TransportBody::Raw(bytes) => Ok(Attempted::Done(Outcome::Raw(bytes))),
            TransportBody::Json(value) => {
                let envelope: Envelope = serde_json::from_value(value)
                    .map_err(|err| HubError::Transport(TransportError::Decode(err)))?;
                if envelope.success {
                    return Ok(Attempted::Done(Outcome::Data(
                        envelope.data.unwrap_or(Value::Null),
                    )));
                }
                let code = envelope.error_code().unwrap_or(0);
                if envelope.is_auth_failure() {
                    return Ok(Attempted::AuthFailure(code));
                }
                Err(HubError::Api {
                    api: api_of(query),
                    code,
                })
            }
        }
    }
}

impl<T, C, S, P> ApiCall for RequestGateway<T, C, S, P>
where
    T: ApiTransport,
    C: CredentialCipher,
    S: DeviceStore,
    P: EventPublisher,
{
    async fn call(&self, path: &str, query: Query) -> Result<Value, HubError> {
        self.execute(path, &query).await
    }
}

fn api_of(query: &Query) -> String {
    query
        .iter()
        .find(|(key, _)| key == "api")
        .map_or_else(String::new, |(_, value)| value.clone())
}
