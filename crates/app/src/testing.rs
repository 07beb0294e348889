//! In-memory fakes of the ports, shared by the engine's unit tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use camhub_domain::credential::{Credential, EncryptedCredential};
use camhub_domain::error::{CredentialError, HubError, TransportError};
use camhub_domain::event::{Event, EventKind};
use camhub_domain::protocol::Query;

use crate::ports::{
    ApiCall, ApiTransport, CredentialCipher, DeviceStore, EventPublisher, StoreId, TransportBody,
};

/// In-memory [`DeviceStore`].
#[derive(Default)]
pub(crate) struct MemoryStore {
    data: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for MemoryStore {
    fn get(
        &self,
        device: &StoreId,
        key: &str,
    ) -> impl Future<Output = Result<Option<Value>, HubError>> + Send {
        let result = self
            .data
            .lock()
            .unwrap()
            .get(&device.to_string())
            .and_then(|keys| keys.get(key))
            .cloned();
        async move { Ok(result) }
    }

    fn put(
        &self,
        device: &StoreId,
        key: &str,
        value: Value,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        self.data
            .lock()
            .unwrap()
            .entry(device.to_string())
            .or_default()
            .insert(key.to_string(), value);
        async { Ok(()) }
    }

    fn delete(
        &self,
        device: &StoreId,
        key: &str,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        if let Some(keys) = self.data.lock().unwrap().get_mut(&device.to_string()) {
            keys.remove(key);
        }
        async { Ok(()) }
    }

    fn remove_device(
        &self,
        device: &StoreId,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        self.data.lock().unwrap().remove(&device.to_string());
        async { Ok(()) }
    }

    fn list_devices(&self) -> impl Future<Output = Result<Vec<StoreId>, HubError>> + Send {
        let result = self
            .data
            .lock()
            .unwrap()
            .keys()
            .filter_map(|key| key.parse().ok())
            .collect();
        async move { Ok(result) }
    }
}

/// [`EventPublisher`] that records every published event.
#[derive(Default)]
pub(crate) struct RecordingBus {
    events: Mutex<Vec<Event>>,
}

impl RecordingBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn kinds(&self) -> Vec<EventKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.kind.clone())
            .collect()
    }
}

impl EventPublisher for RecordingBus {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HubError>> + Send {
        self.events.lock().unwrap().push(event);
        async { Ok(()) }
    }
}

/// Identity [`CredentialCipher`]: "encrypts" by JSON-encoding the
/// credential, which keeps tests honest about what crosses the port.
pub(crate) struct PlainCipher;

impl CredentialCipher for PlainCipher {
    fn encrypt(&self, credential: &Credential) -> Result<EncryptedCredential, CredentialError> {
        let blob = serde_json::to_string(credential)
            .map_err(|err| CredentialError::Encrypt(Box::new(err)))?;
        Ok(EncryptedCredential::new(blob))
    }

    fn decrypt(&self, blob: &EncryptedCredential) -> Result<Credential, CredentialError> {
        serde_json::from_str(blob.as_str()).map_err(|err| CredentialError::Decrypt(Box::new(err)))
    }
}

/// [`ApiTransport`] that answers from a scripted queue and records every
/// requested URL.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<TransportBody, TransportError>>>,
    calls: Mutex<Vec<String>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer each call only after `latency` of (virtual) time.
    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub(crate) fn push_json(&self, value: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(TransportBody::Json(value)));
    }

    pub(crate) fn push_raw(&self, bytes: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(TransportBody::Raw(bytes)));
    }

    pub(crate) fn push_network_error(&self) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Network("scripted failure".into())));
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(path))
            .count()
    }
}

impl ApiTransport for ScriptedTransport {
    fn get(&self, url: &str) -> impl Future<Output = Result<TransportBody, TransportError>> + Send {
        self.calls.lock().unwrap().push(url.to_string());
        let response = self.responses.lock().unwrap().pop_front();
        let latency = self.latency;
        async move {
            if latency > Duration::ZERO {
                tokio::time::sleep(latency).await;
            }
            response.unwrap_or_else(|| Err(TransportError::Network("queue exhausted".into())))
        }
    }
}

/// [`ApiCall`] fake for the rule synchronizer: scripted `data` payloads
/// plus a log of every issued query.
#[derive(Default)]
pub(crate) struct ScriptedApi {
    responses: Mutex<VecDeque<Result<Value, ()>>>,
    calls: Mutex<Vec<Query>>,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_data(&self, value: Value) {
        self.responses.lock().unwrap().push_back(Ok(value));
    }

    pub(crate) fn push_failure(&self) {
        self.responses.lock().unwrap().push_back(Err(()));
    }

    pub(crate) fn calls(&self) -> Vec<Query> {
        self.calls.lock().unwrap().clone()
    }

    /// Count of calls whose `method` parameter equals `method`.
    pub(crate) fn calls_with_method(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|query| {
                query
                    .iter()
                    .any(|(key, value)| key == "method" && value == method)
            })
            .count()
    }
}

impl ApiCall for ScriptedApi {
    fn call(
        &self,
        _path: &str,
        query: Query,
    ) -> impl Future<Output = Result<Value, HubError>> + Send {
        self.calls.lock().unwrap().push(query.clone());
        let api = query
            .iter()
            .find(|(key, _)| key == "api")
            .map_or_else(String::new, |(_, value)| value.clone());
        let response = self.responses.lock().unwrap().pop_front();
        async move {
            match response {
                Some(Ok(value)) => Ok(value),
                Some(Err(())) | None => Err(HubError::Api { api, code: 400 }),
            }
        }
    }
}

/// A successful envelope wrapping `data`.
pub(crate) fn ok_envelope(data: Value) -> Value {
    json!({"success": true, "data": data})
}

/// A failed envelope with `code`.
pub(crate) fn error_envelope(code: i64) -> Value {
    json!({"success": false, "error": {"code": code}})
}

use camhub_domain::device::CameraKind;
use camhub_domain::id::{CameraId, StationId};
use camhub_domain::rule::RuleKind;

use crate::devices::{CameraDevice, StationDevice};
use crate::registry::HubRegistry;

pub(crate) type TestStation =
    StationDevice<ScriptedTransport, PlainCipher, MemoryStore, RecordingBus>;
pub(crate) type TestCamera = CameraDevice<ScriptedTransport, PlainCipher, MemoryStore, RecordingBus>;
pub(crate) type TestRegistry = HubRegistry<ScriptedTransport, PlainCipher, MemoryStore, RecordingBus>;

pub(crate) fn test_station_id() -> StationId {
    StationId::new("st-1")
}

pub(crate) const TEST_CALLBACK_BASE: &str = "https://hub.example.net";

/// A station device whose store carries pair data, an encrypted
/// credential, and a persisted last-known-good session id, so tests reach
/// the entry endpoint without scripting a login first.
pub(crate) async fn paired_station(
    transport: &Arc<ScriptedTransport>,
    store: &Arc<MemoryStore>,
    bus: &Arc<RecordingBus>,
) -> TestStation {
    let cipher = Arc::new(PlainCipher);
    let store_id = StoreId::Station(test_station_id());
    for (key, value) in [
        (crate::ports::keys::PROTOCOL, json!("https")),
        (crate::ports::keys::HOST, json!("nas.local")),
        (crate::ports::keys::PORT, json!(5001)),
        (crate::ports::keys::SID, json!("sid-1")),
    ] {
        store.put(&store_id, key, value).await.unwrap();
    }
    let blob = cipher.encrypt(&Credential::new("admin", "secret")).unwrap();
    store
        .put(&store_id, crate::ports::keys::CREDENTIAL, json!(blob.as_str()))
        .await
        .unwrap();

    StationDevice::new(
        test_station_id(),
        "Surveillance Station",
        TEST_CALLBACK_BASE,
        Arc::clone(transport),
        cipher,
        Arc::clone(store),
        Arc::clone(bus),
    )
}

pub(crate) fn test_camera(
    id: i64,
    store: &Arc<MemoryStore>,
    bus: &Arc<RecordingBus>,
) -> TestCamera {
    CameraDevice::new(
        test_station_id(),
        CameraId::new(id),
        CameraKind::Camera,
        format!("Camera {id}"),
        Arc::clone(store),
        Arc::clone(bus),
    )
}

/// Queue the responses one camera initialization consumes: five rule
/// creations matched against a shared fixture list, then the state read.
pub(crate) fn queue_camera_init(transport: &ScriptedTransport, camera: CameraId, enabled: bool) {
    let rules: Vec<Value> = RuleKind::CAMERA
        .iter()
        .enumerate()
        .map(|(index, kind)| {
            let url = format!(
                "{TEST_CALLBACK_BASE}{}",
                kind.callback_path(&test_station_id(), Some((CameraKind::Camera, camera)))
            );
            let id = i64::try_from(index).unwrap() + 1 + camera.as_i64() * 10;
            json!({"ruleId": id, "actions": [{"extUrl": url}]})
        })
        .collect();
    for _ in 0..RuleKind::CAMERA.len() {
        transport.push_json(ok_envelope(json!({})));
        transport.push_json(ok_envelope(json!({"actRule": rules.clone()})));
    }
    transport.push_json(ok_envelope(json!({"cameras": [{"enabled": enabled}]})));
}
