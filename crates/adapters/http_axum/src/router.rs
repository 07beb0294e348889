//! Axum router assembly for the callback endpoint.
//!
//! Three route shapes cover every rule the bridge registers, newest
//! first:
//!
//! - `/callback/station/{station}/{event}` — station-owned events
//! - `/callback/station/{station}/{kind}/{camera}/{event}` — camera
//!   events with full station scoping
//! - `/callback/{event}/{id}` — legacy form kept for rules created by
//!   older installations
//!
//! Every handler answers `200 {}` no matter what: the recorder must see
//! a fast, idempotent endpoint, and a callback for a vanished device is
//! not an error worth reporting back to it.

use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use camhub_app::callback::{self, CallbackEvent};
use camhub_app::ports::{ApiTransport, CredentialCipher, DeviceStore, EventPublisher};
use camhub_domain::id::{CameraId, StationId};
use camhub_domain::rule::RuleKind;

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// Includes a [`TraceLayer`] that logs each HTTP request/response at the
/// `DEBUG` level using the `tracing` ecosystem.
pub fn build<T, C, S, P>(state: AppState<T, C, S, P>) -> Router
where
    T: ApiTransport + 'static,
    C: CredentialCipher + 'static,
    S: DeviceStore + 'static,
    P: EventPublisher + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/callback/station/{station}/{event}", get(station_event))
        .route(
            "/callback/station/{station}/{kind}/{camera}/{event}",
            get(camera_event),
        )
        .route("/callback/{event}/{id}", get(legacy_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn station_event<T, C, S, P>(
    State(state): State<AppState<T, C, S, P>>,
    Path((station, event)): Path<(String, String)>,
) -> Json<Value>
where
    T: ApiTransport + 'static,
    C: CredentialCipher + 'static,
    S: DeviceStore + 'static,
    P: EventPublisher + 'static,
{
    let Ok(kind) = event.parse::<RuleKind>() else {
        tracing::debug!(event, "callback with unknown event name");
        return Json(json!({}));
    };
    let callback = CallbackEvent::for_station(StationId::new(station), kind);
    deliver(&state, &callback).await
}

async fn camera_event<T, C, S, P>(
    State(state): State<AppState<T, C, S, P>>,
    Path((station, kind, camera, event)): Path<(String, String, String, String)>,
) -> Json<Value>
where
    T: ApiTransport + 'static,
    C: CredentialCipher + 'static,
    S: DeviceStore + 'static,
    P: EventPublisher + 'static,
{
    let Ok(event_kind) = event.parse::<RuleKind>() else {
        tracing::debug!(event, "callback with unknown event name");
        return Json(json!({}));
    };
    let Ok(camera_id) = camera.parse::<CameraId>() else {
        tracing::debug!(camera, "callback with non-numeric camera id");
        return Json(json!({}));
    };
    if kind.parse::<camhub_domain::device::CameraKind>().is_err() {
        tracing::debug!(kind, "callback with unknown camera kind segment");
    }
    let callback = CallbackEvent::for_camera(StationId::new(station), camera_id, event_kind);
    deliver(&state, &callback).await
}

async fn legacy_event<T, C, S, P>(
    State(state): State<AppState<T, C, S, P>>,
    Path((event, id)): Path<(String, String)>,
) -> Json<Value>
where
    T: ApiTransport + 'static,
    C: CredentialCipher + 'static,
    S: DeviceStore + 'static,
    P: EventPublisher + 'static,
{
    let Ok(kind) = event.parse::<RuleKind>() else {
        tracing::debug!(event, "callback with unknown event name");
        return Json(json!({}));
    };
    match CallbackEvent::legacy(kind, &id) {
        Ok(callback) => deliver(&state, &callback).await,
        Err(err) => {
            tracing::debug!(error = %err, "malformed legacy callback");
            Json(json!({}))
        }
    }
}

async fn deliver<T, C, S, P>(
    state: &AppState<T, C, S, P>,
    callback: &CallbackEvent,
) -> Json<Value>
where
    T: ApiTransport + 'static,
    C: CredentialCipher + 'static,
    S: DeviceStore + 'static,
    P: EventPublisher + 'static,
{
    if let Err(err) = callback::dispatch(state.registry.as_ref(), callback).await {
        tracing::debug!(error = %err, "callback could not be correlated");
    }
    Json(json!({}))
}
