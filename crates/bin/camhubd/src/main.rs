//! # camhubd — camhub daemon
//!
//! Composition root that wires all adapters together and starts the
//! bridge.
//!
//! ## Responsibilities
//! - Parse configuration (TOML file, env vars)
//! - Initialize the `SQLite` pool and run migrations
//! - Construct the transport, cipher, and device store adapters
//! - Load paired stations and cameras from the device store and spawn
//!   their initialization tasks
//! - Subscribe the session cascade to the event bus
//! - Serve the public callback endpoint and handle graceful shutdown
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use camhub_adapter_crypto::AesGcmCipher;
use camhub_adapter_http_axum::{AppState, router};
use camhub_adapter_storage_sqlite_sqlx::{Config as DbConfig, SqliteDeviceStore};
use camhub_adapter_surveillance::ReqwestTransport;
use camhub_app::devices::{CameraDevice, StationDevice};
use camhub_app::event_bus::InProcessEventBus;
use camhub_app::ports::{DeviceStore, StoreId, keys};
use camhub_app::registry::HubRegistry;
use camhub_domain::device::CameraKind;

use crate::config::Config;

type Registry = HubRegistry<ReqwestTransport, AesGcmCipher, SqliteDeviceStore, InProcessEventBus>;
type Station = StationDevice<ReqwestTransport, AesGcmCipher, SqliteDeviceStore, InProcessEventBus>;
type Camera = CameraDevice<ReqwestTransport, AesGcmCipher, SqliteDeviceStore, InProcessEventBus>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.logging.filter))
        .init();

    // Storage
    let db = DbConfig {
        database_url: config.database.url.clone(),
    }
    .build()
    .await?;
    let store = Arc::new(SqliteDeviceStore::new(db.pool().clone()));

    // Adapters
    let cipher = Arc::new(AesGcmCipher::new(&config.crypto.key));
    let transport = Arc::new(ReqwestTransport::new(&config.api)?);

    // Event bus and registry
    let bus = Arc::new(InProcessEventBus::new(256));
    let registry = Arc::new(Registry::new());

    // Session outcomes fan out to dependent devices through the cascade.
    {
        let registry = Arc::clone(&registry);
        let mut events = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => registry.handle_event(&event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "cascade task lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    spawn_paired_devices(&config, &transport, &cipher, &store, &bus, &registry).await?;

    // HTTP
    let app = router::build(AppState::new(Arc::clone(&registry)));
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "camhubd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Load every paired device from the store and spawn its initialization.
///
/// Stations are inserted first so cameras find them; camera init tasks
/// then wait on the readiness registry in the background.
async fn spawn_paired_devices(
    config: &Config,
    transport: &Arc<ReqwestTransport>,
    cipher: &Arc<AesGcmCipher>,
    store: &Arc<SqliteDeviceStore>,
    bus: &Arc<InProcessEventBus>,
    registry: &Arc<Registry>,
) -> anyhow::Result<()> {
    let devices = store.list_devices().await?;

    for device in &devices {
        let StoreId::Station(id) = device else {
            continue;
        };
        let name = stored_name(store, device, "Surveillance Station").await;
        let station: Arc<Station> = Arc::new(StationDevice::new(
            id.clone(),
            name,
            config.callback.base_url.clone(),
            Arc::clone(transport),
            Arc::clone(cipher),
            Arc::clone(store),
            Arc::clone(bus),
        ));
        registry.insert_station(Arc::clone(&station));
        tracing::info!(station = %id, "loaded paired station");

        let registry = Arc::clone(registry);
        tokio::spawn(async move {
            station.initialize(registry.as_ref()).await;
        });
    }

    for device in &devices {
        let StoreId::Camera(station_id, camera_id) = device else {
            continue;
        };
        let name = stored_name(store, device, &format!("Camera {camera_id}")).await;
        let kind = store
            .get(device, keys::KIND)
            .await
            .ok()
            .flatten()
            .and_then(|value| value.as_str().and_then(|raw| raw.parse().ok()))
            .unwrap_or(CameraKind::Camera);
        let camera: Arc<Camera> = Arc::new(CameraDevice::new(
            station_id.clone(),
            *camera_id,
            kind,
            name,
            Arc::clone(store),
            Arc::clone(bus),
        ));
        registry.insert_camera(Arc::clone(&camera));
        tracing::info!(camera = %camera_id, station = %station_id, "loaded paired camera");

        let registry = Arc::clone(registry);
        tokio::spawn(async move {
            camera.initialize(registry.as_ref()).await;
        });
    }

    Ok(())
}

async fn stored_name(store: &SqliteDeviceStore, device: &StoreId, fallback: &str) -> String {
    store
        .get(device, keys::NAME)
        .await
        .ok()
        .flatten()
        .and_then(|value| value.as_str().map(ToString::to_string))
        .unwrap_or_else(|| fallback.to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutting down");
}
