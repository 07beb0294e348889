//! `SQLite` implementation of the [`DeviceStore`] port.

use std::future::Future;
use std::str::FromStr;

use serde_json::Value;
use sqlx::{Row, SqlitePool};

use camhub_app::ports::{DeviceStore, StoreId};
use camhub_domain::error::HubError;

use crate::error::StorageError;

const UPSERT: &str = "INSERT INTO device_store (device_id, key, value) VALUES (?, ?, ?) \
     ON CONFLICT (device_id, key) DO UPDATE SET value = excluded.value";
const SELECT: &str = "SELECT value FROM device_store WHERE device_id = ? AND key = ?";
const DELETE: &str = "DELETE FROM device_store WHERE device_id = ? AND key = ?";
const DELETE_DEVICE: &str = "DELETE FROM device_store WHERE device_id = ?";
const SELECT_DEVICES: &str = "SELECT DISTINCT device_id FROM device_store ORDER BY device_id";

/// `SQLite`-backed per-device key/value store.
pub struct SqliteDeviceStore {
    pool: SqlitePool,
}

impl SqliteDeviceStore {
    /// Create a new store using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl DeviceStore for SqliteDeviceStore {
    fn get(
        &self,
        device: &StoreId,
        key: &str,
    ) -> impl Future<Output = Result<Option<Value>, HubError>> + Send {
        let pool = self.pool.clone();
        let device = device.to_string();
        let key = key.to_string();
        async move {
            let row = sqlx::query(SELECT)
                .bind(device)
                .bind(key)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            row.map(|row| {
                let raw: String = row.try_get("value").map_err(StorageError::from)?;
                serde_json::from_str(&raw).map_err(|err| HubError::from(StorageError::from(err)))
            })
            .transpose()
        }
    }

    fn put(
        &self,
        device: &StoreId,
        key: &str,
        value: Value,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let pool = self.pool.clone();
        let device = device.to_string();
        let key = key.to_string();
        async move {
            let raw = serde_json::to_string(&value).map_err(StorageError::from)?;
            sqlx::query(UPSERT)
                .bind(device)
                .bind(key)
                .bind(raw)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;
            Ok(())
        }
    }

    fn delete(
        &self,
        device: &StoreId,
        key: &str,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let pool = self.pool.clone();
        let device = device.to_string();
        let key = key.to_string();
        async move {
            sqlx::query(DELETE)
                .bind(device)
                .bind(key)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;
            Ok(())
        }
    }

    fn remove_device(
        &self,
        device: &StoreId,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let pool = self.pool.clone();
        let device = device.to_string();
        async move {
            sqlx::query(DELETE_DEVICE)
                .bind(device)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;
            Ok(())
        }
    }

    fn list_devices(&self) -> impl Future<Output = Result<Vec<StoreId>, HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows = sqlx::query(SELECT_DEVICES)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            // Rows that do not parse as a store id are skipped rather than
            // failing enumeration; they can only come from older schemas.
            let devices = rows
                .iter()
                .filter_map(|row| row.try_get::<String, _>("device_id").ok())
                .filter_map(|raw| StoreId::from_str(&raw).ok())
                .collect();
            Ok(devices)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use camhub_domain::id::{CameraId, StationId};
    use serde_json::json;

    async fn setup() -> SqliteDeviceStore {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        SqliteDeviceStore::new(db.pool().clone())
    }

    fn station() -> StoreId {
        StoreId::Station(StationId::new("st-1"))
    }

    #[tokio::test]
    async fn should_store_and_retrieve_values() {
        let store = setup().await;

        store.put(&station(), "sid", json!("sid-1")).await.unwrap();

        let value = store.get(&station(), "sid").await.unwrap();
        assert_eq!(value, Some(json!("sid-1")));
    }

    #[tokio::test]
    async fn should_return_none_for_unknown_key() {
        let store = setup().await;
        let value = store.get(&station(), "missing").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn should_replace_value_on_second_put() {
        let store = setup().await;

        store.put(&station(), "rule_motion", json!(4)).await.unwrap();
        store.put(&station(), "rule_motion", json!(9)).await.unwrap();

        let value = store.get(&station(), "rule_motion").await.unwrap();
        assert_eq!(value, Some(json!(9)));
    }

    #[tokio::test]
    async fn should_delete_single_key() {
        let store = setup().await;
        store.put(&station(), "sid", json!("sid-1")).await.unwrap();

        store.delete(&station(), "sid").await.unwrap();

        assert_eq!(store.get(&station(), "sid").await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_tolerate_deleting_absent_key() {
        let store = setup().await;
        store.delete(&station(), "missing").await.unwrap();
    }

    #[tokio::test]
    async fn should_wipe_every_key_of_a_device() {
        let store = setup().await;
        let camera = StoreId::Camera(StationId::new("st-1"), CameraId::new(7));
        store.put(&camera, "rule_motion", json!(4)).await.unwrap();
        store.put(&camera, "version", json!("1.0.0")).await.unwrap();
        store.put(&station(), "sid", json!("keep")).await.unwrap();

        store.remove_device(&camera).await.unwrap();

        assert_eq!(store.get(&camera, "rule_motion").await.unwrap(), None);
        assert_eq!(store.get(&camera, "version").await.unwrap(), None);
        assert_eq!(
            store.get(&station(), "sid").await.unwrap(),
            Some(json!("keep"))
        );
    }

    #[tokio::test]
    async fn should_enumerate_devices_with_stored_values() {
        let store = setup().await;
        let camera = StoreId::Camera(StationId::new("st-1"), CameraId::new(7));
        store.put(&station(), "sid", json!("s")).await.unwrap();
        store.put(&camera, "rule_motion", json!(4)).await.unwrap();

        let mut devices = store.list_devices().await.unwrap();
        devices.sort_by_key(ToString::to_string);

        assert_eq!(devices, vec![camera, station()]);
    }

    #[tokio::test]
    async fn should_preserve_complex_json_values() {
        let store = setup().await;
        let value = json!({"cameras": [1, 2, 3], "nested": {"on": true}});
        store.put(&station(), "blob", value.clone()).await.unwrap();

        assert_eq!(store.get(&station(), "blob").await.unwrap(), Some(value));
    }
}
