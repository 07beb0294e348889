//! Rule synchronizer — create-then-match reconciliation of event rules.
//!
//! The recorder's create call does not return the new rule's id, so
//! reconciliation is a two-step protocol: issue the create, then re-fetch
//! the rule list and match by the exact callback URL just registered.
//! Failure is reported as a boolean so callers can withdraw the matching
//! capability instead of failing the whole device.

use std::sync::Arc;

use serde_json::Value;

use camhub_domain::device::CameraKind;
use camhub_domain::error::{HubError, ReconciliationError};
use camhub_domain::id::{CameraId, RuleId, StationId};
use camhub_domain::protocol::{self, ENTRY_PATH};
use camhub_domain::rule::{self, RemoteRule, RuleKind};

use crate::ports::{ApiCall, DeviceStore, StoreId};

/// Keeps one device's rules synchronized with the recorder.
///
/// Runs entirely on the narrow [`ApiCall`] port, which keeps the matching
/// heuristic testable against fixture rule lists.
pub struct RuleSynchronizer<A, S> {
    api: Arc<A>,
    store: Arc<S>,
    store_id: StoreId,
    station: StationId,
    camera: Option<(CameraKind, CameraId)>,
    target_name: String,
    callback_base: String,
}

impl<A, S> RuleSynchronizer<A, S>
where
    A: ApiCall,
    S: DeviceStore,
{
    /// Synchronizer for the station's own (home mode) rules.
    pub fn for_station(
        station: StationId,
        target_name: impl Into<String>,
        callback_base: impl Into<String>,
        api: Arc<A>,
        store: Arc<S>,
    ) -> Self {
        let store_id = StoreId::Station(station.clone());
        Self {
            api,
            store,
            store_id,
            station,
            camera: None,
            target_name: target_name.into(),
            callback_base: callback_base.into(),
        }
    }

    /// Synchronizer for one camera's rules.
    pub fn for_camera(
        station: StationId,
        kind: CameraKind,
        camera: CameraId,
        target_name: impl Into<String>,
        callback_base: impl Into<String>,
        api: Arc<A>,
        store: Arc<S>,
    ) -> Self {
        let store_id = StoreId::Camera(station.clone(), camera);
        Self {
            api,
            store,
            store_id,
            station,
            camera: Some((kind, camera)),
            target_name: target_name.into(),
            callback_base: callback_base.into(),
        }
    }

    /// The full callback URL a rule of `kind` must point at.
    #[must_use]
    pub fn callback_url(&self, kind: RuleKind) -> String {
        format!(
            "{}{}",
            self.callback_base.trim_end_matches('/'),
            kind.callback_path(&self.station, self.camera)
        )
    }

    /// Ensure exactly one enabled remote rule of `kind` exists for this
    /// device, creating it when absent and re-enabling it when found.
    ///
    /// Never raises: failures are reported as `false` so the caller can
    /// decide whether to expose or withdraw the matching capability.
    #[tracing::instrument(skip(self), fields(device = %self.store_id, kind = %kind))]
    pub async fn synchronize(&self, kind: RuleKind) -> bool {
        match self.try_synchronize(kind).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "rule synchronize failed");
                false
            }
        }
    }

    async fn try_synchronize(&self, kind: RuleKind) -> Result<(), HubError> {
        if let Some(id) = self.stored_rule_id(kind).await {
            let rules = self.fetch_rules().await?;
            if rule::find_by_id(&rules, id).is_some() {
                // Found rules are re-enabled unconditionally; a disabled
                // rule silently stops delivering callbacks otherwise.
                self.toggle_rule(id, true).await?;
                return Ok(());
            }
            tracing::info!(rule_id = %id, "stored rule vanished remotely, recreating");
        }
        self.create_and_match(kind).await
    }

    /// The two-step create protocol: create, re-fetch, match by URL.
    async fn create_and_match(&self, kind: RuleKind) -> Result<(), HubError> {
        let callback_url = self.callback_url(kind);
        let camera_id = self.camera.map(|(_, id)| id);
        let query = protocol::rule_save_query(kind, camera_id, &self.target_name, &callback_url);
        self.api.call(ENTRY_PATH, query).await?;

        let rules = self.fetch_rules().await?;
        let found = rule::find_by_callback_url(&rules, &callback_url)
            .ok_or(ReconciliationError::Unmatched { kind })?;

        self.store
            .put(
                &self.store_id,
                kind.store_key(),
                Value::from(found.id.as_i64()),
            )
            .await?;
        tracing::debug!(rule_id = %found.id, "rule created and matched");
        Ok(())
    }

    /// The locally stored remote rule id for `kind`, when it is a valid
    /// integer.
    pub async fn stored_rule_id(&self, kind: RuleKind) -> Option<RuleId> {
        self.store
            .get(&self.store_id, kind.store_key())
            .await
            .ok()
            .flatten()
            .and_then(|value| value.as_i64())
            .map(RuleId::new)
    }

    /// Enable or disable the stored remote rule of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconciliationError::MissingRuleId`] when `kind` was never
    /// synchronized, or the gateway's error for the call itself.
    pub async fn set_rule_enabled(&self, kind: RuleKind, enabled: bool) -> Result<(), HubError> {
        let id = self
            .stored_rule_id(kind)
            .await
            .ok_or(ReconciliationError::MissingRuleId { kind })?;
        self.toggle_rule(id, enabled).await
    }

    /// Delete every stored rule of `kinds` on the recorder and forget the
    /// stored ids. Kinds that were never synchronized are skipped.
    ///
    /// # Errors
    ///
    /// Propagates the delete call's failure; stored ids are only dropped
    /// after the recorder confirmed the delete.
    pub async fn delete_rules(&self, kinds: &[RuleKind]) -> Result<(), HubError> {
        let mut ids = Vec::new();
        let mut present = Vec::new();
        for &kind in kinds {
            if let Some(id) = self.stored_rule_id(kind).await {
                ids.push(id);
                present.push(kind);
            }
        }
        if ids.is_empty() {
            return Ok(());
        }

        let query = protocol::rule_id_list_query(protocol::RULE_DELETE, &ids);
        self.api.call(ENTRY_PATH, query).await?;

        for kind in present {
            self.store.delete(&self.store_id, kind.store_key()).await?;
        }
        Ok(())
    }

    async fn toggle_rule(&self, id: RuleId, enabled: bool) -> Result<(), HubError> {
        let method = if enabled {
            protocol::RULE_ENABLE
        } else {
            protocol::RULE_DISABLE
        };
        let query = protocol::rule_id_list_query(method, &[id]);
        self.api.call(ENTRY_PATH, query).await?;
        Ok(())
    }

    async fn fetch_rules(&self) -> Result<Vec<RemoteRule>, HubError> {
        let data = self
            .api
            .call(ENTRY_PATH, protocol::RULE_LIST.query())
            .await?;
        protocol::parse_rule_list(&data)
            .ok_or_else(|| ReconciliationError::ListUnavailable.into())
    }
}
