//! Event rules registered on the recorder.
//!
//! A rule kind is one of a fixed, small set of event categories; each maps
//! to an exact event code on the recorder side and to a callback path
//! segment on ours. Rules are matched back after creation by the callback
//! URL in their action entry, because the create call does not return the
//! new rule's id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::device::CameraKind;
use crate::id::{CameraId, RuleId, StationId};

/// The fixed set of rule kinds the bridge registers. Not user-extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Motion,
    Enabled,
    Disabled,
    ConnectionLost,
    ConnectionNormal,
    HomeModeOn,
    HomeModeOff,
}

impl RuleKind {
    /// Every kind, cameras first.
    pub const ALL: [Self; 7] = [
        Self::Motion,
        Self::Enabled,
        Self::Disabled,
        Self::ConnectionLost,
        Self::ConnectionNormal,
        Self::HomeModeOn,
        Self::HomeModeOff,
    ];

    /// Kinds owned by a camera device.
    pub const CAMERA: [Self; 5] = [
        Self::Motion,
        Self::Enabled,
        Self::Disabled,
        Self::ConnectionLost,
        Self::ConnectionNormal,
    ];

    /// Kinds owned by the station device itself.
    pub const STATION: [Self; 2] = [Self::HomeModeOn, Self::HomeModeOff];

    /// Event code the recorder uses for this kind's trigger condition.
    #[must_use]
    pub fn event_code(self) -> i64 {
        match self {
            Self::Enabled => 1,
            Self::Disabled => 2,
            Self::ConnectionLost => 3,
            Self::ConnectionNormal => 4,
            Self::Motion => 5,
            Self::HomeModeOn => 20,
            Self::HomeModeOff => 21,
        }
    }

    /// Event source the recorder expects (camera events vs. station events).
    #[must_use]
    pub fn event_source(self) -> i64 {
        if self.is_station_kind() { 4 } else { 0 }
    }

    /// Trigger mode; only motion is edge-triggered on the recorder side.
    #[must_use]
    pub fn event_trigger(self) -> i64 {
        i64::from(self == Self::Motion)
    }

    /// True for kinds owned by the station device.
    #[must_use]
    pub fn is_station_kind(self) -> bool {
        matches!(self, Self::HomeModeOn | Self::HomeModeOff)
    }

    /// The path segment used in callback URLs for this kind.
    #[must_use]
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Motion => "motion",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::ConnectionLost => "connection_lost",
            Self::ConnectionNormal => "connection_normal",
            Self::HomeModeOn => "homemode_on",
            Self::HomeModeOff => "homemode_off",
        }
    }

    /// Device-store key holding this kind's remote rule id.
    #[must_use]
    pub fn store_key(self) -> &'static str {
        match self {
            Self::Motion => "rule_motion",
            Self::Enabled => "rule_enabled",
            Self::Disabled => "rule_disabled",
            Self::ConnectionLost => "rule_connection_lost",
            Self::ConnectionNormal => "rule_connection_normal",
            Self::HomeModeOn => "rule_home_mode_on",
            Self::HomeModeOff => "rule_home_mode_off",
        }
    }

    /// Human-readable rule name registered on the recorder.
    #[must_use]
    pub fn rule_label(self, target_name: &str) -> String {
        match self {
            Self::HomeModeOn => "Camhub home mode on".to_string(),
            Self::HomeModeOff => "Camhub home mode off".to_string(),
            Self::Motion => format!("Camhub motion detection for {target_name}"),
            Self::Enabled => format!("Camhub enabled rule for {target_name}"),
            Self::Disabled => format!("Camhub disabled rule for {target_name}"),
            Self::ConnectionLost => format!("Camhub connection lost rule for {target_name}"),
            Self::ConnectionNormal => format!("Camhub connection normal rule for {target_name}"),
        }
    }

    /// Deterministic callback path for this kind and owner.
    ///
    /// Station kinds encode only the station id; camera kinds additionally
    /// encode the camera kind and id so the correlator can route without
    /// consulting the recorder.
    #[must_use]
    pub fn callback_path(
        self,
        station: &StationId,
        camera: Option<(CameraKind, CameraId)>,
    ) -> String {
        let event = self.event_name();
        match camera {
            Some((kind, id)) => {
                format!("/callback/station/{station}/{}/{id}/{event}", kind.as_str())
            }
            None => format!("/callback/station/{station}/{event}"),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

impl FromStr for RuleKind {
    type Err = UnknownRuleKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_name() == s)
            .ok_or_else(|| UnknownRuleKind(s.to_string()))
    }
}

/// Error returned when an event name does not map to a [`RuleKind`].
#[derive(Debug, thiserror::Error)]
#[error("unknown rule kind: {0}")]
pub struct UnknownRuleKind(String);

/// Locally stored reconciliation state for one (device, kind) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub kind: RuleKind,
    /// The callback path the remote rule must point at.
    pub callback_path: String,
    /// Remote id, unknown until the first successful synchronize.
    pub remote_rule_id: Option<RuleId>,
}

/// Summary of a rule as reported by the recorder's rule list, reduced to
/// the fields the matching heuristic needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRule {
    pub id: RuleId,
    pub name: String,
    /// Callback URLs of the rule's action entries.
    pub action_urls: Vec<String>,
}

/// Find a rule by its remote id.
#[must_use]
pub fn find_by_id(rules: &[RemoteRule], id: RuleId) -> Option<&RemoteRule> {
    rules.iter().find(|rule| rule.id == id)
}

/// Find the rule whose action targets `url`, by exact string equality.
///
/// If several rules coincidentally share a URL the first one encountered
/// wins and the rest are ignored, never deleted — an accepted limitation
/// of matching by callback URL.
#[must_use]
pub fn find_by_callback_url<'a>(rules: &'a [RemoteRule], url: &str) -> Option<&'a RemoteRule> {
    rules
        .iter()
        .find(|rule| rule.action_urls.iter().any(|candidate| candidate == url))
}
