//! The recorder's query-parameter RPC surface.
//!
//! Everything in this module reproduces observable wire behaviour of the
//! recorder and must not drift: api names, method versions, event codes,
//! the response envelope, and the JSON fragments embedded in the rule
//! create call. The engine stays compatible only as long as these match
//! the recorder's expectations exactly.

use serde::Deserialize;
use serde_json::Value;

use crate::credential::Credential;
use crate::id::{CameraId, RuleId};
use crate::rule::{RemoteRule, RuleKind};
use crate::session::Session;

/// Login endpoint path.
pub const AUTH_PATH: &str = "/webapi/auth.cgi";
/// Entry endpoint path for every other call.
pub const ENTRY_PATH: &str = "/webapi/entry.cgi";

/// Session namespace requested at login.
pub const AUTH_SESSION_NAME: &str = "SurveillanceStation";

/// Error codes that mean "the session is no longer valid" and warrant one
/// refresh-and-retry cycle. Anything else is surfaced as-is.
pub const AUTH_RETRY_CODES: [i64; 4] = [105, 106, 107, 119];

/// Login error code meaning a one-time password is required.
pub const OTP_REQUIRED_CODE: i64 = 403;

/// Camera status values that count as disconnected.
pub const CAMERA_DISCONNECTED_STATUSES: [i64; 2] = [3, 15];

/// Query parameter list for one call.
pub type Query = Vec<(String, String)>;

/// One versioned method of the RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiMethod {
    pub api: &'static str,
    pub method: &'static str,
    pub version: u8,
}

impl ApiMethod {
    /// Base query parameters (`api`, `method`, `version`) for this method.
    #[must_use]
    pub fn query(self) -> Query {
        vec![
            ("api".to_string(), self.api.to_string()),
            ("method".to_string(), self.method.to_string()),
            ("version".to_string(), self.version.to_string()),
        ]
    }
}

pub const LOGIN: ApiMethod = ApiMethod {
    api: "SYNO.API.Auth",
    method: "Login",
    version: 6,
};

pub const RULE_LIST: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.ActionRule",
    method: "List",
    version: 3,
};
pub const RULE_SAVE: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.ActionRule",
    method: "Save",
    version: 3,
};
pub const RULE_ENABLE: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.ActionRule",
    method: "Enable",
    version: 1,
};
pub const RULE_DISABLE: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.ActionRule",
    method: "Disable",
    version: 1,
};
pub const RULE_DELETE: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.ActionRule",
    method: "Delete",
    version: 1,
};

pub const HOME_MODE_INFO: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.HomeMode",
    method: "GetInfo",
    version: 1,
};
pub const HOME_MODE_SWITCH: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.HomeMode",
    method: "Switch",
    version: 1,
};

pub const CAMERA_INFO: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.Camera",
    method: "GetInfo",
    version: 8,
};
pub const CAMERA_LIST: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.Camera",
    method: "List",
    version: 9,
};
pub const CAMERA_ENABLE: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.Camera",
    method: "Enable",
    version: 9,
};
pub const CAMERA_DISABLE: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.Camera",
    method: "Disable",
    version: 9,
};
pub const CAMERA_SNAPSHOT: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.Camera",
    method: "GetSnapshot",
    version: 9,
};

pub const STATION_INFO: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.Info",
    method: "GetInfo",
    version: 5,
};

pub const EXTERNAL_RECORD: ApiMethod = ApiMethod {
    api: "SYNO.SurveillanceStation.ExternalRecording",
    method: "Record",
    version: 1,
};

/// The recorder's response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<EnvelopeError>,
}

/// Error object inside a failed [`Envelope`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EnvelopeError {
    pub code: i64,
}

impl Envelope {
    /// The error code, if the call failed.
    #[must_use]
    pub fn error_code(&self) -> Option<i64> {
        self.error.map(|err| err.code)
    }

    /// True when the error code is in the session-invalid class.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        self.error_code()
            .is_some_and(|code| AUTH_RETRY_CODES.contains(&code))
    }
}

/// One rule as returned by the rule list call.
#[derive(Debug, Clone, Deserialize)]
pub struct ActRule {
    #[serde(rename = "ruleId")]
    pub rule_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub events: Vec<ActRuleEvent>,
    #[serde(default)]
    pub actions: Vec<ActRuleAction>,
}

/// Trigger entry of an [`ActRule`].
#[derive(Debug, Clone, Deserialize)]
pub struct ActRuleEvent {
    #[serde(rename = "evtId", default)]
    pub event_id: i64,
    #[serde(rename = "evtDevId", default)]
    pub device_id: i64,
}

/// Action entry of an [`ActRule`].
#[derive(Debug, Clone, Deserialize)]
pub struct ActRuleAction {
    #[serde(rename = "extUrl", default)]
    pub ext_url: String,
}

impl From<ActRule> for RemoteRule {
    fn from(rule: ActRule) -> Self {
        Self {
            id: RuleId::new(rule.rule_id),
            name: rule.name,
            action_urls: rule
                .actions
                .into_iter()
                .map(|action| action.ext_url)
                .filter(|url| !url.is_empty())
                .collect(),
        }
    }
}

/// Extract the rule list from a `List` response's `data`.
///
/// Returns `None` when the payload does not carry an `actRule` array,
/// which callers treat as a failed list fetch.
#[must_use]
pub fn parse_rule_list(data: &Value) -> Option<Vec<RemoteRule>> {
    let rules = data.get("actRule")?.as_array()?;
    let parsed = rules
        .iter()
        .filter_map(|value| serde_json::from_value::<ActRule>(value.clone()).ok())
        .map(RemoteRule::from)
        .collect();
    Some(parsed)
}

/// Extract the session from a `Login` response's `data`.
#[must_use]
pub fn parse_login(data: &Value) -> Option<Session> {
    let sid = data.get("sid")?.as_str()?;
    let device_token = data
        .get("did")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    Some(Session::new(sid, device_token))
}

/// Extract the home-mode flag from a `HomeMode GetInfo` response's `data`.
#[must_use]
pub fn parse_home_mode_on(data: &Value) -> Option<bool> {
    data.get("on")?.as_bool()
}

/// Extract the enabled flag of the first camera in a camera payload.
#[must_use]
pub fn parse_camera_enabled(data: &Value) -> Option<bool> {
    data.get("cameras")?.as_array()?.first()?["enabled"].as_bool()
}

/// Decide connectivity from a `Camera List` response's `data`.
///
/// An empty camera list or a disconnected status both count as offline.
#[must_use]
pub fn parse_camera_connected(data: &Value) -> Option<bool> {
    let cameras = data.get("cameras")?.as_array()?;
    let Some(first) = cameras.first() else {
        return Some(false);
    };
    let status = first.get("status").and_then(Value::as_i64)?;
    Some(!CAMERA_DISCONNECTED_STATUSES.contains(&status))
}

/// Build the login query, replaying the device token of a remembered
/// two-factor login when one is stored.
#[must_use]
pub fn login_query(
    credential: &Credential,
    device_token: Option<&str>,
    otp_code: Option<&str>,
) -> Query {
    let mut query = LOGIN.query();
    query.push(("session".to_string(), AUTH_SESSION_NAME.to_string()));
    query.push(("account".to_string(), credential.account.clone()));
    query.push(("passwd".to_string(), credential.password.clone()));
    query.push(("format".to_string(), "sid".to_string()));
    if let Some(token) = device_token {
        query.push(("device_id".to_string(), token.to_string()));
    }
    if let Some(otp) = otp_code {
        query.push(("otp_code".to_string(), otp.to_string()));
    }
    query
}

// Number of half-hour slots in the weekly rule schedule.
const SCHEDULE_SLOTS: usize = 336;

/// Build the full `Save` query for one rule.
///
/// The recorder expects the rule name and schedule wrapped in literal
/// double quotes, and the trigger/action entries as embedded JSON strings.
#[must_use]
pub fn rule_save_query(
    kind: RuleKind,
    camera: Option<CameraId>,
    target_name: &str,
    callback_url: &str,
) -> Query {
    let mut query = RULE_SAVE.query();
    query.push((
        "name".to_string(),
        format!("\"{}\"", kind.rule_label(target_name)),
    ));
    query.push(("multiRuleId".to_string(), "-1".to_string()));
    query.push(("ruleType".to_string(), "0".to_string()));
    query.push(("actType".to_string(), "0".to_string()));
    query.push(("multiEvtSetting".to_string(), "0".to_string()));
    query.push(("evtMinIntvl".to_string(), "10".to_string()));
    query.push(("events".to_string(), rule_events_json(kind, camera)));
    query.push(("actions".to_string(), rule_actions_json(callback_url)));
    query.push((
        "actSchedule".to_string(),
        format!("\"{}\"", "1".repeat(SCHEDULE_SLOTS)),
    ));
    query
}

/// The embedded trigger JSON for a `Save` call.
#[must_use]
pub fn rule_events_json(kind: RuleKind, camera: Option<CameraId>) -> String {
    let device_id = camera.map_or(0, CameraId::as_i64);
    format!(
        "[{{\"evtSrc\":{},\"evtDsId\":0,\"evtDevId\":{},\"evtId\":{},\"evtItem\":-1,\"evtTrig\":{},\"evtWebhookToken\":\"\"}}]",
        kind.event_source(),
        device_id,
        kind.event_code(),
        kind.event_trigger(),
    )
}

/// The embedded action JSON for a `Save` call: "call this callback URL".
#[must_use]
pub fn rule_actions_json(callback_url: &str) -> String {
    format!(
        "[{{\"id\":-1,\"actSrc\":1,\"actDsId\":0,\"actDevId\":-1,\"actId\":-1,\"actItemId\":-1,\"actTimes\":1,\"actTimeUnit\":1,\"actTimeDur\":10,\"actRetPos\":-2,\"extUrl\":\"{callback_url}\",\"userName\":\"\",\"password\":\"\",\"iftttKey\":\"\",\"iftttEvent\":\"\",\"param1\":\"\",\"param2\":\"\",\"param3\":\"\",\"webhookReqMethod\":0,\"httpContentType\":0,\"httpBody\":\"\"}}]"
    )
}

/// Build an `idList` query for Enable/Disable/Delete of rules.
#[must_use]
pub fn rule_id_list_query(method: ApiMethod, ids: &[RuleId]) -> Query {
    let mut query = method.query();
    let id_list = ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    query.push(("idList".to_string(), id_list));
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_recognise_auth_failure_codes() {
        for code in AUTH_RETRY_CODES {
            let envelope: Envelope =
                serde_json::from_value(json!({"success": false, "error": {"code": code}})).unwrap();
            assert!(envelope.is_auth_failure(), "code {code} should retry");
        }
    }

    #[test]
    fn should_not_treat_other_codes_as_auth_failure() {
        let envelope: Envelope =
            serde_json::from_value(json!({"success": false, "error": {"code": 400}})).unwrap();
        assert!(!envelope.is_auth_failure());
        assert_eq!(envelope.error_code(), Some(400));
    }

    #[test]
    fn should_parse_rule_list_into_remote_rules() {
        let data = json!({
            "actRule": [
                {
                    "ruleId": 12,
                    "name": "Camhub motion detection for Porch",
                    "events": [{"evtId": 5, "evtDevId": 7}],
                    "actions": [{"extUrl": "https://hub/callback/station/a/camera/7/motion"}]
                },
                {"ruleId": 13, "actions": []}
            ]
        });

        let rules = parse_rule_list(&data).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, RuleId::new(12));
        assert_eq!(
            rules[0].action_urls,
            vec!["https://hub/callback/station/a/camera/7/motion"]
        );
        assert!(rules[1].action_urls.is_empty());
    }

    #[test]
    fn should_return_none_when_rule_list_payload_is_malformed() {
        assert!(parse_rule_list(&json!({"rules": []})).is_none());
    }

    #[test]
    fn should_parse_login_with_and_without_device_token() {
        let with = parse_login(&json!({"sid": "s1", "did": "d1"})).unwrap();
        assert_eq!(with.sid, "s1");
        assert_eq!(with.device_token.as_deref(), Some("d1"));

        let without = parse_login(&json!({"sid": "s2"})).unwrap();
        assert!(without.device_token.is_none());

        assert!(parse_login(&json!({})).is_none());
    }

    #[test]
    fn should_build_login_query_with_exact_auth_parameters() {
        let credential = Credential::new("admin", "secret");
        let query = login_query(&credential, Some("token-1"), None);

        assert!(query.contains(&("api".to_string(), "SYNO.API.Auth".to_string())));
        assert!(query.contains(&("method".to_string(), "Login".to_string())));
        assert!(query.contains(&("version".to_string(), "6".to_string())));
        assert!(query.contains(&("session".to_string(), "SurveillanceStation".to_string())));
        assert!(query.contains(&("format".to_string(), "sid".to_string())));
        assert!(query.contains(&("device_id".to_string(), "token-1".to_string())));
        assert!(!query.iter().any(|(key, _)| key == "otp_code"));
    }

    #[test]
    fn should_embed_motion_event_code_and_camera_id_in_events_json() {
        let events = rule_events_json(RuleKind::Motion, Some(CameraId::new(7)));
        assert_eq!(
            events,
            "[{\"evtSrc\":0,\"evtDsId\":0,\"evtDevId\":7,\"evtId\":5,\"evtItem\":-1,\"evtTrig\":1,\"evtWebhookToken\":\"\"}]"
        );
    }

    #[test]
    fn should_embed_station_source_for_home_mode_events_json() {
        let events = rule_events_json(RuleKind::HomeModeOn, None);
        assert_eq!(
            events,
            "[{\"evtSrc\":4,\"evtDsId\":0,\"evtDevId\":0,\"evtId\":20,\"evtItem\":-1,\"evtTrig\":0,\"evtWebhookToken\":\"\"}]"
        );
    }

    #[test]
    fn should_embed_callback_url_in_actions_json() {
        let actions = rule_actions_json("https://hub/callback/station/a/homemode_on");
        assert!(actions.contains("\"extUrl\":\"https://hub/callback/station/a/homemode_on\""));
        assert!(actions.contains("\"actSrc\":1"));
        assert!(actions.contains("\"webhookReqMethod\":0"));
    }

    #[test]
    fn should_quote_name_and_schedule_in_save_query() {
        let query = rule_save_query(
            RuleKind::Motion,
            Some(CameraId::new(3)),
            "Porch",
            "https://hub/cb",
        );

        let name = &query.iter().find(|(key, _)| key == "name").unwrap().1;
        assert_eq!(name, "\"Camhub motion detection for Porch\"");

        let schedule = &query.iter().find(|(key, _)| key == "actSchedule").unwrap().1;
        assert_eq!(schedule.len(), SCHEDULE_SLOTS + 2);
        assert!(schedule.starts_with("\"1"));
        assert!(schedule.ends_with("1\""));
    }

    #[test]
    fn should_join_rule_ids_with_commas_for_id_list_calls() {
        let query = rule_id_list_query(RULE_DELETE, &[RuleId::new(4), RuleId::new(9)]);
        assert!(query.contains(&("idList".to_string(), "4,9".to_string())));
        assert!(query.contains(&("method".to_string(), "Delete".to_string())));
    }

    #[test]
    fn should_parse_camera_payloads() {
        assert_eq!(
            parse_camera_enabled(&json!({"cameras": [{"enabled": true}]})),
            Some(true)
        );
        assert_eq!(parse_camera_enabled(&json!({"cameras": []})), None);

        assert_eq!(
            parse_camera_connected(&json!({"cameras": [{"status": 1}]})),
            Some(true)
        );
        assert_eq!(
            parse_camera_connected(&json!({"cameras": [{"status": 3}]})),
            Some(false)
        );
        assert_eq!(parse_camera_connected(&json!({"cameras": []})), Some(false));
    }

    #[test]
    fn should_parse_home_mode_payload() {
        assert_eq!(parse_home_mode_on(&json!({"on": true})), Some(true));
        assert_eq!(parse_home_mode_on(&json!({})), None);
    }
}
