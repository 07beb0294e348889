//! Common error types used across the workspace.
//!
//! The taxonomy mirrors how failures propagate through the bridge: transport
//! problems are never retried, an invalid session is retried once via a
//! refresh, a failed refresh escalates to the user, and rule reconciliation
//! degrades a capability instead of failing a device.

use crate::rule::RuleKind;

/// Boxed source error crossing a port boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error for the camhub engine.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Network or body-decoding failure; surfaced without a retry.
    #[error("transport failure")]
    Transport(#[from] TransportError),

    /// The recorder rejected the session or a login attempt.
    #[error("authentication failed")]
    Auth(#[from] AuthError),

    /// The stored credentials could not be used for a refresh.
    #[error("credential failure")]
    Credential(#[from] CredentialError),

    /// The recorder reported a non-auth error code in its envelope.
    #[error("recorder reported error code {code} for {api}")]
    Api { api: String, code: i64 },

    /// A rule could not be reconciled with the recorder.
    #[error("rule reconciliation failed")]
    Reconciliation(#[from] ReconciliationError),

    /// A setting was rejected at the configuration boundary.
    #[error("invalid configuration")]
    Configuration(#[from] ConfigurationError),

    /// A referenced device is not known to the registry.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// The device store failed.
    #[error("storage error")]
    Storage(#[source] BoxError),
}

/// Network-level failures. Not retried and never touch session state.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request never completed.
    #[error("network request failed")]
    Network(#[source] BoxError),

    /// The response body was expected to be JSON but was not.
    #[error("response body is not valid JSON")]
    Decode(#[source] serde_json::Error),

    /// The call exceeded its wall-clock bound.
    #[error("request timed out")]
    Timeout,

    /// The stored pair data did not yield a usable URL.
    #[error("could not build request url from stored pair data")]
    InvalidUrl(#[source] BoxError),
}

/// Session and login failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The recorder flagged the session token as invalid.
    #[error("session rejected by the recorder (code {code})")]
    SessionInvalid { code: i64 },

    /// A login attempt was rejected.
    #[error("login rejected by the recorder (code {code})")]
    LoginFailed { code: i64 },

    /// The account requires a one-time password for this login.
    #[error("a one-time password is required")]
    OtpRequired,

    /// The login succeeded but no session id was returned.
    #[error("login response carried no session id")]
    MissingSid,
}

/// Failures around the credential-at-rest blob.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No credential blob is stored for the station.
    #[error("no credentials stored for this station")]
    Missing,

    /// The encryption service could not produce a blob.
    #[error("credentials could not be encrypted")]
    Encrypt(#[source] BoxError),

    /// The stored blob could not be decrypted.
    #[error("stored credentials could not be decrypted")]
    Decrypt(#[source] BoxError),
}

/// Failures of the create-then-match rule protocol.
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    /// The remote rule list could not be fetched or decoded.
    #[error("rule list unavailable")]
    ListUnavailable,

    /// The create call was accepted but the rule could not be matched back.
    #[error("created {kind} rule could not be matched by callback url")]
    Unmatched { kind: RuleKind },

    /// An enable/disable toggle was requested with no stored rule id.
    #[error("no stored rule id for {kind}")]
    MissingRuleId { kind: RuleKind },

    /// A repair pass could not bring a rule back in sync.
    #[error("{kind} rule could not be synchronized")]
    SyncFailed { kind: RuleKind },
}

/// Settings rejected synchronously at the configuration boundary.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// Motion timeout outside the accepted window; rejected, not clamped.
    #[error("motion timeout must be between {min} and {max} seconds, got {value}")]
    MotionTimeoutOutOfRange { value: u64, min: u64, max: u64 },
}

/// A referenced device does not exist.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}
