//! Transport port — one HTTP round trip against the recorder.
//!
//! The transport knows nothing about sessions or retries; it issues a
//! single GET against a fully built URL and classifies the body. Session
//! attachment and the retry-once policy live in the
//! [`RequestGateway`](crate::gateway::RequestGateway) above it.

use std::future::Future;

use serde_json::Value;

use camhub_domain::error::{HubError, TransportError};
use camhub_domain::protocol::Query;

/// Response body of one transport call.
///
/// Most responses are the recorder's JSON envelope; snapshot and stream
/// endpoints answer with raw bytes, which are passed through unparsed —
/// the one documented exception to "always decode the envelope".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportBody {
    Json(Value),
    Raw(Vec<u8>),
}

impl TransportBody {
    /// Unwrap a JSON body, rejecting raw bytes where an envelope was
    /// expected.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] for a raw body.
    pub fn into_json(self) -> Result<Value, TransportError> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Raw(_) => Err(TransportError::Decode(serde::de::Error::custom(
                "expected a JSON body",
            ))),
        }
    }
}

/// The generic request function consumed from the outside: issue one
/// GET, return the classified body.
pub trait ApiTransport: Send + Sync {
    /// Perform one GET against `url`.
    fn get(&self, url: &str) -> impl Future<Output = Result<TransportBody, TransportError>> + Send;
}

/// Narrow port over the authenticated gateway.
///
/// The rule synchronizer runs entirely on this surface so its matching
/// heuristic can be unit-tested against fixture rule lists without a live
/// recorder.
pub trait ApiCall: Send + Sync {
    /// Perform one authenticated entry call and return the envelope's
    /// `data` payload.
    fn call(
        &self,
        path: &str,
        query: Query,
    ) -> impl Future<Output = Result<Value, HubError>> + Send;
}
