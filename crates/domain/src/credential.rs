//! Credentials for the recording station account.
//!
//! The plaintext [`Credential`] only exists transiently: it is produced by
//! the pairing flow, handed to the encryption service, and re-materialised
//! for the duration of a single login call. At rest the station only holds
//! an [`EncryptedCredential`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Account and password for the recorder, in plaintext.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub account: String,
    pub password: String,
}

impl Credential {
    /// Create a credential from pairing input.
    #[must_use]
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
        }
    }
}

// The password must never reach logs, so Debug is written by hand.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The opaque at-rest form of a [`Credential`], produced by the
/// encryption service behind the `CredentialCipher` port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCredential(String);

impl EncryptedCredential {
    /// Wrap an opaque blob produced by the encryption service.
    #[must_use]
    pub fn new(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    /// Access the blob for storage or decryption.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
