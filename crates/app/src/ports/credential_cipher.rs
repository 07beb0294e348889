//! Credential encryption port.
//!
//! Credentials only exist in plaintext for the duration of one login call;
//! at rest the station holds the opaque blob this port produces. The
//! algorithm behind it is an external concern.

use camhub_domain::credential::{Credential, EncryptedCredential};
use camhub_domain::error::CredentialError;

/// Encrypt/decrypt service for the credential-at-rest blob.
pub trait CredentialCipher: Send + Sync {
    /// Produce the opaque at-rest form of a credential.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Encrypt`] when the cipher fails.
    fn encrypt(&self, credential: &Credential) -> Result<EncryptedCredential, CredentialError>;

    /// Re-materialise the plaintext credential for one login call.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Decrypt`] when the blob is corrupt or was
    /// produced with a different key.
    fn decrypt(&self, blob: &EncryptedCredential) -> Result<Credential, CredentialError>;
}
