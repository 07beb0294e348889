//! # camhub-adapter-crypto
//!
//! AES-256-GCM implementation of the
//! [`CredentialCipher`](camhub_app::ports::CredentialCipher) port.
//!
//! The blob layout is `base64(nonce || ciphertext)` with a fresh random
//! nonce per encryption, so encrypting the same credential twice yields
//! different blobs. The key is derived from an operator-supplied secret;
//! losing that secret invalidates every stored credential, which then
//! needs a repair flow.
//!
//! ## Dependency rule
//! Depends on `camhub-app` (for the port trait) and `camhub-domain`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

use camhub_app::ports::CredentialCipher;
use camhub_domain::credential::{Credential, EncryptedCredential};
use camhub_domain::error::CredentialError;

const NONCE_LEN: usize = 12;

/// AES-256-GCM credential cipher keyed from an operator secret.
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Derive the cipher key from `secret` (any length, hashed to 256
    /// bits).
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }
}

impl CredentialCipher for AesGcmCipher {
    fn encrypt(&self, credential: &Credential) -> Result<EncryptedCredential, CredentialError> {
        let plaintext = serde_json::to_vec(credential)
            .map_err(|err| CredentialError::Encrypt(Box::new(err)))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| CredentialError::Encrypt("aead encryption failed".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(EncryptedCredential::new(BASE64.encode(blob)))
    }

    fn decrypt(&self, blob: &EncryptedCredential) -> Result<Credential, CredentialError> {
        let raw = BASE64
            .decode(blob.as_str())
            .map_err(|err| CredentialError::Decrypt(Box::new(err)))?;
        if raw.len() <= NONCE_LEN {
            return Err(CredentialError::Decrypt("blob too short".into()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CredentialError::Decrypt("aead decryption failed".into()))?;
        serde_json::from_slice(&plaintext).map_err(|err| CredentialError::Decrypt(Box::new(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential::new("admin", "hunter2")
    }

    #[test]
    fn should_roundtrip_credential_through_cipher() {
        let cipher = AesGcmCipher::new("operator-secret");
        let blob = cipher.encrypt(&credential()).unwrap();
        let decrypted = cipher.decrypt(&blob).unwrap();
        assert_eq!(decrypted, credential());
    }

    #[test]
    fn should_produce_different_blobs_for_same_credential() {
        let cipher = AesGcmCipher::new("operator-secret");
        let first = cipher.encrypt(&credential()).unwrap();
        let second = cipher.encrypt(&credential()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn should_not_leak_plaintext_into_blob() {
        let cipher = AesGcmCipher::new("operator-secret");
        let blob = cipher.encrypt(&credential()).unwrap();
        assert!(!blob.as_str().contains("hunter2"));
        assert!(!blob.as_str().contains("admin"));
    }

    #[test]
    fn should_reject_blob_encrypted_with_different_key() {
        let blob = AesGcmCipher::new("key-one").encrypt(&credential()).unwrap();
        let result = AesGcmCipher::new("key-two").decrypt(&blob);
        assert!(matches!(result, Err(CredentialError::Decrypt(_))));
    }

    #[test]
    fn should_reject_tampered_blob() {
        let cipher = AesGcmCipher::new("operator-secret");
        let blob = cipher.encrypt(&credential()).unwrap();
        let mut raw = BASE64.decode(blob.as_str()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let tampered = EncryptedCredential::new(BASE64.encode(raw));

        assert!(matches!(
            cipher.decrypt(&tampered),
            Err(CredentialError::Decrypt(_))
        ));
    }

    #[test]
    fn should_reject_malformed_blobs() {
        let cipher = AesGcmCipher::new("operator-secret");
        assert!(cipher
            .decrypt(&EncryptedCredential::new("not base64 !!!"))
            .is_err());
        assert!(cipher
            .decrypt(&EncryptedCredential::new(BASE64.encode(b"short")))
            .is_err());
    }
}
