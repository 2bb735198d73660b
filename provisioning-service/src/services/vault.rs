//! Encryption of secrets at rest.
//!
//! AES-256-GCM with a random 96-bit nonce prepended to each ciphertext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, Secret};

use super::error::VaultError;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// Symmetric protection for stored secrets. `decrypt(encrypt(x)) == x`.
pub trait CredentialVault: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, VaultError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Secret<String>, VaultError>;
}

#[derive(Clone)]
pub struct AesGcmVault {
    cipher: Aes256Gcm,
}

impl AesGcmVault {
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        if key.len() != KEY_LENGTH {
            return Err(VaultError::InvalidKey(format!(
                "key must be {} bytes, got {}",
                KEY_LENGTH,
                key.len()
            )));
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Build from a base64-encoded 32-byte master key.
    pub fn from_base64(encoded: &Secret<String>) -> Result<Self, VaultError> {
        let key = STANDARD
            .decode(encoded.expose_secret().trim())
            .map_err(|e| VaultError::InvalidKey(format!("invalid base64 key: {}", e)))?;
        Self::new(&key)
    }
}

impl CredentialVault for AesGcmVault {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Secret<String>, VaultError> {
        if ciphertext.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(VaultError::DecryptionFailed(
                "ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| VaultError::DecryptionFailed("authentication tag mismatch".to_string()))?;

        String::from_utf8(plaintext)
            .map(Secret::new)
            .map_err(|e| VaultError::DecryptionFailed(format!("not valid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> AesGcmVault {
        AesGcmVault::new(&[7u8; KEY_LENGTH]).unwrap()
    }

    #[test]
    fn test_decrypt_recovers_plaintext() {
        let vault = vault();
        let sealed = vault.encrypt("s3cret").unwrap();
        assert_ne!(&sealed[NONCE_LENGTH..], b"s3cret");
        assert_eq!(vault.decrypt(&sealed).unwrap().expose_secret(), "s3cret");
    }

    #[test]
    fn test_nonce_differs_per_encryption() {
        let vault = vault();
        assert_ne!(vault.encrypt("same").unwrap(), vault.encrypt("same").unwrap());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let vault = vault();
        let mut sealed = vault.encrypt("s3cret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(
            vault.decrypt(&sealed),
            Err(VaultError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        assert!(matches!(
            AesGcmVault::new(&[0u8; 16]),
            Err(VaultError::InvalidKey(_))
        ));
        let encoded = Secret::new(STANDARD.encode([1u8; KEY_LENGTH]));
        assert!(AesGcmVault::from_base64(&encoded).is_ok());
    }
}
