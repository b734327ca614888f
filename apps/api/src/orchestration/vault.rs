//! Credential vault — AES-256-GCM encryption of provider API keys at rest.
//!
//! Stored format: base64(nonce[12] || ciphertext || tag[16]). A fresh random nonce is
//! drawn per encryption, so equal plaintexts never produce equal ciphertexts.
//! Compare credentials with `decrypt` + `CredentialSecret::matches`, never by ciphertext.

use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub const MASTER_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("credential master key is not configured")]
    MissingMasterKey,

    #[error("invalid master key: {0}")]
    InvalidMasterKey(String),

    #[error("credential decryption failed: {0}")]
    Decryption(String),

    #[error("credential encryption failed")]
    Encryption,
}

/// A decrypted provider secret. Lives in memory for one call only.
/// `Debug` prints a placeholder; the value is reachable only via `expose_secret`.
pub struct CredentialSecret(SecretString);

impl Clone for CredentialSecret {
    fn clone(&self) -> Self {
        Self::new(self.expose_secret())
    }
}

impl CredentialSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn matches(&self, other: &str) -> bool {
        self.expose_secret() == other
    }
}

impl fmt::Debug for CredentialSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialSecret([REDACTED])")
    }
}

/// Symmetric encryption under a single server-held master key.
///
/// Holding no key is a valid state: the service still boots and the static fallback
/// keeps working, while every stored credential fails with `MissingMasterKey`.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: Option<Aes256Gcm>,
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("has_master_key", &self.cipher.is_some())
            .finish()
    }
}

impl CredentialVault {
    pub fn new(master_key: &[u8]) -> Result<Self, VaultError> {
        if master_key.len() != MASTER_KEY_LEN {
            return Err(VaultError::InvalidMasterKey(format!(
                "expected {MASTER_KEY_LEN} bytes, got {}",
                master_key.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(master_key);
        Ok(Self {
            cipher: Some(Aes256Gcm::new(key)),
        })
    }

    /// Builds a vault from the base64 `CREDENTIAL_MASTER_KEY` value.
    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::InvalidMasterKey(format!("not valid base64: {e}")))?;
        Self::new(&bytes)
    }

    pub fn without_key() -> Self {
        Self { cipher: None }
    }

    pub fn has_master_key(&self) -> bool {
        self.cipher.is_some()
    }

    /// Generates a random master key, base64-encoded, for operators bootstrapping a deployment.
    pub fn generate_master_key() -> String {
        STANDARD.encode(Aes256Gcm::generate_key(&mut OsRng))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let cipher = self.cipher.as_ref().ok_or(VaultError::MissingMasterKey)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    /// Fails on a missing/rotated key or any corruption; never returns unauthenticated bytes.
    pub fn decrypt(&self, ciphertext: &str) -> Result<CredentialSecret, VaultError> {
        let cipher = self.cipher.as_ref().ok_or(VaultError::MissingMasterKey)?;
        let raw = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| VaultError::Decryption("ciphertext is not valid base64".to_string()))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::Decryption("ciphertext is truncated".to_string()));
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| {
                VaultError::Decryption(
                    "authentication failed (corrupted data or rotated master key)".to_string(),
                )
            })?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| VaultError::Decryption("plaintext is not valid UTF-8".to_string()))?;
        Ok(CredentialSecret::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::new(&[7u8; MASTER_KEY_LEN]).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let vault = vault();
        for secret in ["sk-live-abc123", "", "ключ-🔑"] {
            let ciphertext = vault.encrypt(secret).unwrap();
            assert!(vault.decrypt(&ciphertext).unwrap().matches(secret));
        }
    }

    #[test]
    fn test_encryption_is_non_deterministic() {
        let vault = vault();
        let a = vault.encrypt("sk-same").unwrap();
        let b = vault.encrypt("sk-same").unwrap();
        assert_ne!(a, b);
        assert!(vault.decrypt(&a).unwrap().matches("sk-same"));
        assert!(vault.decrypt(&b).unwrap().matches("sk-same"));
    }

    #[test]
    fn test_ciphertext_does_not_contain_plaintext() {
        let ciphertext = vault().encrypt("sk-visible-secret").unwrap();
        assert!(!ciphertext.contains("sk-visible-secret"));
    }

    #[test]
    fn test_single_byte_corruption_fails() {
        let vault = vault();
        let ciphertext = vault.encrypt("sk-live-abc123").unwrap();
        let raw = STANDARD.decode(&ciphertext).unwrap();

        for index in [0, NONCE_LEN, raw.len() - 1] {
            let mut corrupted = raw.clone();
            corrupted[index] ^= 0x01;
            let result = vault.decrypt(&STANDARD.encode(&corrupted));
            assert!(
                matches!(result, Err(VaultError::Decryption(_))),
                "byte {index} corruption must fail"
            );
        }
    }

    #[test]
    fn test_rotated_key_fails() {
        let ciphertext = vault().encrypt("sk-live-abc123").unwrap();
        let rotated = CredentialVault::new(&[9u8; MASTER_KEY_LEN]).unwrap();
        assert!(matches!(
            rotated.decrypt(&ciphertext),
            Err(VaultError::Decryption(_))
        ));
    }

    #[test]
    fn test_missing_key_fails_both_ways() {
        let vault = CredentialVault::without_key();
        assert_eq!(vault.encrypt("x"), Err(VaultError::MissingMasterKey));
        assert!(matches!(
            vault.decrypt("AAAA"),
            Err(VaultError::MissingMasterKey)
        ));
    }

    #[test]
    fn test_truncated_and_garbage_input_fail() {
        let vault = vault();
        assert!(matches!(
            vault.decrypt("AAAA"),
            Err(VaultError::Decryption(_))
        ));
        assert!(matches!(
            vault.decrypt("not base64 at all!"),
            Err(VaultError::Decryption(_))
        ));
    }

    #[test]
    fn test_master_key_length_is_checked() {
        assert!(matches!(
            CredentialVault::new(&[0u8; 16]),
            Err(VaultError::InvalidMasterKey(_))
        ));
        let generated = CredentialVault::generate_master_key();
        assert!(CredentialVault::from_base64(&generated).is_ok());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = CredentialSecret::new("sk-should-not-print");
        assert!(!format!("{secret:?}").contains("sk-should-not-print"));
    }
}
