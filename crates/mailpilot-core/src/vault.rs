//! Encrypted credential vault for per-account mail secrets
//!
//! Uses AES-256-GCM with a key derived from a passphrase via Argon2id.
//! A fixed application salt keeps the derivation stable, so the same
//! passphrase always opens the same vault regardless of database path.
//!
//! Blob format: base64(nonce || ciphertext), 12-byte random nonce.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Credentials;

/// Environment variable holding the vault passphrase
pub const VAULT_KEY_ENV: &str = "MAILPILOT_DB_KEY";

/// Application-specific salt for key derivation
/// Changing this would invalidate every stored credential blob
const APP_SALT: &[u8] = b"mailpilot.v1.credential.vault.salt";

/// Nonce size for AES-GCM (96 bits / 12 bytes)
const NONCE_SIZE: usize = 12;

/// Stateless vault handle wrapping the derived cipher
#[derive(Clone)]
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    /// Create a vault with a key derived from the given passphrase
    pub fn new(passphrase: &str) -> Result<Self> {
        let key = derive_vault_key(passphrase)?;
        let cipher = Aes256Gcm::new(&key.into());
        debug!("Initialized credential vault");
        Ok(Self { cipher })
    }

    /// Create a vault from the `MAILPILOT_DB_KEY` environment variable
    pub fn from_env() -> Result<Self> {
        let passphrase = std::env::var(VAULT_KEY_ENV).map_err(|_| {
            Error::Vault(format!(
                "Credential vault requires the {} environment variable",
                VAULT_KEY_ENV
            ))
        })?;
        Self::new(&passphrase)
    }

    /// Encrypt account credentials into a storable blob
    pub fn encrypt(&self, credentials: &Credentials) -> Result<String> {
        let plaintext = serde_json::to_string(credentials)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        use aes_gcm::aead::rand_core::RngCore;
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::Vault(format!("AES-GCM encryption failed: {}", e)))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&combined))
    }

    /// Decrypt a stored blob back into account credentials
    pub fn decrypt(&self, blob: &str) -> Result<Credentials> {
        let combined = BASE64
            .decode(blob)
            .map_err(|e| Error::Vault(format!("Invalid base64 in credential blob: {}", e)))?;

        if combined.len() < NONCE_SIZE {
            return Err(Error::Vault(format!(
                "Credential blob too short: {} bytes",
                combined.len()
            )));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self.cipher.decrypt(nonce, ciphertext).map_err(|e| {
            Error::Vault(format!(
                "AES-GCM decryption failed (wrong key or corrupted blob): {}",
                e
            ))
        })?;

        let credentials: Credentials = serde_json::from_slice(&plaintext)?;
        Ok(credentials)
    }
}

/// Derive the AES-256 vault key from a passphrase using Argon2id
fn derive_vault_key(passphrase: &str) -> Result<[u8; 32]> {
    let mut output_key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), APP_SALT, &mut output_key)
        .map_err(|e| Error::Vault(format!("Key derivation failed: {}", e)))?;
    Ok(output_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_creds() -> Credentials {
        Credentials::Password {
            username: "alice".into(),
            password: "hunter2".into(),
            host: "imap.example.com".into(),
            port: 993,
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let vault = CredentialVault::new("test-passphrase").unwrap();
        let blob = vault.encrypt(&password_creds()).unwrap();

        match vault.decrypt(&blob).unwrap() {
            Credentials::Password { username, host, .. } => {
                assert_eq!(username, "alice");
                assert_eq!(host, "imap.example.com");
            }
            _ => panic!("wrong credential variant"),
        }
    }

    #[test]
    fn test_blob_is_not_plaintext() {
        let vault = CredentialVault::new("test-passphrase").unwrap();
        let blob = vault.encrypt(&password_creds()).unwrap();
        assert!(!blob.contains("hunter2"));
        assert!(!blob.contains("alice"));
    }

    #[test]
    fn test_nonce_varies_between_encryptions() {
        let vault = CredentialVault::new("test-passphrase").unwrap();
        let a = vault.encrypt(&password_creds()).unwrap();
        let b = vault.encrypt(&password_creds()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let vault = CredentialVault::new("correct").unwrap();
        let blob = vault.encrypt(&password_creds()).unwrap();

        let other = CredentialVault::new("incorrect").unwrap();
        assert!(other.decrypt(&blob).is_err());
    }

    #[test]
    fn test_garbage_blob_fails() {
        let vault = CredentialVault::new("test").unwrap();
        assert!(vault.decrypt("not base64 at all!!!").is_err());
        assert!(vault.decrypt("AAAA").is_err());
    }
}
