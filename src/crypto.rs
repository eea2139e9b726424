//! Encryption of OAuth tokens at rest.
//!
//! Tokens written to the database are sealed with AES-256-GCM. The stored
//! form is hex(nonce || ciphertext || tag) with a fresh 96-bit nonce per value.

use aes_gcm::{
    aead::{generic_array::typenum::U12, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use log::debug;
use std::env;

use crate::error::{XApiError, XApiResult};

/// The length of the nonce in bytes (96 bits for AES-GCM)
const NONCE_LENGTH: usize = 12;

/// Name of the environment variable holding the hex-encoded key.
pub const KEY_ENV_VAR: &str = "TOKEN_ENCRYPTION_KEY";

/// AES-256-GCM cipher for stored tokens.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl TokenCipher {
    /// Builds a cipher from a 64-character hex key (32 bytes).
    pub fn from_hex_key(key_hex: &str) -> XApiResult<Self> {
        let key_bytes = hex::decode(key_hex.trim()).map_err(|e| {
            XApiError::ConfigurationMissing(format!(
                "{} is not valid hex: {}. Generate a key with: openssl rand -hex 32",
                KEY_ENV_VAR, e
            ))
        })?;

        if key_bytes.len() != 32 {
            return Err(XApiError::ConfigurationMissing(format!(
                "{} must be exactly 32 bytes (64 hex chars), got {} bytes",
                KEY_ENV_VAR,
                key_bytes.len()
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        Ok(Self { key })
    }

    /// Builds a cipher from `TOKEN_ENCRYPTION_KEY`.
    pub fn from_env() -> XApiResult<Self> {
        let key_hex = env::var(KEY_ENV_VAR).map_err(|_| {
            XApiError::ConfigurationMissing(format!(
                "{} environment variable is not set. Generate a 32-byte key with: openssl rand -hex 32",
                KEY_ENV_VAR
            ))
        })?;
        let cipher = Self::from_hex_key(&key_hex)?;
        debug!("Token encryption configuration validated successfully");
        Ok(cipher)
    }

    fn cipher(&self) -> XApiResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| XApiError::Store(format!("invalid encryption key: {}", e)))
    }

    /// Encrypts `plaintext` and returns the hex-encoded sealed value.
    pub fn encrypt(&self, plaintext: &str) -> XApiResult<String> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| XApiError::Store(format!("failed to generate random nonce: {}", e)))?;
        let nonce: Nonce<U12> = nonce_bytes.into();

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| XApiError::Store(format!("encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        debug!("Token encrypted successfully");
        Ok(hex::encode(result))
    }

    /// Decrypts a value produced by [`TokenCipher::encrypt`].
    pub fn decrypt(&self, encrypted_hex: &str) -> XApiResult<String> {
        let cipher = self.cipher()?;

        let encrypted_bytes = hex::decode(encrypted_hex)
            .map_err(|e| XApiError::Store(format!("invalid hex in encrypted token: {}", e)))?;

        if encrypted_bytes.len() < NONCE_LENGTH {
            return Err(XApiError::Store("encrypted token is too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = encrypted_bytes.split_at(NONCE_LENGTH);
        let nonce_array: [u8; NONCE_LENGTH] = nonce_bytes
            .try_into()
            .map_err(|_| XApiError::Store("invalid nonce length".to_string()))?;
        let nonce: Nonce<U12> = nonce_array.into();

        let plaintext = cipher.decrypt(&nonce, ciphertext).map_err(|_| {
            XApiError::Store("decryption failed - wrong key or corrupted data".to_string())
        })?;

        let token = String::from_utf8(plaintext)
            .map_err(|e| XApiError::Store(format!("decrypted token is not valid UTF-8: {}", e)))?;

        debug!("Token decrypted successfully");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests that touch TOKEN_ENCRYPTION_KEY
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = TokenCipher::from_hex_key(TEST_KEY).unwrap();

        let original = "test_token_12345";
        let encrypted = cipher.encrypt(original).unwrap();
        assert_ne!(encrypted, original);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), original);
    }

    #[test]
    fn test_different_encryptions_produce_different_output() {
        let cipher = TokenCipher::from_hex_key(TEST_KEY).unwrap();

        let encrypted1 = cipher.encrypt("test_token").unwrap();
        let encrypted2 = cipher.encrypt("test_token").unwrap();
        assert_ne!(encrypted1, encrypted2);
        assert_eq!(cipher.decrypt(&encrypted1).unwrap(), "test_token");
        assert_eq!(cipher.decrypt(&encrypted2).unwrap(), "test_token");
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() {
        let cipher = TokenCipher::from_hex_key(TEST_KEY).unwrap();
        let other = TokenCipher::from_hex_key(&"ab".repeat(32)).unwrap();

        let encrypted = cipher.encrypt("secret").unwrap();
        let err = other.decrypt(&encrypted).unwrap_err();
        assert_eq!(err.kind(), "store_error");
        assert!(cipher.decrypt("abcd").is_err());
    }

    #[test]
    fn test_key_validation() {
        assert!(TokenCipher::from_hex_key("not-hex").is_err());
        assert!(TokenCipher::from_hex_key("abcd").is_err());
        assert!(!format!("{:?}", TokenCipher::from_hex_key(TEST_KEY).unwrap()).contains("0123"));
    }

    #[test]
    fn test_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::remove_var(KEY_ENV_VAR);
        assert_eq!(
            TokenCipher::from_env().unwrap_err().kind(),
            "configuration_missing"
        );

        env::set_var(KEY_ENV_VAR, TEST_KEY);
        assert!(TokenCipher::from_env().is_ok());
        env::remove_var(KEY_ENV_VAR);
    }
}
