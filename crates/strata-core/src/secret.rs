//! Encryption of storage credentials at rest.
//!
//! S3 secret keys are stored AES-256-GCM encrypted under a process-wide
//! master key and only decrypted when a client is constructed. The
//! ciphertext format is `base64(nonce || ciphertext || tag)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{EngineError, Result};

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Master key length in bytes (AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// Process-wide cipher for credential encryption.
///
/// Cloning is cheap; the underlying cipher state is reused. The master key
/// bytes are zeroized once the cipher has been constructed.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug.
        f.write_str("SecretCipher(..)")
    }
}

impl SecretCipher {
    /// Build a cipher from a 32-byte master key.
    pub fn new(master_key: &[u8]) -> Result<Self> {
        if master_key.len() != MASTER_KEY_LEN {
            return Err(EngineError::internal(format!(
                "master key must be {MASTER_KEY_LEN} bytes, got {}",
                master_key.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(master_key);
        Ok(Self { cipher: Aes256Gcm::new(key) })
    }

    /// Build a cipher from a base64-encoded master key.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|e| EngineError::internal(format!("invalid master key encoding: {e}")))?,
        );
        Self::new(&raw)
    }

    /// Encrypt a secret, producing `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| EngineError::internal("secret encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Decrypt a secret produced by [`encrypt`](Self::encrypt).
    ///
    /// The result is zeroized on drop.
    pub fn decrypt(&self, encoded: &str) -> Result<Zeroizing<String>> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| EngineError::internal(format!("invalid encrypted secret: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(EngineError::internal("encrypted secret too short"));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(nonce, ciphertext)
                .map_err(|_| EngineError::internal("secret decryption failed"))?,
        );
        String::from_utf8(plaintext.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| EngineError::internal("decrypted secret is not UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new(&[7u8; MASTER_KEY_LEN]).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let c = cipher();
        let encrypted = c.encrypt("wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY").unwrap();
        let decrypted = c.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted.as_str(), "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY");
    }

    #[test]
    fn test_nonce_uniqueness() {
        let c = cipher();
        // Same plaintext twice must not produce the same ciphertext.
        let a = c.encrypt("secret").unwrap();
        let b = c.encrypt("secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = cipher().encrypt("secret").unwrap();
        let other = SecretCipher::new(&[8u8; MASTER_KEY_LEN]).unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_rejects_bad_key_length() {
        assert!(SecretCipher::new(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let c = cipher();
        let encrypted = c.encrypt("secret").unwrap();
        let mut raw = BASE64.decode(&encrypted).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(c.decrypt(&BASE64.encode(raw)).is_err());
    }
}
