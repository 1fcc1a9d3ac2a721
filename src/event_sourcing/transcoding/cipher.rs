use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use rand::RngCore;

use crate::event_sourcing::core::TranscodingError;

// ============================================================================
// Cipher - symmetric encryption of serialized payloads
// ============================================================================

pub const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;

/// Turns plaintext JSON into opaque text and back.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, TranscodingError>;

    /// Fails with `TranscodingError::Decryption` on tampered or foreign input.
    fn decrypt(&self, ciphertext: &str) -> Result<String, TranscodingError>;
}

/// AES-256-GCM with a random nonce per message. Output is
/// `base64(nonce || ciphertext || tag)`.
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn new(key: &[u8]) -> Result<Self, TranscodingError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            TranscodingError::Configuration(format!(
                "cipher key must be {} bytes, got {}",
                KEY_BYTES,
                key.len()
            ))
        })?;
        Ok(Self { cipher })
    }

    pub fn from_base64_key(encoded: &str) -> Result<Self, TranscodingError> {
        let key = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| TranscodingError::Configuration("cipher key is not valid base64".to_string()))?;
        Self::new(&key)
    }

    /// A fresh random key, base64 encoded.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_BYTES];
        rand::rng().fill_bytes(&mut key);
        base64::engine::general_purpose::STANDARD.encode(key)
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, TranscodingError> {
        let mut nonce_bytes = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| TranscodingError::Encryption("payload encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, TranscodingError> {
        let sealed = base64::engine::general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|_| TranscodingError::Decryption("payload is not valid base64".to_string()))?;

        if sealed.len() < NONCE_BYTES {
            return Err(TranscodingError::Decryption("payload too short".to_string()));
        }
        let (nonce_bytes, body) = sealed.split_at(NONCE_BYTES);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|_| TranscodingError::Decryption("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| TranscodingError::Decryption("plaintext is not UTF-8".to_string()))
    }
}

impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmCipher").field("key", &"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AesGcmCipher {
        AesGcmCipher::from_base64_key(&AesGcmCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        let sealed = cipher.encrypt(r#"{"a":1}"#).unwrap();
        assert_ne!(sealed, r#"{"a":1}"#);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_nonce_is_fresh_per_message() {
        let cipher = cipher();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let cipher = cipher();
        let sealed = cipher.encrypt("secret").unwrap();
        let mut bytes = base64::engine::general_purpose::STANDARD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = base64::engine::general_purpose::STANDARD.encode(bytes);

        assert!(matches!(cipher.decrypt(&tampered), Err(TranscodingError::Decryption(_))));
        assert!(matches!(cipher.decrypt("not base64!"), Err(TranscodingError::Decryption(_))));
        assert!(matches!(cipher.decrypt("AAAA"), Err(TranscodingError::Decryption(_))));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = cipher().encrypt("secret").unwrap();
        assert!(matches!(cipher().decrypt(&sealed), Err(TranscodingError::Decryption(_))));
    }

    #[test]
    fn test_bad_key_length() {
        assert!(matches!(AesGcmCipher::new(&[0u8; 16]), Err(TranscodingError::Configuration(_))));
        assert!(matches!(
            AesGcmCipher::from_base64_key("%%%"),
            Err(TranscodingError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        assert!(format!("{:?}", cipher()).contains("<redacted>"));
    }
}
