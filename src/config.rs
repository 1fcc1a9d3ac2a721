//! Transcoder configuration.
//!
//! Loaded from the environment by the binary; library users can also build
//! it directly or deserialize it from their own config files.

use std::fmt;

use serde::Deserialize;

use crate::event_sourcing::{AesGcmCipher, TranscodingError};

pub const ENV_ALWAYS_ENCRYPT: &str = "TRANSCODER_ALWAYS_ENCRYPT";
pub const ENV_CIPHER_KEY: &str = "TRANSCODER_CIPHER_KEY";

#[derive(Clone, Default, Deserialize)]
pub struct TranscoderConfig {
    /// Encrypt every payload, not only types that demand it.
    #[serde(default)]
    pub always_encrypt: bool,

    /// Base64-encoded 32-byte AES key.
    #[serde(default)]
    pub cipher_key: Option<String>,
}

impl TranscoderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, TranscodingError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, TranscodingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let always_encrypt = lookup(ENV_ALWAYS_ENCRYPT)
            .map(|raw| parse_flag(ENV_ALWAYS_ENCRYPT, &raw))
            .transpose()?
            .unwrap_or(false);

        let cipher_key = lookup(ENV_CIPHER_KEY)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            always_encrypt,
            cipher_key,
        })
    }

    /// The configured cipher, if a key is present.
    pub fn cipher(&self) -> Result<Option<AesGcmCipher>, TranscodingError> {
        self.cipher_key
            .as_deref()
            .map(AesGcmCipher::from_base64_key)
            .transpose()
    }

    /// Reject settings that would fail on the first encrypted payload.
    pub fn validate(&self) -> Result<(), TranscodingError> {
        if self.always_encrypt && self.cipher_key.is_none() {
            return Err(TranscodingError::Configuration(format!(
                "{} is set but {} is missing",
                ENV_ALWAYS_ENCRYPT, ENV_CIPHER_KEY
            )));
        }
        self.cipher().map(|_| ())
    }
}

impl fmt::Debug for TranscoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscoderConfig")
            .field("always_encrypt", &self.always_encrypt)
            .field("cipher_key", &self.cipher_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, TranscodingError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(TranscodingError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}
