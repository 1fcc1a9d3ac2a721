// ============================================================================
// Transcoding Errors
// ============================================================================
//
// None of these are retried internally: every failure is deterministic for
// a given input and configuration.
//
// ============================================================================

/// Why a set of decoded attributes could not populate a type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttributeError {
    #[error("missing attribute '{0}'")]
    Missing(String),

    #[error("attribute '{name}' has the wrong kind: expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("attribute '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },

    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),
}

impl AttributeError {
    /// Attach the attribute name to an error raised while converting a bare value.
    pub(crate) fn named(self, name: &str) -> Self {
        match self {
            AttributeError::TypeMismatch { expected, found, .. } => AttributeError::TypeMismatch {
                name: name.to_string(),
                expected,
                found,
            },
            AttributeError::Invalid { reason, .. } => AttributeError::Invalid {
                name: name.to_string(),
                reason,
            },
            other => other,
        }
    }
}

/// Errors raised while converting between domain events and stored events.
#[derive(Debug, thiserror::Error)]
pub enum TranscodingError {
    /// Encryption or decryption is required but not possible with the
    /// current configuration. Fix the configuration before retrying.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A topic (or value-object class) is not known to the reading process.
    #[error("type resolution failed: {0}")]
    TypeResolution(String),

    /// Decoded attributes do not fit the resolved type (schema drift).
    #[error("cannot reconstruct '{topic}': {source}")]
    Reconstruction {
        topic: String,
        #[source]
        source: AttributeError,
    },

    /// Ciphertext is malformed or was produced under another key.
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// A value could not be represented in the wire format.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A payload is not valid wire format.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The type registry was given conflicting registrations.
    #[error("registry error: {0}")]
    Registry(String),
}

impl TranscodingError {
    /// Short, stable label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TranscodingError::Configuration(_) => "configuration",
            TranscodingError::TypeResolution(_) => "type_resolution",
            TranscodingError::Reconstruction { .. } => "reconstruction",
            TranscodingError::Decryption(_) => "decryption",
            TranscodingError::Encryption(_) => "encryption",
            TranscodingError::Encoding(_) => "encoding",
            TranscodingError::Decoding(_) => "decoding",
            TranscodingError::Registry(_) => "registry",
        }
    }
}

impl From<serde_json::Error> for TranscodingError {
    fn from(err: serde_json::Error) -> Self {
        TranscodingError::Decoding(err.to_string())
    }
}
