// ============================================================================
// Transcoding - typed domain events <-> storage-neutral records
// ============================================================================
//
// - registry:   explicit topic <-> type table built at startup
// - extensions: encode/decode hooks for non-JSON value kinds
// - json:       canonical JSON encoder/decoder driven by the hooks
// - cipher:     optional payload encryption
// - transcoder: orchestration of all of the above
//
// ============================================================================

pub mod cipher;
pub mod extensions;
pub mod json;
pub mod registry;
pub mod transcoder;

pub use cipher::{AesGcmCipher, Cipher};
pub use extensions::{
    DateExtension, DateTimeExtension, DecodeContext, Decoded, Encoded, ExtensionChain,
    NdArrayExtension, ObjectExtension, TypeExtension,
};
pub use json::{ObjectJsonDecoder, ObjectJsonEncoder};
pub use registry::{EntityDescriptor, EventDescriptor, TopicResolver, TypeRegistry, TypeRegistryBuilder};
pub use transcoder::{deserialize_domain_entity, JsonTranscoder, Transcoder};
