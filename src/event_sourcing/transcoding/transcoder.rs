use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::config::TranscoderConfig;
use crate::event_sourcing::core::{
    downcast_event, make_stored_entity_id, Attributes, DomainEntity, DomainEvent, EventType,
    StoredEvent, TranscodingError, DOMAIN_EVENT_ID_ATTR,
};
use crate::metrics::{TranscoderMetrics, OP_DESERIALIZE, OP_SERIALIZE};

use super::cipher::Cipher;
use super::extensions::{ExtensionChain, TypeExtension};
use super::json::{ObjectJsonDecoder, ObjectJsonEncoder};
use super::registry::{EventDescriptor, TopicResolver};

// ============================================================================
// Transcoder - domain event <-> stored event
// ============================================================================
//
// serialize:   state -> drop domain_event_id -> canonical JSON -> [encrypt]
// deserialize: topic -> type -> [decrypt] -> JSON -> attrs + id -> from_state
//
// A transcoder holds only read-only configuration and can be shared across
// threads and tasks without locking.
//
// ============================================================================

pub trait Transcoder: Send + Sync {
    fn serialize(&self, event: &dyn DomainEvent) -> Result<StoredEvent, TranscodingError>;

    fn deserialize(&self, stored: &StoredEvent) -> Result<Box<dyn DomainEvent>, TranscodingError>;
}

#[derive(Clone)]
pub struct JsonTranscoder {
    resolver: Arc<dyn TopicResolver>,
    chain: Arc<ExtensionChain>,
    encoder: ObjectJsonEncoder,
    decoder: ObjectJsonDecoder,
    cipher: Option<Arc<dyn Cipher>>,
    always_encrypt: bool,
    metrics: Option<Arc<TranscoderMetrics>>,
}

impl JsonTranscoder {
    /// Plaintext transcoder with the default extension chain.
    pub fn new(resolver: Arc<dyn TopicResolver>) -> Self {
        let chain = Arc::new(ExtensionChain::default());
        Self {
            encoder: ObjectJsonEncoder::new(chain.clone()),
            decoder: ObjectJsonDecoder::new(chain.clone(), resolver.clone()),
            resolver,
            chain,
            cipher: None,
            always_encrypt: false,
            metrics: None,
        }
    }

    pub fn from_config(
        config: &TranscoderConfig,
        resolver: Arc<dyn TopicResolver>,
    ) -> Result<Self, TranscodingError> {
        let transcoder = Self::new(resolver).with_always_encrypt(config.always_encrypt);
        Ok(match config.cipher()? {
            Some(cipher) => transcoder.with_cipher(Arc::new(cipher)),
            None => transcoder,
        })
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_always_encrypt(mut self, always_encrypt: bool) -> Self {
        self.always_encrypt = always_encrypt;
        self
    }

    /// Add a hook ahead of every hook already configured.
    pub fn with_extension(mut self, extension: Arc<dyn TypeExtension>) -> Self {
        let mut chain = (*self.chain).clone();
        chain.prepend(extension);
        let chain = Arc::new(chain);
        self.encoder = ObjectJsonEncoder::new(chain.clone());
        self.decoder = ObjectJsonDecoder::new(chain.clone(), self.resolver.clone());
        self.chain = chain;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<TranscoderMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn resolver(&self) -> &Arc<dyn TopicResolver> {
        &self.resolver
    }

    /// Deserialize and downcast to a statically known event type.
    pub fn deserialize_as<E: EventType>(&self, stored: &StoredEvent) -> Result<E, TranscodingError> {
        let event = self.deserialize(stored)?;
        downcast_event::<E>(event).ok_or_else(|| {
            TranscodingError::TypeResolution(format!(
                "topic '{}' does not hold {}",
                stored.event_topic,
                std::any::type_name::<E>()
            ))
        })
    }

    fn encryption_required(&self, descriptor: &EventDescriptor) -> bool {
        self.always_encrypt || descriptor.always_encrypt
    }

    fn cipher_for(&self, topic: &str) -> Result<&dyn Cipher, TranscodingError> {
        self.cipher.as_deref().ok_or_else(|| {
            TranscodingError::Configuration(format!(
                "'{}' must be encrypted but no cipher is configured",
                topic
            ))
        })
    }

    fn serialize_event(&self, event: &dyn DomainEvent) -> Result<StoredEvent, TranscodingError> {
        let descriptor = self.resolver.topic_for(event)?;

        let mut state = event.state();
        state.remove(DOMAIN_EVENT_ID_ATTR);
        let stored_entity_id = make_stored_entity_id(descriptor.id_prefix, event.entity_id());

        let plaintext = self.encoder.encode_attrs(&state)?;
        let encrypted = self.encryption_required(descriptor);
        let event_attrs = if encrypted {
            self.cipher_for(&descriptor.topic)?.encrypt(&plaintext)?
        } else {
            plaintext
        };

        tracing::debug!(
            topic = %descriptor.topic,
            stored_entity_id = %stored_entity_id,
            encrypted,
            bytes = event_attrs.len(),
            "Serialized domain event"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_serialized(&descriptor.topic, event_attrs.len(), encrypted);
        }

        Ok(StoredEvent {
            event_id: event.domain_event_id().clone(),
            stored_entity_id,
            event_topic: descriptor.topic.clone(),
            event_attrs,
        })
    }

    fn deserialize_event(&self, stored: &StoredEvent) -> Result<Box<dyn DomainEvent>, TranscodingError> {
        let descriptor = self.resolver.type_for(&stored.event_topic)?;

        let encrypted = self.encryption_required(descriptor);
        let plaintext = if encrypted {
            Cow::Owned(self.cipher_for(&descriptor.topic)?.decrypt(&stored.event_attrs)?)
        } else {
            Cow::Borrowed(stored.event_attrs.as_str())
        };

        let mut attrs = self.decoder.decode_attrs(&plaintext)?;
        attrs.set(DOMAIN_EVENT_ID_ATTR, stored.event_id.clone());

        let event = descriptor
            .reconstruct(attrs)
            .map_err(|source| TranscodingError::Reconstruction {
                topic: descriptor.topic.clone(),
                source,
            })?;

        tracing::debug!(
            topic = %descriptor.topic,
            stored_entity_id = %stored.stored_entity_id,
            encrypted,
            "Deserialized stored event"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_deserialized(&descriptor.topic, stored.event_attrs.len(), encrypted);
        }

        Ok(event)
    }

    fn record_failure(&self, operation: &str, err: &TranscodingError) {
        tracing::warn!(operation, kind = err.kind(), error = %err, "Transcoding failed");
        if let Some(metrics) = &self.metrics {
            metrics.record_failure(operation, err.kind());
        }
    }
}

impl Transcoder for JsonTranscoder {
    fn serialize(&self, event: &dyn DomainEvent) -> Result<StoredEvent, TranscodingError> {
        self.serialize_event(event)
            .inspect_err(|err| self.record_failure(OP_SERIALIZE, err))
    }

    fn deserialize(&self, stored: &StoredEvent) -> Result<Box<dyn DomainEvent>, TranscodingError> {
        self.deserialize_event(stored)
            .inspect_err(|err| self.record_failure(OP_DESERIALIZE, err))
    }
}

impl fmt::Debug for JsonTranscoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonTranscoder")
            .field("extensions", &self.chain)
            .field("cipher", &self.cipher.is_some())
            .field("always_encrypt", &self.always_encrypt)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// Rebuild an entity from its topic and captured state.
pub fn deserialize_domain_entity(
    resolver: &dyn TopicResolver,
    topic: &str,
    attrs: Attributes,
) -> Result<Box<dyn DomainEntity>, TranscodingError> {
    let descriptor = resolver.entity_type_for(topic)?;
    descriptor
        .reconstruct(attrs)
        .map_err(|source| TranscodingError::Reconstruction {
            topic: descriptor.topic.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::{
        downcast_entity, AttributeError, EntityType, EventId, ENTITY_ID_ATTR,
    };
    use crate::event_sourcing::transcoding::cipher::AesGcmCipher;
    use crate::event_sourcing::transcoding::registry::TypeRegistry;
    use chrono::{DateTime, FixedOffset, TimeZone};

    const MODULE: &str = "tests::example";

    #[derive(Debug, Clone, PartialEq)]
    struct Created {
        entity_id: String,
        domain_event_id: EventId,
        name: String,
        when: DateTime<FixedOffset>,
    }

    impl DomainEvent for Created {
        fn entity_id(&self) -> &str {
            &self.entity_id
        }

        fn domain_event_id(&self) -> &EventId {
            &self.domain_event_id
        }

        fn state(&self) -> Attributes {
            Attributes::new()
                .with(ENTITY_ID_ATTR, self.entity_id.clone())
                .with(DOMAIN_EVENT_ID_ATTR, self.domain_event_id.clone())
                .with("name", self.name.clone())
                .with("when", self.when)
        }
    }

    impl EventType for Created {
        const MODULE: &'static str = MODULE;
        const QUALNAME: &'static str = "Example.Created";

        fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
            Ok(Self {
                entity_id: state.take(ENTITY_ID_ATTR)?,
                domain_event_id: state.take(DOMAIN_EVENT_ID_ATTR)?,
                name: state.take("name")?,
                when: state.take("when")?,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Sealed {
        entity_id: String,
        domain_event_id: EventId,
        secret: String,
    }

    impl DomainEvent for Sealed {
        fn entity_id(&self) -> &str {
            &self.entity_id
        }

        fn domain_event_id(&self) -> &EventId {
            &self.domain_event_id
        }

        fn state(&self) -> Attributes {
            Attributes::new()
                .with(ENTITY_ID_ATTR, self.entity_id.clone())
                .with(DOMAIN_EVENT_ID_ATTR, self.domain_event_id.clone())
                .with("secret", self.secret.clone())
        }
    }

    impl EventType for Sealed {
        const MODULE: &'static str = MODULE;
        const QUALNAME: &'static str = "Example.Sealed";
        const ALWAYS_ENCRYPT: bool = true;

        fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
            Ok(Self {
                entity_id: state.take(ENTITY_ID_ATTR)?,
                domain_event_id: state.take(DOMAIN_EVENT_ID_ATTR)?,
                secret: state.take("secret")?,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Example {
        id: String,
        name: String,
    }

    impl DomainEntity for Example {
        fn id(&self) -> &str {
            &self.id
        }

        fn state(&self) -> Attributes {
            Attributes::new().with("id", self.id.clone()).with("name", self.name.clone())
        }
    }

    impl EntityType for Example {
        const MODULE: &'static str = MODULE;
        const QUALNAME: &'static str = "Example";

        fn from_state(mut state: Attributes) -> Result<Self, AttributeError> {
            Ok(Self {
                id: state.take("id")?,
                name: state.take("name")?,
            })
        }
    }

    fn registry() -> Arc<dyn TopicResolver> {
        let mut builder = TypeRegistry::builder();
        builder
            .register_event::<Created>()
            .unwrap()
            .register_event::<Sealed>()
            .unwrap()
            .register_entity::<Example>()
            .unwrap();
        Arc::new(builder.build())
    }

    fn created() -> Created {
        Created {
            entity_id: "E1".to_string(),
            domain_event_id: EventId::from("ev-1"),
            name: "a".to_string(),
            when: FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn cipher() -> Arc<dyn Cipher> {
        Arc::new(AesGcmCipher::from_base64_key(&AesGcmCipher::generate_key()).unwrap())
    }

    #[test]
    fn test_serialize_concrete_scenario() {
        let transcoder = JsonTranscoder::new(registry());
        let stored = transcoder.serialize(&created()).unwrap();

        assert_eq!(stored.event_id, EventId::from("ev-1"));
        assert_eq!(stored.stored_entity_id, "Example::E1");
        assert_eq!(stored.event_topic, "tests::example#Example.Created");
        assert_eq!(
            stored.event_attrs,
            r#"{"entity_id":"E1","name":"a","when":{"ISO8601_datetime":"2024-01-01T00:00:00.000000+0000"}}"#
        );

        let back = transcoder.deserialize_as::<Created>(&stored).unwrap();
        assert_eq!(back, created());
    }

    #[test]
    fn test_always_encrypt_configuration() {
        let transcoder = JsonTranscoder::new(registry())
            .with_cipher(cipher())
            .with_always_encrypt(true);
        let plain = JsonTranscoder::new(registry()).serialize(&created()).unwrap();

        let stored = transcoder.serialize(&created()).unwrap();
        assert_ne!(stored.event_attrs, plain.event_attrs);
        assert!(!stored.event_attrs.contains("ISO8601_datetime"));
        assert_eq!(transcoder.deserialize_as::<Created>(&stored).unwrap(), created());
    }

    #[test]
    fn test_always_encrypt_type_needs_cipher() {
        let sealed = Sealed {
            entity_id: "E1".to_string(),
            domain_event_id: EventId::from("ev-2"),
            secret: "hunter2".to_string(),
        };

        let plain = JsonTranscoder::new(registry());
        for _ in 0..2 {
            assert!(matches!(plain.serialize(&sealed), Err(TranscodingError::Configuration(_))));
        }

        let with_cipher = JsonTranscoder::new(registry()).with_cipher(cipher());
        let stored = with_cipher.serialize(&sealed).unwrap();
        assert!(!stored.event_attrs.contains("hunter2"));
        assert!(matches!(plain.deserialize(&stored), Err(TranscodingError::Configuration(_))));
        assert_eq!(with_cipher.deserialize_as::<Sealed>(&stored).unwrap(), sealed);

        // A type that does not demand encryption stays readable.
        let open = with_cipher.serialize(&created()).unwrap();
        assert!(open.event_attrs.contains("ISO8601_datetime"));
    }

    #[test]
    fn test_wrong_key_fails_decryption() {
        let writer = JsonTranscoder::new(registry()).with_cipher(cipher()).with_always_encrypt(true);
        let reader = JsonTranscoder::new(registry()).with_cipher(cipher()).with_always_encrypt(true);

        let stored = writer.serialize(&created()).unwrap();
        assert!(matches!(reader.deserialize(&stored), Err(TranscodingError::Decryption(_))));
    }

    #[test]
    fn test_unknown_topic() {
        let transcoder = JsonTranscoder::new(registry());
        let mut stored = transcoder.serialize(&created()).unwrap();
        stored.event_topic = "tests::example#Example.Renamed".to_string();

        assert!(matches!(transcoder.deserialize(&stored), Err(TranscodingError::TypeResolution(_))));
    }

    #[test]
    fn test_schema_drift_is_reconstruction_error() {
        let transcoder = JsonTranscoder::new(registry());
        let mut stored = transcoder.serialize(&created()).unwrap();
        stored.event_attrs = r#"{"entity_id":"E1","name":7}"#.to_string();

        match transcoder.deserialize(&stored) {
            Err(TranscodingError::Reconstruction { topic, source }) => {
                assert_eq!(topic, "tests::example#Example.Created");
                assert!(matches!(source, AttributeError::TypeMismatch { .. }));
            }
            other => panic!("expected reconstruction error, got {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_as_wrong_type() {
        let transcoder = JsonTranscoder::new(registry());
        let stored = transcoder.serialize(&created()).unwrap();
        assert!(matches!(
            transcoder.deserialize_as::<Sealed>(&stored),
            Err(TranscodingError::TypeResolution(_))
        ));
    }

    #[test]
    fn test_metrics_are_recorded() {
        let metrics = Arc::new(TranscoderMetrics::new().unwrap());
        let transcoder = JsonTranscoder::new(registry()).with_metrics(metrics.clone());

        let stored = transcoder.serialize(&created()).unwrap();
        transcoder.deserialize(&stored).unwrap();
        let mut broken = stored.clone();
        broken.event_topic = "nowhere#Nothing".to_string();
        assert!(transcoder.deserialize(&broken).is_err());

        let gathered = metrics.registry().gather();
        let serialized = gathered.iter().find(|m| m.name() == "events_serialized_total").unwrap();
        assert_eq!(serialized.metric[0].counter.value, Some(1.0));
        let failures = gathered.iter().find(|m| m.name() == "transcoding_failures_total").unwrap();
        assert_eq!(failures.metric[0].counter.value, Some(1.0));
    }

    #[test]
    fn test_from_config() {
        let config = TranscoderConfig {
            always_encrypt: true,
            cipher_key: Some(AesGcmCipher::generate_key()),
        };
        let transcoder = JsonTranscoder::from_config(&config, registry()).unwrap();
        let stored = transcoder.serialize(&created()).unwrap();
        assert!(!stored.event_attrs.starts_with('{'));
        assert_eq!(transcoder.deserialize_as::<Created>(&stored).unwrap(), created());
    }

    #[test]
    fn test_deserialize_domain_entity() {
        let resolver = registry();
        let entity = Example {
            id: "X1".to_string(),
            name: "widget".to_string(),
        };

        let rebuilt = deserialize_domain_entity(
            resolver.as_ref(),
            "tests::example#Example",
            entity.state(),
        )
        .unwrap();
        assert_eq!(downcast_entity::<Example>(rebuilt).unwrap(), entity);

        assert!(matches!(
            deserialize_domain_entity(resolver.as_ref(), "tests::example#Missing", Attributes::new()),
            Err(TranscodingError::TypeResolution(_))
        ));
    }

    #[test]
    fn test_transcoder_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<JsonTranscoder>();
    }
}
