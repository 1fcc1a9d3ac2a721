use std::any::TypeId;
use std::collections::{HashMap, HashSet};

use crate::event_sourcing::core::{
    id_prefix_from_qualname, make_topic, AttributeError, Attributes, DomainEntity, DomainEvent,
    EntityType, EventType, TranscodingError, ValueObject,
};

// ============================================================================
// Type Registry - explicit topic <-> type bijection
// ============================================================================
//
// Built once at startup by registering every event, entity and value-object
// type the process knows about. Afterwards it is read-only and shared behind
// an Arc, so lookups are plain map reads from any thread.
//
// ============================================================================

/// Maps concrete types to topics and back.
pub trait TopicResolver: Send + Sync {
    /// Descriptor for the concrete type of `event`.
    fn topic_for(&self, event: &dyn DomainEvent) -> Result<&EventDescriptor, TranscodingError>;

    /// Descriptor for the event type stored under `topic`.
    fn type_for(&self, topic: &str) -> Result<&EventDescriptor, TranscodingError>;

    /// Descriptor for the entity type stored under `topic`.
    fn entity_type_for(&self, topic: &str) -> Result<&EntityDescriptor, TranscodingError>;

    /// Succeeds if `module` + `qualname` names a known value-object class.
    fn resolve_class(&self, module: &str, qualname: &str) -> Result<(), TranscodingError>;
}

type EventFactory = fn(Attributes) -> Result<Box<dyn DomainEvent>, AttributeError>;
type EntityFactory = fn(Attributes) -> Result<Box<dyn DomainEntity>, AttributeError>;

fn build_event<E: EventType>(state: Attributes) -> Result<Box<dyn DomainEvent>, AttributeError> {
    E::from_state(state).map(|event| Box::new(event) as Box<dyn DomainEvent>)
}

fn build_entity<E: EntityType>(state: Attributes) -> Result<Box<dyn DomainEntity>, AttributeError> {
    E::from_state(state).map(|entity| Box::new(entity) as Box<dyn DomainEntity>)
}

/// What the transcoder needs to know about one event type.
#[derive(Debug, Clone)]
pub struct EventDescriptor {
    pub topic: String,
    pub type_name: &'static str,
    pub id_prefix: &'static str,
    pub always_encrypt: bool,
    type_id: TypeId,
    factory: EventFactory,
}

impl EventDescriptor {
    fn of<E: EventType>() -> Self {
        Self {
            topic: make_topic(E::MODULE, E::QUALNAME),
            type_name: std::any::type_name::<E>(),
            id_prefix: id_prefix_from_qualname(E::QUALNAME),
            always_encrypt: E::ALWAYS_ENCRYPT,
            type_id: TypeId::of::<E>(),
            factory: build_event::<E>,
        }
    }

    /// Build an instance from raw state through the type's `from_state`.
    pub fn reconstruct(&self, state: Attributes) -> Result<Box<dyn DomainEvent>, AttributeError> {
        (self.factory)(state)
    }
}

#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub topic: String,
    pub type_name: &'static str,
    pub id_prefix: &'static str,
    type_id: TypeId,
    factory: EntityFactory,
}

impl EntityDescriptor {
    fn of<E: EntityType>() -> Self {
        Self {
            topic: make_topic(E::MODULE, E::QUALNAME),
            type_name: std::any::type_name::<E>(),
            id_prefix: id_prefix_from_qualname(E::QUALNAME),
            type_id: TypeId::of::<E>(),
            factory: build_entity::<E>,
        }
    }

    pub fn reconstruct(&self, state: Attributes) -> Result<Box<dyn DomainEntity>, AttributeError> {
        (self.factory)(state)
    }
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    events_by_topic: HashMap<String, EventDescriptor>,
    event_topics: HashMap<TypeId, String>,
    entities_by_topic: HashMap<String, EntityDescriptor>,
    entity_topics: HashMap<TypeId, String>,
    classes: HashSet<(String, String)>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Descriptor for a statically known event type.
    pub fn event_descriptor<E: EventType>(&self) -> Result<&EventDescriptor, TranscodingError> {
        self.event_topics
            .get(&TypeId::of::<E>())
            .and_then(|topic| self.events_by_topic.get(topic))
            .ok_or_else(|| unregistered(std::any::type_name::<E>()))
    }

    /// Descriptor for a statically known entity type.
    pub fn entity_descriptor<E: EntityType>(&self) -> Result<&EntityDescriptor, TranscodingError> {
        self.entity_topics
            .get(&TypeId::of::<E>())
            .and_then(|topic| self.entities_by_topic.get(topic))
            .ok_or_else(|| unregistered(std::any::type_name::<E>()))
    }

    /// Id prefix of a registered entity's stream.
    pub fn id_prefix_for_entity(&self, entity: &dyn DomainEntity) -> Result<&'static str, TranscodingError> {
        let type_id = entity.as_any().type_id();
        self.entity_topics
            .get(&type_id)
            .and_then(|topic| self.entities_by_topic.get(topic))
            .map(|descriptor| descriptor.id_prefix)
            .ok_or_else(|| unregistered(&format!("{:?}", type_id)))
    }

    pub fn event_topics(&self) -> impl Iterator<Item = &str> {
        self.events_by_topic.keys().map(|t| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.events_by_topic.len() + self.entities_by_topic.len() + self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unregistered(type_name: &str) -> TranscodingError {
    TranscodingError::TypeResolution(format!("type {} is not registered", type_name))
}

impl TopicResolver for TypeRegistry {
    fn topic_for(&self, event: &dyn DomainEvent) -> Result<&EventDescriptor, TranscodingError> {
        let type_id = event.as_any().type_id();
        self.event_topics
            .get(&type_id)
            .and_then(|topic| self.events_by_topic.get(topic))
            .ok_or_else(|| unregistered(&format!("{:?}", type_id)))
    }

    fn type_for(&self, topic: &str) -> Result<&EventDescriptor, TranscodingError> {
        self.events_by_topic
            .get(topic)
            .ok_or_else(|| TranscodingError::TypeResolution(format!("unknown topic '{}'", topic)))
    }

    fn entity_type_for(&self, topic: &str) -> Result<&EntityDescriptor, TranscodingError> {
        self.entities_by_topic
            .get(topic)
            .ok_or_else(|| TranscodingError::TypeResolution(format!("unknown topic '{}'", topic)))
    }

    fn resolve_class(&self, module: &str, qualname: &str) -> Result<(), TranscodingError> {
        if self.classes.contains(&(module.to_string(), qualname.to_string())) {
            Ok(())
        } else {
            Err(TranscodingError::TypeResolution(format!(
                "unknown class '{}'",
                make_topic(module, qualname)
            )))
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    registry: TypeRegistry,
}

impl TypeRegistryBuilder {
    pub fn register_event<E: EventType>(&mut self) -> Result<&mut Self, TranscodingError> {
        let descriptor = EventDescriptor::of::<E>();
        let existing = self
            .registry
            .events_by_topic
            .get(&descriptor.topic)
            .map(|existing| (existing.type_id, existing.type_name));

        match existing {
            Some((type_id, _)) if type_id == descriptor.type_id => return Ok(self),
            Some((_, bound_to)) => {
                return Err(TranscodingError::Registry(format!(
                    "topic '{}' is already bound to {}",
                    descriptor.topic, bound_to
                )))
            }
            None => {}
        }

        tracing::debug!(topic = %descriptor.topic, type_name = descriptor.type_name, "Registered event type");
        self.registry.event_topics.insert(descriptor.type_id, descriptor.topic.clone());
        self.registry.events_by_topic.insert(descriptor.topic.clone(), descriptor);
        Ok(self)
    }

    pub fn register_entity<E: EntityType>(&mut self) -> Result<&mut Self, TranscodingError> {
        let descriptor = EntityDescriptor::of::<E>();
        let existing = self
            .registry
            .entities_by_topic
            .get(&descriptor.topic)
            .map(|existing| (existing.type_id, existing.type_name));

        match existing {
            Some((type_id, _)) if type_id == descriptor.type_id => return Ok(self),
            Some((_, bound_to)) => {
                return Err(TranscodingError::Registry(format!(
                    "topic '{}' is already bound to {}",
                    descriptor.topic, bound_to
                )))
            }
            None => {}
        }

        tracing::debug!(topic = %descriptor.topic, type_name = descriptor.type_name, "Registered entity type");
        self.registry.entity_topics.insert(descriptor.type_id, descriptor.topic.clone());
        self.registry.entities_by_topic.insert(descriptor.topic.clone(), descriptor);
        Ok(self)
    }

    pub fn register_value_object<T: ValueObject>(&mut self) -> Result<&mut Self, TranscodingError> {
        self.register_class(T::MODULE, T::QUALNAME)
    }

    /// Register a class by name, for objects decoded without a Rust type.
    pub fn register_class(&mut self, module: &str, qualname: &str) -> Result<&mut Self, TranscodingError> {
        if module.is_empty() || qualname.is_empty() {
            return Err(TranscodingError::Registry(
                "class module and name must not be empty".to_string(),
            ));
        }
        self.registry
            .classes
            .insert((module.to_string(), qualname.to_string()));
        Ok(self)
    }

    pub fn build(self) -> TypeRegistry {
        tracing::info!(
            events = self.registry.events_by_topic.len(),
            entities = self.registry.entities_by_topic.len(),
            classes = self.registry.classes.len(),
            "Type registry built"
        );
        self.registry
    }
}
