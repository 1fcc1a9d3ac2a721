use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use uuid::Uuid;

use super::errors::AttributeError;
use super::ndarray::NumericArray;

// ============================================================================
// Attribute Model
// ============================================================================
//
// Domain events and entities expose their state as a sorted map of
// attribute name -> AttrValue. The JSON base encoder represents the native
// kinds directly; the remaining kinds go through the type extension chain.
//
// ============================================================================

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
    Array(NumericArray),
    Object(ObjectValue),
}

impl AttrValue {
    /// Human-readable kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "string",
            AttrValue::List(_) => "list",
            AttrValue::Map(_) => "map",
            AttrValue::DateTime(_) => "datetime",
            AttrValue::Date(_) => "date",
            AttrValue::Array(_) => "ndarray",
            AttrValue::Object(_) => "object",
        }
    }

    /// True for the kinds the JSON base encoder represents without help.
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            AttrValue::Null
                | AttrValue::Bool(_)
                | AttrValue::Int(_)
                | AttrValue::Float(_)
                | AttrValue::Str(_)
                | AttrValue::List(_)
                | AttrValue::Map(_)
        )
    }
}

/// An arbitrary object: its type's module and qualified name plus its
/// public attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    pub class: String,
    pub module: String,
    pub attrs: BTreeMap<String, AttrValue>,
}

impl ObjectValue {
    pub fn new(module: impl Into<String>, class: impl Into<String>, attrs: Attributes) -> Self {
        Self {
            class: class.into(),
            module: module.into(),
            attrs: attrs.into_inner(),
        }
    }

    pub fn of<T: ValueObject>(value: &T) -> Self {
        Self::new(T::MODULE, T::QUALNAME, value.attributes())
    }

    pub fn is<T: ValueObject>(&self) -> bool {
        self.module == T::MODULE && self.class == T::QUALNAME
    }
}

// ============================================================================
// Attributes - sorted name/value map with typed accessors
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(BTreeMap<String, AttrValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl IntoAttr) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl IntoAttr) -> Option<AttrValue> {
        self.0.insert(name.to_string(), value.into_attr())
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        self.0.remove(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Remove an attribute and convert it. A missing attribute is an error
    /// unless `T` tolerates absence (`Option<_>`).
    pub fn take<T: FromAttr>(&mut self, name: &str) -> Result<T, AttributeError> {
        match self.0.remove(name) {
            Some(value) => T::from_attr(value).map_err(|e| e.named(name)),
            None => T::from_missing(name),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn as_map(&self) -> &BTreeMap<String, AttrValue> {
        &self.0
    }

    pub fn into_inner(self) -> BTreeMap<String, AttrValue> {
        self.0
    }
}

impl From<BTreeMap<String, AttrValue>> for Attributes {
    fn from(map: BTreeMap<String, AttrValue>) -> Self {
        Self(map)
    }
}

impl IntoIterator for Attributes {
    type Item = (String, AttrValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, AttrValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ============================================================================
// Conversions
// ============================================================================

pub trait IntoAttr {
    fn into_attr(self) -> AttrValue;
}

pub trait FromAttr: Sized {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError>;

    /// Called by `Attributes::take` when the attribute is absent.
    fn from_missing(name: &str) -> Result<Self, AttributeError> {
        Err(AttributeError::Missing(name.to_string()))
    }
}

pub(crate) fn mismatch(expected: &'static str, found: &AttrValue) -> AttributeError {
    AttributeError::TypeMismatch {
        name: String::new(),
        expected,
        found: found.kind(),
    }
}

fn invalid(reason: impl Into<String>) -> AttributeError {
    AttributeError::Invalid {
        name: String::new(),
        reason: reason.into(),
    }
}

impl IntoAttr for AttrValue {
    fn into_attr(self) -> AttrValue {
        self
    }
}

impl FromAttr for AttrValue {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        Ok(value)
    }
}

impl IntoAttr for String {
    fn into_attr(self) -> AttrValue {
        AttrValue::Str(self)
    }
}

impl IntoAttr for &str {
    fn into_attr(self) -> AttrValue {
        AttrValue::Str(self.to_string())
    }
}

impl FromAttr for String {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        match value {
            AttrValue::Str(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl IntoAttr for bool {
    fn into_attr(self) -> AttrValue {
        AttrValue::Bool(self)
    }
}

impl FromAttr for bool {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        match value {
            AttrValue::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl IntoAttr for i64 {
    fn into_attr(self) -> AttrValue {
        AttrValue::Int(self)
    }
}

impl FromAttr for i64 {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        match value {
            AttrValue::Int(i) => Ok(i),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl IntoAttr for i32 {
    fn into_attr(self) -> AttrValue {
        AttrValue::Int(i64::from(self))
    }
}

impl FromAttr for i32 {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        let wide = i64::from_attr(value)?;
        i32::try_from(wide).map_err(|_| invalid(format!("{} does not fit in i32", wide)))
    }
}

impl IntoAttr for u32 {
    fn into_attr(self) -> AttrValue {
        AttrValue::Int(i64::from(self))
    }
}

impl FromAttr for u32 {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        let wide = i64::from_attr(value)?;
        u32::try_from(wide).map_err(|_| invalid(format!("{} does not fit in u32", wide)))
    }
}

impl IntoAttr for f64 {
    fn into_attr(self) -> AttrValue {
        AttrValue::Float(self)
    }
}

impl FromAttr for f64 {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        match value {
            AttrValue::Float(f) => Ok(f),
            // JSON does not distinguish 2.0 from 2 once written by other tools.
            AttrValue::Int(i) => Ok(i as f64),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl IntoAttr for DateTime<FixedOffset> {
    fn into_attr(self) -> AttrValue {
        AttrValue::DateTime(self)
    }
}

impl FromAttr for DateTime<FixedOffset> {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        match value {
            AttrValue::DateTime(dt) => Ok(dt),
            other => Err(mismatch("datetime", &other)),
        }
    }
}

impl IntoAttr for DateTime<Utc> {
    fn into_attr(self) -> AttrValue {
        AttrValue::DateTime(self.fixed_offset())
    }
}

impl FromAttr for DateTime<Utc> {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        DateTime::<FixedOffset>::from_attr(value).map(|dt| dt.with_timezone(&Utc))
    }
}

impl IntoAttr for NaiveDate {
    fn into_attr(self) -> AttrValue {
        AttrValue::Date(self)
    }
}

impl FromAttr for NaiveDate {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        match value {
            AttrValue::Date(d) => Ok(d),
            other => Err(mismatch("date", &other)),
        }
    }
}

impl IntoAttr for NumericArray {
    fn into_attr(self) -> AttrValue {
        AttrValue::Array(self)
    }
}

impl FromAttr for NumericArray {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        match value {
            AttrValue::Array(a) => Ok(a),
            other => Err(mismatch("ndarray", &other)),
        }
    }
}

impl IntoAttr for Uuid {
    fn into_attr(self) -> AttrValue {
        AttrValue::Str(self.to_string())
    }
}

impl FromAttr for Uuid {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        let text = String::from_attr(value)?;
        Uuid::parse_str(&text).map_err(|e| invalid(e.to_string()))
    }
}

impl<T: IntoAttr> IntoAttr for Option<T> {
    fn into_attr(self) -> AttrValue {
        match self {
            Some(value) => value.into_attr(),
            None => AttrValue::Null,
        }
    }
}

impl<T: FromAttr> FromAttr for Option<T> {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        match value {
            AttrValue::Null => Ok(None),
            other => T::from_attr(other).map(Some),
        }
    }

    fn from_missing(_name: &str) -> Result<Self, AttributeError> {
        Ok(None)
    }
}

impl<T: IntoAttr> IntoAttr for Vec<T> {
    fn into_attr(self) -> AttrValue {
        AttrValue::List(self.into_iter().map(IntoAttr::into_attr).collect())
    }
}

impl<T: FromAttr> FromAttr for Vec<T> {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        match value {
            AttrValue::List(items) => items.into_iter().map(T::from_attr).collect(),
            other => Err(mismatch("list", &other)),
        }
    }
}

impl<T: IntoAttr> IntoAttr for BTreeMap<String, T> {
    fn into_attr(self) -> AttrValue {
        AttrValue::Map(self.into_iter().map(|(k, v)| (k, v.into_attr())).collect())
    }
}

impl<T: FromAttr> FromAttr for BTreeMap<String, T> {
    fn from_attr(value: AttrValue) -> Result<Self, AttributeError> {
        match value {
            AttrValue::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| T::from_attr(v).map(|v| (k, v)))
                .collect(),
            other => Err(mismatch("map", &other)),
        }
    }
}

// ============================================================================
// Value Objects - typed reconstruction of arbitrary objects
// ============================================================================

/// A type that travels through the arbitrary-object encoding.
///
/// `construct` is the validating constructor; `bare` and `assign` build an
/// instance from raw state without any validation.
pub trait ValueObject: Sized {
    const MODULE: &'static str;
    const QUALNAME: &'static str;

    fn attributes(&self) -> Attributes;

    fn construct(args: Attributes) -> Result<Self, AttributeError>;

    fn bare() -> Self;

    fn assign(&mut self, name: &str, value: AttrValue) -> Result<(), AttributeError>;
}

/// Rebuild a value object: first through its validating constructor with
/// every attribute as a named argument, then, if that fails, by raw
/// assignment onto a bare instance.
pub fn reconstruct_object<T: ValueObject>(value: AttrValue) -> Result<T, AttributeError> {
    let object = match value {
        AttrValue::Object(object) => object,
        other => return Err(mismatch("object", &other)),
    };

    if !object.is::<T>() {
        return Err(invalid(format!(
            "expected {}.{}, found {}.{}",
            T::MODULE,
            T::QUALNAME,
            object.module,
            object.class
        )));
    }

    match T::construct(Attributes::from(object.attrs.clone())) {
        Ok(constructed) => Ok(constructed),
        Err(reason) => {
            tracing::debug!(
                class = T::QUALNAME,
                error = %reason,
                "Constructor rejected stored state, assigning attributes directly"
            );
            let mut bare = T::bare();
            for (name, value) in object.attrs {
                bare.assign(&name, value)?;
            }
            Ok(bare)
        }
    }
}

/// Implement `IntoAttr`/`FromAttr` for a `ValueObject`.
#[macro_export]
macro_rules! impl_value_object_attr {
    ($ty:ty) => {
        impl $crate::event_sourcing::IntoAttr for $ty {
            fn into_attr(self) -> $crate::event_sourcing::AttrValue {
                $crate::event_sourcing::AttrValue::Object($crate::event_sourcing::ObjectValue::of(&self))
            }
        }

        impl $crate::event_sourcing::FromAttr for $ty {
            fn from_attr(
                value: $crate::event_sourcing::AttrValue,
            ) -> Result<Self, $crate::event_sourcing::AttributeError> {
                $crate::event_sourcing::reconstruct_object(value)
            }
        }
    };
}
