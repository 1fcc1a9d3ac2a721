use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::event_sourcing::core::{AttrValue, NumericArray, ObjectValue, TranscodingError};

use super::json::ObjectJsonEncoder;
use super::registry::TopicResolver;

// ============================================================================
// Type Extensions - encode/decode hooks for non-native value kinds
// ============================================================================
//
// Each hook turns one value kind into a mapping keyed by a well-known marker
// and back. Hooks are tried in chain order and either handle the value or
// decline it; the base encoder/decoder never changes.
//
// ============================================================================

pub const DATETIME_MARKER: &str = "ISO8601_datetime";
pub const DATE_MARKER: &str = "ISO8601_date";
pub const NDARRAY_MARKER: &str = "__ndarray__";
pub const CLASS_MARKER: &str = "__class__";
pub const MODULE_MARKER: &str = "__module__";

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%z";
const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Result of offering a value to an encode hook.
#[derive(Debug)]
pub enum Encoded {
    Handled(Value),
    Declined,
}

/// Result of offering a decoded mapping to a decode hook. A declining hook
/// hands the mapping back untouched.
#[derive(Debug)]
pub enum Decoded {
    Handled(AttrValue),
    Declined(BTreeMap<String, AttrValue>),
}

/// Lookups available to decode hooks.
pub struct DecodeContext<'a> {
    pub resolver: &'a dyn TopicResolver,
}

pub trait TypeExtension: Send + Sync {
    fn name(&self) -> &'static str;

    /// Keys this hook uses as markers. No other mapping may use them.
    fn marker_keys(&self) -> &'static [&'static str];

    fn encode(&self, value: &AttrValue, encoder: &ObjectJsonEncoder) -> Result<Encoded, TranscodingError>;

    fn decode(
        &self,
        map: BTreeMap<String, AttrValue>,
        ctx: &DecodeContext<'_>,
    ) -> Result<Decoded, TranscodingError>;
}

fn marker_payload(map: &BTreeMap<String, AttrValue>, marker: &str) -> Result<String, TranscodingError> {
    match map.get(marker) {
        Some(AttrValue::Str(text)) => Ok(text.clone()),
        Some(other) => Err(TranscodingError::Decoding(format!(
            "'{}' must hold a string, found {}",
            marker,
            other.kind()
        ))),
        None => Err(TranscodingError::Decoding(format!("missing '{}'", marker))),
    }
}

fn single_marker(marker: &str, payload: String) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(marker.to_string(), Value::String(payload));
    Value::Object(map)
}

// ============================================================================
// Built-in Extensions
// ============================================================================

/// Timestamps with UTC offset, microsecond precision.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateTimeExtension;

impl DateTimeExtension {
    /// Offsets with a seconds part are written as `+HHMMSS`.
    pub fn format(value: &DateTime<FixedOffset>) -> String {
        let offset = value.offset().local_minus_utc();
        if offset % 60 == 0 {
            return value.format(DATETIME_FORMAT).to_string();
        }
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.unsigned_abs();
        format!(
            "{}{}{:02}{:02}{:02}",
            value.format(LOCAL_DATETIME_FORMAT),
            sign,
            abs / 3600,
            abs / 60 % 60,
            abs % 60
        )
    }

    /// Accepts the canonical form, RFC 3339, and offset-less timestamps
    /// (read as UTC).
    pub fn parse(text: &str) -> Result<DateTime<FixedOffset>, TranscodingError> {
        DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z")
            .or_else(|_| DateTime::parse_from_rfc3339(text))
            .or_else(|e| parse_seconds_offset(text).ok_or(e))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|naive| naive.and_utc().fixed_offset())
            })
            .map_err(|e| TranscodingError::Decoding(format!("invalid timestamp '{}': {}", text, e)))
    }
}

/// `<local>[+-]HHMMSS`, the form `format` uses for sub-minute offsets.
fn parse_seconds_offset(text: &str) -> Option<DateTime<FixedOffset>> {
    let split = text.len().checked_sub(7)?;
    let local = text.get(..split)?;
    let offset = text.get(split..)?;
    let sign = match offset.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits = &offset[1..];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    let seconds: i32 = digits[4..6].parse().ok()?;
    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60 + seconds))?;
    NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()?
        .and_local_timezone(offset)
        .single()
}

impl TypeExtension for DateTimeExtension {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn marker_keys(&self) -> &'static [&'static str] {
        &[DATETIME_MARKER]
    }

    fn encode(&self, value: &AttrValue, _encoder: &ObjectJsonEncoder) -> Result<Encoded, TranscodingError> {
        match value {
            AttrValue::DateTime(dt) => Ok(Encoded::Handled(single_marker(DATETIME_MARKER, Self::format(dt)))),
            _ => Ok(Encoded::Declined),
        }
    }

    fn decode(
        &self,
        map: BTreeMap<String, AttrValue>,
        _ctx: &DecodeContext<'_>,
    ) -> Result<Decoded, TranscodingError> {
        if !map.contains_key(DATETIME_MARKER) {
            return Ok(Decoded::Declined(map));
        }
        let text = marker_payload(&map, DATETIME_MARKER)?;
        Ok(Decoded::Handled(AttrValue::DateTime(Self::parse(&text)?)))
    }
}

/// Calendar dates.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateExtension;

impl TypeExtension for DateExtension {
    fn name(&self) -> &'static str {
        "date"
    }

    fn marker_keys(&self) -> &'static [&'static str] {
        &[DATE_MARKER]
    }

    fn encode(&self, value: &AttrValue, _encoder: &ObjectJsonEncoder) -> Result<Encoded, TranscodingError> {
        match value {
            AttrValue::Date(date) => Ok(Encoded::Handled(single_marker(
                DATE_MARKER,
                date.format(DATE_FORMAT).to_string(),
            ))),
            _ => Ok(Encoded::Declined),
        }
    }

    fn decode(
        &self,
        map: BTreeMap<String, AttrValue>,
        _ctx: &DecodeContext<'_>,
    ) -> Result<Decoded, TranscodingError> {
        if !map.contains_key(DATE_MARKER) {
            return Ok(Decoded::Declined(map));
        }
        let text = marker_payload(&map, DATE_MARKER)?;
        let date = NaiveDate::parse_from_str(&text, DATE_FORMAT)
            .map_err(|e| TranscodingError::Decoding(format!("invalid date '{}': {}", text, e)))?;
        Ok(Decoded::Handled(AttrValue::Date(date)))
    }
}

/// One-dimensional numeric arrays.
#[derive(Debug, Default, Clone, Copy)]
pub struct NdArrayExtension;

impl TypeExtension for NdArrayExtension {
    fn name(&self) -> &'static str {
        "ndarray"
    }

    fn marker_keys(&self) -> &'static [&'static str] {
        &[NDARRAY_MARKER]
    }

    fn encode(&self, value: &AttrValue, _encoder: &ObjectJsonEncoder) -> Result<Encoded, TranscodingError> {
        match value {
            AttrValue::Array(array) => Ok(Encoded::Handled(single_marker(NDARRAY_MARKER, array.to_wire()?))),
            _ => Ok(Encoded::Declined),
        }
    }

    fn decode(
        &self,
        map: BTreeMap<String, AttrValue>,
        _ctx: &DecodeContext<'_>,
    ) -> Result<Decoded, TranscodingError> {
        if !map.contains_key(NDARRAY_MARKER) {
            return Ok(Decoded::Declined(map));
        }
        let wire = marker_payload(&map, NDARRAY_MARKER)?;
        Ok(Decoded::Handled(AttrValue::Array(NumericArray::from_wire(&wire)?)))
    }
}

/// Fallback for arbitrary objects: type markers plus every attribute as a
/// sibling key of the same mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectExtension;

impl TypeExtension for ObjectExtension {
    fn name(&self) -> &'static str {
        "object"
    }

    fn marker_keys(&self) -> &'static [&'static str] {
        &[CLASS_MARKER, MODULE_MARKER]
    }

    fn encode(&self, value: &AttrValue, encoder: &ObjectJsonEncoder) -> Result<Encoded, TranscodingError> {
        let object = match value {
            AttrValue::Object(object) => object,
            _ => return Ok(Encoded::Declined),
        };

        let mut entries = BTreeMap::new();
        for (name, attr) in &object.attrs {
            encoder.check_reserved(name)?;
            entries.insert(name.clone(), encoder.encode_value(attr)?);
        }
        entries.insert(CLASS_MARKER.to_string(), Value::String(object.class.clone()));
        entries.insert(MODULE_MARKER.to_string(), Value::String(object.module.clone()));

        Ok(Encoded::Handled(Value::Object(entries.into_iter().collect())))
    }

    fn decode(
        &self,
        mut map: BTreeMap<String, AttrValue>,
        ctx: &DecodeContext<'_>,
    ) -> Result<Decoded, TranscodingError> {
        if !(map.contains_key(CLASS_MARKER) && map.contains_key(MODULE_MARKER)) {
            return Ok(Decoded::Declined(map));
        }
        let class = marker_payload(&map, CLASS_MARKER)?;
        let module = marker_payload(&map, MODULE_MARKER)?;
        map.remove(CLASS_MARKER);
        map.remove(MODULE_MARKER);

        ctx.resolver.resolve_class(&module, &class)?;

        Ok(Decoded::Handled(AttrValue::Object(ObjectValue {
            class,
            module,
            attrs: map,
        })))
    }
}

// ============================================================================
// Extension Chain
// ============================================================================

/// Ordered hooks; earlier entries take priority.
#[derive(Clone)]
pub struct ExtensionChain {
    extensions: Vec<Arc<dyn TypeExtension>>,
}

impl Default for ExtensionChain {
    /// Decode priority: ndarray, class + module, datetime, date.
    fn default() -> Self {
        Self {
            extensions: vec![
                Arc::new(NdArrayExtension),
                Arc::new(ObjectExtension),
                Arc::new(DateTimeExtension),
                Arc::new(DateExtension),
            ],
        }
    }
}

impl ExtensionChain {
    pub fn empty() -> Self {
        Self { extensions: Vec::new() }
    }

    /// Add a hook that runs before every hook already in the chain.
    pub fn prepend(&mut self, extension: Arc<dyn TypeExtension>) -> &mut Self {
        self.extensions.insert(0, extension);
        self
    }

    /// Add a hook that runs after every hook already in the chain.
    pub fn push(&mut self, extension: Arc<dyn TypeExtension>) -> &mut Self {
        self.extensions.push(extension);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extensions.iter().map(|ext| ext.name()).collect()
    }

    pub fn reserved_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extensions.iter().flat_map(|ext| ext.marker_keys().iter().copied())
    }

    pub fn encode(&self, value: &AttrValue, encoder: &ObjectJsonEncoder) -> Result<Value, TranscodingError> {
        for extension in &self.extensions {
            if let Encoded::Handled(encoded) = extension.encode(value, encoder)? {
                return Ok(encoded);
            }
        }
        Err(TranscodingError::Encoding(format!(
            "no extension can encode a {} value",
            value.kind()
        )))
    }

    /// Run a decoded mapping through the hooks; unmatched mappings stay maps.
    pub fn decode(
        &self,
        map: BTreeMap<String, AttrValue>,
        ctx: &DecodeContext<'_>,
    ) -> Result<AttrValue, TranscodingError> {
        let mut map = map;
        for extension in &self.extensions {
            match extension.decode(map, ctx)? {
                Decoded::Handled(value) => return Ok(value),
                Decoded::Declined(unchanged) => map = unchanged,
            }
        }
        Ok(AttrValue::Map(map))
    }
}

impl fmt::Debug for ExtensionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
