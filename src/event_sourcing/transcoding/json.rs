use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::event_sourcing::core::{AttrValue, Attributes, TranscodingError};

use super::extensions::{DecodeContext, ExtensionChain};
use super::registry::TopicResolver;

// ============================================================================
// Object JSON Encoder
// ============================================================================

/// Turns attribute maps into canonical JSON: keys sorted at every level, no
/// insignificant whitespace. Non-native kinds go through the extension chain.
#[derive(Clone)]
pub struct ObjectJsonEncoder {
    chain: Arc<ExtensionChain>,
    reserved: Arc<BTreeSet<&'static str>>,
}

impl ObjectJsonEncoder {
    pub fn new(chain: Arc<ExtensionChain>) -> Self {
        let reserved = chain.reserved_keys().collect();
        Self {
            chain,
            reserved: Arc::new(reserved),
        }
    }

    pub fn encode_attrs(&self, attrs: &Attributes) -> Result<String, TranscodingError> {
        let value = self.encode_map(attrs.as_map())?;
        serde_json::to_string(&value).map_err(|e| TranscodingError::Encoding(e.to_string()))
    }

    pub fn encode_value(&self, value: &AttrValue) -> Result<Value, TranscodingError> {
        match value {
            AttrValue::Null => Ok(Value::Null),
            AttrValue::Bool(b) => Ok(Value::Bool(*b)),
            AttrValue::Int(i) => Ok(Value::from(*i)),
            AttrValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| TranscodingError::Encoding(format!("{} has no JSON representation", f))),
            AttrValue::Str(s) => Ok(Value::String(s.clone())),
            AttrValue::List(items) => items
                .iter()
                .map(|item| self.encode_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            AttrValue::Map(entries) => self.encode_map(entries),
            other => self.chain.encode(other, self),
        }
    }

    pub fn encode_map(&self, entries: &BTreeMap<String, AttrValue>) -> Result<Value, TranscodingError> {
        let mut map = serde_json::Map::new();
        for (key, value) in entries {
            self.check_reserved(key)?;
            map.insert(key.clone(), self.encode_value(value)?);
        }
        Ok(Value::Object(map))
    }

    /// Marker keys may only be written by the extension that owns them.
    pub fn check_reserved(&self, key: &str) -> Result<(), TranscodingError> {
        if self.reserved.contains(key) {
            return Err(TranscodingError::Encoding(format!(
                "'{}' is a reserved marker key",
                key
            )));
        }
        Ok(())
    }
}

impl Default for ObjectJsonEncoder {
    fn default() -> Self {
        Self::new(Arc::new(ExtensionChain::default()))
    }
}

impl fmt::Debug for ObjectJsonEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectJsonEncoder")
            .field("chain", &self.chain)
            .finish()
    }
}

// ============================================================================
// Object JSON Decoder
// ============================================================================

/// Parses JSON back into attributes. Every decoded mapping, innermost first,
/// is offered to the extension chain.
#[derive(Clone)]
pub struct ObjectJsonDecoder {
    chain: Arc<ExtensionChain>,
    resolver: Arc<dyn TopicResolver>,
}

impl ObjectJsonDecoder {
    pub fn new(chain: Arc<ExtensionChain>, resolver: Arc<dyn TopicResolver>) -> Self {
        Self { chain, resolver }
    }

    /// The top level is always a plain attribute map; hooks never apply to it.
    pub fn decode_attrs(&self, text: &str) -> Result<Attributes, TranscodingError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => {
                let mut attrs = BTreeMap::new();
                for (key, value) in map {
                    attrs.insert(key, self.decode_value(value)?);
                }
                Ok(Attributes::from(attrs))
            }
            other => Err(TranscodingError::Decoding(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn decode_value(&self, value: Value) -> Result<AttrValue, TranscodingError> {
        match value {
            Value::Null => Ok(AttrValue::Null),
            Value::Bool(b) => Ok(AttrValue::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(AttrValue::Int(i)),
                None => n
                    .as_f64()
                    .map(AttrValue::Float)
                    .ok_or_else(|| TranscodingError::Decoding(format!("unrepresentable number {}", n))),
            },
            Value::String(s) => Ok(AttrValue::Str(s)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.decode_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(AttrValue::List),
            Value::Object(map) => {
                let mut entries = BTreeMap::new();
                for (key, value) in map {
                    entries.insert(key, self.decode_value(value)?);
                }
                let ctx = DecodeContext {
                    resolver: self.resolver.as_ref(),
                };
                self.chain.decode(entries, &ctx)
            }
        }
    }
}

impl fmt::Debug for ObjectJsonDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectJsonDecoder")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::{NumericArray, ObjectValue};
    use crate::event_sourcing::transcoding::extensions::{Decoded, Encoded, TypeExtension, NDARRAY_MARKER};
    use crate::event_sourcing::transcoding::registry::TypeRegistry;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    fn registry() -> Arc<dyn TopicResolver> {
        let mut builder = TypeRegistry::builder();
        builder.register_class("tests::geo", "Point").unwrap();
        builder.register_class("tests::geo", "Segment").unwrap();
        Arc::new(builder.build())
    }

    fn codec(chain: ExtensionChain) -> (ObjectJsonEncoder, ObjectJsonDecoder) {
        let chain = Arc::new(chain);
        (
            ObjectJsonEncoder::new(chain.clone()),
            ObjectJsonDecoder::new(chain, registry()),
        )
    }

    fn point(x: i64, y: i64) -> AttrValue {
        AttrValue::Object(ObjectValue::new(
            "tests::geo",
            "Point",
            Attributes::new().with("x", x).with("y", y),
        ))
    }

    #[test]
    fn test_canonical_output_is_sorted_and_compact() {
        let (encoder, _) = codec(ExtensionChain::default());
        let mut nested = BTreeMap::new();
        nested.insert("b".to_string(), AttrValue::Int(2));
        nested.insert("a".to_string(), AttrValue::Int(1));

        let attrs = Attributes::new()
            .with("zeta", true)
            .with("alpha", AttrValue::Map(nested))
            .with("mid", vec![1i64, 2]);

        assert_eq!(
            encoder.encode_attrs(&attrs).unwrap(),
            r#"{"alpha":{"a":1,"b":2},"mid":[1,2],"zeta":true}"#
        );
    }

    #[test]
    fn test_datetime_and_date_markers() {
        let (encoder, decoder) = codec(ExtensionChain::default());
        let when = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let attrs = Attributes::new().with("when", when).with("day", day);

        let json = encoder.encode_attrs(&attrs).unwrap();
        assert_eq!(
            json,
            r#"{"day":{"ISO8601_date":"2024-02-29"},"when":{"ISO8601_datetime":"2024-01-01T00:00:00.000000+0000"}}"#
        );
        assert_eq!(decoder.decode_attrs(&json).unwrap(), attrs);
    }

    #[test]
    fn test_object_attributes_are_flattened_beside_markers() {
        let (encoder, decoder) = codec(ExtensionChain::default());
        let attrs = Attributes::new().with("at", point(3, -4));

        let json = encoder.encode_attrs(&attrs).unwrap();
        assert_eq!(
            json,
            r#"{"at":{"__class__":"Point","__module__":"tests::geo","x":3,"y":-4}}"#
        );
        assert_eq!(decoder.decode_attrs(&json).unwrap(), attrs);
    }

    #[test]
    fn test_nested_objects_round_trip() {
        let (encoder, decoder) = codec(ExtensionChain::default());
        let segment = AttrValue::Object(ObjectValue::new(
            "tests::geo",
            "Segment",
            Attributes::new().with("from", point(0, 0)).with("to", point(1, 2)),
        ));
        let attrs = Attributes::new().with("path", segment);

        let json = encoder.encode_attrs(&attrs).unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"path":{"__class__":"Segment","__module__":"tests::geo","#,
                r#""from":{"__class__":"Point","__module__":"tests::geo","x":0,"y":0},"#,
                r#""to":{"__class__":"Point","__module__":"tests::geo","x":1,"y":2}}}"#
            )
        );
        assert_eq!(decoder.decode_attrs(&json).unwrap(), attrs);
    }

    #[test]
    fn test_unknown_class_fails_type_resolution() {
        let (_, decoder) = codec(ExtensionChain::default());
        let err = decoder
            .decode_attrs(r#"{"at":{"__class__":"Circle","__module__":"tests::geo","r":1}}"#)
            .unwrap_err();
        assert!(matches!(err, TranscodingError::TypeResolution(_)));
    }

    #[test]
    fn test_ndarray_wins_over_other_markers() {
        let (encoder, decoder) = codec(ExtensionChain::default());
        let array = NumericArray::F64(vec![1.5, -2.0]);
        let wire = match encoder.encode_value(&AttrValue::Array(array.clone())).unwrap() {
            Value::Object(map) => map[NDARRAY_MARKER].clone(),
            other => panic!("unexpected {:?}", other),
        };

        let mut crowded = serde_json::Map::new();
        crowded.insert(NDARRAY_MARKER.to_string(), wire);
        crowded.insert("ISO8601_date".to_string(), Value::String("2024-01-01".to_string()));
        let decoded = decoder.decode_value(Value::Object(crowded)).unwrap();
        assert_eq!(decoded, AttrValue::Array(array));
    }

    #[test]
    fn test_plain_maps_pass_through() {
        let (_, decoder) = codec(ExtensionChain::default());
        let attrs = decoder.decode_attrs(r#"{"meta":{"k":"v","n":[1,2.5,null]}}"#).unwrap();

        let mut expected = BTreeMap::new();
        expected.insert("k".to_string(), AttrValue::Str("v".to_string()));
        expected.insert(
            "n".to_string(),
            AttrValue::List(vec![AttrValue::Int(1), AttrValue::Float(2.5), AttrValue::Null]),
        );
        assert_eq!(attrs.get("meta"), Some(&AttrValue::Map(expected)));
    }

    #[test]
    fn test_reserved_keys_are_rejected() {
        let (encoder, _) = codec(ExtensionChain::default());

        let top = Attributes::new().with("__class__", "Evil");
        assert!(matches!(encoder.encode_attrs(&top), Err(TranscodingError::Encoding(_))));

        let mut nested = BTreeMap::new();
        nested.insert("ISO8601_date".to_string(), AttrValue::Str("2024-01-01".to_string()));
        let inner = Attributes::new().with("meta", AttrValue::Map(nested));
        assert!(matches!(encoder.encode_attrs(&inner), Err(TranscodingError::Encoding(_))));

        let object = AttrValue::Object(ObjectValue::new(
            "tests::geo",
            "Point",
            Attributes::new().with("__ndarray__", "x"),
        ));
        assert!(matches!(encoder.encode_value(&object), Err(TranscodingError::Encoding(_))));
    }

    #[test]
    fn test_non_finite_float_is_rejected() {
        let (encoder, _) = codec(ExtensionChain::default());
        let attrs = Attributes::new().with("ratio", f64::NAN);
        assert!(matches!(encoder.encode_attrs(&attrs), Err(TranscodingError::Encoding(_))));
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let (_, decoder) = codec(ExtensionChain::default());
        assert!(matches!(decoder.decode_attrs("[1,2]"), Err(TranscodingError::Decoding(_))));
        assert!(matches!(decoder.decode_attrs("{not json"), Err(TranscodingError::Decoding(_))));
    }

    #[test]
    fn test_empty_chain_cannot_encode_extension_kinds() {
        let (encoder, _) = codec(ExtensionChain::empty());
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = encoder.encode_attrs(&Attributes::new().with("day", day)).unwrap_err();
        assert!(matches!(err, TranscodingError::Encoding(_)));
    }

    /// Writes dates as day numbers under its own marker.
    struct EpochDayExtension;

    impl TypeExtension for EpochDayExtension {
        fn name(&self) -> &'static str {
            "epoch_day"
        }

        fn marker_keys(&self) -> &'static [&'static str] {
            &["__epoch_day__"]
        }

        fn encode(&self, value: &AttrValue, _encoder: &ObjectJsonEncoder) -> Result<Encoded, TranscodingError> {
            match value {
                AttrValue::Date(date) => {
                    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
                    let mut map = serde_json::Map::new();
                    map.insert("__epoch_day__".to_string(), Value::from((*date - epoch).num_days()));
                    Ok(Encoded::Handled(Value::Object(map)))
                }
                _ => Ok(Encoded::Declined),
            }
        }

        fn decode(
            &self,
            map: BTreeMap<String, AttrValue>,
            _ctx: &DecodeContext<'_>,
        ) -> Result<Decoded, TranscodingError> {
            match map.get("__epoch_day__") {
                Some(AttrValue::Int(days)) => {
                    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
                    Ok(Decoded::Handled(AttrValue::Date(epoch + chrono::Duration::days(*days))))
                }
                _ => Ok(Decoded::Declined(map)),
            }
        }
    }

    #[test]
    fn test_prepended_extension_takes_precedence() {
        let mut chain = ExtensionChain::default();
        chain.prepend(Arc::new(EpochDayExtension));
        assert_eq!(chain.names()[0], "epoch_day");

        let (encoder, decoder) = codec(chain);
        let day = NaiveDate::from_ymd_opt(1970, 1, 11).unwrap();
        let attrs = Attributes::new().with("day", day);

        let json = encoder.encode_attrs(&attrs).unwrap();
        assert_eq!(json, r#"{"day":{"__epoch_day__":10}}"#);
        assert_eq!(decoder.decode_attrs(&json).unwrap(), attrs);

        // Built-in markers still decode.
        let legacy = decoder.decode_attrs(r#"{"day":{"ISO8601_date":"1970-01-11"}}"#).unwrap();
        assert_eq!(legacy, attrs);
    }
}
