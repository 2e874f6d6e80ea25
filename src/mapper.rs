//! The structured value mapper.
//!
//! Turns a [`Value`] into JSON bytes and JSON bytes back into a generic value
//! tree. Richer variants flatten on the way out (UUIDs become strings,
//! timestamps fractional epoch seconds, enums their variant name) and only
//! come back through [`crate::coerce`].

use crate::types::Value;
use chrono::{DateTime, Utc};
use serde::{
    de::{self, MapAccess, SeqAccess, Visitor},
    ser::{SerializeMap, SerializeSeq},
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::{collections::BTreeMap, fmt};

pub fn to_bytes(value: &Value) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Value> {
    serde_json::from_slice(bytes)
}

pub(crate) fn epoch_seconds(ts: &DateTime<Utc>) -> f64 {
    ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) / 1e9
}

/// Inverse of [`epoch_seconds`], flooring to whole seconds. `None` for
/// non-finite or out-of-range input.
pub(crate) fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let mut whole = secs.floor();
    let mut nanos = ((secs - whole) * 1e9).round();
    if nanos >= 1e9 {
        whole += 1.0;
        nanos = 0.0;
    }
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp(whole as i64, nanos as u32)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i32(*n),
            Value::Long(n) => serializer.serialize_i64(*n),
            // JSON has no NaN or infinity; serde_json writes them as null.
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::String(s) | Value::Enum(s) => serializer.serialize_str(s),
            Value::Uuid(id) => serializer.collect_str(&id.hyphenated()),
            Value::Timestamp(ts) => serializer.serialize_f64(epoch_seconds(ts)),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a structured value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Deserialize::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    // Width is not carried on the wire: any integer that fits 32 bits is an
    // `Int`, even one sent as a `Long`. Coercion widens it back.
    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Value, E> {
        Ok(match i32::try_from(n) {
            Ok(small) => Value::Int(small),
            Err(_) => Value::Long(n),
        })
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Value, E> {
        match i64::try_from(n) {
            Ok(n) => self.visit_i64(n),
            Err(_) => Ok(Value::Float(n as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, x: f64) -> Result<Value, E> {
        Ok(Value::Float(x))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::String(s.to_owned()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some((k, v)) = map.next_entry::<String, Value>()? {
            entries.insert(k, v);
        }
        Ok(Value::Map(entries))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn integers_split_on_32_bits() {
        assert_eq!(from_bytes(b"12").unwrap(), Value::Int(12));
        assert_eq!(from_bytes(b"-3").unwrap(), Value::Int(-3));
        assert_eq!(from_bytes(b"4294967296").unwrap(), Value::Long(1 << 32));
        assert_eq!(from_bytes(b"1.5").unwrap(), Value::Float(1.5));
    }

    #[test]
    fn rich_values_flatten() {
        let id = Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap();
        let bytes = to_bytes(&Value::Uuid(id)).unwrap();
        assert_eq!(bytes, br#""123e4567-e89b-12d3-a456-426614174000""#);

        let ts = DateTime::from_timestamp(1, 500_000_000).unwrap();
        assert_eq!(to_bytes(&Value::Timestamp(ts)).unwrap(), b"1.5");

        assert_eq!(to_bytes(&Value::Enum("Red".into())).unwrap(), br#""Red""#);
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(to_bytes(&Value::Float(f64::NAN)).unwrap(), b"null");
        let infinite = to_bytes(&Value::Float(f64::INFINITY)).unwrap();
        assert_eq!(from_bytes(&infinite).unwrap(), Value::Null);
        let long = to_bytes(&Value::Long(5)).unwrap();
        assert_eq!(from_bytes(&long).unwrap(), Value::Int(5));
    }

    #[test]
    fn nested_structures_survive() {
        let value = Value::Map(BTreeMap::from([
            ("a".to_owned(), Value::List(vec![Value::Bool(true), Value::Null])),
            ("b".to_owned(), Value::from("text")),
        ]));
        assert_eq!(from_bytes(&to_bytes(&value).unwrap()).unwrap(), value);
    }
}
