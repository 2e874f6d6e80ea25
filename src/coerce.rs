//! Converts generically decoded values into their declared types.
//!
//! The same rules apply to server-side arguments and client-side results.
//! Rules are tried in order; the first that matches the (value, target) pair
//! decides, and pairs no rule covers pass through untouched.

use crate::{
    error::CoercionError,
    mapper,
    types::{Field, Type, Value},
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

pub fn coerce(value: Value, target: &Type) -> Result<Value, CoercionError> {
    match (value, target) {
        (Value::Null, _) => Ok(Value::Null),
        (value, Type::Optional(inner)) => coerce(value, inner),
        (Value::String(s), Type::Enum { name, variants }) => {
            if variants.iter().any(|variant| *variant == s) {
                Ok(Value::Enum(s))
            } else {
                Err(CoercionError::UnknownVariant {
                    name: name.clone(),
                    value: s,
                })
            }
        }
        (Value::String(s), Type::Uuid) => match Uuid::parse_str(&s) {
            Ok(id) => Ok(Value::Uuid(id)),
            Err(_) => Err(CoercionError::MalformedUuid(s)),
        },
        (Value::Int(n), Type::Long) => Ok(Value::Long(i64::from(n))),
        (Value::Float(secs), Type::Timestamp) => timestamp_from_secs(secs).map(Value::Timestamp),
        (Value::Map(entries), Type::Record { name, fields }) => map_record(name, fields, entries),
        (Value::List(items), Type::List(elem)) => items
            .into_iter()
            .map(|item| match item {
                Value::Map(_) => coerce(item, elem),
                other => Ok(other),
            })
            .collect::<Result<_, _>>()
            .map(Value::List),
        (value, _) => Ok(value),
    }
}

fn timestamp_from_secs(secs: f64) -> Result<DateTime<Utc>, CoercionError> {
    if !secs.is_finite() {
        return Err(CoercionError::NonFiniteTimestamp(secs));
    }
    mapper::from_epoch_seconds(secs).ok_or(CoercionError::TimestampOutOfRange(secs))
}

fn map_record(
    name: &str,
    fields: &[Field],
    mut entries: BTreeMap<String, Value>,
) -> Result<Value, CoercionError> {
    for field in fields {
        match entries.remove(&field.name) {
            Some(value) => {
                let value = coerce(value, &field.ty)?;
                entries.insert(field.name.clone(), value);
            }
            None if field.is_required() => {
                return Err(CoercionError::MissingField {
                    record: name.to_owned(),
                    field: field.name.clone(),
                })
            }
            None => {}
        }
    }
    Ok(Value::Map(entries))
}
