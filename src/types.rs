use crate::mapper;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::BTreeMap, error::Error, fmt};
use uuid::Uuid;

/// The declared shape of a parameter or result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Type {
    /// Anything; coercion never touches the value.
    Any,
    Nil,
    Bool,
    Int,
    Long,
    Float,
    String,
    Uuid,
    Timestamp,
    Enum { name: String, variants: Vec<String> },
    Record { name: String, fields: Vec<Field> },
    List(Box<Type>),
    Map,
    Optional(Box<Type>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// A field may be left out of a record unless its type rejects null.
    pub fn is_required(&self) -> bool {
        !matches!(self.ty, Type::Optional(_) | Type::Any | Type::Nil)
    }
}

impl Type {
    pub fn list(elem: Type) -> Self {
        Type::List(Box::new(elem))
    }

    pub fn optional(inner: Type) -> Self {
        Type::Optional(Box::new(inner))
    }

    pub fn enumeration<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Type::Enum {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn record(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Type::Record {
            name: name.into(),
            fields,
        }
    }

    fn name(&self) -> &str {
        match self {
            Type::Any => "Any",
            Type::Nil => "Nil",
            Type::Bool => "Bool",
            Type::Int => "Int",
            Type::Long => "Long",
            Type::Float => "Float",
            Type::String => "String",
            Type::Uuid => "Uuid",
            Type::Timestamp => "Timestamp",
            Type::Enum { name, .. } | Type::Record { name, .. } => name.as_str(),
            Type::List(_) => "List",
            Type::Map => "Map",
            Type::Optional(_) => "Optional",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            Type::List(inner) | Type::Optional(inner) => write!(f, "<{inner}>"),
            _ => Ok(()),
        }
    }
}

/// A value crossing the bus.
///
/// Generic decoding only ever produces `Null`, `Bool`, `Int`, `Long`, `Float`,
/// `String`, `List` and `Map`; the remaining variants are produced by coercion
/// against a declared [`Type`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Enum(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl<T: Encode> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Encode::encode(items)
    }
}

macro_rules! impl_value_from {
    ($($rust_type:ty),*) => {
        $(
            impl From<$rust_type> for Value {
                fn from(val: $rust_type) -> Self {
                    Encode::encode(val)
                }
            }
        )*
    };
}

impl_value_from!((), bool, i32, i64, f64, String, Uuid, DateTime<Utc>);

pub trait Typed {
    fn rpc_type() -> Type;
}

pub trait Encode {
    fn encode(val: Self) -> Value;
}

pub trait Decode: Sized {
    fn decode(val: Value) -> Result<Self, TypeMismatch>;
}

macro_rules! impl_encode_decode {
    ($rust_type:ty, $rpc_type:expr, $encode_name:pat => $encode_expr:expr, $($from_rpc_arm:tt)*) => {
        impl Typed for $rust_type {
            fn rpc_type() -> Type {
                $rpc_type
            }
        }

        impl Encode for $rust_type {
            fn encode($encode_name: $rust_type) -> Value {
                $encode_expr
            }
        }

        impl Decode for $rust_type {
            fn decode(val: Value) -> Result<Self, TypeMismatch> {
                Ok(match val {
                    $($from_rpc_arm)*,
                    _ => return Err(TypeMismatch::new(val, <Self as Typed>::rpc_type()))
                })
            }
        }
    };
}

impl_encode_decode!((), Type::Nil, () => Value::Null, Value::Null => ());
impl_encode_decode!(bool, Type::Bool, b => Value::Bool(b), Value::Bool(b) => b);
impl_encode_decode!(i32, Type::Int, n => Value::Int(n), Value::Int(n) => n);
impl_encode_decode!(i64, Type::Long, n => Value::Long(n), Value::Long(n) => n, Value::Int(n) => i64::from(n));
impl_encode_decode!(f64, Type::Float, x => Value::Float(x), Value::Float(x) => x, Value::Int(n) => f64::from(n));
impl_encode_decode!(String, Type::String, s => Value::String(s), Value::String(s) => s);
// Elements of lists and maps skip coercion, so the wire forms decode too.
impl_encode_decode!(Uuid, Type::Uuid, id => Value::Uuid(id),
    Value::Uuid(id) => id,
    Value::String(s) => match Uuid::parse_str(&s) {
        Ok(id) => id,
        Err(_) => return Err(TypeMismatch::new(Value::String(s), Type::Uuid)),
    }
);
impl_encode_decode!(DateTime<Utc>, Type::Timestamp, ts => Value::Timestamp(ts),
    Value::Timestamp(ts) => ts,
    Value::Float(secs) => match mapper::from_epoch_seconds(secs) {
        Some(ts) => ts,
        None => return Err(TypeMismatch::new(Value::Float(secs), Type::Timestamp)),
    }
);

impl Typed for Value {
    fn rpc_type() -> Type {
        Type::Any
    }
}

impl Encode for Value {
    fn encode(val: Self) -> Value {
        val
    }
}

impl Decode for Value {
    fn decode(val: Value) -> Result<Self, TypeMismatch> {
        Ok(val)
    }
}

impl<T: Typed> Typed for Vec<T> {
    fn rpc_type() -> Type {
        Type::list(T::rpc_type())
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(val: Self) -> Value {
        Value::List(val.into_iter().map(Encode::encode).collect())
    }
}

impl<T: Decode + Typed> Decode for Vec<T> {
    fn decode(val: Value) -> Result<Self, TypeMismatch> {
        match val {
            Value::List(items) => items.into_iter().map(T::decode).collect(),
            _ => Err(TypeMismatch::new(val, <Self as Typed>::rpc_type())),
        }
    }
}

impl<T: Typed> Typed for BTreeMap<String, T> {
    fn rpc_type() -> Type {
        Type::Map
    }
}

impl<T: Encode> Encode for BTreeMap<String, T> {
    fn encode(val: Self) -> Value {
        Value::Map(val.into_iter().map(|(k, v)| (k, Encode::encode(v))).collect())
    }
}

impl<T: Decode + Typed> Decode for BTreeMap<String, T> {
    fn decode(val: Value) -> Result<Self, TypeMismatch> {
        match val {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| T::decode(v).map(|v| (k, v)))
                .collect(),
            _ => Err(TypeMismatch::new(val, <Self as Typed>::rpc_type())),
        }
    }
}

impl<T: Typed> Typed for Option<T> {
    fn rpc_type() -> Type {
        Type::optional(T::rpc_type())
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(val: Self) -> Value {
        val.map_or(Value::Null, Encode::encode)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(val: Value) -> Result<Self, TypeMismatch> {
        match val {
            Value::Null => Ok(None),
            val => T::decode(val).map(Some),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeMismatch {
    value: Value,
    expected_type: Type,
}

impl TypeMismatch {
    pub fn new(value: Value, expected_type: Type) -> Self {
        Self {
            value,
            expected_type,
        }
    }

    pub fn expected_type(&self) -> &Type {
        &self.expected_type
    }
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Type error: {:?} :/: {}", self.value, self.expected_type)
    }
}

impl Error for TypeMismatch {}
