//! Result shapes and the arity they imply.
//!
//! `()` completes without a value, `Option<T>` carries zero or one value and
//! every other [`Typed`] result carries exactly one.

use crate::{
    descriptor::Arity,
    error::CoercionError,
    types::{Decode, Encode, Type, Typed, Value},
};
use std::collections::BTreeMap;

pub trait Reply: Sized + Send + 'static {
    const ARITY: Arity;

    /// The declared element type, absent for [`Arity::None`].
    fn result_type() -> Option<Type>;

    /// Builds the result from the (already coerced) reply value.
    fn from_value(value: Option<Value>) -> Result<Self, CoercionError>;

    fn into_value(self) -> Option<Value>;
}

/// Decodes an exactly-one result, rejecting an absent or null value.
pub fn single<T: Decode>(value: Option<Value>) -> Result<T, CoercionError> {
    match value {
        None | Some(Value::Null) => Err(CoercionError::MissingValue),
        Some(value) => Ok(T::decode(value)?),
    }
}

impl Reply for () {
    const ARITY: Arity = Arity::None;

    fn result_type() -> Option<Type> {
        None
    }

    fn from_value(_value: Option<Value>) -> Result<Self, CoercionError> {
        Ok(())
    }

    fn into_value(self) -> Option<Value> {
        None
    }
}

impl<T> Reply for Option<T>
where
    T: Typed + Encode + Decode + Send + 'static,
{
    const ARITY: Arity = Arity::Optional;

    fn result_type() -> Option<Type> {
        Some(T::rpc_type())
    }

    fn from_value(value: Option<Value>) -> Result<Self, CoercionError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(T::decode(value)?)),
        }
    }

    fn into_value(self) -> Option<Value> {
        self.map(Encode::encode)
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __impl_single_reply {
    ($($rust_type:ty),* $(,)?) => {
        $(
            impl $crate::Reply for $rust_type {
                const ARITY: $crate::Arity = $crate::Arity::ExactlyOne;

                fn result_type() -> ::core::option::Option<$crate::Type> {
                    ::core::option::Option::Some(<Self as $crate::Typed>::rpc_type())
                }

                fn from_value(
                    value: ::core::option::Option<$crate::Value>,
                ) -> ::core::result::Result<Self, $crate::CoercionError> {
                    $crate::reply::single(value)
                }

                fn into_value(self) -> ::core::option::Option<$crate::Value> {
                    ::core::option::Option::Some($crate::Encode::encode(self))
                }
            }
        )*
    };
}

crate::__impl_single_reply!(bool, i32, i64, f64, String, uuid::Uuid, chrono::DateTime<chrono::Utc>, Value);

impl<T> Reply for Vec<T>
where
    T: Typed + Encode + Decode + Send + 'static,
{
    const ARITY: Arity = Arity::ExactlyOne;

    fn result_type() -> Option<Type> {
        Some(<Self as Typed>::rpc_type())
    }

    fn from_value(value: Option<Value>) -> Result<Self, CoercionError> {
        single(value)
    }

    fn into_value(self) -> Option<Value> {
        Some(Encode::encode(self))
    }
}

impl<T> Reply for BTreeMap<String, T>
where
    T: Typed + Encode + Decode + Send + 'static,
{
    const ARITY: Arity = Arity::ExactlyOne;

    fn result_type() -> Option<Type> {
        Some(<Self as Typed>::rpc_type())
    }

    fn from_value(value: Option<Value>) -> Result<Self, CoercionError> {
        single(value)
    }

    fn into_value(self) -> Option<Value> {
        Some(Encode::encode(self))
    }
}
