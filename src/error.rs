use crate::{bus::BusError, types::TypeMismatch};
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Every way a service call can fail.
///
/// On the wire all of these collapse into one generic failure carrying the
/// rendered message, so a caller sees `BadRequest` and `Application` raised by
/// the server as [`ServiceError::Transport`] wrapping a
/// [`BusError::Recipient`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("coercion failure: {0}")]
    Coercion(#[from] CoercionError),

    #[error("application failure: {0}")]
    Application(String),

    #[error("transport failure: {0}")]
    Transport(#[from] BusError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application(message.into())
    }
}

#[derive(Debug, Error)]
pub enum CoercionError {
    #[error("{value:?} is not a variant of enum {name}")]
    UnknownVariant { name: String, value: String },

    #[error("malformed UUID {0:?}")]
    MalformedUuid(String),

    #[error("timestamp {0} is not finite")]
    NonFiniteTimestamp(f64),

    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(f64),

    #[error("record {record} is missing required field {field}")]
    MissingField { record: String, field: String },

    #[error("required value missing")]
    MissingValue,

    #[error(transparent)]
    Mismatch(#[from] TypeMismatch),

    #[error("undecodable envelope: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("buffer truncated at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("{0} trailing bytes after the last record")]
    TrailingBytes(usize),

    #[error("payload of {0} bytes does not fit a 4 byte length header")]
    TooLarge(usize),

    #[error("payload: {0}")]
    Json(#[from] serde_json::Error),
}
