//! Length-prefixed value records and the two envelopes built on them.
//!
//! A record is `[u32 big-endian length][payload]` where the payload is one
//! value as produced by [`crate::mapper`]. A request is the concatenation of
//! one record per argument with no count; a reply is zero or one record.

use crate::{
    bus::{Bus, BusError, MessageCodec},
    error::CodecError,
    mapper,
    types::Value,
};
use std::sync::Arc;

const HEADER_LEN: usize = 4;

/// Appends one record holding `value` to `buf`.
pub fn encode_value(buf: &mut Vec<u8>, value: &Value) -> Result<(), CodecError> {
    let payload = mapper::to_bytes(value)?;
    let len = u32::try_from(payload.len()).map_err(|_| CodecError::TooLarge(payload.len()))?;
    buf.reserve(HEADER_LEN + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(())
}

/// Reads the record starting at `pos`, returning the value and the offset
/// immediately after its payload.
pub fn decode_value(buf: &[u8], pos: usize) -> Result<(Value, usize), CodecError> {
    let header = take(buf, pos, HEADER_LEN)?;
    let mut len = [0; HEADER_LEN];
    len.copy_from_slice(header);
    let len = u32::from_be_bytes(len) as usize;
    let payload_start = pos + HEADER_LEN;
    let payload = take(buf, payload_start, len)?;
    let value = mapper::from_bytes(payload)?;
    Ok((value, payload_start + len))
}

fn take(buf: &[u8], offset: usize, needed: usize) -> Result<&[u8], CodecError> {
    let available = buf.len().saturating_sub(offset);
    if available < needed {
        return Err(CodecError::Truncated {
            offset,
            needed,
            available,
        });
    }
    Ok(&buf[offset..offset + needed])
}

pub fn encode_list(values: &[Value]) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    for value in values {
        encode_value(&mut buf, value)?;
    }
    Ok(buf)
}

pub fn decode_list(buf: &[u8]) -> Result<Vec<Value>, CodecError> {
    let mut values = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (value, next) = decode_value(buf, pos)?;
        values.push(value);
        pos = next;
    }
    Ok(values)
}

/// A payload the bus can carry, identified on the bus by its tag.
pub trait Envelope: Sized {
    const TAG: &'static str;

    fn encode(&self) -> Result<Vec<u8>, CodecError>;
    fn decode(buf: &[u8]) -> Result<Self, CodecError>;
}

/// The ordered arguments of one call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestEnvelope {
    pub arguments: Vec<Value>,
}

impl RequestEnvelope {
    pub fn new(arguments: Vec<Value>) -> Self {
        Self { arguments }
    }
}

impl Envelope for RequestEnvelope {
    const TAG: &'static str = "busrpc.request";

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode_list(&self.arguments)
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        decode_list(buf).map(Self::new)
    }
}

/// The result of one call. `None` (no record) is distinct from
/// `Some(Value::Null)` (a record holding null).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplyEnvelope {
    pub value: Option<Value>,
}

impl ReplyEnvelope {
    pub fn empty() -> Self {
        Self { value: None }
    }

    pub fn with(value: Value) -> Self {
        Self { value: Some(value) }
    }
}

impl Envelope for ReplyEnvelope {
    const TAG: &'static str = "busrpc.reply";

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        if let Some(value) = &self.value {
            encode_value(&mut buf, value)?;
        }
        Ok(buf)
    }

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.is_empty() {
            return Ok(Self::empty());
        }
        let (value, end) = decode_value(buf, 0)?;
        if end != buf.len() {
            return Err(CodecError::TrailingBytes(buf.len() - end));
        }
        Ok(Self::with(value))
    }
}

struct RequestCodec;

impl MessageCodec for RequestCodec {
    fn type_tag(&self) -> &'static str {
        RequestEnvelope::TAG
    }

    fn name(&self) -> &'static str {
        "busrpc.length-prefixed-json.request"
    }
}

struct ReplyCodec;

impl MessageCodec for ReplyCodec {
    fn type_tag(&self) -> &'static str {
        ReplyEnvelope::TAG
    }

    fn name(&self) -> &'static str {
        "busrpc.length-prefixed-json.reply"
    }
}

/// Registers both envelope codecs. Safe to call any number of times on the
/// same bus; fails only if someone else claimed one of the tags.
pub fn register_envelope_codecs(bus: &dyn Bus) -> Result<(), BusError> {
    bus.register_default_codec(Arc::new(RequestCodec))?;
    bus.register_default_codec(Arc::new(ReplyCodec))?;
    Ok(())
}
