//! # Bus capability
//!
//! The asynchronous request/reply transport services run over. The bus moves
//! opaque [`Message`]s between addresses; it knows nothing about envelopes,
//! arity or coercion.

pub mod local;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::{sync::Arc, time::Duration};
use thiserror::Error;

pub use local::LocalBus;

/// The single failure code replies fail with.
pub const FAILURE_CODE: i32 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Tag of the codec that produced `body`.
    pub codec: &'static str,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(codec: &'static str, body: Vec<u8>) -> Self {
        Self { codec, body }
    }
}

/// A failed reply, as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: i32,
    pub message: String,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: FAILURE_CODE,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no handlers for address {0}")]
    NoHandlers(String),

    #[error("timed out after {0:?} waiting for a reply")]
    Timeout(Duration),

    #[error("recipient failure ({code}): {message}")]
    Recipient { code: i32, message: String },

    #[error("no codec registered for {0}")]
    NoCodec(String),

    #[error("codec {existing} is already registered for {tag}, refusing {attempted}")]
    CodecConflict {
        tag: String,
        existing: String,
        attempted: String,
    },

    #[error("address {0} already has a handler")]
    AddressInUse(String),
}

impl From<Failure> for BusError {
    fn from(Failure { code, message }: Failure) -> Self {
        BusError::Recipient { code, message }
    }
}

/// Describes how one message type is carried. The bus only compares codecs
/// by name.
pub trait MessageCodec: Send + Sync + 'static {
    fn type_tag(&self) -> &'static str;
    fn name(&self) -> &'static str;
}

/// Receives the messages sent to one address and produces at most one reply
/// for each.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, message: Message) -> BoxFuture<'static, Result<Message, Failure>>;
}

/// A live handler binding.
pub trait Registration: Send + Sync {
    fn address(&self) -> &str;

    /// Resolves once the bus has confirmed the handler is gone.
    fn unregister(self: Box<Self>) -> BoxFuture<'static, Result<(), BusError>>;
}

#[async_trait]
pub trait Bus: Send + Sync + 'static {
    /// Sends `message` to the handler at `address` and waits for its reply.
    async fn request(
        &self,
        address: &str,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, BusError>;

    async fn consumer(
        &self,
        address: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<Box<dyn Registration>, BusError>;

    /// Idempotent for the same codec, an error for a different codec under
    /// an already registered tag.
    fn register_default_codec(&self, codec: Arc<dyn MessageCodec>) -> Result<(), BusError>;
}
