//! An in-process bus.
//!
//! One handler per address. Each request runs its handler on a spawned tokio
//! task, so a panicking handler becomes a recipient failure rather than
//! taking the caller down.

use super::{Bus, BusError, Failure, Handler, Message, MessageCodec, Registration};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::BoxFuture;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, trace};

#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    handlers: DashMap<String, Arc<dyn Handler>>,
    codecs: DashMap<&'static str, Arc<dyn MessageCodec>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_handler(&self, address: &str) -> bool {
        self.inner.handlers.contains_key(address)
    }

    fn check_codec(&self, message: &Message) -> Result<(), BusError> {
        if self.inner.codecs.contains_key(message.codec) {
            Ok(())
        } else {
            Err(BusError::NoCodec(message.codec.to_owned()))
        }
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn request(
        &self,
        address: &str,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, BusError> {
        self.check_codec(&message)?;
        let handler = self
            .inner
            .handlers
            .get(address)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BusError::NoHandlers(address.to_owned()))?;

        trace!(address, bytes = message.body.len(), "delivering request");
        let delivery = tokio::spawn(handler.handle(message));
        let reply = match tokio::time::timeout(timeout, delivery).await {
            Err(_) => return Err(BusError::Timeout(timeout)),
            Ok(Err(join_error)) => return Err(Failure::new(join_error.to_string()).into()),
            Ok(Ok(reply)) => reply?,
        };
        self.check_codec(&reply)?;
        Ok(reply)
    }

    async fn consumer(
        &self,
        address: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<Box<dyn Registration>, BusError> {
        match self.inner.handlers.entry(address.to_owned()) {
            Entry::Occupied(_) => return Err(BusError::AddressInUse(address.to_owned())),
            Entry::Vacant(slot) => {
                slot.insert(handler);
            }
        }
        debug!(address, "handler registered");
        Ok(Box::new(LocalRegistration {
            address: address.to_owned(),
            inner: Arc::clone(&self.inner),
        }))
    }

    fn register_default_codec(&self, codec: Arc<dyn MessageCodec>) -> Result<(), BusError> {
        match self.inner.codecs.entry(codec.type_tag()) {
            Entry::Occupied(existing) if existing.get().name() == codec.name() => Ok(()),
            Entry::Occupied(existing) => Err(BusError::CodecConflict {
                tag: codec.type_tag().to_owned(),
                existing: existing.get().name().to_owned(),
                attempted: codec.name().to_owned(),
            }),
            Entry::Vacant(slot) => {
                debug!(tag = codec.type_tag(), codec = codec.name(), "codec registered");
                slot.insert(codec);
                Ok(())
            }
        }
    }
}

struct LocalRegistration {
    address: String,
    inner: Arc<Inner>,
}

impl Registration for LocalRegistration {
    fn address(&self) -> &str {
        &self.address
    }

    fn unregister(self: Box<Self>) -> BoxFuture<'static, Result<(), BusError>> {
        let LocalRegistration { address, inner } = *self;
        Box::pin(async move {
            match inner.handlers.remove(&address) {
                Some(_) => {
                    debug!(address = %address, "handler unregistered");
                    Ok(())
                }
                None => Err(BusError::NoHandlers(address)),
            }
        })
    }
}

/// Adapts an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message, Failure>> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

struct HandlerFn<F>(F);

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message, Failure>> + Send + 'static,
{
    fn handle(&self, message: Message) -> BoxFuture<'static, Result<Message, Failure>> {
        Box::pin((self.0)(message))
    }
}
