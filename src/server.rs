//! The serving side: binds one bus handler per interface method, coerces
//! incoming arguments, invokes the implementation and encodes its result.

use crate::{
    bus::{Bus, BusError, Failure, Handler, Message, Registration},
    codec::{self, Envelope, ReplyEnvelope, RequestEnvelope},
    coerce::coerce,
    descriptor::{Arity, MethodDescriptor, ServiceDescriptor},
    error::{CoercionError, ServiceError, ServiceResult},
    reply::Reply,
    types::{Decode, Value},
};
use futures::future::{join_all, BoxFuture};
use std::sync::Arc;
use tracing::{debug, warn};

/// A type-erased interface method: takes the coerced arguments in
/// declaration order and produces the reply.
pub type MethodFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, ServiceResult<ReplyEnvelope>> + Send + Sync>;

/// An interface that can be served and called over the bus.
///
/// Implemented by [`service!`](crate::service) for `dyn Trait`.
pub trait Service {
    fn descriptor() -> ServiceResult<ServiceDescriptor>;

    /// One entry per method, keyed by method name.
    fn handlers(service: Arc<Self>) -> Vec<(&'static str, MethodFn)>;
}

/// Takes the next argument and decodes it as `T`.
pub fn take_arg<T: Decode>(
    args: &mut impl Iterator<Item = Value>,
    name: &str,
) -> ServiceResult<T> {
    let value = args
        .next()
        .ok_or_else(|| ServiceError::BadRequest(format!("missing argument {name}")))?;
    Ok(T::decode(value).map_err(CoercionError::from)?)
}

/// Wraps an implementation's result according to its arity.
pub fn into_reply<R: Reply>(result: R) -> ServiceResult<ReplyEnvelope> {
    match (R::ARITY, result.into_value()) {
        (Arity::None, _) => Ok(ReplyEnvelope::empty()),
        (Arity::ExactlyOne, None | Some(Value::Null)) => Err(ServiceError::application(
            "implementation produced no value",
        )),
        (_, value) => Ok(ReplyEnvelope { value }),
    }
}

struct MethodHandler {
    method: Arc<MethodDescriptor>,
    invoke: MethodFn,
}

impl MethodHandler {
    fn prepare(
        &self,
        message: &Message,
    ) -> ServiceResult<BoxFuture<'static, ServiceResult<ReplyEnvelope>>> {
        let request = RequestEnvelope::decode(&message.body)
            .map_err(|e| ServiceError::BadRequest(e.to_string()))?;
        let expected = self.method.params.len();
        if request.arguments.len() != expected {
            return Err(ServiceError::BadRequest(format!(
                "{} expects {expected} arguments, got {}",
                self.method.name,
                request.arguments.len()
            )));
        }
        let arguments = request
            .arguments
            .into_iter()
            .zip(&self.method.params)
            .map(|(arg, ty)| coerce(arg, ty))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((self.invoke)(arguments))
    }
}

impl Handler for MethodHandler {
    fn handle(&self, message: Message) -> BoxFuture<'static, Result<Message, Failure>> {
        let address = self.method.address.clone();
        let invocation = self.prepare(&message);
        Box::pin(async move {
            let reply = match invocation {
                Ok(pending) => pending.await,
                Err(err) => Err(err),
            };
            let body = reply.and_then(|reply| Ok(reply.encode().map_err(CoercionError::from)?));
            match body {
                Ok(body) => Ok(Message::new(ReplyEnvelope::TAG, body)),
                Err(err) => {
                    debug!(address = %address, error = %err, "request failed");
                    Err(Failure::new(err.to_string()))
                }
            }
        })
    }
}

/// Serves one interface implementation until closed.
pub struct ServiceServer {
    name: String,
    registrations: Vec<Box<dyn Registration>>,
}

impl ServiceServer {
    /// Registers a handler for every method of `S`.
    pub async fn bind<S>(bus: Arc<dyn Bus>, service: Arc<S>) -> ServiceResult<Self>
    where
        S: Service + ?Sized,
    {
        codec::register_envelope_codecs(bus.as_ref())?;
        let descriptor = S::descriptor()?;
        let mut server = ServiceServer {
            name: descriptor.name.clone(),
            registrations: Vec::new(),
        };

        for (name, invoke) in S::handlers(service) {
            let Some(method) = descriptor.method(name).cloned() else {
                server.abandon().await;
                return Err(ServiceError::Config(format!(
                    "{} has no descriptor for {name}",
                    descriptor.name
                )));
            };
            let address = method.address.clone();
            let handler = Arc::new(MethodHandler {
                method: Arc::clone(&method),
                invoke,
            });
            match bus.consumer(&address, handler).await {
                Ok(registration) => {
                    debug!(address = %address, arity = ?method.arity, "method bound");
                    server.registrations.push(registration);
                }
                Err(err) => {
                    server.abandon().await;
                    return Err(err.into());
                }
            }
        }
        Ok(server)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.registrations.iter().map(|r| r.address())
    }

    /// Unregisters every handler. Completes only after the bus confirmed
    /// each one, reporting the first failure.
    pub async fn close(mut self) -> Result<(), BusError> {
        let registrations = std::mem::take(&mut self.registrations);
        let count = registrations.len();
        let results = join_all(registrations.into_iter().map(|r| r.unregister())).await;
        debug!(service = %self.name, handlers = count, "server closed");
        results.into_iter().collect()
    }

    async fn abandon(self) {
        let name = self.name.clone();
        if let Err(err) = self.close().await {
            warn!(service = %name, error = %err, "failed to unwind partial bind");
        }
    }
}

impl Drop for ServiceServer {
    fn drop(&mut self) {
        if !self.registrations.is_empty() {
            warn!(
                service = %self.name,
                handlers = self.registrations.len(),
                "server dropped without close, handlers stay registered"
            );
        }
    }
}
