//! The calling side: turns a method call into a request, sends it over the
//! bus and turns the reply back into a typed result.

use crate::{
    bus::{Bus, Message},
    codec::{self, Envelope, ReplyEnvelope, RequestEnvelope},
    coerce::coerce,
    descriptor::{Arity, MethodDescriptor, ServiceDescriptor, DEFAULT_TIMEOUT},
    error::{CoercionError, ServiceError, ServiceResult},
    reply::Reply,
    types::Value,
};
use futures::future::BoxFuture;
use std::{future::IntoFuture, marker::PhantomData, sync::Arc, time::Duration};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Applies to methods declared without a timeout.
    pub default_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Dispatches calls for one interface.
#[derive(Clone)]
pub struct ServiceClient {
    bus: Arc<dyn Bus>,
    descriptor: Arc<ServiceDescriptor>,
    config: Arc<ClientConfig>,
}

impl ServiceClient {
    pub fn new(bus: Arc<dyn Bus>, descriptor: ServiceDescriptor) -> ServiceResult<Self> {
        Self::with_config(bus, descriptor, ClientConfig::default())
    }

    pub fn with_config(
        bus: Arc<dyn Bus>,
        descriptor: ServiceDescriptor,
        config: ClientConfig,
    ) -> ServiceResult<Self> {
        codec::register_envelope_codecs(bus.as_ref())?;
        Ok(Self {
            bus,
            descriptor: Arc::new(descriptor),
            config: Arc::new(config),
        })
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Prepares a call of `method`. Nothing is sent until the returned
    /// [`Call`] is awaited.
    pub fn call<R: Reply>(&self, method: &str, arguments: Vec<Value>) -> Call<R> {
        let prepared = self.prepare::<R>(method, arguments);
        Call {
            bus: Arc::clone(&self.bus),
            prepared,
            _reply: PhantomData,
        }
    }

    fn prepare<R: Reply>(&self, method: &str, arguments: Vec<Value>) -> ServiceResult<Prepared> {
        let descriptor = self.descriptor.method(method).ok_or_else(|| {
            ServiceError::Config(format!("{} has no method {method}", self.descriptor.name))
        })?;
        if descriptor.arity != R::ARITY {
            return Err(ServiceError::Config(format!(
                "{method} is declared {:?} but called as {:?}",
                descriptor.arity,
                R::ARITY
            )));
        }
        let body = RequestEnvelope::new(arguments)
            .encode()
            .map_err(CoercionError::from)?;
        Ok(Prepared {
            method: Arc::clone(descriptor),
            timeout: descriptor.timeout_or(self.config.default_timeout),
            body,
        })
    }
}

struct Prepared {
    method: Arc<MethodDescriptor>,
    timeout: Duration,
    body: Vec<u8>,
}

/// One cold call.
///
/// Holds the encoded request and does nothing until awaited. Awaiting
/// consumes the call, so each instance sends exactly one request.
#[must_use = "a call does nothing until awaited"]
pub struct Call<R> {
    bus: Arc<dyn Bus>,
    prepared: ServiceResult<Prepared>,
    _reply: PhantomData<fn() -> R>,
}

impl<R: Reply> Call<R> {
    async fn send(self) -> ServiceResult<R> {
        let Prepared {
            method,
            timeout,
            body,
        } = self.prepared?;

        debug!(address = %method.address, bytes = body.len(), "sending request");
        let request = Message::new(RequestEnvelope::TAG, body);
        let reply = self.bus.request(&method.address, request, timeout).await?;
        let reply = ReplyEnvelope::decode(&reply.body).map_err(CoercionError::from)?;
        trace!(address = %method.address, present = reply.value.is_some(), "reply received");

        Ok(complete::<R>(&method, reply)?)
    }
}

/// Applies the method's arity and result coercion to a decoded reply.
fn complete<R: Reply>(method: &MethodDescriptor, reply: ReplyEnvelope) -> Result<R, CoercionError> {
    let value = match (method.arity, &method.result) {
        (Arity::None, _) | (_, None) => None,
        (_, Some(result)) => reply.value.map(|v| coerce(v, result)).transpose()?,
    };
    R::from_value(value)
}

impl<R: Reply> IntoFuture for Call<R> {
    type Output = ServiceResult<R>;
    type IntoFuture = BoxFuture<'static, ServiceResult<R>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use uuid::Uuid;

    fn method<R: Reply>(params: Vec<Type>) -> MethodDescriptor {
        MethodDescriptor::new::<R>("Test", "m", params, None)
    }

    #[test]
    fn none_arity_never_looks_at_the_value() {
        let reply = ReplyEnvelope::with(Value::from("garbage"));
        complete::<()>(&method::<()>(vec![]), reply).unwrap();
    }

    #[test]
    fn optional_absent_is_no_value() {
        let got = complete::<Option<bool>>(&method::<Option<bool>>(vec![]), ReplyEnvelope::empty());
        assert_eq!(got.unwrap(), None);
    }

    #[test]
    fn exactly_one_null_is_a_coercion_failure() {
        let got = complete::<bool>(&method::<bool>(vec![]), ReplyEnvelope::with(Value::Null));
        assert!(matches!(got, Err(CoercionError::MissingValue)));
    }

    #[test]
    fn result_is_coerced() {
        let text = "123e4567-e89b-12d3-a456-426614174000";
        let got = complete::<Uuid>(&method::<Uuid>(vec![]), ReplyEnvelope::with(Value::from(text)));
        assert_eq!(got.unwrap(), Uuid::parse_str(text).unwrap());

        let got = complete::<Uuid>(
            &method::<Uuid>(vec![]),
            ReplyEnvelope::with(Value::from("not-a-uuid")),
        );
        assert!(matches!(got, Err(CoercionError::MalformedUuid(_))));
    }
}
