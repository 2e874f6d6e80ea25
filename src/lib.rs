//! Typed service interfaces over an asynchronous message bus.
//!
//! Declare an interface with [`service!`], serve an implementation with
//! [`ServiceServer::bind`] and call it through the generated client. Values
//! cross the bus as length-prefixed JSON records and are coerced back into
//! the declared types on arrival.

pub mod bus;
pub mod client;
pub mod codec;
pub mod coerce;
pub mod descriptor;
pub mod error;
pub mod mapper;
pub mod reply;
pub mod server;
pub mod types;

mod macros;

#[doc(hidden)]
pub use async_trait::async_trait;
#[doc(hidden)]
pub use futures::future::BoxFuture;

pub use bus::{Bus, BusError, LocalBus};
pub use client::{Call, ClientConfig, ServiceClient};
pub use codec::{ReplyEnvelope, RequestEnvelope};
pub use descriptor::{Arity, MethodDescriptor, ServiceDescriptor, DEFAULT_TIMEOUT};
pub use error::{CodecError, CoercionError, ServiceError, ServiceResult};
pub use reply::Reply;
pub use server::{MethodFn, Service, ServiceServer};
pub use types::{Decode, Encode, Field, Type, TypeMismatch, Typed, Value};
