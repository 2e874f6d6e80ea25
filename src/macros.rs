/// Declares a bus service interface.
///
/// ```ignore
/// service! {
///     pub trait MathService for MathServiceClient {
///         fn calculate_and(a: bool, b: bool) -> bool;
///         #[timeout(5)]
///         fn calculate_maybe(should_return: bool) -> Option<bool>;
///         fn calculate_completable() -> ();
///
///         #[local]
///         fn calculate_xor(&self, a: bool, b: bool) -> bool {
///             a != b
///         }
///     }
/// }
/// ```
///
/// Methods marked `#[local]` come after the remote ones. They become provided
/// trait methods and never reach the bus.
///
/// Expands to the async trait `MathService`, `impl Service for dyn
/// MathService` (descriptor and handler tables) and `MathServiceClient`, which
/// implements `MathService` by calling over the bus. The result shape picks
/// the arity: `()` none, `Option<T>` optional, anything else exactly one.
/// Methods are addressed by name alone, so they cannot be overloaded.
#[macro_export]
macro_rules! service {
    (@timeout) => {
        ::core::option::Option::None
    };
    (@timeout $secs:literal) => {
        ::core::option::Option::Some(::std::time::Duration::from_secs($secs))
    };
    (
        $(#[$attr:meta])*
        $vis:vis trait $service:ident for $client:ident {
            $(
                $(#[doc = $doc:literal])*
                $(#[timeout($secs:literal)])?
                fn $method:ident($($arg:ident : $arg_ty:ty),* $(,)?) -> $ret:ty;
            )*
            $(
                #[local]
                $(#[doc = $local_doc:literal])*
                fn $local:ident(& $self:ident $(, $local_arg:ident : $local_arg_ty:ty)* $(,)?) -> $local_ret:ty
                $local_body:block
            )*
        }
    ) => {
        $(#[$attr])*
        #[$crate::async_trait]
        $vis trait $service: ::core::marker::Send + ::core::marker::Sync + 'static {
            $(
                $(#[doc = $doc])*
                async fn $method(&self, $($arg: $arg_ty),*) -> $crate::ServiceResult<$ret>;
            )*
            $(
                $(#[doc = $local_doc])*
                fn $local(&$self $(, $local_arg: $local_arg_ty)*) -> $local_ret $local_body
            )*
        }

        impl $crate::Service for dyn $service {
            fn descriptor() -> $crate::ServiceResult<$crate::ServiceDescriptor> {
                $crate::ServiceDescriptor::new(
                    ::core::stringify!($service),
                    ::std::vec![
                        $(
                            $crate::MethodDescriptor::new::<$ret>(
                                ::core::stringify!($service),
                                ::core::stringify!($method),
                                ::std::vec![$(<$arg_ty as $crate::Typed>::rpc_type()),*],
                                $crate::service!(@timeout $($secs)?),
                            )
                        ),*
                    ],
                )
            }

            fn handlers(
                service: ::std::sync::Arc<Self>,
            ) -> ::std::vec::Vec<(&'static str, $crate::MethodFn)> {
                ::std::vec![
                    $(
                        (::core::stringify!($method), {
                            let service = ::std::sync::Arc::clone(&service);
                            let invoke: $crate::MethodFn = ::std::sync::Arc::new(
                                move |args: ::std::vec::Vec<$crate::Value>| {
                                    let service = ::std::sync::Arc::clone(&service);
                                    ::std::boxed::Box::pin(async move {
                                        #[allow(unused_mut, unused_variables)]
                                        let mut args = args.into_iter();
                                        $(
                                            let $arg = $crate::server::take_arg::<$arg_ty>(
                                                &mut args,
                                                ::core::stringify!($arg),
                                            )?;
                                        )*
                                        let result = service.$method($($arg),*).await?;
                                        $crate::server::into_reply::<$ret>(result)
                                    })
                                        as $crate::BoxFuture<'static, $crate::ServiceResult<$crate::ReplyEnvelope>>
                                },
                            );
                            invoke
                        })
                    ),*
                ]
            }
        }

        /// Calls the service over the bus.
        #[derive(Clone)]
        $vis struct $client {
            inner: $crate::ServiceClient,
        }

        impl $client {
            pub fn new(
                bus: ::std::sync::Arc<dyn $crate::Bus>,
            ) -> $crate::ServiceResult<Self> {
                Self::with_config(bus, $crate::ClientConfig::default())
            }

            pub fn with_config(
                bus: ::std::sync::Arc<dyn $crate::Bus>,
                config: $crate::ClientConfig,
            ) -> $crate::ServiceResult<Self> {
                let descriptor = <dyn $service as $crate::Service>::descriptor()?;
                ::core::result::Result::Ok(Self {
                    inner: $crate::ServiceClient::with_config(bus, descriptor, config)?,
                })
            }

            /// The untyped dispatcher, for building cold calls directly.
            pub fn dispatcher(&self) -> &$crate::ServiceClient {
                &self.inner
            }
        }

        #[$crate::async_trait]
        impl $service for $client {
            $(
                async fn $method(&self, $($arg: $arg_ty),*) -> $crate::ServiceResult<$ret> {
                    self.inner
                        .call::<$ret>(
                            ::core::stringify!($method),
                            ::std::vec![$(<$arg_ty as $crate::Encode>::encode($arg)),*],
                        )
                        .await
                }
            )*
        }
    };
}

/// Declares a record type whose fields cross the bus by name.
///
/// ```ignore
/// record!(BooleanOperation { a: bool, b: Option<bool> });
/// ```
#[macro_export]
macro_rules! record {
    ($record:ident { $($field:ident : $field_ty:ty),* $(,)? }) => {
        impl $crate::Typed for $record {
            fn rpc_type() -> $crate::Type {
                $crate::Type::record(
                    ::core::stringify!($record),
                    ::std::vec![
                        $($crate::Field::new(
                            ::core::stringify!($field),
                            <$field_ty as $crate::Typed>::rpc_type(),
                        )),*
                    ],
                )
            }
        }

        impl $crate::Encode for $record {
            fn encode(val: Self) -> $crate::Value {
                let mut entries = ::std::collections::BTreeMap::new();
                $(
                    entries.insert(
                        ::std::string::String::from(::core::stringify!($field)),
                        <$field_ty as $crate::Encode>::encode(val.$field),
                    );
                )*
                $crate::Value::Map(entries)
            }
        }

        impl $crate::Decode for $record {
            fn decode(val: $crate::Value) -> ::core::result::Result<Self, $crate::TypeMismatch> {
                #[allow(unused_mut)]
                let mut entries = match val {
                    $crate::Value::Map(entries) => entries,
                    other => {
                        return ::core::result::Result::Err($crate::TypeMismatch::new(
                            other,
                            <Self as $crate::Typed>::rpc_type(),
                        ))
                    }
                };
                ::core::result::Result::Ok(Self {
                    $(
                        $field: <$field_ty as $crate::Decode>::decode(
                            entries
                                .remove(::core::stringify!($field))
                                .unwrap_or($crate::Value::Null),
                        )?,
                    )*
                })
            }
        }

        $crate::__impl_single_reply!($record);
    };
}

/// Declares an enum-like type matched by exact variant name.
///
/// ```ignore
/// enumeration!(Color { Red, Green, Blue });
/// ```
#[macro_export]
macro_rules! enumeration {
    ($enum:ident { $($variant:ident),* $(,)? }) => {
        impl $crate::Typed for $enum {
            fn rpc_type() -> $crate::Type {
                $crate::Type::enumeration(
                    ::core::stringify!($enum),
                    [$(::core::stringify!($variant)),*],
                )
            }
        }

        impl $crate::Encode for $enum {
            fn encode(val: Self) -> $crate::Value {
                let name = match val {
                    $($enum::$variant => ::core::stringify!($variant)),*
                };
                $crate::Value::Enum(::std::string::String::from(name))
            }
        }

        impl $crate::Decode for $enum {
            fn decode(val: $crate::Value) -> ::core::result::Result<Self, $crate::TypeMismatch> {
                if let $crate::Value::Enum(name) | $crate::Value::String(name) = &val {
                    $(
                        if name == ::core::stringify!($variant) {
                            return ::core::result::Result::Ok($enum::$variant);
                        }
                    )*
                }
                ::core::result::Result::Err($crate::TypeMismatch::new(
                    val,
                    <Self as $crate::Typed>::rpc_type(),
                ))
            }
        }

        $crate::__impl_single_reply!($enum);
    };
}
