use crate::{
    error::{ServiceError, ServiceResult},
    reply::Reply,
    types::Type,
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc, time::Duration};

/// Timeout of a method that does not declare one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The bus address of one interface method.
///
/// Only the simple names take part, so two methods of the same name (or two
/// interfaces of the same name) share an address.
pub fn address(interface: &str, method: &str) -> String {
    format!("t_service_{interface}#{method}")
}

/// How many values a method's result carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Arity {
    /// Completes without a value.
    None,
    /// Zero or one value.
    Optional,
    /// Exactly one non-null value.
    ExactlyOne,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub address: String,
    pub arity: Arity,
    pub params: Vec<Type>,
    /// `None` exactly when the arity is [`Arity::None`].
    pub result: Option<Type>,
    /// `None` means the caller's default applies.
    pub timeout: Option<Duration>,
}

impl MethodDescriptor {
    pub fn new<R: Reply>(
        interface: &str,
        name: &str,
        params: Vec<Type>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            address: address(interface, name),
            arity: R::ARITY,
            params,
            result: R::result_type(),
            timeout,
        }
    }

    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }
}

/// The descriptor table of one interface. Built once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescriptor {
    pub name: String,
    methods: BTreeMap<String, Arc<MethodDescriptor>>,
}

impl ServiceDescriptor {
    pub fn new(name: &str, methods: Vec<MethodDescriptor>) -> ServiceResult<Self> {
        let mut table = BTreeMap::new();
        for method in methods {
            if table.contains_key(&method.name) {
                return Err(ServiceError::Config(format!(
                    "{name} declares {} more than once",
                    method.name
                )));
            }
            table.insert(method.name.clone(), Arc::new(method));
        }
        Ok(Self {
            name: name.to_owned(),
            methods: table,
        })
    }

    pub fn method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.methods.values()
    }
}
