//! Explicit table of service factories.
//!
//! The composition root registers every adapter it links; nothing registers
//! itself implicitly.

use std::collections::BTreeMap;
use std::sync::Arc;

use relayhub_kernel::Value;

use crate::error::ServiceError;
use crate::ports::Service;

/// Builds a service instance from its name and options table.
pub type ServiceFactory =
    Arc<dyn Fn(&str, Value) -> Result<Arc<dyn Service>, ServiceError> + Send + Sync>;

/// Maps a service kind (`"mqtt"`, `"lutron"`, …) to its factory.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    factories: BTreeMap<String, ServiceFactory>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&str, Value) -> Result<Arc<dyn Service>, ServiceError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    /// Build a service instance named `name` of kind `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownKind`] if no factory is registered for
    /// `kind`, or whatever the factory returns.
    pub fn build(&self, kind: &str, name: &str, options: Value) -> Result<Arc<dyn Service>, ServiceError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ServiceError::UnknownKind(kind.to_string()))?;
        factory(name, options)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayhub_kernel::Connector;

    struct Dummy(String);

    impl Service for Dummy {
        fn name(&self) -> &str {
            &self.0
        }

        fn kind(&self) -> &'static str {
            "dummy"
        }

        fn device(&self, _spec: &Value) -> Result<Connector, ServiceError> {
            Ok(Connector::new("dummy"))
        }
    }

    fn dummy(name: &str, _options: Value) -> Result<Arc<dyn Service>, ServiceError> {
        Ok(Arc::new(Dummy(name.to_string())))
    }

    #[test]
    fn should_build_registered_kind() {
        let mut registry = ServiceRegistry::new();
        registry.register("dummy", dummy);

        let service = registry.build("dummy", "living-room", Value::Null).unwrap();
        assert_eq!(service.name(), "living-room");
        assert_eq!(service.kind(), "dummy");
    }

    #[test]
    fn should_reject_unknown_kind() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.build("zigbee", "z", Value::Null),
            Err(ServiceError::UnknownKind(kind)) if kind == "zigbee"
        ));
    }

    #[test]
    fn should_list_kinds_sorted() {
        let mut registry = ServiceRegistry::new();
        registry.register("shell", dummy).register("bond", dummy);
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["bond", "shell"]);
    }
}
