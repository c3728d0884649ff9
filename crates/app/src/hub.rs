//! Hub: turns a [`HubConfig`] into running services and wired connectors.
//!
//! Building is lenient. A service whose kind is unknown or whose options
//! are invalid is skipped, and so is every binding or sequence that needs
//! it; each problem is logged and kept in [`Hub::failures`]. The rest of the
//! house keeps working.

use std::collections::BTreeMap;
use std::sync::Arc;

use relayhub_kernel::{Connector, Sequencer, Value};

use crate::config::{BindingConfig, Direction, Endpoint, HubConfig, SequenceConfig};
use crate::error::ServiceError;
use crate::ports::Service;
use crate::registry::ServiceRegistry;

/// Running set of services, bindings and sequencers.
#[derive(Default)]
pub struct Hub {
    services: Vec<Arc<dyn Service>>,
    by_name: BTreeMap<String, Arc<dyn Service>>,
    /// Every connector of every wired endpoint, derivations included.
    connectors: Vec<Connector>,
    bindings: usize,
    sequencers: Vec<Sequencer>,
    failures: Vec<ServiceError>,
}

impl Hub {
    /// Build services, resolve endpoints and wire bindings and sequences.
    ///
    /// Nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn build(config: HubConfig, registry: &ServiceRegistry) -> Self {
        let mut hub = Self::default();

        for (name, service) in config.services {
            let kind = service.kind_or(&name).to_string();
            match registry.build(&kind, &name, Value::Object(service.options)) {
                Ok(built) => {
                    tracing::info!(service = %name, kind, "service created");
                    hub.by_name.insert(name, Arc::clone(&built));
                    hub.services.push(built);
                }
                Err(err) => hub.fail(&format!("service {name:?}"), err),
            }
        }

        for (index, binding) in config.bindings.iter().enumerate() {
            if let Err(err) = hub.bind(binding) {
                hub.fail(&format!("binding #{index}"), err);
            }
        }

        for (index, sequence) in config.sequences.iter().enumerate() {
            if let Err(err) = hub.sequence(sequence) {
                hub.fail(&format!("sequence #{index}"), err);
            }
        }

        hub
    }

    /// Start every service. A service failing to start is logged and the
    /// others still start.
    pub fn start(&self) {
        for service in &self.services {
            match service.start() {
                Ok(()) => tracing::info!(service = service.name(), "service started"),
                Err(err) => {
                    tracing::error!(service = service.name(), error = %err, "unable to start service");
                }
            }
        }
    }

    /// Stop every service, in reverse creation order.
    pub fn stop(&self) {
        for service in self.services.iter().rev() {
            tracing::info!(service = service.name(), "stopping service");
            service.stop();
        }
    }

    /// Look up a service by instance name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Arc<dyn Service>> {
        self.by_name.get(name)
    }

    /// Number of bindings successfully wired.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings
    }

    /// Sequencers successfully wired.
    #[must_use]
    pub fn sequencers(&self) -> &[Sequencer] {
        &self.sequencers
    }

    /// Problems met while building, in configuration order.
    #[must_use]
    pub fn failures(&self) -> &[ServiceError] {
        &self.failures
    }

    /// Resolve an endpoint: ask the service for the device, then apply the
    /// transforms in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unknown, the device spec is
    /// rejected or a transform cannot be built.
    pub fn resolve(&mut self, endpoint: &Endpoint) -> Result<Connector, ServiceError> {
        let service = self
            .by_name
            .get(&endpoint.service)
            .ok_or_else(|| ServiceError::UnknownService(endpoint.service.clone()))?;
        let mut connector = service.device(&endpoint.device)?;
        self.connectors.push(connector.clone());
        for spec in &endpoint.transforms {
            connector = connector.derive(&spec.to_transform()?)?;
            self.connectors.push(connector.clone());
        }
        Ok(connector)
    }

    fn bind(&mut self, binding: &BindingConfig) -> Result<(), ServiceError> {
        let source = self.resolve(&binding.source)?;
        let target = self.resolve(&binding.target)?;
        if let Some(name) = &binding.name {
            source.rename(name);
            target.rename(name);
        }

        let filter = binding.value_filter();
        source.bind_one_way(&target, filter.clone());
        if binding.direction == Direction::TwoWay {
            target.bind_one_way(&source, filter);
        }

        tracing::info!(
            source = %source.name(),
            target = %target.name(),
            direction = ?binding.direction,
            "binding created"
        );
        self.bindings += 1;
        Ok(())
    }

    fn sequence(&mut self, sequence: &SequenceConfig) -> Result<(), ServiceError> {
        let stages = sequence
            .stages
            .iter()
            .map(|stage| self.resolve(stage))
            .collect::<Result<Vec<_>, _>>()?;
        if let (Some(name), Some(terminal)) = (&sequence.name, stages.last()) {
            terminal.rename(name);
        }
        let sequencer = Sequencer::new(stages)?;
        tracing::info!(stages = sequencer.controllers().len(), "sequence created");
        self.sequencers.push(sequencer);
        Ok(())
    }

    fn fail(&mut self, what: &str, err: ServiceError) {
        tracing::error!(error = %err, "skipping misconfigured {what}");
        self.failures.push(err);
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("services", &self.by_name.keys().collect::<Vec<_>>())
            .field("bindings", &self.bindings)
            .field("sequencers", &self.sequencers.len())
            .field("failures", &self.failures.len())
            .finish_non_exhaustive()
    }
}
