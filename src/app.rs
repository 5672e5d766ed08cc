//! Application wiring: catalog objects and service lifecycle.

use crate::config::AgentConfig;
use crate::error::Result;
use crate::object::{catalog, create_object_from_descriptor, put_catalog_data};
use crate::variant::Variant;
use tracing::{info, warn};

/// Owns what a configuration publishes to the catalog
pub struct Application {
    config: AgentConfig,
    published: Vec<String>,
    started: Vec<String>,
}

impl Application {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            published: Vec::new(),
            started: Vec::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Create and publish objects, then start services in order.
    /// On failure everything done so far is undone.
    pub fn start(&mut self) -> Result<()> {
        if let Err(e) = self.try_start() {
            self.shutdown();
            return Err(e);
        }
        info!(
            objects = self.published.len(),
            services = self.started.len(),
            "application started"
        );
        Ok(())
    }

    fn try_start(&mut self) -> Result<()> {
        for (name, descriptor) in self.config.object_descriptors()? {
            let object = create_object_from_descriptor(&descriptor).map_err(|e| e.context(format!("object <{name}>")))?;
            put_catalog_data(name.as_str(), object);
            self.published.push(name);
        }
        for name in self.config.services.clone() {
            let service = catalog::global()
                .query_service(&name)
                .map_err(|e| e.context(format!("service <{name}>")))?;
            service.start().map_err(|e| e.context(format!("service <{name}>")))?;
            info!(service = %name, "service started");
            self.started.push(name);
        }
        Ok(())
    }

    /// Shut services down in reverse order and withdraw published objects
    pub fn shutdown(&mut self) {
        while let Some(name) = self.started.pop() {
            match catalog::global().query_service(&name).and_then(|s| s.shutdown()) {
                Ok(()) => info!(service = %name, "service stopped"),
                Err(e) => warn!(service = %name, error = %e, "can't stop service"),
            }
        }
        for name in self.published.drain(..).rev() {
            put_catalog_data(name, Variant::Null);
        }
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        self.shutdown();
    }
}
