use std::sync::Arc;

use depot_core::{AuditStore, Config, Driver, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    audit_store: Arc<dyn AuditStore>,
    driver: Arc<Driver>,
}

impl AppState {
    pub fn new(config: Config, audit_store: Arc<dyn AuditStore>, driver: Arc<Driver>) -> Self {
        Self {
            config,
            audit_store,
            driver,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn driver(&self) -> &Driver {
        self.driver.as_ref()
    }
}
