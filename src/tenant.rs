use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::engine::Engine;
use crate::limits::*;
use crate::model::PaymentPolicy;
use crate::notify::NotifyHub;

/// Manages per-tenant engines. Each tenant gets its own marketplace + notify hub.
/// Tenant = database name from the pgwire connection.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    payment_policy: PaymentPolicy,
}

impl TenantManager {
    pub fn new(payment_policy: PaymentPolicy) -> Self {
        Self {
            engines: DashMap::new(),
            payment_policy,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Two connections racing on a new tenant must end up sharing one engine.
        let engine = self
            .engines
            .entry(tenant.to_string())
            .or_insert_with(|| {
                info!("creating marketplace for tenant {tenant}");
                let notify = Arc::new(NotifyHub::new());
                Arc::new(Engine::new(self.payment_policy, notify))
            })
            .value()
            .clone();
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}
