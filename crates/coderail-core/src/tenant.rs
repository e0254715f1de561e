//! Tenant directory
//!
//! Holds per-tenant configuration: resource limits, permission grants,
//! isolation level and compliance flags. Explicitly constructed and shared
//! behind an `Arc` — no global singleton. Removing a tenant never touches
//! the audit log; audit records outlive the tenant record.

use dashmap::DashMap;

use crate::error::{CoreError, Result};
use crate::types::{IsolationLevel, ResourceLimits, Tenant, TenantId};

/// Directory of registered tenants
pub struct TenantDirectory {
    tenants: DashMap<TenantId, Tenant>,
}

impl TenantDirectory {
    pub fn new() -> Self {
        Self {
            tenants: DashMap::new(),
        }
    }

    /// Register a new tenant; fails if the id is already taken
    pub fn register(&self, tenant: Tenant) -> Result<()> {
        if self.tenants.contains_key(&tenant.id) {
            return Err(CoreError::TenantAlreadyExists(tenant.id.to_string()));
        }
        tracing::info!("Tenant registered: {}", tenant.id);
        self.tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    /// Look up a tenant by id
    pub fn get(&self, id: &TenantId) -> Result<Tenant> {
        self.tenants
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| CoreError::TenantNotFound(id.to_string()))
    }

    /// Replace a tenant's resource limits (admin operation)
    pub fn update_limits(&self, id: &TenantId, limits: ResourceLimits) -> Result<()> {
        let mut entry = self
            .tenants
            .get_mut(id)
            .ok_or_else(|| CoreError::TenantNotFound(id.to_string()))?;
        entry.resource_limits = limits;
        tracing::info!("Tenant limits updated: {}", id);
        Ok(())
    }

    /// Change a tenant's isolation level (admin operation)
    pub fn update_isolation(&self, id: &TenantId, level: IsolationLevel) -> Result<()> {
        let mut entry = self
            .tenants
            .get_mut(id)
            .ok_or_else(|| CoreError::TenantNotFound(id.to_string()))?;
        entry.isolation_level = level;
        Ok(())
    }

    /// Remove a tenant record. Audit entries for the tenant are retained.
    pub fn remove(&self, id: &TenantId) -> Result<Tenant> {
        self.tenants
            .remove(id)
            .map(|(_, t)| t)
            .ok_or_else(|| CoreError::TenantNotFound(id.to_string()))
    }

    /// Whether a tenant holds a grant for `action` on `resource`
    pub fn has_permission(&self, id: &TenantId, resource: &str, action: &str) -> Result<bool> {
        Ok(self.get(id)?.has_permission(resource, action))
    }

    pub fn count(&self) -> usize {
        self.tenants.len()
    }

    pub fn list_ids(&self) -> Vec<TenantId> {
        self.tenants.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for TenantDirectory {
    fn default() -> Self {
        Self::new()
    }
}
