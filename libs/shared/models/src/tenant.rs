use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resolved clinic scope for the current request. Every table carries a
/// `tenant_id` column and every query filters on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: Uuid,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid) -> Self {
        Self { tenant_id }
    }

    /// PostgREST filter fragment for tenant scoping.
    pub fn filter(&self) -> String {
        format!("tenant_id=eq.{}", self.tenant_id)
    }
}
