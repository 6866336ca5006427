//! Caller identity.
//!
//! The tenant identity scopes every read and filter of a tenant-keyed schema;
//! the user identity stamps CreatedBy/ModifiedBy columns.

use crate::value::Value;

/// Identity of the caller on whose behalf an operation runs.
pub trait UserContext {
    /// Tenant the caller belongs to, if the application is multi-tenant.
    fn tenant_id(&self) -> Option<Value>;

    /// Id of the calling user.
    fn user_id(&self) -> Option<Value>;
}

/// A plain caller identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Caller {
    tenant: Option<Value>,
    user: Option<Value>,
}

impl Caller {
    /// A caller with no identity at all.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A caller identified by user id.
    pub fn user(user: impl Into<Value>) -> Self {
        Self {
            tenant: None,
            user: Some(user.into()),
        }
    }

    /// Set the tenant.
    pub fn with_tenant(mut self, tenant: impl Into<Value>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

impl UserContext for Caller {
    fn tenant_id(&self) -> Option<Value> {
        self.tenant.clone()
    }

    fn user_id(&self) -> Option<Value> {
        self.user.clone()
    }
}
