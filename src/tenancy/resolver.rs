use serde::Serialize;
use tracing::warn;

use super::error::TenancyError;
use super::schema_name::validate_tenant_id;
use crate::auth::SessionContext;
use crate::services::tenant_directory::TenantDirectory;

/// Outcome of resolving a session against the tenant directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum TenantAccess {
    /// Superadmin: shared schema only, no tenant scoping.
    SharedOnly,
    Tenant(ResolvedTenant),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTenant {
    pub tenant_id: String,
    pub slug: String,
}

impl TenantAccess {
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            TenantAccess::SharedOnly => None,
            TenantAccess::Tenant(t) => Some(&t.tenant_id),
        }
    }

    pub fn is_shared_only(&self) -> bool {
        matches!(self, TenantAccess::SharedOnly)
    }
}

/// Turn an authenticated session into the tenant it may act for.
///
/// Must run before anything that reads tenant data, including permission
/// loading.
pub async fn resolve_tenant(
    session: &SessionContext,
    directory: &dyn TenantDirectory,
) -> Result<TenantAccess, TenancyError> {
    if session.is_super_admin {
        return Ok(TenantAccess::SharedOnly);
    }

    let tenant_id = match session.tenant_id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => {
            warn!(
                target: "tenancy::security",
                user_id = %session.user_id,
                "session has no tenant context"
            );
            return Err(TenancyError::MissingTenantContext);
        }
    };

    validate_tenant_id(tenant_id)?;

    match directory.find_by_id(tenant_id).await? {
        Some(tenant) => Ok(TenantAccess::Tenant(ResolvedTenant {
            tenant_id: tenant.id,
            slug: tenant.slug,
        })),
        None => {
            warn!(
                user_id = %session.user_id,
                tenant_id = %tenant_id,
                "session tenant not found or inactive"
            );
            Err(TenancyError::TenantUnavailable)
        }
    }
}
