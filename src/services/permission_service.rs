use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

use crate::tenancy::ScopedTransaction;

/// Role and permission set of one user in one tenant.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserPermissions {
    pub role: Option<String>,
    pub permissions: BTreeSet<String>,
}

impl UserPermissions {
    /// Exact match, or `<resource>:*` granting every action on the resource.
    pub fn allows(&self, permission: &str) -> bool {
        if self.permissions.contains(permission) {
            return true;
        }
        match permission.split_once(':') {
            Some((resource, _)) => self.permissions.contains(&format!("{}:*", resource)),
            None => false,
        }
    }
}

/// Load roles and permissions through the caller's scoped transaction, so the
/// check and the operation it guards share one transaction. Inactive or
/// unknown users get an empty set.
pub async fn load_permissions(
    tx: &mut ScopedTransaction,
    user_id: Uuid,
) -> Result<UserPermissions, sqlx::Error> {
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1 AND is_active")
        .bind(user_id)
        .fetch_optional(tx.conn())
        .await?;

    let Some(role) = role else {
        return Ok(UserPermissions::default());
    };

    let permissions: Vec<String> =
        sqlx::query_scalar("SELECT permission FROM role_permissions WHERE role = $1")
            .bind(&role)
            .fetch_all(tx.conn())
            .await?;

    Ok(UserPermissions {
        role: Some(role),
        permissions: permissions.into_iter().collect(),
    })
}
