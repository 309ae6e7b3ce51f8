use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the shared `tenants` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    /// Internal id; the tenant schema name is derived from it.
    pub id: String,
    pub slug: String,
    pub name: String,
    pub is_active: bool,
    /// Per-tenant connection string from the old one-database-per-tenant
    /// layout. Only the maintenance shims read it.
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
