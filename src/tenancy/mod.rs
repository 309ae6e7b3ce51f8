//! Schema-per-tenant isolation.
//!
//! A session is resolved to a tenant ([`resolver`]), the tenant id becomes a
//! validated schema name ([`schema_name`]), and all tenant work runs inside a
//! transaction whose search path is pinned to that schema ([`executor`]).

pub mod error;
pub mod executor;
pub mod resolver;
pub mod schema_name;

pub use error::TenancyError;
pub use executor::{PgScopedExecutor, ScopedTransaction, TenantScope};
pub use resolver::{resolve_tenant, ResolvedTenant, TenantAccess};
pub use schema_name::{validate_tenant_id, SchemaName, ScopePath};
