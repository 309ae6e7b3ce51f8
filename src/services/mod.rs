pub mod permission_service;
pub mod tenant_directory;

pub use permission_service::{load_permissions, UserPermissions};
pub use tenant_directory::{PgTenantDirectory, TenantDirectory};
