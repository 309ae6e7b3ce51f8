// handlers/protected/mod.rs - endpoints behind JWT and tenant validation
//
// Every handler here receives a `TenantAccess` extension and performs its
// permission check inside the same scoped transaction as its business query.

pub mod auth;
pub mod products;
