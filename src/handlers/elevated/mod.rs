// handlers/elevated/mod.rs - superadmin-only endpoints
//
// Sessions reaching these handlers resolve to `TenantAccess::SharedOnly` and
// may only touch the shared schema.

pub mod root;
