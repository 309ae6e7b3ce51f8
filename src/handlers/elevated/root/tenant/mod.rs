pub mod list;

pub use list::tenant_list;
