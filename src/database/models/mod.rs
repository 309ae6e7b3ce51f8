pub mod product;
pub mod tenant;
pub mod user;

pub use product::Product;
pub use tenant::Tenant;
pub use user::User;
