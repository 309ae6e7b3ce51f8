pub mod login;

pub use login::session_login;
