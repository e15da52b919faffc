// libs/auth-cell/src/services/mod.rs
pub mod access;
pub mod password;
pub mod reset;

pub use access::AccessControlService;
pub use password::PasswordSecurityService;
pub use reset::PasswordResetService;
