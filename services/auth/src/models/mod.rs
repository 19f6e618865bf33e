//! Authentication service models

pub mod account;
pub mod requests;
pub mod role;
pub mod session;
pub mod user;

// Re-export for convenience
pub use account::{Account, NewAccount};
pub use role::Role;
pub use session::Session;
pub use user::{NewUser, UpdateUser, User};
