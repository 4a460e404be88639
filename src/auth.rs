//! Identifiers, secrets, and credential models for CRM users.

pub mod credential;
pub mod id;
pub mod secret;

pub use credential::*;
pub use id::*;
pub use secret::*;
