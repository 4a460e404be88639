//! Persistence services that own encryption at the store boundary.

pub mod settings;
pub mod tokens;

pub use settings::SettingsService;
pub use tokens::TokenService;
