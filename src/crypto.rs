//! Symmetric encryption for persisted secrets and HS256 signing for editor payloads.

pub mod cipher;
pub mod signer;

pub use cipher::*;
pub use signer::*;
