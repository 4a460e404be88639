//! Storage contracts and built-in store implementations for encrypted records.
//!
//! Stores only ever see [`StoredCredential`] and [`StoredSettings`]; the secret
//! fields of both hold ciphertext produced by an [`crate::crypto::Encryptor`].

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{TenantId, UserKey},
};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for per-user OAuth credentials.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Persists a new record; fails with [`StoreError::Conflict`] when the key exists.
	fn insert(&self, record: StoredCredential) -> StoreFuture<'_, ()>;

	/// Fetches the record for `id`, if present.
	fn fetch<'a>(&'a self, id: &'a UserKey) -> StoreFuture<'a, Option<StoredCredential>>;

	/// Persists or replaces the record for `record.id`.
	fn upsert(&self, record: StoredCredential) -> StoreFuture<'_, ()>;

	/// Removes the record for `id`; fails with [`StoreError::NotFound`] when absent.
	fn delete<'a>(&'a self, id: &'a UserKey) -> StoreFuture<'a, ()>;
}

/// Persistence contract for per-tenant document server settings.
pub trait SettingsStore
where
	Self: Send + Sync,
{
	/// Persists a new record; fails with [`StoreError::Conflict`] when the tenant exists.
	fn insert(&self, record: StoredSettings) -> StoreFuture<'_, ()>;

	/// Fetches the record for `tenant`, if present.
	fn fetch<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<StoredSettings>>;

	/// Persists or replaces the record for `record.tenant`.
	fn upsert(&self, record: StoredSettings) -> StoreFuture<'_, ()>;

	/// Removes the record for `tenant`; fails with [`StoreError::NotFound`] when absent.
	fn delete<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, ()>;
}

/// Credential record as persisted; both tokens are ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
	/// Composite user key.
	pub id: UserKey,
	/// Encrypted access token.
	pub access_token: String,
	/// Encrypted refresh token.
	pub refresh_token: String,
	/// Token type reported by the provider.
	pub token_type: String,
	/// Granted scope string.
	pub scope: String,
	/// Base URL of the tenant's CRM API.
	pub api_domain: String,
	/// Access token expiry.
	pub expires_at: OffsetDateTime,
}

/// Settings record as persisted; the signing secret is ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSettings {
	/// Tenant the settings belong to.
	pub tenant: TenantId,
	/// Normalized document server address.
	pub address: Option<String>,
	/// Encrypted document server signing secret.
	pub secret: Option<String>,
	/// Authorization header name expected by the document server.
	pub header: Option<String>,
	/// Whether the tenant opted into the demo trial.
	pub demo_enabled: bool,
	/// First instant the demo trial was activated.
	pub demo_started: Option<OffsetDateTime>,
}

/// Error type produced by store implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// No record exists for the key.
	#[error("Record `{key}` was not found.")]
	NotFound {
		/// Key that was looked up.
		key: String,
	},
	/// A record already exists for the key.
	#[error("Record `{key}` already exists.")]
	Conflict {
		/// Conflicting key.
		key: String,
	},
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	/// Converts the store error into a crate error, naming missing records as `entity`.
	pub fn into_error(self, entity: &'static str) -> Error {
		match self {
			Self::NotFound { key } => Error::NotFound { entity, id: key },
			Self::Conflict { key } =>
				Error::validation("id", format!("{entity} `{key}` already exists")),
			other => Error::Storage(other),
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as _;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("database unreachable"));

		let source =
			error.source().expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn missing_records_become_typed_not_found() {
		let error = StoreError::NotFound { key: "42@7700".into() }.into_error("credential");

		assert!(matches!(error, Error::NotFound { entity: "credential", ref id } if id == "42@7700"));

		let error = StoreError::Conflict { key: "7700".into() }.into_error("settings");

		assert!(matches!(error, Error::Validation { .. }));
	}
}
