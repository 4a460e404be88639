//! Thread-safe in-memory store for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{TenantId, UserKey},
	store::{
		CredentialStore, SettingsStore, StoreError, StoreFuture, StoredCredential, StoredSettings,
	},
};

type CredentialMap = Arc<RwLock<HashMap<UserKey, StoredCredential>>>;
type SettingsMap = Arc<RwLock<HashMap<TenantId, StoredSettings>>>;

/// Storage backend that keeps credentials and settings in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	credentials: CredentialMap,
	settings: SettingsMap,
}
impl MemoryStore {
	/// Returns the number of stored credentials.
	pub fn credential_count(&self) -> usize {
		self.credentials.read().len()
	}

	/// Returns the number of stored settings records.
	pub fn settings_count(&self) -> usize {
		self.settings.read().len()
	}

	fn insert_now<K, V>(map: &RwLock<HashMap<K, V>>, key: K, value: V) -> Result<(), StoreError>
	where
		K: Eq + Hash + Display,
	{
		let mut guard = map.write();

		if guard.contains_key(&key) {
			return Err(StoreError::Conflict { key: key.to_string() });
		}

		guard.insert(key, value);

		Ok(())
	}

	fn delete_now<K, V>(map: &RwLock<HashMap<K, V>>, key: &K) -> Result<(), StoreError>
	where
		K: Eq + Hash + Display,
	{
		match map.write().remove(key) {
			Some(_) => Ok(()),
			None => Err(StoreError::NotFound { key: key.to_string() }),
		}
	}
}
impl CredentialStore for MemoryStore {
	fn insert(&self, record: StoredCredential) -> StoreFuture<'_, ()> {
		let map = self.credentials.clone();

		Box::pin(async move { Self::insert_now(&map, record.id.clone(), record) })
	}

	fn fetch<'a>(&'a self, id: &'a UserKey) -> StoreFuture<'a, Option<StoredCredential>> {
		let map = self.credentials.clone();

		Box::pin(async move { Ok(map.read().get(id).cloned()) })
	}

	fn upsert(&self, record: StoredCredential) -> StoreFuture<'_, ()> {
		let map = self.credentials.clone();

		Box::pin(async move {
			map.write().insert(record.id.clone(), record);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, id: &'a UserKey) -> StoreFuture<'a, ()> {
		let map = self.credentials.clone();

		Box::pin(async move { Self::delete_now(&map, id) })
	}
}
impl SettingsStore for MemoryStore {
	fn insert(&self, record: StoredSettings) -> StoreFuture<'_, ()> {
		let map = self.settings.clone();

		Box::pin(async move { Self::insert_now(&map, record.tenant.clone(), record) })
	}

	fn fetch<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<StoredSettings>> {
		let map = self.settings.clone();

		Box::pin(async move { Ok(map.read().get(tenant).cloned()) })
	}

	fn upsert(&self, record: StoredSettings) -> StoreFuture<'_, ()> {
		let map = self.settings.clone();

		Box::pin(async move {
			map.write().insert(record.tenant.clone(), record);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, ()> {
		let map = self.settings.clone();

		Box::pin(async move { Self::delete_now(&map, tenant) })
	}
}
