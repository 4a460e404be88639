//! JSON-file-backed store for single-node deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{TenantId, UserKey},
	store::{
		CredentialStore, SettingsStore, StoreError, StoreFuture, StoredCredential, StoredSettings,
	},
};

#[derive(Debug, Default)]
struct Contents {
	credentials: HashMap<UserKey, StoredCredential>,
	settings: HashMap<TenantId, StoredSettings>,
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
	#[serde(default)]
	credentials: Vec<StoredCredential>,
	#[serde(default)]
	settings: Vec<StoredSettings>,
}

/// Persists every record to a JSON snapshot after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Contents>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;
		let contents = Contents {
			credentials: snapshot
				.credentials
				.into_iter()
				.map(|record| (record.id.clone(), record))
				.collect(),
			settings: snapshot
				.settings
				.into_iter()
				.map(|record| (record.tenant.clone(), record))
				.collect(),
		};

		Ok(Self { path, inner: Arc::new(RwLock::new(contents)) })
	}

	/// Returns the snapshot location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(Snapshot::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &Contents) -> Result<(), StoreError> {
		let snapshot = Snapshot {
			credentials: contents.credentials.values().cloned().collect(),
			settings: contents.settings.values().cloned().collect(),
		};
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn mutate<F>(&self, apply: F) -> Result<(), StoreError>
	where
		F: FnOnce(&mut Contents) -> Result<(), StoreError>,
	{
		let mut guard = self.inner.write();

		apply(&mut guard)?;
		self.persist_locked(&guard)
	}
}
impl CredentialStore for FileStore {
	fn insert(&self, record: StoredCredential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.mutate(|contents| {
				if contents.credentials.contains_key(&record.id) {
					return Err(StoreError::Conflict { key: record.id.to_string() });
				}

				contents.credentials.insert(record.id.clone(), record);

				Ok(())
			})
		})
	}

	fn fetch<'a>(&'a self, id: &'a UserKey) -> StoreFuture<'a, Option<StoredCredential>> {
		Box::pin(async move { Ok(self.inner.read().credentials.get(id).cloned()) })
	}

	fn upsert(&self, record: StoredCredential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.mutate(|contents| {
				contents.credentials.insert(record.id.clone(), record);

				Ok(())
			})
		})
	}

	fn delete<'a>(&'a self, id: &'a UserKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|contents| match contents.credentials.remove(id) {
				Some(_) => Ok(()),
				None => Err(StoreError::NotFound { key: id.to_string() }),
			})
		})
	}
}
impl SettingsStore for FileStore {
	fn insert(&self, record: StoredSettings) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.mutate(|contents| {
				if contents.settings.contains_key(&record.tenant) {
					return Err(StoreError::Conflict { key: record.tenant.to_string() });
				}

				contents.settings.insert(record.tenant.clone(), record);

				Ok(())
			})
		})
	}

	fn fetch<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, Option<StoredSettings>> {
		Box::pin(async move { Ok(self.inner.read().settings.get(tenant).cloned()) })
	}

	fn upsert(&self, record: StoredSettings) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.mutate(|contents| {
				contents.settings.insert(record.tenant.clone(), record);

				Ok(())
			})
		})
	}

	fn delete<'a>(&'a self, tenant: &'a TenantId) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|contents| match contents.settings.remove(tenant) {
				Some(_) => Ok(()),
				None => Err(StoreError::NotFound { key: tenant.to_string() }),
			})
		})
	}
}
