//! Cached, encrypted CRUD over per-tenant document server settings.

// self
use crate::{
	_prelude::*,
	auth::{Secret, TenantId},
	cache::SettingsCache,
	crypto::Encryptor,
	settings::Settings,
	store::{SettingsStore, StoredSettings},
};

const ENTITY: &str = "settings";

/// Settings service with a read-through TTL cache.
///
/// Every write goes to the store first and evicts the cache entry before
/// returning, so a read issued after a write never observes the old value.
pub struct SettingsService {
	store: Arc<dyn SettingsStore>,
	encryptor: Arc<dyn Encryptor>,
	cache: SettingsCache,
}
impl SettingsService {
	/// Creates a service whose cache entries live for `cache_ttl`.
	pub fn new(
		store: Arc<dyn SettingsStore>,
		encryptor: Arc<dyn Encryptor>,
		cache_ttl: StdDuration,
	) -> Self {
		Self { store, encryptor, cache: SettingsCache::new(cache_ttl) }
	}

	/// Validates, encrypts, and inserts settings for a new tenant.
	pub async fn create(&self, ctx: &Context, mut settings: Settings) -> Result<Settings> {
		settings.validate()?;

		if settings.demo_enabled && settings.demo_started.is_none() {
			settings.demo_started = Some(OffsetDateTime::now_utc());
		}

		let record = self.seal(&settings)?;

		tracing::debug!(tenant = %settings.tenant, "persisting settings");
		ctx.run(async { self.store.insert(record).await.map_err(|e| e.into_error(ENTITY)) })
			.await?;
		self.cache.evict(&settings.tenant);

		Ok(settings)
	}

	/// Returns the settings for `tenant`, serving from cache when possible.
	pub async fn get(&self, ctx: &Context, tenant: &str) -> Result<Settings> {
		let tenant = TenantId::new(tenant.trim())?;

		if let Some(record) = self.cache.get(&tenant) {
			tracing::debug!(tenant = %tenant, "settings cache hit");

			return self.open(record);
		}

		let ticket = self.cache.ticket();
		let record = ctx
			.run(async { self.store.fetch(&tenant).await.map_err(Error::from) })
			.await?
			.ok_or_else(|| Error::NotFound { entity: ENTITY, id: tenant.to_string() })?;
		let settings = self.open(record.clone())?;

		if !self.cache.put(record, ticket) {
			tracing::debug!(tenant = %tenant, "settings changed during read; skipping cache fill");
		}

		Ok(settings)
	}

	/// Validates, encrypts, and upserts settings, returning what was persisted.
	///
	/// The demo activation instant already on record is kept; it is stamped only when
	/// the demo is enabled and no instant exists yet.
	pub async fn update(&self, ctx: &Context, mut settings: Settings) -> Result<Settings> {
		settings.validate()?;

		let existing = ctx
			.run(async { self.store.fetch(&settings.tenant).await.map_err(Error::from) })
			.await?;

		settings.demo_started = existing
			.and_then(|record| record.demo_started)
			.or(settings.demo_started)
			.or_else(|| settings.demo_enabled.then(OffsetDateTime::now_utc));

		let record = self.seal(&settings)?;

		tracing::debug!(tenant = %settings.tenant, "updating settings");
		ctx.run(async { self.store.upsert(record).await.map_err(Error::from) }).await?;
		self.cache.evict(&settings.tenant);

		Ok(settings)
	}

	/// Removes the settings for `tenant`.
	pub async fn delete(&self, ctx: &Context, tenant: &str) -> Result<()> {
		let tenant = TenantId::new(tenant.trim())?;

		tracing::debug!(tenant = %tenant, "deleting settings");

		let result =
			ctx.run(async { self.store.delete(&tenant).await.map_err(|e| e.into_error(ENTITY)) }).await;

		self.cache.evict(&tenant);

		result
	}

	fn seal(&self, settings: &Settings) -> Result<StoredSettings> {
		let secret = match &settings.secret {
			Some(secret) => Some(self.encryptor.encrypt(secret.expose())?),
			None => None,
		};

		Ok(StoredSettings {
			tenant: settings.tenant.clone(),
			address: settings.address.clone(),
			secret,
			header: settings.header.clone(),
			demo_enabled: settings.demo_enabled,
			demo_started: settings.demo_started,
		})
	}

	fn open(&self, record: StoredSettings) -> Result<Settings> {
		let secret = match &record.secret {
			Some(sealed) => Some(Secret::new(self.encryptor.decrypt(sealed)?)),
			None => None,
		};

		Ok(Settings {
			tenant: record.tenant,
			address: record.address,
			secret,
			header: record.header,
			demo_enabled: record.demo_enabled,
			demo_started: record.demo_started,
		})
	}
}
impl Debug for SettingsService {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SettingsService").field("cached", &self.cache.len()).finish()
	}
}
