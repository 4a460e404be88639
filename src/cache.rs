//! Short-lived cache of sealed tenant settings with write-epoch protection.
//!
//! A reader that misses takes a [`CacheTicket`] before consulting the settings store
//! and hands it back to [`SettingsCache::put`]. Any eviction in between bumps the
//! epoch, so a record read before a concurrent write can never be cached after it.

// crates.io
use tokio::time::Instant;
// self
use crate::{_prelude::*, auth::TenantId, store::StoredSettings};

/// Epoch observed by a reader before it went to the settings store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheTicket(u64);

#[derive(Debug)]
struct CachedSettings {
	record: StoredSettings,
	expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
	entries: HashMap<TenantId, CachedSettings>,
	epoch: u64,
}

/// Per-tenant settings cache whose entries expire `ttl` after insertion.
#[derive(Debug)]
pub struct SettingsCache {
	state: RwLock<CacheState>,
	ttl: StdDuration,
}
impl SettingsCache {
	/// Creates an empty cache.
	pub fn new(ttl: StdDuration) -> Self {
		Self { state: Default::default(), ttl }
	}

	/// Returns the live record for `tenant`; expired records count as misses.
	pub fn get(&self, tenant: &TenantId) -> Option<StoredSettings> {
		let state = self.state.read();
		let cached = state.entries.get(tenant)?;

		(cached.expires_at > Instant::now()).then(|| cached.record.clone())
	}

	/// Captures the current write epoch ahead of a store read.
	pub fn ticket(&self) -> CacheTicket {
		CacheTicket(self.state.read().epoch)
	}

	/// Caches `record` unless an eviction happened since `ticket` was taken.
	///
	/// Returns `true` when the record was stored.
	pub fn put(&self, record: StoredSettings, ticket: CacheTicket) -> bool {
		let mut state = self.state.write();

		if state.epoch != ticket.0 {
			return false;
		}

		let now = Instant::now();
		// An unrepresentable deadline means the record would never expire; skip it.
		let Some(expires_at) = now.checked_add(self.ttl) else {
			return false;
		};

		state.entries.retain(|_, cached| cached.expires_at > now);
		state.entries.insert(record.tenant.clone(), CachedSettings { record, expires_at });

		true
	}

	/// Drops the record for `tenant` and invalidates every outstanding ticket.
	pub fn evict(&self, tenant: &TenantId) {
		let mut state = self.state.write();

		state.entries.remove(tenant);
		state.epoch = state.epoch.wrapping_add(1);
	}

	/// Returns the number of stored records, including expired ones not yet purged.
	pub fn len(&self) -> usize {
		self.state.read().entries.len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
