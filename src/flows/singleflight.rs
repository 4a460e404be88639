//! Request coalescing keyed by an arbitrary hashable key.

// crates.io
use async_lock::OnceCell;
// self
use crate::_prelude::*;

type Group<T> = Arc<OnceCell<T>>;

/// Collapses concurrent computations for the same key into one.
///
/// The first caller for a key runs its computation; callers arriving while it is in
/// flight wait for and clone the same output. The group is dropped from the table as
/// soon as its output is available, so a later call starts a fresh computation. If
/// the running caller is dropped mid-flight, one of the waiters takes over with its
/// own computation.
#[derive(Debug)]
pub struct SingleFlight<K, T> {
	groups: Mutex<HashMap<K, Group<T>>>,
}
impl<K, T> SingleFlight<K, T>
where
	K: Clone + Eq + Hash,
	T: Clone,
{
	/// Creates an empty group table.
	pub fn new() -> Self {
		Self { groups: Mutex::new(HashMap::new()) }
	}

	/// Runs `f` for `key` unless a computation for the same key is already in flight.
	pub async fn run<F, Fut>(&self, key: K, f: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let group = self.groups.lock().entry(key.clone()).or_default().clone();
		let output = group.get_or_init(f).await.clone();

		self.forget(&key, &group);

		output
	}

	/// Returns the number of keys with a computation in flight.
	pub fn in_flight(&self) -> usize {
		self.groups.lock().len()
	}

	fn forget(&self, key: &K, group: &Group<T>) {
		let mut groups = self.groups.lock();

		if groups.get(key).is_some_and(|current| Arc::ptr_eq(current, group)) {
			groups.remove(key);
		}
	}
}
impl<K, T> Default for SingleFlight<K, T>
where
	K: Clone + Eq + Hash,
	T: Clone,
{
	fn default() -> Self {
		Self::new()
	}
}
