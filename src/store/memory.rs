//! Thread-safe in-memory [`KvStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{KvStore, StoreError, StoreFuture, StoredEntry},
};

type StoreMap = Arc<RwLock<HashMap<String, StoredEntry>>>;

/// Thread-safe storage backend that keeps entries in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns the number of live entries.
	pub fn len(&self) -> usize {
		let now = OffsetDateTime::now_utc();

		self.0.read().values().filter(|entry| entry.is_live_at(now)).count()
	}

	/// Returns `true` when no live entries remain.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn get_now(map: &StoreMap, key: &str) -> Option<Value> {
		let now = OffsetDateTime::now_utc();

		map.read().get(key).filter(|entry| entry.is_live_at(now)).map(|entry| entry.value.clone())
	}

	fn set_now(map: &StoreMap, key: &str, value: Value, ttl: Option<Duration>) {
		let entry = StoredEntry::new(value, ttl, OffsetDateTime::now_utc());

		map.write().insert(key.to_owned(), entry);
	}

	fn add_now(map: &StoreMap, key: &str, value: Value, ttl: Option<Duration>) -> bool {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		if guard.get(key).is_some_and(|entry| entry.is_live_at(now)) {
			return false;
		}

		guard.insert(key.to_owned(), StoredEntry::new(value, ttl, now));

		true
	}
}
impl KvStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
		Box::pin(async move { Ok(Self::get_now(&self.0, key)) })
	}

	fn set<'a>(&'a self, key: &'a str, value: Value, ttl: Option<Duration>) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			Self::set_now(&self.0, key, value, ttl);

			Ok(())
		})
	}

	fn add<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(Self::add_now(&self.0, key, value, ttl)) })
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().remove(key);

			Ok::<_, StoreError>(())
		})
	}
}
