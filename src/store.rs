//! Shared key-value storage contract and built-in backends.
//!
//! Every piece of coordination state (encrypted tokens, expirations, the failure flag, refresh
//! locks, cached snapshots) lives behind [`KvStore`] so unrelated process instances observe the
//! same session. Values are JSON documents; entries may carry a time-to-live after which they
//! read as absent.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::_prelude::*;

/// Boxed future returned by [`KvStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract shared by tokens, session flags, locks, and caches.
pub trait KvStore
where
	Self: Send + Sync,
{
	/// Fetches the live value stored under `key`, if any.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>>;

	/// Stores `value` under `key`, replacing any previous entry; `ttl` bounds its lifetime.
	fn set<'a>(&'a self, key: &'a str, value: Value, ttl: Option<Duration>) -> StoreFuture<'a, ()>;

	/// Stores `value` only when no live entry exists; returns whether the write happened.
	fn add<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, bool>;

	/// Removes the entry under `key`; missing keys are not an error.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}
impl dyn KvStore {
	/// Reads and deserializes the value under `key`.
	pub async fn load<T>(&self, key: &str) -> Result<Option<T>, StoreError>
	where
		T: DeserializeOwned,
	{
		match self.get(key).await? {
			Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
				StoreError::Serialization { message: format!("Failed to decode `{key}`: {e}") }
			}),
			None => Ok(None),
		}
	}

	/// Serializes and stores `value` under `key`.
	pub async fn save<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), StoreError>
	where
		T: ?Sized + Serialize,
	{
		let value = serde_json::to_value(value).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode `{key}`: {e}"),
		})?;

		self.set(key, value, ttl).await
	}
}

/// Error type produced by [`KvStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
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

/// Stored value plus its optional expiry instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
	/// JSON payload.
	pub value: Value,
	/// Instant after which the entry reads as absent.
	#[serde(with = "time::serde::timestamp::option")]
	pub expires_at: Option<OffsetDateTime>,
}
impl StoredEntry {
	/// Creates an entry that expires `ttl` after `now` (never, when `ttl` is `None`).
	pub fn new(value: Value, ttl: Option<Duration>, now: OffsetDateTime) -> Self {
		Self { value, expires_at: ttl.map(|ttl| now + ttl) }
	}

	/// Returns `true` while the entry has not expired at `now`.
	pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|expires_at| now < expires_at)
	}
}
