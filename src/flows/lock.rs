//! Advisory refresh lock shared across processes through the [`KvStore`].
//!
//! The lock is a plain store entry written with set-if-absent semantics and a short TTL, so a
//! holder that crashes mid-refresh stops blocking others once the entry expires.

// self
use crate::{
	_prelude::*,
	auth::TokenKind,
	store::{KvStore, StoreError},
};

/// Per-kind refresh lock.
#[derive(Clone)]
pub struct RefreshLock {
	store: Arc<dyn KvStore>,
	ttl: Duration,
}
impl RefreshLock {
	/// Creates a lock whose entries expire after `ttl`.
	pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
		Self { store, ttl }
	}

	/// Storage key of the lock for `kind`.
	pub fn key(kind: TokenKind) -> String {
		format!("lock:refresh:{kind}")
	}

	/// Whether some holder currently owns the lock for `kind`.
	pub async fn is_locked(&self, kind: TokenKind) -> Result<bool, StoreError> {
		Ok(self.store.get(&Self::key(kind)).await?.is_some())
	}

	/// Tries to take the lock; `false` means another holder won the race.
	pub async fn try_acquire(&self, kind: TokenKind) -> Result<bool, StoreError> {
		self.store.add(&Self::key(kind), Value::Bool(true), Some(self.ttl)).await
	}

	/// Releases the lock.
	pub async fn release(&self, kind: TokenKind) -> Result<(), StoreError> {
		self.store.delete(&Self::key(kind)).await
	}
}
impl Debug for RefreshLock {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshLock").field("ttl", &self.ttl).finish()
	}
}
