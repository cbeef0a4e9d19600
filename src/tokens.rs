//! Encrypted per-kind token storage.
//!
//! Each [`TokenKind`] owns three keys: the access-token envelope, the refresh-token envelope, and
//! the expiry timestamp. Plaintext only exists in memory for the duration of a call.

// self
use crate::{
	_prelude::*,
	auth::{Codec, TokenKind, TokenSecret, is_token_shaped},
	store::{KvStore, StoreError},
};

/// Token store over a shared [`KvStore`] and a [`Codec`].
#[derive(Clone)]
pub struct TokenStore {
	store: Arc<dyn KvStore>,
	codec: Arc<dyn Codec>,
}
impl TokenStore {
	/// Creates a token store.
	pub fn new(store: Arc<dyn KvStore>, codec: Arc<dyn Codec>) -> Self {
		Self { store, codec }
	}

	/// Storage key holding the access (or refresh) envelope for `kind`.
	pub fn token_key(kind: TokenKind, refresh: bool) -> String {
		if refresh { format!("token:{kind}:refresh") } else { format!("token:{kind}") }
	}

	/// Storage key holding the expiry timestamp for `kind`.
	pub fn expiry_key(kind: TokenKind) -> String {
		format!("token:{kind}:expires_at")
	}

	/// Reads and decrypts a token; `None` when unset or undecodable.
	pub async fn get(&self, kind: TokenKind, refresh: bool) -> Result<Option<TokenSecret>, StoreError> {
		let envelope: Option<String> =
			self.store.load(&Self::token_key(kind, refresh)).await?;
		let plaintext = envelope.map(|envelope| self.codec.decrypt(&envelope)).unwrap_or_default();

		Ok(is_token_shaped(&plaintext).then(|| TokenSecret::new(plaintext)))
	}

	/// Encrypts and stores a token; values without the token shape are stored as empty.
	pub async fn set(&self, kind: TokenKind, token: &str, refresh: bool) -> Result<(), StoreError> {
		let token = token.trim();
		let envelope =
			if is_token_shaped(token) { self.codec.encrypt(token) } else { String::new() };

		self.store.save(&Self::token_key(kind, refresh), &envelope, None).await
	}

	/// Stores the access/refresh pair issued by the remote API.
	pub async fn set_pair(
		&self,
		kind: TokenKind,
		token: &str,
		refresh_token: &str,
		expires_at: OffsetDateTime,
	) -> Result<(), StoreError> {
		self.set(kind, token, false).await?;
		self.set(kind, refresh_token, true).await?;
		self.set_expires_at(kind, expires_at).await
	}

	/// Clears the stored refresh token so it can never be replayed.
	pub async fn invalidate_refresh(&self, kind: TokenKind) -> Result<(), StoreError> {
		self.set(kind, "", true).await
	}

	/// Returns the recorded expiry for `kind`.
	pub async fn expires_at(&self, kind: TokenKind) -> Result<Option<OffsetDateTime>, StoreError> {
		let timestamp: Option<i64> = self.store.load(&Self::expiry_key(kind)).await?;

		Ok(timestamp.and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok()))
	}

	/// Records the expiry for `kind`.
	pub async fn set_expires_at(
		&self,
		kind: TokenKind,
		expires_at: OffsetDateTime,
	) -> Result<(), StoreError> {
		self.store.save(&Self::expiry_key(kind), &expires_at.unix_timestamp(), None).await
	}

	/// Marks the access token as expired without touching the refresh token.
	pub async fn expire(&self, kind: TokenKind) -> Result<(), StoreError> {
		self.set_expires_at(kind, OffsetDateTime::now_utc()).await
	}

	/// A token is valid when a refresh token exists and the expiry lies after `now`.
	///
	/// Access-token presence alone never counts: a valid token must always be renewable.
	pub async fn is_valid_at(&self, kind: TokenKind, now: OffsetDateTime) -> Result<bool, StoreError> {
		if self.get(kind, true).await?.is_none() {
			return Ok(false);
		}

		Ok(self.expires_at(kind).await?.is_some_and(|expires_at| expires_at > now))
	}

	/// [`TokenStore::is_valid_at`] evaluated against the current clock.
	pub async fn is_valid(&self, kind: TokenKind) -> Result<bool, StoreError> {
		self.is_valid_at(kind, OffsetDateTime::now_utc()).await
	}

	/// Removes every token, refresh token, and expiry key.
	pub async fn clear_all(&self) -> Result<(), StoreError> {
		for kind in TokenKind::ALL {
			self.store.delete(&Self::token_key(kind, false)).await?;
			self.store.delete(&Self::token_key(kind, true)).await?;
			self.store.delete(&Self::expiry_key(kind)).await?;
		}

		Ok(())
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenStore(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{hex_token, test_codec},
		store::MemoryStore,
	};

	fn token_store() -> (TokenStore, Arc<MemoryStore>) {
		let backend = Arc::new(MemoryStore::default());

		(TokenStore::new(backend.clone(), Arc::new(test_codec())), backend)
	}

	#[tokio::test]
	async fn tokens_are_encrypted_at_rest() {
		let (tokens, backend) = token_store();
		let token = hex_token('a');

		tokens.set(TokenKind::Admin, &token, false).await.expect("Set should succeed.");

		let raw = backend.get("token:admin").await.expect("Raw read should succeed.");
		let raw = raw.and_then(|value| value.as_str().map(str::to_owned)).unwrap_or_default();

		assert!(raw.starts_with("v2:"));
		assert!(!raw.contains(&token));
		assert_eq!(
			tokens.get(TokenKind::Admin, false).await.expect("Get should succeed."),
			Some(TokenSecret::new(token))
		);
	}

	#[tokio::test]
	async fn malformed_tokens_are_stored_as_empty() {
		let (tokens, _) = token_store();

		tokens.set(TokenKind::Public, "not-a-token", false).await.expect("Set should succeed.");

		assert_eq!(tokens.get(TokenKind::Public, false).await.expect("Get should succeed."), None);
	}

	#[tokio::test]
	async fn undecodable_envelopes_read_as_absent() {
		let (tokens, backend) = token_store();

		backend
			.set("token:admin:refresh", Value::String("v2:garbage.garbage".into()), None)
			.await
			.expect("Raw write should succeed.");

		assert_eq!(tokens.get(TokenKind::Admin, true).await.expect("Get should succeed."), None);
	}

	#[tokio::test]
	async fn validity_requires_refresh_token_and_future_expiry() {
		let (tokens, _) = token_store();
		let now = OffsetDateTime::now_utc();

		tokens.set(TokenKind::Admin, &hex_token('1'), false).await.expect("Set should succeed.");
		tokens
			.set_expires_at(TokenKind::Admin, now + Duration::minutes(10))
			.await
			.expect("Expiry should persist.");

		assert!(!tokens.is_valid_at(TokenKind::Admin, now).await.expect("Check should succeed."));

		tokens.set(TokenKind::Admin, &hex_token('2'), true).await.expect("Set should succeed.");

		assert!(tokens.is_valid_at(TokenKind::Admin, now).await.expect("Check should succeed."));
		assert!(
			!tokens
				.is_valid_at(TokenKind::Admin, now + Duration::minutes(11))
				.await
				.expect("Check should succeed.")
		);

		tokens.invalidate_refresh(TokenKind::Admin).await.expect("Invalidate should succeed.");

		assert!(!tokens.is_valid_at(TokenKind::Admin, now).await.expect("Check should succeed."));
	}

	#[tokio::test]
	async fn clear_all_removes_every_kind() {
		let (tokens, backend) = token_store();
		let expires_at = OffsetDateTime::now_utc() + Duration::hours(1);

		for kind in TokenKind::ALL {
			tokens
				.set_pair(kind, &hex_token('c'), &hex_token('d'), expires_at)
				.await
				.expect("Pair should persist.");
		}

		tokens.clear_all().await.expect("Clear should succeed.");

		assert!(backend.is_empty());
	}
}
