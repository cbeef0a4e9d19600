//! Session flows powered by the broker facade.
//!
//! [`Broker`] owns the transport, the shared store, and the component views over it (tokens,
//! credentials, session flags, refresh lock). Individual flows live in submodules as `impl`
//! blocks: refresh rotation, password authentication (manual and fallback), authenticated
//! requests, and one-time login URLs.

pub mod auth;
pub mod common;
pub mod lock;
pub mod login_url;
pub mod refresh;
pub mod request;

pub use auth::*;
pub use lock::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::{Codec, CredentialStore, TokenKind},
	ext::{NoopEventSink, SessionEvent, SessionEventSink},
	http::ApiHttpClient,
	remote::RemoteDescriptor,
	session::{ApiStatus, SessionState},
	store::KvStore,
	tokens::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport.
pub type ReqwestBroker = Broker<ReqwestHttpClient>;

/// Coordinates the remote session for one installation.
///
/// A broker holds no session state of its own: every token, flag, lock, and cached snapshot
/// lives in the shared [`KvStore`], so brokers built in unrelated processes against the same
/// store cooperate. Construct one per request (or share one) as convenient.
#[derive(Clone)]
pub struct Broker<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// HTTP client used for every outbound request.
	pub http_client: Arc<C>,
	/// Shared key-value store backing all session state.
	pub store: Arc<dyn KvStore>,
	/// Remote API descriptor.
	pub descriptor: RemoteDescriptor,
	/// Encrypted token storage.
	pub tokens: TokenStore,
	/// Encrypted account credentials used for fallback re-authentication.
	pub credentials: CredentialStore,
	/// Persistent session flags and diagnostics.
	pub session: SessionState,
	/// Advisory refresh lock.
	pub refresh_lock: RefreshLock,
	/// Receiver for authentication and cache signals.
	pub events: Arc<dyn SessionEventSink>,
	/// Shared metrics recorder for refresh flow outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
}
impl<C> Broker<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Creates a broker that reuses the caller-provided transport.
	pub fn with_http_client(
		store: Arc<dyn KvStore>,
		codec: Arc<dyn Codec>,
		descriptor: RemoteDescriptor,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			tokens: TokenStore::new(store.clone(), codec.clone()),
			credentials: CredentialStore::new(store.clone(), codec),
			session: SessionState::new(store.clone()),
			refresh_lock: RefreshLock::new(store.clone(), descriptor.refresh_lock_ttl),
			store,
			descriptor,
			events: Arc::new(NoopEventSink),
			refresh_metrics: Default::default(),
		}
	}

	/// Replaces the event sink.
	pub fn with_event_sink(mut self, events: Arc<dyn SessionEventSink>) -> Self {
		self.events = events;

		self
	}

	/// Returns `true` when the admin session is usable: the failure flag is clear, company
	/// registration is complete, and the admin token is valid (refreshing it when needed).
	pub async fn is_authenticated(&self) -> Result<bool> {
		if self.session.is_auth_failed().await? || !self.session.is_registered().await? {
			return Ok(false);
		}
		if self.tokens.is_valid(TokenKind::Admin).await? {
			return Ok(true);
		}

		self.refresh(TokenKind::Admin).await?;

		Ok(!self.session.is_auth_failed().await? && self.tokens.is_valid(TokenKind::Admin).await?)
	}

	/// Clears every token, the stored credentials, the registration marker, and the failure
	/// flag so the installation can register again.
	pub async fn reset_registration(&self) -> Result<()> {
		self.tokens.clear_all().await?;
		self.credentials.clear().await?;
		self.session.clear_registration().await?;
		self.session.clear_auth_failed().await?;

		tracing::info!("Remote registration reset.");

		Ok(())
	}

	/// Drops every token while keeping registration and credentials.
	pub async fn logout(&self) -> Result<()> {
		self.tokens.clear_all().await?;

		Ok(())
	}

	/// Returns the outcome of the latest API call.
	pub async fn last_api_status(&self) -> Result<Option<ApiStatus>> {
		Ok(self.session.last_api_status().await?)
	}

	pub(crate) fn publish(&self, event: SessionEvent) {
		self.events.publish(&event);
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient> {
	/// Creates a broker with its own reqwest transport.
	pub fn new(
		store: Arc<dyn KvStore>,
		codec: Arc<dyn Codec>,
		descriptor: RemoteDescriptor,
	) -> Result<Self> {
		let http_client = ReqwestHttpClient::new()?;

		Ok(Self::with_http_client(store, codec, descriptor, http_client))
	}
}
impl<C> Debug for Broker<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("refresh_metrics", &self.refresh_metrics)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, auth::AccountCredentials};

	async fn seed_admin(broker: &ScriptedBroker, expires_in: Duration) {
		broker
			.tokens
			.set_pair(
				TokenKind::Admin,
				&hex_token('a'),
				&hex_token('b'),
				OffsetDateTime::now_utc() + expires_in,
			)
			.await
			.expect("Admin tokens should persist.");
	}

	#[tokio::test]
	async fn fresh_install_is_not_authenticated_and_stays_offline() {
		let (broker, _, http) = build_scripted_broker();

		assert!(!broker.is_authenticated().await.expect("Check should succeed."));
		assert_eq!(http.total_calls(), 0);
	}

	#[tokio::test]
	async fn missing_refresh_token_never_reaches_the_network() {
		let (broker, _, http) = build_scripted_broker();

		broker.session.mark_registered().await.expect("Registration should persist.");

		assert!(!broker.is_authenticated().await.expect("Check should succeed."));
		assert_eq!(http.total_calls(), 0);
		assert!(!broker.refresh_lock.is_locked(TokenKind::Admin).await.expect("Lock read."));
	}

	#[tokio::test]
	async fn valid_admin_token_authenticates_without_refreshing() {
		let (broker, _, http) = build_scripted_broker();

		broker.session.mark_registered().await.expect("Registration should persist.");
		seed_admin(&broker, Duration::minutes(10)).await;

		assert!(broker.is_authenticated().await.expect("Check should succeed."));
		assert_eq!(http.total_calls(), 0);
		assert_eq!(broker.refresh_metrics.attempts(), 0);
	}

	#[tokio::test]
	async fn failure_flag_overrides_valid_tokens() {
		let (broker, _, _) = build_scripted_broker();

		broker.session.mark_registered().await.expect("Registration should persist.");
		seed_admin(&broker, Duration::minutes(10)).await;
		broker.session.mark_auth_failed().await.expect("Flag should persist.");

		assert!(!broker.is_authenticated().await.expect("Check should succeed."));
	}

	#[tokio::test]
	async fn reset_registration_clears_everything() {
		let (broker, store, _) = build_scripted_broker();

		broker.session.mark_registered().await.expect("Registration should persist.");
		broker.session.mark_auth_failed().await.expect("Flag should persist.");
		broker
			.credentials
			.save(&AccountCredentials::new(TEST_COMPANY, "owner", "pw"))
			.await
			.expect("Credentials should persist.");
		seed_admin(&broker, Duration::minutes(10)).await;
		broker.reset_registration().await.expect("Reset should succeed.");

		assert!(store.is_empty());
		assert!(!broker.is_authenticated().await.expect("Check should succeed."));
	}

	#[tokio::test]
	async fn logout_keeps_registration() {
		let (broker, _, _) = build_scripted_broker();

		broker.session.mark_registered().await.expect("Registration should persist.");
		seed_admin(&broker, Duration::minutes(10)).await;
		broker.logout().await.expect("Logout should succeed.");

		assert!(broker.session.is_registered().await.expect("Read should succeed."));
		assert!(!broker.tokens.is_valid(TokenKind::Admin).await.expect("Read should succeed."));
	}
}
