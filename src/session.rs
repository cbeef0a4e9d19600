//! Persistent session flags and operator-facing diagnostics.

// self
use crate::{
	_prelude::*,
	store::{KvStore, StoreError},
};

const AUTH_FAILED_KEY: &str = "auth:failed";
const REGISTERED_KEY: &str = "auth:registered";
const LAST_API_STATUS_KEY: &str = "api:last_status";
const STATUS_ERROR_MAX_CHARS: usize = 255;

/// Outcome label recorded for the most recent API call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStatusKind {
	/// The call succeeded.
	Success,
	/// The call failed.
	Error,
}

/// Snapshot of the most recent API call, kept for operator diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
	/// Success or error.
	pub status: ApiStatusKind,
	/// Endpoint path that was called.
	pub endpoint: String,
	/// HTTP status, when a response arrived.
	pub http_status: Option<u16>,
	/// Sanitized error message for failed calls.
	pub error: Option<String>,
	/// Instant the call finished.
	#[serde(with = "time::serde::timestamp")]
	pub recorded_at: OffsetDateTime,
}
impl ApiStatus {
	/// Builds a success snapshot.
	pub fn success(endpoint: impl Into<String>, http_status: u16) -> Self {
		Self {
			status: ApiStatusKind::Success,
			endpoint: endpoint.into(),
			http_status: Some(http_status),
			error: None,
			recorded_at: OffsetDateTime::now_utc(),
		}
	}

	/// Builds an error snapshot; the message is trimmed to a bounded length.
	pub fn error(
		endpoint: impl Into<String>,
		http_status: Option<u16>,
		message: impl AsRef<str>,
	) -> Self {
		Self {
			status: ApiStatusKind::Error,
			endpoint: endpoint.into(),
			http_status,
			error: Some(truncate(message.as_ref().trim(), STATUS_ERROR_MAX_CHARS)),
			recorded_at: OffsetDateTime::now_utc(),
		}
	}

	/// Returns `true` for success snapshots.
	pub fn is_success(&self) -> bool {
		matches!(self.status, ApiStatusKind::Success)
	}
}

/// Truncates `value` to at most `max` characters on a character boundary.
pub(crate) fn truncate(value: &str, max: usize) -> String {
	match value.char_indices().nth(max) {
		Some((idx, _)) => value[..idx].to_owned(),
		None => value.to_owned(),
	}
}

/// Installation-wide session state shared through the [`KvStore`].
#[derive(Clone)]
pub struct SessionState {
	store: Arc<dyn KvStore>,
}
impl SessionState {
	/// Creates session state over a shared store.
	pub fn new(store: Arc<dyn KvStore>) -> Self {
		Self { store }
	}

	/// Whether automatic re-authentication failed and a human must log in again.
	pub async fn is_auth_failed(&self) -> Result<bool, StoreError> {
		Ok(self.store.load::<bool>(AUTH_FAILED_KEY).await?.unwrap_or(false))
	}

	/// Sets the persistent authentication-failed flag.
	pub async fn mark_auth_failed(&self) -> Result<(), StoreError> {
		self.store.save(AUTH_FAILED_KEY, &true, None).await
	}

	/// Clears the authentication-failed flag.
	pub async fn clear_auth_failed(&self) -> Result<(), StoreError> {
		self.store.delete(AUTH_FAILED_KEY).await
	}

	/// Whether company registration has completed.
	pub async fn is_registered(&self) -> Result<bool, StoreError> {
		Ok(self.store.load::<bool>(REGISTERED_KEY).await?.unwrap_or(false))
	}

	/// Marks company registration as complete.
	pub async fn mark_registered(&self) -> Result<(), StoreError> {
		self.store.save(REGISTERED_KEY, &true, None).await
	}

	/// Clears the registration marker.
	pub async fn clear_registration(&self) -> Result<(), StoreError> {
		self.store.delete(REGISTERED_KEY).await
	}

	/// Records the outcome of the latest API call.
	pub async fn record_api_status(&self, status: &ApiStatus) -> Result<(), StoreError> {
		self.store.save(LAST_API_STATUS_KEY, status, None).await
	}

	/// Returns the outcome of the latest API call, if any was recorded.
	pub async fn last_api_status(&self) -> Result<Option<ApiStatus>, StoreError> {
		self.store.load(LAST_API_STATUS_KEY).await
	}
}
impl Debug for SessionState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SessionState(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	fn session() -> SessionState {
		SessionState::new(Arc::new(MemoryStore::default()))
	}

	#[tokio::test]
	async fn failure_flag_defaults_to_clear() {
		let session = session();

		assert!(!session.is_auth_failed().await.expect("Read should succeed."));

		session.mark_auth_failed().await.expect("Write should succeed.");

		assert!(session.is_auth_failed().await.expect("Read should succeed."));

		session.clear_auth_failed().await.expect("Clear should succeed.");

		assert!(!session.is_auth_failed().await.expect("Read should succeed."));
	}

	#[tokio::test]
	async fn last_status_round_trips() {
		let session = session();
		let status = ApiStatus::error("admin/bookings", Some(500), "x".repeat(1000));

		session.record_api_status(&status).await.expect("Write should succeed.");

		let stored = session
			.last_api_status()
			.await
			.expect("Read should succeed.")
			.expect("Status should be stored.");

		assert!(!stored.is_success());
		assert_eq!(stored.http_status, Some(500));
		assert_eq!(stored.error.map(|message| message.len()), Some(STATUS_ERROR_MAX_CHARS));
	}

	#[test]
	fn truncate_respects_char_boundaries() {
		assert_eq!(truncate("héllo", 2), "hé");
		assert_eq!(truncate("short", 10), "short");
	}
}
