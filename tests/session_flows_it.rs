#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
use time::{Duration, OffsetDateTime};
// self
use booking_session::{
	auth::{AccountCredentials, AesCbcCodec, CodecKeys, TokenKind},
	error::{Error, TransientError},
	flows::{Broker, ReauthOutcome, RefreshOutcome, ReqwestBroker},
	remote::RemoteDescriptor,
	store::{KvStore, MemoryStore},
	url::Url,
};

const COMPANY: &str = "acme-salon";

fn token(seed: char) -> String {
	seed.to_string().repeat(64)
}

fn descriptor(server: &MockServer, timeout: Duration) -> RemoteDescriptor {
	let base = Url::parse(&server.base_url()).expect("Mock server URL should parse.");

	RemoteDescriptor::builder(base)
		.request_timeout(timeout)
		.build()
		.expect("Loopback descriptor should build.")
}

fn build_broker(store: Arc<dyn KvStore>, descriptor: RemoteDescriptor) -> ReqwestBroker {
	let codec = Arc::new(AesCbcCodec::new(CodecKeys::new("it-secret", "it-legacy-secret")));

	Broker::new(store, codec, descriptor).expect("Reqwest broker should build.")
}

async fn seed_session(broker: &ReqwestBroker, expires_in: Duration) {
	broker
		.tokens
		.set_pair(
			TokenKind::Admin,
			&token('a'),
			&token('b'),
			OffsetDateTime::now_utc() + expires_in,
		)
		.await
		.expect("Admin tokens should persist.");
	broker
		.credentials
		.save(&AccountCredentials::new(COMPANY, "owner", "correct horse"))
		.await
		.expect("Credentials should persist.");
	broker.session.mark_registered().await.expect("Registration should persist.");
}

#[tokio::test]
async fn refresh_rotates_tokens_and_never_replays_the_old_refresh_token() {
	let server = MockServer::start_async().await;
	let broker = build_broker(
		Arc::new(MemoryStore::default()),
		descriptor(&server, Duration::seconds(5)),
	);

	seed_session(&broker, -Duration::minutes(1)).await;

	let first = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/admin/auth/refresh-token")
				.header("X-Company-Login", COMPANY)
				.json_body(json!({ "company": COMPANY, "refresh_token": token('b') }));
			then.status(200).json_body(json!({
				"token": token('c'),
				"refresh_token": token('d'),
				"expires_in": 1800,
			}));
		})
		.await;
	let second = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/admin/auth/refresh-token")
				.json_body(json!({ "company": COMPANY, "refresh_token": token('d') }));
			then.status(200).json_body(json!({
				"token": token('e'),
				"refresh_token": token('f'),
			}));
		})
		.await;

	assert_eq!(
		broker.refresh(TokenKind::Admin).await.expect("Refresh should run."),
		RefreshOutcome::Refreshed
	);

	let expires_at = broker
		.tokens
		.expires_at(TokenKind::Admin)
		.await
		.expect("Expiry read should succeed.")
		.expect("Expiry should be stored.");

	assert!(expires_at > OffsetDateTime::now_utc() + Duration::minutes(29));
	assert!(!broker.session.is_auth_failed().await.expect("Flag read should succeed."));

	broker.tokens.expire(TokenKind::Admin).await.expect("Expire should succeed.");

	assert_eq!(
		broker.refresh(TokenKind::Admin).await.expect("Refresh should run."),
		RefreshOutcome::Refreshed
	);

	first.assert_calls_async(1).await;
	second.assert_calls_async(1).await;

	let access = broker
		.tokens
		.get(TokenKind::Admin, false)
		.await
		.expect("Token read should succeed.")
		.expect("Token should be stored.");

	assert_eq!(access.expose(), token('e'));
}

#[tokio::test]
async fn concurrent_refreshes_share_one_network_call() {
	let server = MockServer::start_async().await;
	let store: Arc<dyn KvStore> = Arc::new(MemoryStore::default());
	let descriptor = descriptor(&server, Duration::seconds(5));
	let first = build_broker(store.clone(), descriptor.clone());
	let second = build_broker(store, descriptor);

	seed_session(&first, -Duration::minutes(1)).await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/admin/auth/refresh-token");
			then.status(200).delay(std::time::Duration::from_millis(200)).json_body(json!({
				"token": token('c'),
				"refresh_token": token('d'),
				"expires_in": 600,
			}));
		})
		.await;
	let (a, b) = tokio::join!(first.refresh(TokenKind::Admin), second.refresh(TokenKind::Admin));
	let mut outcomes = [a.expect("Refresh should run."), b.expect("Refresh should run.")];

	outcomes.sort_by_key(|outcome| *outcome == RefreshOutcome::Locked);

	assert_eq!(outcomes, [RefreshOutcome::Refreshed, RefreshOutcome::Locked]);

	mock.assert_calls_async(1).await;

	assert!(second.tokens.is_valid(TokenKind::Admin).await.expect("Read should succeed."));
	assert!(!second.refresh_lock.is_locked(TokenKind::Admin).await.expect("Read should succeed."));
}

#[tokio::test]
async fn token_expiry_is_retried_once_then_surfaced() {
	let server = MockServer::start_async().await;
	let broker = build_broker(
		Arc::new(MemoryStore::default()),
		descriptor(&server, Duration::seconds(5)),
	);

	seed_session(&broker, Duration::minutes(10)).await;

	let bookings = server
		.mock_async(|when, then| {
			when.method(GET).path("/admin/bookings").header("X-Company-Login", COMPANY);
			then.status(401).json_body(json!({ "code": 401, "message": "Token Expired" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/admin/auth/refresh-token");
			then.status(200).json_body(json!({
				"token": token('c'),
				"refresh_token": token('d'),
			}));
		})
		.await;
	let err = broker.get("admin/bookings").await.expect_err("Call should fail.");

	assert!(matches!(err, Error::Transient(TransientError::Api { status: 401, .. })));

	bookings.assert_calls_async(2).await;
	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn failed_fallback_blocks_all_further_network_calls() {
	let server = MockServer::start_async().await;
	let broker = build_broker(
		Arc::new(MemoryStore::default()),
		descriptor(&server, Duration::seconds(5)),
	);

	seed_session(&broker, -Duration::minutes(1)).await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/admin/auth/refresh-token");
			then.status(401).json_body(json!({ "message": "Refresh token revoked" }));
		})
		.await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/admin/auth").json_body(json!({
				"company": COMPANY,
				"login": "owner",
				"password": "correct horse",
			}));
			then.status(401).json_body(json!({ "message": "Invalid password" }));
		})
		.await;
	let bookings = server
		.mock_async(|when, then| {
			when.method(GET).path("/admin/bookings");
			then.status(200).json_body(json!([]));
		})
		.await;

	assert!(matches!(
		broker.get("admin/bookings").await,
		Err(Error::TokenUnavailable { kind: TokenKind::Admin })
	));
	assert!(broker.session.is_auth_failed().await.expect("Flag read should succeed."));
	assert!(matches!(broker.get("admin/bookings").await, Err(Error::AuthenticationFailed)));
	assert!(!broker.is_authenticated().await.expect("Check should succeed."));
	assert_eq!(
		broker.reauthenticate().await.expect("Fallback should run."),
		ReauthOutcome::SkippedAuthFailed
	);

	refresh.assert_calls_async(1).await;
	login.assert_calls_async(1).await;
	bookings.assert_calls_async(0).await;
}

#[tokio::test]
async fn timeouts_are_transport_failures_and_leave_the_session_intact() {
	let server = MockServer::start_async().await;
	let broker = build_broker(
		Arc::new(MemoryStore::default()),
		descriptor(&server, Duration::milliseconds(200)),
	);

	seed_session(&broker, Duration::minutes(10)).await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/admin/company");
			then.status(200).delay(std::time::Duration::from_secs(2)).json_body(json!({}));
		})
		.await;

	assert!(matches!(broker.get("admin/company").await, Err(Error::Transport(_))));
	assert!(!broker.session.is_auth_failed().await.expect("Flag read should succeed."));
	assert!(broker.tokens.is_valid(TokenKind::Admin).await.expect("Read should succeed."));

	let status = broker
		.last_api_status()
		.await
		.expect("Status read should succeed.")
		.expect("Status should be recorded.");

	assert!(!status.is_success());
	assert_eq!(status.endpoint, "admin/company");
}
