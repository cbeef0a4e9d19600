//! Refresh-token rotation guarded by the shared advisory lock.
//!
//! [`Broker::refresh`] never blocks: when another holder owns the lock it returns
//! [`RefreshOutcome::Locked`] and the caller re-checks validity. The holder re-validates after
//! acquiring (someone may have finished first), destroys the stored refresh token before the
//! network call so it can never be replayed, and stores the rotated pair on success. Refresh
//! tokens the remote API no longer accepts trigger fallback re-authentication.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::TokenKind,
	flows::{
		Broker, ReauthOutcome,
		common::{self, TokenGrant},
	},
	http::{ApiHttpClient, ApiMethod},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	remote::REFRESH_PATH,
};

/// Result of a [`Broker::refresh`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// The token kind cannot be refreshed; nothing happened.
	Unsupported,
	/// Another holder owns the refresh lock; nothing happened.
	Locked,
	/// The token became valid while the lock was being acquired.
	AlreadyValid,
	/// A rotated token pair was stored.
	Refreshed,
	/// Refresh could not proceed and fallback re-authentication ran instead.
	FellBack(ReauthOutcome),
	/// The refresh call failed; the refresh token is gone and the next call will fall back.
	Failed,
}
impl RefreshOutcome {
	/// Returns `true` when a valid token should now be stored.
	pub fn is_success(self) -> bool {
		matches!(self, Self::AlreadyValid | Self::Refreshed | Self::FellBack(ReauthOutcome::Succeeded))
	}
}

enum LockedStep {
	Done(RefreshOutcome),
	MissingRefreshToken,
}

impl<C> Broker<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Rotates the token of `kind` using its stored refresh token.
	///
	/// Errors only surface for storage or configuration failures; remote failures are reported
	/// through [`RefreshOutcome`]. The lock is released on every path once acquired.
	pub async fn refresh(&self, kind: TokenKind) -> Result<RefreshOutcome> {
		const KIND: FlowKind = FlowKind::Refresh;

		if !kind.supports_refresh() {
			return Ok(RefreshOutcome::Unsupported);
		}

		let span = FlowSpan::new(KIND, "refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				if self.refresh_lock.is_locked(kind).await?
					|| !self.refresh_lock.try_acquire(kind).await?
				{
					tracing::debug!(%kind, "Refresh skipped; lock held elsewhere.");
					self.refresh_metrics.record_contended();

					return Ok(RefreshOutcome::Locked);
				}

				self.refresh_metrics.record_attempt();

				let step = self.refresh_locked(kind).await;
				let released = self.refresh_lock.release(kind).await;
				let step = step?;

				released?;

				match step {
					LockedStep::Done(outcome) => Ok(outcome),
					LockedStep::MissingRefreshToken => {
						tracing::warn!(%kind, "No refresh token stored; falling back to re-authentication.");

						Ok(RefreshOutcome::FellBack(self.reauthenticate().await?))
					},
				}
			})
			.await;

		match &result {
			Ok(outcome) if outcome.is_success() => {
				self.refresh_metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Ok(RefreshOutcome::Locked) => (),
			_ => {
				self.refresh_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn refresh_locked(&self, kind: TokenKind) -> Result<LockedStep> {
		let Some(refresh_token) = self.tokens.get(kind, true).await? else {
			return Ok(LockedStep::MissingRefreshToken);
		};

		if self.tokens.is_valid(kind).await? {
			return Ok(LockedStep::Done(RefreshOutcome::AlreadyValid));
		}

		let company = self.credentials.company().await?.unwrap_or_default();

		self.tokens.invalidate_refresh(kind).await?;

		let body = serde_json::json!({
			"company": company,
			"refresh_token": refresh_token.expose(),
		});
		let request = self
			.build_request(ApiMethod::Post, REFRESH_PATH)?
			.with_header(common::COMPANY_HEADER, company.as_str())
			.with_body(Some(body));
		let response = match self.dispatch(REFRESH_PATH, request).await {
			Ok(response) => response,
			Err(Error::Transport(_)) => return Ok(LockedStep::Done(RefreshOutcome::Failed)),
			Err(e) => return Err(e),
		};

		if response.status == 401 {
			tracing::warn!(
				%kind,
				body = %obs::body_excerpt(&response.body_text()),
				"Refresh token rejected; falling back to re-authentication."
			);

			return Ok(LockedStep::Done(RefreshOutcome::FellBack(self.reauthenticate().await?)));
		}
		if !response.is_success() {
			common::api_failure(REFRESH_PATH, &response);

			return Ok(LockedStep::Done(RefreshOutcome::Failed));
		}

		let grant: TokenGrant = match common::decode(REFRESH_PATH, &response) {
			Ok(grant) => grant,
			Err(e) => {
				tracing::warn!(%kind, error = %e, "Refresh response could not be decoded.");

				return Ok(LockedStep::Done(RefreshOutcome::Failed));
			},
		};

		if !grant.is_well_formed() {
			tracing::warn!(%kind, "Refresh response carried malformed tokens.");

			return Ok(LockedStep::Done(RefreshOutcome::Failed));
		}

		let expires_at =
			grant.expires_at(OffsetDateTime::now_utc(), self.descriptor.default_token_ttl);

		self.tokens.set_pair(kind, &grant.token, &grant.refresh_token, expires_at).await?;
		self.session.clear_auth_failed().await?;

		tracing::info!(%kind, %expires_at, "Token refreshed.");

		Ok(LockedStep::Done(RefreshOutcome::Refreshed))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, auth::AccountCredentials, flows::RefreshLock, remote::AUTH_PATH};

	async fn seed_expired_admin(broker: &ScriptedBroker) {
		broker
			.tokens
			.set_pair(
				TokenKind::Admin,
				&hex_token('a'),
				&hex_token('b'),
				OffsetDateTime::now_utc() - Duration::minutes(1),
			)
			.await
			.expect("Admin tokens should persist.");
		broker
			.credentials
			.save(&AccountCredentials::new(TEST_COMPANY, "owner", "pw"))
			.await
			.expect("Credentials should persist.");
		broker.session.mark_registered().await.expect("Registration should persist.");
	}

	fn rotated() -> Value {
		serde_json::json!({
			"token": hex_token('c'),
			"refresh_token": hex_token('d'),
			"expires_in": 600,
		})
	}

	async fn stored(broker: &ScriptedBroker, refresh: bool) -> Option<String> {
		broker
			.tokens
			.get(TokenKind::Admin, refresh)
			.await
			.expect("Read should succeed.")
			.map(|token| token.expose().to_owned())
	}

	#[tokio::test]
	async fn non_admin_kinds_are_not_refreshed() {
		let (broker, _, http) = build_scripted_broker();

		for kind in [TokenKind::Public, TokenKind::User] {
			assert_eq!(
				broker.refresh(kind).await.expect("Refresh should run."),
				RefreshOutcome::Unsupported
			);
		}

		assert_eq!(http.total_calls(), 0);
	}

	#[tokio::test]
	async fn expired_token_rotates_and_releases_the_lock() {
		let (broker, _, http) = build_scripted_broker();

		seed_expired_admin(&broker).await;
		http.reply(REFRESH_PATH, 200, rotated());

		assert_eq!(
			broker.refresh(TokenKind::Admin).await.expect("Refresh should run."),
			RefreshOutcome::Refreshed
		);
		assert_eq!(stored(&broker, false).await, Some(hex_token('c')));
		assert_eq!(stored(&broker, true).await, Some(hex_token('d')));
		assert!(broker.is_authenticated().await.expect("Check should succeed."));
		assert!(!broker.refresh_lock.is_locked(TokenKind::Admin).await.expect("Read."));
		assert_eq!(broker.refresh_metrics.successes(), 1);

		let body = http.requests()[0].body.clone().expect("Refresh call should carry a body.");

		assert_eq!(body["refresh_token"], Value::from(hex_token('b')));
		assert_eq!(body["company"], Value::from(TEST_COMPANY));
	}

	#[tokio::test]
	async fn held_lock_returns_immediately() {
		let (broker, store, http) = build_scripted_broker();

		seed_expired_admin(&broker).await;

		let other = RefreshLock::new(store, Duration::seconds(10));

		assert!(other.try_acquire(TokenKind::Admin).await.expect("Acquire should succeed."));
		assert_eq!(
			broker.refresh(TokenKind::Admin).await.expect("Refresh should run."),
			RefreshOutcome::Locked
		);
		assert_eq!(http.total_calls(), 0);
		assert_eq!(broker.refresh_metrics.contended(), 1);
		assert!(broker.refresh_lock.is_locked(TokenKind::Admin).await.expect("Read."));
	}

	#[tokio::test]
	async fn token_refreshed_elsewhere_is_not_refreshed_again() {
		let (broker, _, http) = build_scripted_broker();

		seed_expired_admin(&broker).await;
		broker
			.tokens
			.set_expires_at(TokenKind::Admin, OffsetDateTime::now_utc() + Duration::minutes(5))
			.await
			.expect("Expiry should persist.");

		assert_eq!(
			broker.refresh(TokenKind::Admin).await.expect("Refresh should run."),
			RefreshOutcome::AlreadyValid
		);
		assert_eq!(http.total_calls(), 0);
	}

	#[tokio::test]
	async fn rejected_refresh_token_falls_back_and_flags_on_failure() {
		let (broker, _, http) = build_scripted_broker();

		seed_expired_admin(&broker).await;
		http.reply(REFRESH_PATH, 401, serde_json::json!({ "message": "Invalid refresh token" }));
		http.reply(AUTH_PATH, 401, serde_json::json!({ "message": "Invalid password" }));

		assert_eq!(
			broker.refresh(TokenKind::Admin).await.expect("Refresh should run."),
			RefreshOutcome::FellBack(ReauthOutcome::Failed)
		);
		assert!(broker.session.is_auth_failed().await.expect("Read should succeed."));
		assert_eq!(stored(&broker, true).await, None);
		assert!(!broker.refresh_lock.is_locked(TokenKind::Admin).await.expect("Read."));
		assert!(!broker.is_authenticated().await.expect("Check should succeed."));
		assert_eq!(http.total_calls(), 2);
	}

	#[tokio::test]
	async fn rejected_refresh_token_recovers_through_fallback() {
		let (broker, _, http) = build_scripted_broker();

		seed_expired_admin(&broker).await;
		http.reply(REFRESH_PATH, 401, serde_json::json!({ "message": "Invalid refresh token" }));
		http.reply(AUTH_PATH, 200, rotated());

		assert_eq!(
			broker.refresh(TokenKind::Admin).await.expect("Refresh should run."),
			RefreshOutcome::FellBack(ReauthOutcome::Succeeded)
		);
		assert!(broker.is_authenticated().await.expect("Check should succeed."));
	}

	#[tokio::test]
	async fn transport_failure_consumes_the_refresh_token() {
		let (broker, _, http) = build_scripted_broker();

		seed_expired_admin(&broker).await;
		http.fail(REFRESH_PATH);

		assert_eq!(
			broker.refresh(TokenKind::Admin).await.expect("Refresh should run."),
			RefreshOutcome::Failed
		);
		assert_eq!(stored(&broker, true).await, None);
		assert!(!broker.session.is_auth_failed().await.expect("Read should succeed."));
		assert!(!broker.refresh_lock.is_locked(TokenKind::Admin).await.expect("Read."));
		assert_eq!(broker.refresh_metrics.failures(), 1);
	}

	#[tokio::test]
	async fn missing_refresh_token_falls_back_after_releasing_the_lock() {
		let (broker, _, http) = build_scripted_broker();

		broker
			.credentials
			.save(&AccountCredentials::new(TEST_COMPANY, "owner", "pw"))
			.await
			.expect("Credentials should persist.");
		http.reply(AUTH_PATH, 200, rotated());

		assert_eq!(
			broker.refresh(TokenKind::Admin).await.expect("Refresh should run."),
			RefreshOutcome::FellBack(ReauthOutcome::Succeeded)
		);
		assert_eq!(http.calls_to(REFRESH_PATH), 0);
		assert_eq!(stored(&broker, false).await, Some(hex_token('c')));
	}

	#[tokio::test]
	async fn malformed_refresh_response_is_a_failure() {
		let (broker, _, http) = build_scripted_broker();

		seed_expired_admin(&broker).await;
		http.reply(REFRESH_PATH, 200, serde_json::json!({ "token": "short", "refresh_token": "x" }));

		assert_eq!(
			broker.refresh(TokenKind::Admin).await.expect("Refresh should run."),
			RefreshOutcome::Failed
		);
		assert!(!broker.tokens.is_valid(TokenKind::Admin).await.expect("Read should succeed."));
	}
}
