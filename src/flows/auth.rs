//! Password authentication: manual logins (with optional two-factor confirmation) and the
//! automatic fallback used when refresh rotation cannot recover.
//!
//! Fallback re-authentication is the one place that sets the persistent failure flag. Once set,
//! every authenticated flow short-circuits until a manual login succeeds or registration is
//! reset, so a bad password can never hammer the remote API.

// self
use crate::{
	_prelude::*,
	auth::{AccountCredentials, TokenKind},
	ext::SessionEvent,
	flows::{
		Broker,
		common::{self, TokenGrant},
	},
	http::{ApiHttpClient, ApiMethod},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	remote::{AUTH_PATH, SMS_PATH, TWO_FACTOR_PATH},
};

/// Result of a manual [`Broker::authenticate`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
	/// Tokens were issued and persisted.
	Authenticated,
	/// The account requires a second factor; finish with [`Broker::complete_two_factor`].
	TwoFactorRequired {
		/// Remote authentication session to confirm.
		session_id: String,
		/// Second-factor providers enabled for the account (e.g. `ga`, `sms`).
		providers: Vec<String>,
	},
}

/// Result of an automatic [`Broker::reauthenticate`] attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReauthOutcome {
	/// Fresh admin tokens were stored.
	Succeeded,
	/// The remote API rejected the stored credentials; the failure flag is now set.
	Failed,
	/// Skipped because the failure flag was already set.
	SkippedAuthFailed,
	/// Skipped because no credentials are stored.
	SkippedNoAccount,
	/// The remote API could not be reached; no state changed.
	Unreachable,
}
impl ReauthOutcome {
	/// Returns `true` when fresh tokens were stored.
	pub fn is_success(self) -> bool {
		matches!(self, Self::Succeeded)
	}
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
	#[serde(default)]
	token: Option<String>,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	require2fa: bool,
	#[serde(default)]
	auth_session_id: Option<String>,
	#[serde(default)]
	allowed2fa_providers: Vec<String>,
}

enum LoginReply {
	Tokens(TokenGrant),
	TwoFactor { session_id: String, providers: Vec<String> },
}

impl<C> Broker<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Logs in with account credentials.
	///
	/// On success the tokens, the credentials (for later fallback), and the registration marker
	/// are persisted and the failure flag is cleared. Rejected credentials surface as
	/// [`Error::InvalidCredentials`] without touching stored state.
	pub async fn authenticate(&self, credentials: &AccountCredentials) -> Result<AuthOutcome> {
		const KIND: FlowKind = FlowKind::Authenticate;

		let span = FlowSpan::new(KIND, "authenticate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				match self.password_login(credentials).await? {
					LoginReply::Tokens(grant) => {
						self.complete_login(credentials, &grant, false).await?;

						Ok(AuthOutcome::Authenticated)
					},
					LoginReply::TwoFactor { session_id, providers } => {
						tracing::info!(company = %credentials.company, "Second factor required.");

						Ok(AuthOutcome::TwoFactorRequired { session_id, providers })
					},
				}
			})
			.await;

		record(KIND, &result);

		result
	}

	/// Confirms a two-factor login started by [`Broker::authenticate`].
	pub async fn complete_two_factor(
		&self,
		credentials: &AccountCredentials,
		session_id: &str,
		code: &str,
		provider: &str,
	) -> Result<()> {
		const KIND: FlowKind = FlowKind::Authenticate;

		let span = FlowSpan::new(KIND, "complete_two_factor");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let body = serde_json::json!({
					"company": credentials.company,
					"session_id": session_id,
					"code": code,
					"type": provider,
				});
				let request = self
					.build_request(ApiMethod::Post, TWO_FACTOR_PATH)?
					.with_header(common::COMPANY_HEADER, credentials.company.as_str())
					.with_body(Some(body));
				let response = self.dispatch(TWO_FACTOR_PATH, request).await?;

				if !response.is_success() {
					return Err(rejection(TWO_FACTOR_PATH, &response));
				}

				let grant: TokenGrant = common::decode(TWO_FACTOR_PATH, &response)?;

				if !grant.is_well_formed() {
					return Err(malformed_grant());
				}

				self.complete_login(credentials, &grant, false).await
			})
			.await;

		record(KIND, &result);

		result
	}

	/// Asks the remote API to text a two-factor code for a pending login session.
	pub async fn request_sms_code(&self, company: &str, session_id: &str) -> Result<()> {
		let mut request = self
			.build_request(ApiMethod::Get, SMS_PATH)?
			.with_header(common::COMPANY_HEADER, company);

		request
			.url
			.query_pairs_mut()
			.append_pair("company", company)
			.append_pair("session_id", session_id);

		let response = self.dispatch(SMS_PATH, request).await?;

		if !response.is_success() {
			return Err(rejection(SMS_PATH, &response));
		}

		Ok(())
	}

	/// Logs in again with the stored credentials after refresh rotation failed.
	///
	/// Never runs while the failure flag is set. A rejection sets the flag, so at most one
	/// rejected attempt happens per manual intervention.
	pub async fn reauthenticate(&self) -> Result<ReauthOutcome> {
		const KIND: FlowKind = FlowKind::Reauthenticate;

		let span = FlowSpan::new(KIND, "reauthenticate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				if self.session.is_auth_failed().await? {
					tracing::debug!("Automatic re-authentication skipped; failure flag is set.");

					return Ok(ReauthOutcome::SkippedAuthFailed);
				}

				let Some(credentials) = self.credentials.load().await? else {
					tracing::debug!("Automatic re-authentication skipped; no stored account.");

					return Ok(ReauthOutcome::SkippedNoAccount);
				};
				let reason = match self.password_login(&credentials).await {
					Ok(LoginReply::Tokens(grant)) => {
						self.complete_login(&credentials, &grant, true).await?;

						return Ok(ReauthOutcome::Succeeded);
					},
					Ok(LoginReply::TwoFactor { .. }) =>
						"Two-factor confirmation is required.".to_owned(),
					Err(Error::InvalidCredentials { reason }) => reason,
					Err(Error::Transport(e)) => {
						tracing::warn!(error = %e, "Automatic re-authentication could not reach the remote API.");

						return Ok(ReauthOutcome::Unreachable);
					},
					Err(Error::Transient(e)) if e.status() >= 500 => {
						tracing::warn!(error = %e, "Automatic re-authentication hit a server error.");

						return Ok(ReauthOutcome::Unreachable);
					},
					Err(Error::Transient(e)) => e.to_string(),
					Err(e) => return Err(e),
				};

				tracing::error!(
					company = %credentials.company,
					reason = %reason,
					"Automatic re-authentication failed; manual login required."
				);

				self.session.mark_auth_failed().await?;
				self.publish(SessionEvent::AuthFailed { company: credentials.company, reason });

				Ok(ReauthOutcome::Failed)
			})
			.await;

		match &result {
			Ok(ReauthOutcome::Succeeded) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Ok(ReauthOutcome::SkippedAuthFailed | ReauthOutcome::SkippedNoAccount) => (),
			_ => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn password_login(&self, credentials: &AccountCredentials) -> Result<LoginReply> {
		let body = serde_json::json!({
			"company": credentials.company,
			"login": credentials.login,
			"password": credentials.password.expose(),
		});
		let request = self
			.build_request(ApiMethod::Post, AUTH_PATH)?
			.with_header(common::COMPANY_HEADER, credentials.company.as_str())
			.with_body(Some(body));
		let response = self.dispatch(AUTH_PATH, request).await?;

		if !response.is_success() {
			return Err(rejection(AUTH_PATH, &response));
		}

		let login: LoginResponse = common::decode(AUTH_PATH, &response)?;

		if login.require2fa {
			return Ok(LoginReply::TwoFactor {
				session_id: login.auth_session_id.unwrap_or_default(),
				providers: login.allowed2fa_providers,
			});
		}

		let (Some(token), Some(refresh_token)) = (login.token, login.refresh_token) else {
			return Err(Error::InvalidCredentials {
				reason: "Login response did not include a token pair".into(),
			});
		};
		let grant = TokenGrant { token, refresh_token, expires_in: login.expires_in };

		if !grant.is_well_formed() {
			return Err(malformed_grant());
		}

		Ok(LoginReply::Tokens(grant))
	}

	async fn complete_login(
		&self,
		credentials: &AccountCredentials,
		grant: &TokenGrant,
		automatic: bool,
	) -> Result<()> {
		let expires_at =
			grant.expires_at(OffsetDateTime::now_utc(), self.descriptor.default_token_ttl);

		self.tokens.set_pair(TokenKind::Admin, &grant.token, &grant.refresh_token, expires_at).await?;

		if !automatic {
			self.credentials.save(credentials).await?;
			self.session.mark_registered().await?;
		}

		self.session.clear_auth_failed().await?;

		tracing::info!(company = %credentials.company, automatic, "Authenticated against the remote API.");

		self.publish(SessionEvent::AuthSucceeded { company: credentials.company.clone(), automatic });

		Ok(())
	}
}

/// 4xx answers reject the credentials; anything else stays a transient API failure.
fn rejection(path: &str, response: &crate::http::ApiResponse) -> Error {
	let failure = common::api_failure(path, response);

	if (400..500).contains(&response.status) {
		Error::InvalidCredentials { reason: common::error_message(response) }
	} else {
		failure.into()
	}
}

fn malformed_grant() -> Error {
	tracing::warn!("Login response carried malformed tokens.");

	Error::InvalidCredentials { reason: "Login response carried malformed tokens".into() }
}

fn record<T>(kind: FlowKind, result: &Result<T>) {
	match result {
		Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
	}
}
