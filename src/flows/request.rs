//! Authenticated remote API calls with token selection and a bounded expiry retry.

// self
use crate::{
	_prelude::*,
	auth::{TokenKind, TokenSecret},
	error::TransientError,
	flows::{Broker, common},
	http::{ApiHttpClient, ApiMethod},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::ApiStatus,
};

/// Extra attempts granted when the remote API reports an expired token.
const MAX_EXPIRY_RETRIES: u8 = 1;

impl<C> Broker<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Issues an authenticated call and returns the decoded JSON body (`null` when empty).
	///
	/// Paths under `admin` use the admin token; everything else uses the public token. A
	/// missing or expired token is refreshed before sending. When the remote API answers that
	/// the token expired, the token is refreshed and the call retried once. The failure flag
	/// short-circuits every call with [`Error::AuthenticationFailed`] before any I/O.
	pub async fn api_call(&self, method: ApiMethod, path: &str, body: Option<Value>) -> Result<Value> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "api_call");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let kind = TokenKind::for_path(path);
				let mut attempt = 0;

				loop {
					if self.session.is_auth_failed().await? {
						return Err(Error::AuthenticationFailed);
					}

					let token = self.ensure_token(kind).await?;
					let company = self.credentials.company().await?;
					let mut request = self
						.build_request(method, path)?
						.with_header(common::TOKEN_HEADER, token.expose())
						.with_body(body.clone());

					if let Some(company) = company {
						request = request.with_header(common::COMPANY_HEADER, company);
					}

					let response = match self.dispatch(path, request).await {
						Ok(response) => response,
						Err(e) => {
							self.record_status(ApiStatus::error(path, None, e.to_string())).await;

							return Err(e);
						},
					};

					if response.is_success() {
						let value: Value = common::decode(path, &response)?;

						self.record_status(ApiStatus::success(path, response.status)).await;

						return Ok(value);
					}

					let failure = common::api_failure(path, &response);
					let expired = matches!(
						&failure,
						TransientError::Api { message, .. } if is_token_expired(message)
					);

					if expired && attempt < MAX_EXPIRY_RETRIES {
						tracing::info!(endpoint = path, %kind, "Token expired remotely; refreshing and retrying.");

						attempt += 1;

						// Non-refreshable tokens are retried as stored; expiring them would strand
						// every later call.
						if kind.supports_refresh() {
							self.tokens.expire(kind).await?;
							self.refresh(kind).await?;
						}

						continue;
					}

					self.record_status(ApiStatus::error(
						path,
						Some(response.status),
						failure.to_string(),
					))
					.await;

					return Err(failure.into());
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// `GET` shorthand for [`Broker::api_call`].
	pub async fn get(&self, path: &str) -> Result<Value> {
		self.api_call(ApiMethod::Get, path, None).await
	}

	/// `POST` shorthand for [`Broker::api_call`].
	pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
		self.api_call(ApiMethod::Post, path, Some(body)).await
	}

	/// `PUT` shorthand for [`Broker::api_call`].
	pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
		self.api_call(ApiMethod::Put, path, Some(body)).await
	}

	/// `DELETE` shorthand for [`Broker::api_call`].
	pub async fn delete(&self, path: &str) -> Result<Value> {
		self.api_call(ApiMethod::Delete, path, None).await
	}

	async fn record_status(&self, status: ApiStatus) {
		if let Err(e) = self.session.record_api_status(&status).await {
			tracing::warn!(endpoint = %status.endpoint, error = %e, "Failed to record the API status.");
		}
	}

	async fn ensure_token(&self, kind: TokenKind) -> Result<TokenSecret> {
		if !self.tokens.is_valid(kind).await? {
			self.refresh(kind).await?;

			if !self.tokens.is_valid(kind).await? {
				tracing::warn!(%kind, "No valid token available for the request.");

				return Err(Error::TokenUnavailable { kind });
			}
		}

		self.tokens.get(kind, false).await?.ok_or(Error::TokenUnavailable { kind })
	}
}

fn is_token_expired(message: &str) -> bool {
	let message = message.to_lowercase();

	message.contains("token") && message.contains("expired")
}
