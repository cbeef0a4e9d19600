//! Shared helpers for flow implementations (request building, dispatch, response decoding).

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{TransientError, TransportError},
	flows::Broker,
	http::{ApiHttpClient, ApiMethod, ApiRequest, ApiResponse},
	obs,
};

/// Header carrying the company login on every remote call.
pub const COMPANY_HEADER: &str = "X-Company-Login";
/// Header carrying the access token on authenticated calls.
pub const TOKEN_HEADER: &str = "X-Token";

/// Token pair issued by login, two-factor confirmation, and refresh endpoints.
#[derive(Clone, Deserialize)]
pub(crate) struct TokenGrant {
	pub(crate) token: String,
	pub(crate) refresh_token: String,
	#[serde(default)]
	pub(crate) expires_in: Option<i64>,
}
impl TokenGrant {
	/// Expiry derived from `expires_in`, or `fallback` when absent or non-positive.
	pub(crate) fn expires_at(&self, now: OffsetDateTime, fallback: Duration) -> OffsetDateTime {
		now + self.expires_in.filter(|secs| *secs > 0).map(Duration::seconds).unwrap_or(fallback)
	}

	/// Both tokens carry the remote API token shape.
	pub(crate) fn is_well_formed(&self) -> bool {
		crate::auth::is_token_shaped(&self.token) && crate::auth::is_token_shaped(&self.refresh_token)
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant").field("expires_in", &self.expires_in).finish()
	}
}

#[derive(Deserialize)]
struct RemoteErrorBody {
	#[serde(default)]
	message: Option<String>,
}

impl<C> Broker<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Builds a request for `path` carrying the descriptor's timeout.
	pub(crate) fn build_request(&self, method: ApiMethod, path: &str) -> Result<ApiRequest> {
		let url = self.descriptor.endpoint(path)?;

		Ok(ApiRequest::new(method, url, self.descriptor.request_timeout_std()))
	}

	/// Sends `request`, mapping transport failures into [`TransportError`].
	pub(crate) async fn dispatch(&self, path: &str, request: ApiRequest) -> Result<ApiResponse> {
		let method = request.method;

		self.http_client.execute(request).await.map_err(|e| {
			tracing::warn!(endpoint = path, %method, error = %e, "Remote API call failed at the transport layer.");

			Error::from(TransportError::network(path, e))
		})
	}
}

/// Decodes a JSON response body; an empty body decodes as `null`.
pub(crate) fn decode<T>(path: &str, response: &ApiResponse) -> Result<T, TransientError>
where
	T: DeserializeOwned,
{
	let body: &[u8] =
		if response.body.iter().all(u8::is_ascii_whitespace) { b"null" } else { &response.body };
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
		TransientError::ResponseParse { endpoint: path.to_owned(), source, status: response.status }
	})
}

/// Extracts the remote `message` field, falling back to a trimmed body excerpt.
pub(crate) fn error_message(response: &ApiResponse) -> String {
	serde_json::from_slice::<RemoteErrorBody>(&response.body)
		.ok()
		.and_then(|body| body.message)
		.filter(|message| !message.trim().is_empty())
		.unwrap_or_else(|| obs::body_excerpt(&response.body_text()))
}

/// Logs a non-success response and converts it into [`TransientError::Api`].
pub(crate) fn api_failure(path: &str, response: &ApiResponse) -> TransientError {
	let message = error_message(response);

	tracing::warn!(
		endpoint = path,
		status = response.status,
		body = %obs::body_excerpt(&response.body_text()),
		"Remote API returned a non-success status."
	);

	TransientError::Api { endpoint: path.to_owned(), status: response.status, message }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response(status: u16, body: &str) -> ApiResponse {
		ApiResponse { status, body: body.as_bytes().to_vec() }
	}

	#[test]
	fn error_message_prefers_the_remote_message() {
		assert_eq!(
			error_message(&response(401, r#"{"code":401,"message":"Token Expired","data":[]}"#)),
			"Token Expired"
		);
		assert_eq!(error_message(&response(502, "  Bad gateway  ")), "Bad gateway");
		assert_eq!(error_message(&response(500, r#"{"message":""}"#)), r#"{"message":""}"#);
	}

	#[test]
	fn empty_bodies_decode_as_null() {
		let value: Value = decode("admin/bookings", &response(204, "")).expect("Decode should succeed.");

		assert_eq!(value, Value::Null);
	}

	#[test]
	fn decode_failures_carry_the_json_path() {
		let err = decode::<TokenGrant>("admin/auth", &response(200, r#"{"token":1}"#))
			.expect_err("Decode should fail.");

		match err {
			TransientError::ResponseParse { endpoint, source, status } => {
				assert_eq!(endpoint, "admin/auth");
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "token");
			},
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[test]
	fn grant_expiry_falls_back_for_missing_or_bogus_lifetimes() {
		let now = OffsetDateTime::UNIX_EPOCH;
		let fallback = Duration::hours(1);
		let grant = |expires_in| TokenGrant { token: String::new(), refresh_token: String::new(), expires_in };

		assert_eq!(grant(Some(120)).expires_at(now, fallback), now + Duration::seconds(120));
		assert_eq!(grant(Some(0)).expires_at(now, fallback), now + fallback);
		assert_eq!(grant(None).expires_at(now, fallback), now + fallback);
	}
}
