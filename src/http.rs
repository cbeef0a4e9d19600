//! Transport primitives for remote API calls.
//!
//! [`ApiHttpClient`] is the crate's only dependency on an HTTP stack. Flows build an
//! [`ApiRequest`] (method, resolved URL, headers, optional JSON body, timeout) and receive a raw
//! [`ApiResponse`]; status interpretation and JSON decoding stay in the flows so every transport
//! behaves the same.

// std
use std::time::Duration as StdDuration;
// self
use crate::_prelude::*;

/// Boxed future returned by [`ApiHttpClient::execute`].
pub type HttpFuture<'a, E> = Pin<Box<dyn Future<Output = Result<ApiResponse, E>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing remote API calls.
///
/// Implementations must enforce [`ApiRequest::timeout`] and report timeouts as transport
/// errors. They must not follow redirects or retry on their own; retry policy belongs to the
/// request executor.
pub trait ApiHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Executes a single request.
	fn execute(&self, request: ApiRequest) -> HttpFuture<'_, Self::TransportError>;
}

/// HTTP methods used against the remote API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiMethod {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `DELETE`
	Delete,
}
impl ApiMethod {
	/// Returns the method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			ApiMethod::Get => "GET",
			ApiMethod::Post => "POST",
			ApiMethod::Put => "PUT",
			ApiMethod::Delete => "DELETE",
		}
	}
}
impl Display for ApiMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully resolved outbound request.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: ApiMethod,
	/// Absolute request URL (query included).
	pub url: Url,
	/// Extra request headers.
	pub headers: BTreeMap<String, String>,
	/// Optional JSON body.
	pub body: Option<Value>,
	/// Hard timeout for the whole exchange.
	pub timeout: StdDuration,
}
impl ApiRequest {
	/// Creates a request without headers or body.
	pub fn new(method: ApiMethod, url: Url, timeout: StdDuration) -> Self {
		Self { method, url, headers: BTreeMap::new(), body: None, timeout }
	}

	/// Adds a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Attaches a JSON body.
	pub fn with_body(mut self, body: Option<Value>) -> Self {
		self.body = body;

		self
	}

	/// Returns a header value, if present.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).map(String::as_str)
	}
}

/// Raw response returned by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Lossy UTF-8 view of the body, for logging.
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a client that never follows redirects.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiHttpClient for ReqwestHttpClient {
	type TransportError = ReqwestError;

	fn execute(&self, request: ApiRequest) -> HttpFuture<'_, Self::TransportError> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				ApiMethod::Get => reqwest::Method::GET,
				ApiMethod::Post => reqwest::Method::POST,
				ApiMethod::Put => reqwest::Method::PUT,
				ApiMethod::Delete => reqwest::Method::DELETE,
			};
			let mut builder = client.request(method, request.url).timeout(request.timeout);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = &request.body {
				builder = builder.json(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let body = response.bytes().await?.to_vec();

			Ok::<_, ReqwestError>(ApiResponse { status, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn success_covers_the_2xx_range() {
		assert!(ApiResponse { status: 200, body: Vec::new() }.is_success());
		assert!(ApiResponse { status: 204, body: Vec::new() }.is_success());
		assert!(!ApiResponse { status: 301, body: Vec::new() }.is_success());
		assert!(!ApiResponse { status: 401, body: Vec::new() }.is_success());
	}

	#[test]
	fn request_builder_collects_headers() {
		let url = Url::parse("https://user-api.booking.test/admin").expect("URL should parse.");
		let request = ApiRequest::new(ApiMethod::Get, url, StdDuration::from_secs(15))
			.with_header("X-Company-Login", "acme");

		assert_eq!(request.header("X-Company-Login"), Some("acme"));
		assert_eq!(request.header("X-Token"), None);
		assert_eq!(request.method.to_string(), "GET");
	}
}
