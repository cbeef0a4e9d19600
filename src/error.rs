//! Session-level error types shared across flows, stores, and caches.

// self
use crate::{_prelude::*, auth::TokenKind};

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Remote API answered with an error or an unreadable body; safe to retry later.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Automatic re-authentication failed earlier; a manual login is required.
	#[error("Authentication failed permanently; manual re-authentication is required.")]
	AuthenticationFailed,
	/// No usable token of the requested kind is stored, even after a refresh attempt.
	#[error("No valid {kind} token is available.")]
	TokenUnavailable {
		/// Token kind that was required.
		kind: TokenKind,
	},
	/// Remote API rejected the supplied account credentials.
	#[error("Remote API rejected the credentials: {reason}.")]
	InvalidCredentials {
		/// Remote-supplied reason string.
		reason: String,
	},
	/// The local request budget for the operation is exhausted.
	#[error("Request budget exhausted until {retry_at}.")]
	RateLimited {
		/// Instant at which the budget window resets.
		retry_at: OffsetDateTime,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// An endpoint path could not be joined onto the API base URL.
	#[error("Endpoint `{path}` cannot be resolved against the API base URL.")]
	InvalidEndpoint {
		/// Endpoint path that failed to resolve.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// No account credentials have been stored yet.
	#[error("No account credentials are stored.")]
	MissingAccount,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Remote API returned a non-success status.
	#[error("Remote API returned {status} for `{endpoint}`: {message}.")]
	Api {
		/// Endpoint path that was called.
		endpoint: String,
		/// HTTP status code.
		status: u16,
		/// Remote-supplied error message.
		message: String,
	},
	/// Remote API responded with JSON that does not match the expected shape.
	#[error("Remote API returned malformed JSON for `{endpoint}`.")]
	ResponseParse {
		/// Endpoint path that was called.
		endpoint: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code.
		status: u16,
	},
}
impl TransientError {
	/// Returns the HTTP status attached to the failure.
	pub fn status(&self) -> u16 {
		match self {
			Self::Api { status, .. } | Self::ResponseParse { status, .. } => *status,
		}
	}
}

/// Transport-level failures (DNS, TCP, TLS, timeout).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling `{endpoint}`.")]
	Network {
		/// Endpoint path that was called.
		endpoint: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint: endpoint.into(), source: Box::new(src) }
	}
}
