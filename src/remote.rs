//! Remote booking API descriptor: base URL, endpoint paths, timeouts, and local budgets.

// self
use crate::{_prelude::*, error::ConfigError};

/// Password login endpoint.
pub const AUTH_PATH: &str = "admin/auth";
/// Two-factor confirmation endpoint.
pub const TWO_FACTOR_PATH: &str = "admin/auth/2fa";
/// SMS code dispatch endpoint for two-factor logins.
pub const SMS_PATH: &str = "admin/auth/sms";
/// Refresh-token exchange endpoint.
pub const REFRESH_PATH: &str = "admin/auth/refresh-token";
/// One-time dashboard login URL endpoint.
pub const LOGIN_HASH_PATH: &str = "admin/auth/create-login-hash";

/// Request budget for an operation, counted over a window that starts with the first request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBudget {
	/// Maximum requests per window.
	pub max_requests: u32,
	/// Window length.
	pub window: Duration,
}

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum RemoteDescriptorError {
	/// The API base must use HTTPS (loopback hosts excepted).
	#[error("The API base URL must use HTTPS: {url}.")]
	InsecureBase {
		/// Base URL that failed validation.
		url: String,
	},
	/// The API base cannot carry a path (e.g. `mailto:` URLs).
	#[error("The API base URL cannot be used as a base: {url}.")]
	CannotBeABase {
		/// Base URL that failed validation.
		url: String,
	},
	/// A duration setting was zero or negative.
	#[error("The {setting} setting must be positive.")]
	NonPositiveDuration {
		/// Which setting failed validation.
		setting: &'static str,
	},
	/// The login URL budget allows no requests.
	#[error("The login URL budget must allow at least one request.")]
	EmptyBudget,
}

/// Immutable descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
	/// API base URL; always ends with `/`.
	pub api_base: Url,
	/// Timeout applied to every outbound request.
	pub request_timeout: Duration,
	/// Access-token lifetime assumed when the API omits `expires_in`.
	pub default_token_ttl: Duration,
	/// Lifetime of the refresh lock.
	pub refresh_lock_ttl: Duration,
	/// Budget for one-time login URL generation.
	pub login_url_budget: RequestBudget,
}
impl RemoteDescriptor {
	/// Default request timeout.
	pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(15);
	/// Default token lifetime.
	pub const DEFAULT_TOKEN_TTL: Duration = Duration::seconds(3600);
	/// Default refresh lock lifetime.
	pub const DEFAULT_REFRESH_LOCK_TTL: Duration = Duration::seconds(10);
	/// Default login URL budget.
	pub const DEFAULT_LOGIN_URL_BUDGET: RequestBudget =
		RequestBudget { max_requests: 3, window: Duration::hours(1) };

	/// Creates a new builder for the provided API base.
	pub fn builder(api_base: Url) -> RemoteDescriptorBuilder {
		RemoteDescriptorBuilder::new(api_base)
	}

	/// Resolves an endpoint path against the API base.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		self.api_base.join(path.trim_start_matches('/')).map_err(|source| {
			ConfigError::InvalidEndpoint { path: path.to_owned(), source }
		})
	}

	/// Request timeout as a standard-library duration for transports.
	pub fn request_timeout_std(&self) -> std::time::Duration {
		self.request_timeout.try_into().unwrap_or(std::time::Duration::from_secs(15))
	}

	fn validate(&self) -> Result<(), RemoteDescriptorError> {
		if self.api_base.cannot_be_a_base() {
			return Err(RemoteDescriptorError::CannotBeABase { url: self.api_base.to_string() });
		}
		if self.api_base.scheme() != "https" && !is_loopback(&self.api_base) {
			return Err(RemoteDescriptorError::InsecureBase { url: self.api_base.to_string() });
		}

		for (setting, value) in [
			("request_timeout", self.request_timeout),
			("default_token_ttl", self.default_token_ttl),
			("refresh_lock_ttl", self.refresh_lock_ttl),
			("login_url_budget.window", self.login_url_budget.window),
		] {
			if !value.is_positive() {
				return Err(RemoteDescriptorError::NonPositiveDuration { setting });
			}
		}

		if self.login_url_budget.max_requests == 0 {
			return Err(RemoteDescriptorError::EmptyBudget);
		}

		Ok(())
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain == "localhost",
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

/// Builder for [`RemoteDescriptor`] values.
#[derive(Debug)]
pub struct RemoteDescriptorBuilder {
	/// API base URL.
	pub api_base: Url,
	/// Outbound request timeout.
	pub request_timeout: Duration,
	/// Fallback access-token lifetime.
	pub default_token_ttl: Duration,
	/// Refresh lock lifetime.
	pub refresh_lock_ttl: Duration,
	/// Login URL budget.
	pub login_url_budget: RequestBudget,
}
impl RemoteDescriptorBuilder {
	/// Creates a builder seeded with defaults.
	pub fn new(api_base: Url) -> Self {
		Self {
			api_base,
			request_timeout: RemoteDescriptor::DEFAULT_REQUEST_TIMEOUT,
			default_token_ttl: RemoteDescriptor::DEFAULT_TOKEN_TTL,
			refresh_lock_ttl: RemoteDescriptor::DEFAULT_REFRESH_LOCK_TTL,
			login_url_budget: RemoteDescriptor::DEFAULT_LOGIN_URL_BUDGET,
		}
	}

	/// Overrides the outbound request timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the fallback access-token lifetime.
	pub fn default_token_ttl(mut self, ttl: Duration) -> Self {
		self.default_token_ttl = ttl;

		self
	}

	/// Overrides the refresh lock lifetime.
	pub fn refresh_lock_ttl(mut self, ttl: Duration) -> Self {
		self.refresh_lock_ttl = ttl;

		self
	}

	/// Overrides the login URL budget.
	pub fn login_url_budget(mut self, max_requests: u32, window: Duration) -> Self {
		self.login_url_budget = RequestBudget { max_requests, window };

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<RemoteDescriptor, RemoteDescriptorError> {
		let mut api_base = self.api_base;

		if !api_base.path().ends_with('/') {
			let path = format!("{}/", api_base.path());

			api_base.set_path(&path);
		}

		let descriptor = RemoteDescriptor {
			api_base,
			request_timeout: self.request_timeout,
			default_token_ttl: self.default_token_ttl,
			refresh_lock_ttl: self.refresh_lock_ttl,
			login_url_budget: self.login_url_budget,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}
