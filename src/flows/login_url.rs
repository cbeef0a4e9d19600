//! One-time dashboard login URLs, rate limited locally per installation.

// self
use crate::{
	_prelude::*,
	flows::Broker,
	http::ApiHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	remote::LOGIN_HASH_PATH,
};

const COUNT_KEY: &str = "login_url:count";
const WINDOW_START_KEY: &str = "login_url:window_start";

#[derive(Deserialize)]
struct LoginHash {
	login_url: String,
}

impl<C> Broker<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Creates a one-time login URL for the remote dashboard, optionally returning to
	/// `back_url` afterwards.
	///
	/// Requests are counted against [`RemoteDescriptor::login_url_budget`]; once the budget is
	/// spent, [`Error::RateLimited`] reports when the window resets and no request is sent.
	///
	/// [`RemoteDescriptor::login_url_budget`]: crate::remote::RemoteDescriptor::login_url_budget
	pub async fn create_login_url(&self, back_url: Option<&str>) -> Result<String> {
		const KIND: FlowKind = FlowKind::LoginUrl;

		let span = FlowSpan::new(KIND, "create_login_url");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.consume_login_url_budget(OffsetDateTime::now_utc()).await?;

				let body = match back_url {
					Some(back_url) => serde_json::json!({ "back_url": back_url }),
					None => serde_json::json!({}),
				};
				let value = self.post(LOGIN_HASH_PATH, body).await?;
				let hash: LoginHash = serde_path_to_error::deserialize(value).map_err(|source| {
					crate::error::TransientError::ResponseParse {
						endpoint: LOGIN_HASH_PATH.into(),
						source,
						status: 200,
					}
				})?;

				Ok(hash.login_url)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn consume_login_url_budget(&self, now: OffsetDateTime) -> Result<()> {
		let budget = self.descriptor.login_url_budget;
		let started: Option<i64> = self.store.load(WINDOW_START_KEY).await?;
		let count: Option<u32> = self.store.load(COUNT_KEY).await?;
		let started = started.and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok());
		let (window_start, count) = match started {
			Some(start) if now - start < budget.window => (start, count.unwrap_or(0)),
			_ => (now, 0),
		};
		let window_end = window_start + budget.window;

		if count >= budget.max_requests {
			tracing::warn!(count, retry_at = %window_end, "Login URL budget exhausted.");

			return Err(Error::RateLimited { retry_at: window_end });
		}

		let ttl = Some(window_end - now);

		self.store.save(COUNT_KEY, &(count + 1), ttl).await?;
		self.store.save(WINDOW_START_KEY, &window_start.unix_timestamp(), ttl).await?;

		Ok(())
	}
}
