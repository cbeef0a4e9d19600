//! Cached remote entities backed by the broker's authenticated API calls.

// self
use crate::{
	_prelude::*,
	cache::{EntitySource, SourceFuture},
	flows::Broker,
	http::ApiHttpClient,
};

/// Remote path listing the plan's usage limits.
pub const PLAN_LIMITS_PATH: &str = "admin/tariff/limits";
/// Remote path describing the company account.
pub const COMPANY_INFO_PATH: &str = "admin/company";

/// Usage limits of the company's subscription plan, keyed by limit key.
pub struct PlanLimits<C>
where
	C: ?Sized + ApiHttpClient,
{
	broker: Arc<Broker<C>>,
}
impl<C> PlanLimits<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Creates the entity over a shared broker.
	pub fn new(broker: Arc<Broker<C>>) -> Self {
		Self { broker }
	}
}
impl<C> EntitySource for PlanLimits<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn identifier(&self) -> &str {
		"plan_limits"
	}

	fn fetch(&self) -> SourceFuture<'_> {
		Box::pin(self.broker.get(PLAN_LIMITS_PATH))
	}

	/// Turns `[{"key": "sms", ...}, ...]` into `{"sms": {...}, ...}`; other shapes pass through.
	fn process_data(&self, data: Value) -> Value {
		let Value::Array(items) = data else {
			return data;
		};

		Value::Object(
			items
				.into_iter()
				.filter_map(|item| {
					let key = item.get("key")?.as_str()?.to_owned();

					Some((key, item))
				})
				.collect(),
		)
	}
}

/// Company profile; changes rarely, so snapshots stay fresh for a day.
pub struct CompanyInfo<C>
where
	C: ?Sized + ApiHttpClient,
{
	broker: Arc<Broker<C>>,
}
impl<C> CompanyInfo<C>
where
	C: ?Sized + ApiHttpClient,
{
	/// Creates the entity over a shared broker.
	pub fn new(broker: Arc<Broker<C>>) -> Self {
		Self { broker }
	}
}
impl<C> EntitySource for CompanyInfo<C>
where
	C: ?Sized + ApiHttpClient,
{
	fn identifier(&self) -> &str {
		"company_info"
	}

	fn fetch(&self) -> SourceFuture<'_> {
		Box::pin(self.broker.get(COMPANY_INFO_PATH))
	}

	fn freshness_threshold(&self) -> Duration {
		Duration::days(1)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{AccountCredentials, TokenKind},
		cache::EntityCache,
	};

	async fn authenticated_broker() -> (Arc<ScriptedBroker>, Arc<ScriptedHttpClient>) {
		let (broker, _, http) = build_scripted_broker();

		broker
			.tokens
			.set_pair(
				TokenKind::Admin,
				&hex_token('a'),
				&hex_token('b'),
				OffsetDateTime::now_utc() + Duration::minutes(10),
			)
			.await
			.expect("Admin tokens should persist.");
		broker
			.credentials
			.save(&AccountCredentials::new(TEST_COMPANY, "owner", "pw"))
			.await
			.expect("Credentials should persist.");

		(Arc::new(broker), http)
	}

	#[tokio::test]
	async fn plan_limits_are_keyed_by_limit() {
		let (broker, http) = authenticated_broker().await;

		http.reply(
			PLAN_LIMITS_PATH,
			200,
			serde_json::json!([
				{ "key": "sms_limit", "total": 100, "rest": 40 },
				{ "key": "provider_limit", "total": 5, "rest": 2 },
				{ "total": 1 },
			]),
		);

		let cache = EntityCache::new(PlanLimits::new(broker.clone()), broker.store.clone());
		let limits = cache.restore().await.expect("Restore should succeed.");

		assert_eq!(limits["sms_limit"]["rest"], Value::from(40));
		assert_eq!(limits.as_object().map(|map| map.len()), Some(2));
		assert_eq!(
			cache.search("provider_limit:total", Value::Null).await.expect("Search."),
			Value::from(5)
		);
		assert_eq!(http.calls_to(PLAN_LIMITS_PATH), 1);
	}

	#[tokio::test]
	async fn company_info_uses_a_day_threshold() {
		let (broker, http) = authenticated_broker().await;

		http.reply(COMPANY_INFO_PATH, 200, serde_json::json!({ "name": "Acme Salon" }));

		let cache = EntityCache::new(CompanyInfo::new(broker.clone()), broker.store.clone());

		assert_eq!(cache.source().freshness_threshold(), Duration::days(1));

		cache.restore().await.expect("Restore should succeed.");

		assert_eq!(
			cache.search("name", Value::Null).await.expect("Search should succeed."),
			Value::from("Acme Salon")
		);
	}

	#[tokio::test]
	async fn restore_surfaces_remote_failures() {
		let (broker, http) = authenticated_broker().await;

		http.reply(COMPANY_INFO_PATH, 500, serde_json::json!({ "message": "Boom" }));

		let cache = EntityCache::new(CompanyInfo::new(broker.clone()), broker.store.clone());

		assert!(cache.restore().await.is_err());
		assert_eq!(cache.snapshot().await.expect("Read should succeed."), None);
	}
}
