//! Read-through entity cache over the shared [`KvStore`].
//!
//! Each entity keeps two tiers: a persisted [`Snapshot`] without TTL that survives restarts, and
//! ephemeral entries bounded by the entity's freshness threshold. Writers always persist the
//! snapshot before touching the ephemeral tier.

pub mod entities;

pub use entities::*;

// self
use crate::{
	_prelude::*,
	ext::{NoopEventSink, SessionEvent, SessionEventSink},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::KvStore,
};

/// Freshness threshold applied when an entity does not override it.
pub const DEFAULT_FRESHNESS_THRESHOLD: Duration = Duration::minutes(5);

/// Boxed future returned by [`EntitySource::fetch`].
pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + 'a + Send>>;

/// Remote resource that can be cached by an [`EntityCache`].
pub trait EntitySource
where
	Self: Send + Sync,
{
	/// Stable identifier used in storage keys.
	fn identifier(&self) -> &str;

	/// Fetches the current data from the remote API.
	fn fetch(&self) -> SourceFuture<'_>;

	/// Reshapes fetched data before it is stored.
	fn process_data(&self, data: Value) -> Value {
		data
	}

	/// Maximum snapshot age for expiration-aware reads.
	fn freshness_threshold(&self) -> Duration {
		DEFAULT_FRESHNESS_THRESHOLD
	}

	/// Called whenever new data has been stored.
	fn on_loaded(&self, _data: &Value) {}
}

/// Persisted entity data with the instant it was stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
	/// Stored data.
	pub data: Value,
	/// When the data was stored.
	#[serde(with = "time::serde::timestamp")]
	pub updated_at_utc: OffsetDateTime,
}
impl Snapshot {
	/// Age of the snapshot at `now`.
	pub fn age_at(&self, now: OffsetDateTime) -> Duration {
		now - self.updated_at_utc
	}

	/// Whether the snapshot is older than `threshold` at `now`.
	pub fn is_stale_at(&self, now: OffsetDateTime, threshold: Duration) -> bool {
		self.age_at(now) > threshold
	}
}

/// Two-tier cache for one [`EntitySource`].
pub struct EntityCache<S> {
	source: S,
	store: Arc<dyn KvStore>,
	events: Arc<dyn SessionEventSink>,
}
impl<S> EntityCache<S>
where
	S: EntitySource,
{
	/// Creates a cache for `source` over `store`.
	pub fn new(source: S, store: Arc<dyn KvStore>) -> Self {
		Self { source, store, events: Arc::new(NoopEventSink) }
	}

	/// Replaces the event sink notified after each load.
	pub fn with_event_sink(mut self, events: Arc<dyn SessionEventSink>) -> Self {
		self.events = events;

		self
	}

	/// Returns the wrapped source.
	pub fn source(&self) -> &S {
		&self.source
	}

	/// Key of the ephemeral entry for the given read mode.
	pub fn ephemeral_key(&self, has_expiration: bool) -> String {
		let mode = if has_expiration { "expiring" } else { "any" };

		format!("cache:{}:{mode}", self.source.identifier())
	}

	/// Key of the persisted snapshot.
	pub fn snapshot_key(&self) -> String {
		format!("snapshot:{}", self.source.identifier())
	}

	/// Returns cached data without contacting the remote API.
	///
	/// With `has_expiration`, a snapshot older than the freshness threshold reads as `None` so
	/// the caller knows to [`restore`](Self::restore). Without it, data of any age is returned.
	pub async fn all(&self, has_expiration: bool) -> Result<Option<Value>> {
		let ephemeral_key = self.ephemeral_key(has_expiration);

		if let Some(data) = self.store.get(&ephemeral_key).await? {
			return Ok(Some(data));
		}

		let Some(snapshot) = self.snapshot().await? else {
			return Ok(None);
		};
		let now = OffsetDateTime::now_utc();
		let threshold = self.source.freshness_threshold();

		if has_expiration && snapshot.is_stale_at(now, threshold) {
			tracing::debug!(entity = self.source.identifier(), "Cached snapshot is stale.");

			return Ok(None);
		}

		let ttl = if has_expiration { threshold - snapshot.age_at(now) } else { threshold };

		if ttl.is_positive() {
			self.store.set(&ephemeral_key, snapshot.data.clone(), Some(ttl)).await?;
		}

		Ok(Some(snapshot.data))
	}

	/// Re-fetches the entity, bypassing both tiers, and stores the result.
	pub async fn restore(&self) -> Result<Value> {
		const KIND: FlowKind = FlowKind::CacheRestore;

		let span = FlowSpan::new(KIND, "restore");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let data = self.source.fetch().await?;
				let snapshot = self.save(data).await?;

				Ok(snapshot.data)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(e) => {
				tracing::warn!(entity = self.source.identifier(), error = %e, "Entity restore failed.");
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	/// Stores externally supplied data exactly as [`restore`](Self::restore) would.
	pub async fn save(&self, data: Value) -> Result<Snapshot> {
		let snapshot = Snapshot {
			data: self.source.process_data(data),
			updated_at_utc: OffsetDateTime::now_utc(),
		};
		let ttl = Some(self.source.freshness_threshold());

		self.store.save(&self.snapshot_key(), &snapshot, None).await?;

		for has_expiration in [true, false] {
			self.store.set(&self.ephemeral_key(has_expiration), snapshot.data.clone(), ttl).await?;
		}

		self.source.on_loaded(&snapshot.data);
		self.events.publish(&SessionEvent::EntityLoaded {
			identifier: self.source.identifier().to_owned(),
			data: snapshot.data.clone(),
		});

		Ok(snapshot)
	}

	/// Reads a nested value by dotted path; `:` may stand in for `.`.
	///
	/// Array elements are addressed by index. Missing paths and stale data yield `default`.
	pub async fn search(&self, key: &str, default: Value) -> Result<Value> {
		let Some(data) = self.all(true).await? else {
			return Ok(default);
		};

		Ok(lookup(&data, key).cloned().unwrap_or(default))
	}

	/// Returns the persisted snapshot, if any.
	pub async fn snapshot(&self) -> Result<Option<Snapshot>> {
		Ok(self.store.load(&self.snapshot_key()).await?)
	}
}
impl<S> Debug for EntityCache<S>
where
	S: EntitySource,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EntityCache").field("identifier", &self.source.identifier()).finish()
	}
}

fn lookup<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
	key.split(['.', ':']).filter(|segment| !segment.is_empty()).try_fold(data, |node, segment| {
		match node {
			Value::Object(map) => map.get(segment),
			Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
			_ => None,
		}
	})
}
