//! Remote-session lifecycle for a booking API: encrypted token storage, lock-guarded refresh
//! rotation, fallback re-authentication, and read-through entity caching on top of a shared
//! key-value store.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod error;
pub mod ext;
pub mod flows;
pub mod http;
pub mod obs;
pub mod remote;
pub mod session;
pub mod store;
pub mod tokens;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		auth::{AesCbcCodec, Codec, CodecKeys},
		flows::Broker,
		http::{ApiHttpClient, ApiRequest, ApiResponse, HttpFuture},
		remote::RemoteDescriptor,
		store::{KvStore, MemoryStore},
	};

	/// Base URL every scripted broker points at.
	pub const TEST_API_BASE: &str = "https://user-api.booking.test/";
	/// Company login used by test fixtures.
	pub const TEST_COMPANY: &str = "acme-salon";

	/// Broker type alias used by unit tests.
	pub type ScriptedBroker = Broker<ScriptedHttpClient>;

	/// Builds a 64-character hex token by repeating `seed`.
	pub fn hex_token(seed: char) -> String {
		seed.to_string().repeat(64)
	}

	/// Codec keyed with fixed test secrets.
	pub fn test_codec() -> AesCbcCodec {
		AesCbcCodec::new(CodecKeys::new("test-secret", "test-legacy-secret"))
	}

	/// Failure produced when a scripted route is missing or explicitly fails.
	#[derive(Debug, ThisError)]
	pub enum ScriptedTransportError {
		/// No reply has been scripted for the path.
		#[error("No scripted reply for `{0}`.")]
		Unroutable(String),
		/// The route was scripted to fail at the transport layer.
		#[error("Scripted transport failure for `{0}`.")]
		Failed(String),
	}

	/// Reply returned by [`ScriptedHttpClient`] for a path.
	#[derive(Clone, Debug)]
	pub enum ScriptedReply {
		/// HTTP response with a JSON body.
		Json {
			/// Status code.
			status: u16,
			/// Response body.
			body: serde_json::Value,
		},
		/// Transport-level failure (timeout, connection reset).
		Transport,
	}

	/// In-process transport that replays scripted replies per path and records each request.
	///
	/// Replies for a path are consumed in order; the final reply repeats for later calls.
	#[derive(Debug, Default)]
	pub struct ScriptedHttpClient {
		routes: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
		calls: Mutex<Vec<ApiRequest>>,
	}
	impl ScriptedHttpClient {
		/// Queues a JSON reply for `path` (without a leading slash).
		pub fn reply(&self, path: &str, status: u16, body: serde_json::Value) -> &Self {
			self.push(path, ScriptedReply::Json { status, body })
		}

		/// Queues a transport failure for `path`.
		pub fn fail(&self, path: &str) -> &Self {
			self.push(path, ScriptedReply::Transport)
		}

		/// Returns how many requests hit `path`.
		pub fn calls_to(&self, path: &str) -> usize {
			self.calls.lock().iter().filter(|request| route_of(request) == path).count()
		}

		/// Returns the total number of requests issued.
		pub fn total_calls(&self) -> usize {
			self.calls.lock().len()
		}

		/// Returns a copy of every recorded request.
		pub fn requests(&self) -> Vec<ApiRequest> {
			self.calls.lock().clone()
		}

		fn push(&self, path: &str, reply: ScriptedReply) -> &Self {
			self.routes.lock().entry(path.to_owned()).or_default().push_back(reply);

			self
		}

		fn next_reply(&self, path: &str) -> Option<ScriptedReply> {
			let mut routes = self.routes.lock();
			let queue = routes.get_mut(path)?;

			if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() }
		}
	}
	impl ApiHttpClient for ScriptedHttpClient {
		type TransportError = ScriptedTransportError;

		fn execute(&self, request: ApiRequest) -> HttpFuture<'_, Self::TransportError> {
			let path = route_of(&request);

			self.calls.lock().push(request);

			let reply = self.next_reply(&path);

			Box::pin(async move {
				match reply {
					Some(ScriptedReply::Json { status, body }) =>
						Ok(ApiResponse { status, body: body.to_string().into_bytes() }),
					Some(ScriptedReply::Transport) => Err(ScriptedTransportError::Failed(path)),
					None => Err(ScriptedTransportError::Unroutable(path)),
				}
			})
		}
	}

	fn route_of(request: &ApiRequest) -> String {
		request.url.path().trim_start_matches('/').to_owned()
	}

	/// Builds a broker over an in-memory store and a scripted transport.
	pub fn build_scripted_broker() -> (ScriptedBroker, Arc<MemoryStore>, Arc<ScriptedHttpClient>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn KvStore> = store_backend.clone();
		let codec: Arc<dyn Codec> = Arc::new(test_codec());
		let descriptor = RemoteDescriptor::builder(
			Url::parse(TEST_API_BASE).expect("Test API base URL should parse."),
		)
		.build()
		.expect("Test descriptor should build.");
		let http_client = Arc::new(ScriptedHttpClient::default());
		let broker = Broker::with_http_client(store, codec, descriptor, http_client.clone());

		(broker, store_backend, http_client)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
