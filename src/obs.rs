//! Observability helpers for session flows.
//!
//! - Every flow runs inside a `tracing` span named `booking_session.flow` with `flow` and `stage`
//!   fields; absorbed failures are logged as events inside that span.
//! - Enable `metrics` to increment the `booking_session_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod spans;

pub use spans::*;

// self
use crate::_prelude::*;

/// Longest body excerpt written to logs.
pub const LOG_BODY_MAX_CHARS: usize = 200;

/// Session flow kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Refresh-token rotation.
	Refresh,
	/// Automatic password re-authentication after an irrecoverable refresh failure.
	Reauthenticate,
	/// Manual password (and two-factor) authentication.
	Authenticate,
	/// Authenticated API request.
	Request,
	/// One-time dashboard login URL generation.
	LoginUrl,
	/// Entity cache reload.
	CacheRestore,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::Reauthenticate => "reauthenticate",
			FlowKind::Authenticate => "authenticate",
			FlowKind::Request => "request",
			FlowKind::LoginUrl => "login_url",
			FlowKind::CacheRestore => "cache_restore",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Counts a flow outcome under `booking_session_flow_total`; a no-op without `metrics`.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"booking_session_flow_total",
		"flow" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Trims a response body for logging.
pub fn body_excerpt(body: &str) -> String {
	crate::session::truncate(body.trim(), LOG_BODY_MAX_CHARS)
}
