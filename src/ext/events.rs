//! Decoupled notifications about authentication and cached entity loads.

// self
use crate::_prelude::*;

/// Signal emitted by session flows.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
	/// Password authentication (manual or automatic) succeeded.
	AuthSucceeded {
		/// Company login that authenticated.
		company: String,
		/// Whether the login was triggered automatically after a failed refresh.
		automatic: bool,
	},
	/// Automatic re-authentication failed; the session now requires a manual login.
	AuthFailed {
		/// Company login that failed.
		company: String,
		/// Remote or local reason.
		reason: String,
	},
	/// A cached entity was (re)loaded from the remote API or saved by a caller.
	EntityLoaded {
		/// Cache identifier of the entity.
		identifier: String,
		/// Freshly stored data.
		data: Value,
	},
}

/// Receiver for [`SessionEvent`]s.
pub trait SessionEventSink
where
	Self: Send + Sync,
{
	/// Handles an event; implementations must not block.
	fn publish(&self, event: &SessionEvent);
}

/// Sink that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;
impl SessionEventSink for NoopEventSink {
	fn publish(&self, _: &SessionEvent) {}
}

/// Sink that keeps every event in memory; handy for tests and diagnostics pages.
#[derive(Debug, Default)]
pub struct RecordingEventSink(Mutex<Vec<SessionEvent>>);
impl RecordingEventSink {
	/// Returns a copy of the recorded events.
	pub fn events(&self) -> Vec<SessionEvent> {
		self.0.lock().clone()
	}
}
impl SessionEventSink for RecordingEventSink {
	fn publish(&self, event: &SessionEvent) {
		self.0.lock().push(event.clone());
	}
}
