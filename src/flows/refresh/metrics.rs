// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh rotations.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	contended: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of refreshes that acquired the lock.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that ended with a valid token (rotated or already fresh).
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that ended without a rotated token.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes skipped because another holder owned the lock.
	pub fn contended(&self) -> u64 {
		self.contended.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_contended(&self) {
		self.contended.fetch_add(1, Ordering::Relaxed);
	}
}
