//! An `OperationSession` (spec §4.8) carries everything an `Operation` needs to run: the
//! shared cancellation flag, the policy, the buffered event log, an optional progress
//! observer, and the block pool copy buffers are drawn from.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{OperationEvent, OperationPolicy, OperationState};
use crate::pool::BlockPool;

/// Receives buffered state events and unbuffered progress events from a session's
/// operations, when `OperationPolicy::dispatch_events` is set.
pub trait ProgressObserver: Send + Sync {
	fn on_operation_event(&self, event: &OperationEvent);
}

#[derive(Clone)]
pub struct SessionConfig {
	pub policy: OperationPolicy,
	/// Bytes between progress events for a single copy.
	pub progress_interval: u64,
	pub observer: Option<Arc<dyn ProgressObserver>>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			policy: OperationPolicy::default(),
			progress_interval: 64 * 1024,
			observer: None,
		}
	}
}

pub struct OperationSession {
	cancel: Arc<AtomicBool>,
	policy: OperationPolicy,
	events: Mutex<Vec<OperationEvent>>,
	observer: Option<Arc<dyn ProgressObserver>>,
	pool: Arc<BlockPool>,
	progress_interval: u64,
}

impl OperationSession {
	#[must_use]
	pub fn new(pool: Arc<BlockPool>, config: SessionConfig) -> Arc<Self> {
		Arc::new(Self {
			cancel: Arc::new(AtomicBool::new(false)),
			policy: config.policy,
			events: Mutex::new(Vec::new()),
			observer: config.observer,
			pool,
			progress_interval: config.progress_interval.max(1),
		})
	}

	#[must_use]
	pub fn policy(&self) -> OperationPolicy {
		self.policy
	}

	#[must_use]
	pub fn pool(&self) -> &Arc<BlockPool> {
		&self.pool
	}

	#[must_use]
	pub fn progress_interval(&self) -> u64 {
		self.progress_interval
	}

	/// Signals cancellation. Running operations observe this at their next child/buffer
	/// boundary; in-flight buffers complete before the operation transitions to `Cancelled`.
	pub fn cancel(&self) {
		self.cancel.store(true, Ordering::SeqCst);
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.cancel.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn events(&self) -> Vec<OperationEvent> {
		self.events.lock().clone()
	}

	pub(crate) fn record_state(&self, op: &'static str, state: OperationState) {
		if self.policy.log_events {
			log::debug!("operation {op}: {state:?}");
		}

		self.events.lock().push(OperationEvent::State { op, state });

		if self.policy.dispatch_events {
			if let Some(observer) = &self.observer {
				observer.on_operation_event(&OperationEvent::State { op, state });
			}
		}
	}

	pub(crate) fn record_progress(&self, op: &'static str, bytes_done: u64, bytes_total: u64) {
		if self.policy.log_events {
			log::trace!("operation {op}: {bytes_done}/{bytes_total} bytes");
		}

		if self.policy.dispatch_events {
			if let Some(observer) = &self.observer {
				observer.on_operation_event(&OperationEvent::Progress {
					op,
					bytes_done,
					bytes_total,
				});
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::pool::BlockPoolConfig;

	#[test]
	fn cancel_flag_round_trips() {
		let session = OperationSession::new(
			BlockPool::new(BlockPoolConfig {
				block_size: 64,
				block_count: 4,
			}),
			SessionConfig::default(),
		);

		assert!(!session.is_cancelled());
		session.cancel();
		assert!(session.is_cancelled());
	}

	#[test]
	fn state_events_are_buffered() {
		let session = OperationSession::new(
			BlockPool::new(BlockPoolConfig {
				block_size: 64,
				block_count: 4,
			}),
			SessionConfig::default(),
		);

		session.record_state("CopyFile", OperationState::Estimated);
		assert_eq!(session.events().len(), 1);
	}
}
