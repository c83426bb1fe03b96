//! The transactional file-operation engine (spec §4.8, C10): sessions, an
//! Estimate/Run/rollback state machine, and the concrete copy/move/delete/tree/batch
//! operations built on it.
//!
//! No direct teacher analogue exists for this module — the source VFS is read-mostly and
//! has no operation engine of its own. It follows the teacher's manual `Result`-returning,
//! `log`-facade idiom throughout rather than introducing a different error-handling style
//! for just this module.

mod file_ops;
mod session;
mod tree_ops;

pub use file_ops::{CopyFile, CreateDirectory, Delete, Move};
pub use session::{OperationSession, ProgressObserver, SessionConfig};
pub use tree_ops::{Batch, CopyTree, MoveTree, TransferTree};

use crate::error::{Error, ErrorKind, Result};

/// How a missing source path is handled by `Estimate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SrcPolicy {
	#[default]
	Unset,
	Throw,
	Skip,
}

/// How an already-occupied destination path is handled by `Estimate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DstPolicy {
	#[default]
	Unset,
	Throw,
	Skip,
	Overwrite,
}

/// Policy flags governing one session's operations. Source/destination handling are
/// mutually-exclusive choices, not independent bits, so they are small enums rather than
/// packed into a `bitflags!` mask a caller could set to an invalid combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationPolicy {
	pub src: SrcPolicy,
	pub dst: DstPolicy,
	/// `Run` performs an implicit `Estimate` first if not already estimated.
	pub estimate_on_run: bool,
	/// `Run` re-estimates even if already estimated.
	pub re_estimate_on_run: bool,
	/// A failed operation signals the session's shared cancellation flag, aborting siblings.
	pub cancel_on_error: bool,
	pub omit_mounted_packages: bool,
	/// A `Batch`/tree operation runs every child even after one fails, raising an aggregate
	/// error at the end instead of stopping at the first failure.
	pub batch_continue_on_error: bool,
	/// A fatal policy violation in `Estimate` sets state to `Error` without returning `Err`.
	pub suppress_exception: bool,
	/// Every buffered state/progress event is additionally logged via `log::debug!`.
	pub log_events: bool,
	pub dispatch_events: bool,
}

impl Default for OperationPolicy {
	fn default() -> Self {
		Self {
			src: SrcPolicy::Skip,
			dst: DstPolicy::Throw,
			estimate_on_run: false,
			re_estimate_on_run: false,
			cancel_on_error: false,
			omit_mounted_packages: true,
			batch_continue_on_error: false,
			suppress_exception: false,
			log_events: true,
			dispatch_events: true,
		}
	}
}

/// One operation's lifecycle state. `Error` carries the kind of the failure that produced
/// it, so `Operation::assert_successful`'s default body needs no separate stashed-error
/// field to rethrow from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
	Initialized,
	Estimating,
	Estimated,
	Running,
	Completed,
	Skipped,
	Cancelled,
	Error(ErrorKind),
}

/// A buffered or dispatched notification from an operation's lifecycle.
#[derive(Debug, Clone)]
pub enum OperationEvent {
	State { op: &'static str, state: OperationState },
	Progress { op: &'static str, bytes_done: u64, bytes_total: u64 },
}

/// One schedulable, cancelable, estimate-then-run file operation (spec §4.8).
///
/// Object-safe so sessions and batches can hold a heterogeneous `Vec<Box<dyn Operation>>`.
pub trait Operation: Send {
	/// Moves `Initialized → Estimating → Estimated`: computes the total byte count,
	/// validates the source, and checks the destination against the current policy.
	fn estimate(&mut self, session: &OperationSession) -> Result<()>;

	/// Requires `Estimated` (or re-estimates first per policy). Streams/renames/deletes,
	/// transitioning to `Completed`, `Cancelled`, or `Error`.
	fn run(&mut self, session: &OperationSession) -> Result<()>;

	/// A compensating operation that would undo this one's effect, or `None` if rollback
	/// isn't possible (the common case: a delete of a pre-existing file has nothing to
	/// restore it from).
	fn create_rollback(&self) -> Option<Box<dyn Operation>>;

	fn state(&self) -> OperationState;

	#[must_use]
	fn can_rollback(&self) -> bool {
		self.create_rollback().is_some()
	}

	/// Rethrows the original failure if `Error`, raises `Cancelled` if cancelled; a no-op
	/// otherwise.
	fn assert_successful(&self) -> Result<()> {
		match self.state() {
			OperationState::Error(kind) => Err(Error::new(kind)),
			OperationState::Cancelled => Err(Error::cancelled()),
			_ => Ok(()),
		}
	}
}

/// Checks the session's shared cancel flag, returning `Ok(true)` if the caller should stop.
pub(crate) fn cancelled(session: &OperationSession) -> bool {
	session.is_cancelled()
}
