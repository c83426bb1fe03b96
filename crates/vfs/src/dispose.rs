//! Disposal lifecycle (design note, Open Question (b)): a `Disposable` runs a LIFO list of
//! teardown actions exactly once, and a [`BelateGuard`] can defer that teardown until every
//! in-flight borrower of the resource (e.g. an open `MemoryStream`) has let go.
//!
//! Modeled as a `parking_lot::Mutex`-guarded state machine rather than a lock-free CAS loop:
//! this corpus already reaches for `parking_lot` over hand-rolled atomics whenever more than
//! one field must change together (see `engine/src/lith.rs`'s `Arc<Mutex<..>>` handle state).

use std::sync::Arc;

use parking_lot::Mutex;

/// Something with teardown actions that must run, in reverse registration order, exactly
/// once — whether disposal is requested explicitly or the value is simply dropped.
pub trait Disposable {
	fn dispose(&self);
}

struct State {
	refcount: i64,
	dispose_requested: bool,
	disposed: bool,
	actions: Vec<Box<dyn FnOnce() + Send>>,
}

/// A disposal gate: disposal only actually runs once requested *and* every outstanding
/// [`BelateGuard`] has been released. Requesting dispose while guards are outstanding
/// "belates" (postpones) the teardown rather than running it concurrently with active use.
pub struct BelateDispose {
	state: Mutex<State>,
}

impl Default for BelateDispose {
	fn default() -> Self {
		Self::new()
	}
}

impl BelateDispose {
	#[must_use]
	pub fn new() -> Self {
		Self {
			state: Mutex::new(State {
				refcount: 0,
				dispose_requested: false,
				disposed: false,
				actions: Vec::new(),
			}),
		}
	}

	/// Registers a teardown action. Actions run in LIFO order when disposal finally fires.
	/// Registering after disposal has already run is a bug in the caller and is a no-op
	/// rather than a panic, so shutdown sequences don't need defensive ordering checks.
	pub fn defer(&self, action: impl FnOnce() + Send + 'static) {
		let mut state = self.state.lock();

		if state.disposed {
			return;
		}

		state.actions.push(Box::new(action));
	}

	/// Marks one borrower as active. While any guard from this call is alive, a disposal
	/// request will not run its teardown actions.
	#[must_use]
	pub fn enter(self: &Arc<Self>) -> BelateGuard {
		self.state.lock().refcount += 1;

		BelateGuard {
			owner: self.clone(),
		}
	}

	/// Requests disposal. Runs teardown immediately if no guard is outstanding; otherwise
	/// the last [`BelateGuard`] to drop runs it.
	pub fn request_dispose(&self) {
		let mut state = self.state.lock();
		state.dispose_requested = true;
		Self::finalize_locked(&mut state);
	}

	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.state.lock().disposed
	}

	#[must_use]
	pub fn is_dispose_requested(&self) -> bool {
		self.state.lock().dispose_requested
	}

	fn finalize_locked(state: &mut State) {
		if state.disposed || !state.dispose_requested || state.refcount > 0 {
			return;
		}

		state.disposed = true;
		let actions = std::mem::take(&mut state.actions);

		for action in actions.into_iter().rev() {
			action();
		}
	}

	fn release(&self) {
		let mut state = self.state.lock();
		state.refcount -= 1;
		Self::finalize_locked(&mut state);
	}
}

impl Disposable for BelateDispose {
	fn dispose(&self) {
		self.request_dispose();
	}
}

/// Held by a caller currently using a disposable resource. Dropping it releases the hold;
/// if disposal was requested while held, dropping the last guard runs the teardown.
pub struct BelateGuard {
	owner: Arc<BelateDispose>,
}

impl Drop for BelateGuard {
	fn drop(&mut self) {
		self.owner.release();
	}
}
