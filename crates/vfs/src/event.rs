//! Observer handles, event kinds, and dispatchers (spec §4.1 `Observe`, §5, §6).
//!
//! Observer lists are copy-on-write for dispatch (spec §5): `notify` clones the current
//! `Vec<Arc<Registration>>` — cheap, since it's a vector of `Arc`s — so a concurrent
//! `add`/dispose never blocks or races a live dispatch pass.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::glob::Pattern;
use crate::path::VPathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
	Create,
	Delete,
	Change,
	Rename { from: VPathBuf },
}

#[derive(Debug, Clone)]
pub struct Event {
	pub path: VPathBuf,
	pub kind: EventKind,
}

impl Event {
	#[must_use]
	pub fn create(path: VPathBuf) -> Self {
		Self {
			path,
			kind: EventKind::Create,
		}
	}

	#[must_use]
	pub fn delete(path: VPathBuf) -> Self {
		Self {
			path,
			kind: EventKind::Delete,
		}
	}

	#[must_use]
	pub fn change(path: VPathBuf) -> Self {
		Self {
			path,
			kind: EventKind::Change,
		}
	}

	/// Rewrites `self.path` (e.g. when bridging a sub-mount's events into the virtual
	/// filesystem's namespace); the `from` field of a `Rename` event is rewritten too.
	#[must_use]
	pub fn rebase(mut self, new_path: VPathBuf, new_from: Option<VPathBuf>) -> Self {
		self.path = new_path;

		if let (EventKind::Rename { from }, Some(nf)) = (&mut self.kind, new_from) {
			*from = nf;
		}

		self
	}
}

/// Receives events from an [`crate::fs_trait::FileSystem::observe`] subscription.
pub trait Observer: Send + Sync {
	fn on_event(&self, event: &Event);

	fn on_error(&self, _error: &crate::error::Error) {}

	/// Called once, when the subscription's [`ObserverHandle`] is disposed.
	fn on_completed(&self) {}
}

/// Runs an observer's callback, either inline or off-thread.
pub trait Dispatcher: Send + Sync {
	fn dispatch(&self, observer: Arc<dyn Observer>, event: Event);
}

/// Invokes the observer synchronously on the calling thread. Introduces no suspension
/// beyond what the observer's own code does.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallerThreadDispatcher;

impl Dispatcher for CallerThreadDispatcher {
	fn dispatch(&self, observer: Arc<dyn Observer>, event: Event) {
		observer.on_event(&event);
	}
}

/// Runs the observer callback on the global `rayon` pool instead of the producer thread —
/// the same "don't make the producer wait on bulk/slow work" shape as this corpus's
/// `VirtualFs::ingest_all`/`normalize_names`, which hand bulk work to `rayon` rather than
/// doing it inline.
///
/// A bounded semaphore (backed by `crossbeam-channel`) caps the number of callbacks
/// in flight at once; once saturated, further events for this dispatcher are logged at
/// `warn!` and dropped rather than queued without bound.
pub struct TaskPoolDispatcher {
	acquire: crossbeam_channel::Receiver<()>,
	release: crossbeam_channel::Sender<()>,
}

impl TaskPoolDispatcher {
	#[must_use]
	pub fn new(max_in_flight: usize) -> Self {
		let (tx, rx) = crossbeam_channel::bounded(max_in_flight.max(1));

		for _ in 0..max_in_flight.max(1) {
			let _ = tx.send(());
		}

		Self {
			acquire: rx,
			release: tx,
		}
	}
}

impl Default for TaskPoolDispatcher {
	fn default() -> Self {
		Self::new(256)
	}
}

impl Dispatcher for TaskPoolDispatcher {
	fn dispatch(&self, observer: Arc<dyn Observer>, event: Event) {
		if self.acquire.try_recv().is_err() {
			log::warn!(
				"task-pool dispatcher saturated; dropping {:?} event for {}",
				event.kind,
				event.path
			);
			return;
		}

		let release = self.release.clone();

		rayon::spawn(move || {
			observer.on_event(&event);
			let _ = release.send(());
		});
	}
}

struct Registration {
	id: u64,
	filter: Pattern,
	observer: Arc<dyn Observer>,
	dispatcher: Arc<dyn Dispatcher>,
}

/// A list of active observer registrations for one filesystem (or mount-tree node).
/// Dispatch reads a cloned snapshot of the registration list (copy-on-write), so adding
/// or disposing a registration never blocks a concurrent `notify`.
#[derive(Default)]
pub struct ObserverList {
	next_id: AtomicU64,
	inner: RwLock<Vec<Arc<Registration>>>,
}

impl ObserverList {
	#[must_use]
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn add(
		self: &Arc<Self>,
		filter: Pattern,
		observer: Arc<dyn Observer>,
		dispatcher: Arc<dyn Dispatcher>,
	) -> ObserverHandle {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);

		let reg = Arc::new(Registration {
			id,
			filter,
			observer: observer.clone(),
			dispatcher,
		});

		self.inner.write().push(reg);

		ObserverHandle {
			id,
			list: Arc::downgrade(self),
			observer,
			disposed: AtomicBool::new(false),
		}
	}

	pub fn notify(&self, event: Event) {
		let regs = self.inner.read().clone();

		for reg in regs.iter() {
			if reg.filter.is_match(&event.path) {
				reg.dispatcher.dispatch(reg.observer.clone(), event.clone());
			}
		}
	}

	fn remove(&self, id: u64) {
		self.inner.write().retain(|r| r.id != id);
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.read().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// A disposable subscription returned by `Observe`. Disposing removes the registration
/// from its [`ObserverList`] and delivers [`Observer::on_completed`] exactly once.
pub struct ObserverHandle {
	id: u64,
	list: Weak<ObserverList>,
	observer: Arc<dyn Observer>,
	disposed: AtomicBool,
}

impl ObserverHandle {
	pub fn dispose(&self) {
		if self.disposed.swap(true, Ordering::SeqCst) {
			return;
		}

		if let Some(list) = self.list.upgrade() {
			list.remove(self.id);
		}

		self.observer.on_completed();
	}

	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}
}

impl Drop for ObserverHandle {
	fn drop(&mut self) {
		self.dispose();
	}
}

#[cfg(test)]
mod test {
	use std::sync::Mutex;

	use super::*;

	struct Recorder(Mutex<Vec<Event>>, Mutex<bool>);

	impl Observer for Recorder {
		fn on_event(&self, event: &Event) {
			self.0.lock().unwrap().push(event.clone());
		}

		fn on_completed(&self) {
			*self.1.lock().unwrap() = true;
		}
	}

	#[test]
	fn dispose_removes_registration_and_completes() {
		let list = ObserverList::new();
		let rec = Arc::new(Recorder(Mutex::new(vec![]), Mutex::new(false)));

		let handle = list.add(
			Pattern::all(),
			rec.clone(),
			Arc::new(CallerThreadDispatcher),
		);

		list.notify(Event::create(VPathBuf::from("/a")));
		assert_eq!(rec.0.lock().unwrap().len(), 1);

		handle.dispose();
		assert!(*rec.1.lock().unwrap());

		list.notify(Event::create(VPathBuf::from("/b")));
		assert_eq!(rec.0.lock().unwrap().len(), 1);
	}

	#[test]
	fn filter_restricts_delivery() {
		let list = ObserverList::new();
		let rec = Arc::new(Recorder(Mutex::new(vec![]), Mutex::new(false)));

		let _handle = list.add(
			Pattern::new("/only/*", true).unwrap(),
			rec.clone(),
			Arc::new(CallerThreadDispatcher),
		);

		list.notify(Event::create(VPathBuf::from("/other/file")));
		assert!(rec.0.lock().unwrap().is_empty());

		list.notify(Event::create(VPathBuf::from("/only/file")));
		assert_eq!(rec.0.lock().unwrap().len(), 1);
	}
}
