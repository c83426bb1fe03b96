//! The fixed-capacity block pool backing [`crate::memory::MemoryFileSystem`] (spec §4.3).
//!
//! A `MemoryFileSystem` is configured with a byte quota expressed as a block count times a
//! block size; every write is satisfied from this pool rather than an unbounded `Vec<u8>`
//! per file, so the quota is enforced by the pool simply running out of blocks to hand out.
//! Waiting for a block blocks the caller's thread (FIFO: waiters are woken in the order
//! `Condvar::notify_one` was asked to wake them, matching `Condvar`'s own guarantee); a
//! non-blocking variant is provided for callers that would rather fail fast.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPoolConfig {
	pub block_size: usize,
	pub block_count: usize,
}

impl BlockPoolConfig {
	#[must_use]
	pub fn quota_bytes(&self) -> u64 {
		self.block_size as u64 * self.block_count as u64
	}
}

/// Owns every block's backing storage. A block is exposed to exactly one [`BlockHandle`] at
/// a time, as enforced by the free-list protocol in [`BlockPool`]; `Sync` is sound under
/// that invariant even though raw interior mutability is used to avoid a second lock per
/// block access.
struct Storage(Vec<UnsafeCell<Box<[u8]>>>);

unsafe impl Sync for Storage {}

struct PoolState {
	free: VecDeque<usize>,
	disconnected: bool,
}

pub struct BlockPool {
	config: BlockPoolConfig,
	storage: Storage,
	state: Mutex<PoolState>,
	available: Condvar,
}

impl BlockPool {
	#[must_use]
	pub fn new(config: BlockPoolConfig) -> Arc<Self> {
		let storage = (0..config.block_count)
			.map(|_| UnsafeCell::new(vec![0u8; config.block_size].into_boxed_slice()))
			.collect();

		Arc::new(Self {
			config,
			storage: Storage(storage),
			state: Mutex::new(PoolState {
				free: (0..config.block_count).collect(),
				disconnected: false,
			}),
			available: Condvar::new(),
		})
	}

	#[must_use]
	pub fn block_size(&self) -> usize {
		self.config.block_size
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.config.block_count
	}

	#[must_use]
	pub fn available_blocks(&self) -> usize {
		self.state.lock().free.len()
	}

	/// Blocks the calling thread until a block is free, or the pool is disconnected.
	pub fn allocate(self: &Arc<Self>) -> Result<BlockHandle> {
		let mut state = self.state.lock();

		loop {
			if state.disconnected {
				return Err(Error::disposed());
			}

			if let Some(index) = state.free.pop_front() {
				return Ok(BlockHandle {
					pool: self.clone(),
					index,
				});
			}

			self.available.wait(&mut state);
		}
	}

	/// Returns `Ok(None)` immediately rather than waiting if the pool is exhausted.
	pub fn try_allocate(self: &Arc<Self>) -> Result<Option<BlockHandle>> {
		let mut state = self.state.lock();

		if state.disconnected {
			return Err(Error::disposed());
		}

		Ok(state.free.pop_front().map(|index| BlockHandle {
			pool: self.clone(),
			index,
		}))
	}

	/// Wakes every blocked `allocate` with [`crate::error::ErrorKind::Disposed`]. Used when
	/// tearing down the owning `MemoryFileSystem`.
	pub fn disconnect(&self) {
		let mut state = self.state.lock();
		state.disconnected = true;
		self.available.notify_all();
	}

	fn recycle(&self, index: usize) {
		let mut state = self.state.lock();
		state.free.push_back(index);
		drop(state);
		self.available.notify_one();
	}
}

/// An exclusively-owned block. Deref/DerefMut give direct byte access; dropping the handle
/// returns the block to its pool's free list and wakes one waiter.
pub struct BlockHandle {
	pool: Arc<BlockPool>,
	index: usize,
}

impl BlockHandle {
	#[must_use]
	pub fn index(&self) -> usize {
		self.index
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.pool.block_size()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Deref for BlockHandle {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		// SAFETY: the free-list protocol guarantees this index is owned by exactly one
		// `BlockHandle` for as long as that handle is alive.
		unsafe { &*self.pool.storage.0[self.index].get() }
	}
}

impl DerefMut for BlockHandle {
	fn deref_mut(&mut self) -> &mut [u8] {
		// SAFETY: see `Deref` above.
		unsafe { &mut *self.pool.storage.0[self.index].get() }
	}
}

impl Drop for BlockHandle {
	fn drop(&mut self) {
		self.pool.recycle(self.index);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn allocate_and_recycle_roundtrip() {
		let pool = BlockPool::new(BlockPoolConfig {
			block_size: 16,
			block_count: 2,
		});

		let mut a = pool.allocate().unwrap();
		a[0] = 7;
		let b = pool.try_allocate().unwrap().unwrap();
		assert!(pool.try_allocate().unwrap().is_none());

		drop(a);
		assert_eq!(pool.available_blocks(), 1);
		drop(b);
		assert_eq!(pool.available_blocks(), 2);
	}

	#[test]
	fn disconnect_wakes_blocked_allocation() {
		let pool = BlockPool::new(BlockPoolConfig {
			block_size: 8,
			block_count: 1,
		});

		let held = pool.allocate().unwrap();
		let pool2 = pool.clone();

		let handle = std::thread::spawn(move || pool2.allocate());

		std::thread::sleep(std::time::Duration::from_millis(20));
		pool.disconnect();

		assert!(handle.join().unwrap().is_err());
		drop(held);
	}

	#[test]
	fn quota_bytes_is_size_times_count() {
		let cfg = BlockPoolConfig {
			block_size: 4096,
			block_count: 10,
		};
		assert_eq!(cfg.quota_bytes(), 40_960);
	}
}
