//! The `Read + Write + Seek` handle returned by [`super::MemoryFileSystem::open`].
//!
//! Bytes are backed by a sequence of fixed-size blocks drawn from the filesystem's
//! [`crate::pool::BlockPool`] rather than one contiguous buffer per file, so writing past
//! the end of a file draws additional blocks from the pool instead of growing a `Vec`
//! without bound. Growth uses `try_allocate`, not the pool's blocking `allocate`: a single
//! writer extending a file has no one else to wait on, so an exhausted pool fails the write
//! with `OutOfSpace` immediately instead of suspending the caller forever.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use super::node::{FileBody, OpenState};
use crate::pool::BlockPool;

pub struct MemoryStream {
	body: Arc<Mutex<FileBody>>,
	pool: Arc<BlockPool>,
	offset: u64,
	writable: bool,
}

impl MemoryStream {
	pub(super) fn new(body: Arc<Mutex<FileBody>>, pool: Arc<BlockPool>, writable: bool) -> Self {
		Self {
			body,
			pool,
			offset: 0,
			writable,
		}
	}

	fn block_size(&self) -> usize {
		self.pool.block_size()
	}
}

impl Read for MemoryStream {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let block_size = self.block_size();
		let body = self.body.lock();

		let remaining = (body.length as u64).saturating_sub(self.offset);
		let to_read = (buf.len() as u64).min(remaining) as usize;

		let mut written = 0;

		while written < to_read {
			let pos = self.offset as usize + written;
			let block_index = pos / block_size;
			let block_offset = pos % block_size;

			let Some(block) = body.blocks.get(block_index) else {
				break;
			};

			let chunk = (to_read - written).min(block_size - block_offset);
			buf[written..written + chunk]
				.copy_from_slice(&block[block_offset..block_offset + chunk]);
			written += chunk;
		}

		self.offset += written as u64;
		Ok(written)
	}
}

impl Write for MemoryStream {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if !self.writable {
			return Err(io::Error::new(
				io::ErrorKind::PermissionDenied,
				"stream was opened read-only",
			));
		}

		let block_size = self.block_size();
		let mut body = self.body.lock();
		let mut written = 0;

		while written < buf.len() {
			let pos = self.offset as usize + written;
			let block_index = pos / block_size;
			let block_offset = pos % block_size;

			while body.blocks.len() <= block_index {
				let Some(block) = self.pool.try_allocate().map_err(|e| {
					io::Error::new(io::ErrorKind::OutOfMemory, e.to_string())
				})?
				else {
					return Err(io::Error::new(
						io::ErrorKind::OutOfMemory,
						crate::error::Error::out_of_space().to_string(),
					));
				};
				body.blocks.push(block);
			}

			let chunk = (buf.len() - written).min(block_size - block_offset);
			body.blocks[block_index][block_offset..block_offset + chunk]
				.copy_from_slice(&buf[written..written + chunk]);
			written += chunk;
		}

		self.offset += written as u64;
		body.length = body.length.max(self.offset as usize);
		Ok(written)
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl Seek for MemoryStream {
	fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
		let length = self.body.lock().length as i64;

		let new_offset = match pos {
			SeekFrom::Start(n) => n as i64,
			SeekFrom::End(n) => length + n,
			SeekFrom::Current(n) => self.offset as i64 + n,
		};

		if new_offset < 0 {
			return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				"seek before byte 0",
			));
		}

		self.offset = new_offset as u64;
		Ok(self.offset)
	}
}

impl Drop for MemoryStream {
	fn drop(&mut self) {
		let mut body = self.body.lock();

		body.open = match body.open {
			OpenState::Writing => OpenState::Idle,
			OpenState::Reading(n) if n <= 1 => OpenState::Idle,
			OpenState::Reading(n) => OpenState::Reading(n - 1),
			OpenState::Idle => OpenState::Idle,
		};
	}
}
