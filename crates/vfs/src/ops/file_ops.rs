//! Single-entry operations: `CopyFile`, `Move`, `Delete`, `CreateDirectory` (spec §4.8).

use std::io::{Read, Write};
use std::sync::Arc;

use super::session::OperationSession;
use super::{DstPolicy, Operation, OperationState, SrcPolicy};
use crate::error::{Error, ErrorKind, Result};
use crate::fs_trait::FileSystem;
use crate::path::VPathBuf;

/// Looks a fatal `Estimate`-time policy violation up, honoring `SuppressException`:
/// `Ok(true)` means "record `Error` and stop, but don't propagate"; `Err(_)` means "record
/// `Error` and propagate".
fn fatal(session: &OperationSession, kind: ErrorKind) -> Result<bool> {
	if session.policy().suppress_exception {
		Ok(true)
	} else {
		Err(Error::new(kind))
	}
}

pub struct CopyFile {
	src_fs: Arc<dyn FileSystem>,
	src_path: VPathBuf,
	dst_fs: Arc<dyn FileSystem>,
	dst_path: VPathBuf,
	state: OperationState,
	dst_preexisted: bool,
	total_bytes: u64,
}

impl CopyFile {
	#[must_use]
	pub fn new(
		src_fs: Arc<dyn FileSystem>,
		src_path: impl Into<VPathBuf>,
		dst_fs: Arc<dyn FileSystem>,
		dst_path: impl Into<VPathBuf>,
	) -> Self {
		Self {
			src_fs,
			src_path: src_path.into(),
			dst_fs,
			dst_path: dst_path.into(),
			state: OperationState::Initialized,
			dst_preexisted: false,
			total_bytes: 0,
		}
	}
}

impl Operation for CopyFile {
	fn estimate(&mut self, session: &OperationSession) -> Result<()> {
		self.state = OperationState::Estimating;
		session.record_state("CopyFile", self.state);

		let entry = match self.src_fs.entry(self.src_path.as_path()) {
			Ok(e) => e,
			Err(e) if e.kind() == ErrorKind::NotFound => match session.policy().src {
				SrcPolicy::Skip => {
					self.state = OperationState::Skipped;
					session.record_state("CopyFile", self.state);
					return Ok(());
				}
				_ => {
					if fatal(session, ErrorKind::NotFound)? {
						self.state = OperationState::Error(ErrorKind::NotFound);
						session.record_state("CopyFile", self.state);
						return Ok(());
					}
					unreachable!()
				}
			},
			Err(e) => return Err(e),
		};

		self.total_bytes = entry.length().unwrap_or(0);
		self.dst_preexisted = self.dst_fs.entry(self.dst_path.as_path()).is_ok();

		if self.dst_preexisted {
			match session.policy().dst {
				DstPolicy::Skip => {
					self.state = OperationState::Skipped;
					session.record_state("CopyFile", self.state);
					return Ok(());
				}
				DstPolicy::Overwrite => {}
				DstPolicy::Unset | DstPolicy::Throw => {
					if fatal(session, ErrorKind::AlreadyExistsFile)? {
						self.state = OperationState::Error(ErrorKind::AlreadyExistsFile);
						session.record_state("CopyFile", self.state);
						return Ok(());
					}
				}
			}
		}

		self.state = OperationState::Estimated;
		session.record_state("CopyFile", self.state);
		Ok(())
	}

	fn run(&mut self, session: &OperationSession) -> Result<()> {
		if self.state == OperationState::Skipped {
			return Ok(());
		}

		if self.state != OperationState::Estimated {
			if session.policy().estimate_on_run || session.policy().re_estimate_on_run {
				self.estimate(session)?;
				if matches!(self.state, OperationState::Skipped | OperationState::Error(_)) {
					return Ok(());
				}
			} else {
				return Err(Error::invalid_argument());
			}
		}

		self.state = OperationState::Running;
		session.record_state("CopyFile", self.state);

		let result = (|| -> Result<()> {
			let mut src = self.src_fs.open(self.src_path.as_path(), false, false)?;
			let mut dst = self.dst_fs.open(self.dst_path.as_path(), true, true)?;
			let mut handle = session.pool().allocate()?;
			let mut bytes_done: u64 = 0;
			let mut last_reported: u64 = 0;

			loop {
				if super::cancelled(session) {
					self.state = OperationState::Cancelled;
					session.record_state("CopyFile", self.state);
					return Ok(());
				}

				let n = src.read(&mut handle)?;
				if n == 0 {
					break;
				}

				dst.write_all(&handle[..n])?;
				bytes_done += n as u64;

				if bytes_done - last_reported >= session.progress_interval() {
					session.record_progress("CopyFile", bytes_done, self.total_bytes);
					last_reported = bytes_done;
				}
			}

			session.record_progress("CopyFile", bytes_done, self.total_bytes);
			Ok(())
		})();

		match result {
			Ok(()) if self.state == OperationState::Cancelled => Ok(()),
			Ok(()) => {
				self.state = OperationState::Completed;
				session.record_state("CopyFile", self.state);
				Ok(())
			}
			Err(e) => {
				self.state = OperationState::Error(e.kind());
				session.record_state("CopyFile", self.state);
				Err(e)
			}
		}
	}

	fn create_rollback(&self) -> Option<Box<dyn Operation>> {
		if self.state == OperationState::Completed && !self.dst_preexisted {
			Some(Box::new(Delete::new(self.dst_fs.clone(), self.dst_path.clone())))
		} else {
			None
		}
	}

	fn state(&self) -> OperationState {
		self.state
	}
}

pub struct Move {
	src_fs: Arc<dyn FileSystem>,
	src_path: VPathBuf,
	dst_fs: Arc<dyn FileSystem>,
	dst_path: VPathBuf,
	state: OperationState,
	/// Set once `run` decides whether it took the same-filesystem rename fast path.
	renamed_in_place: bool,
}

impl Move {
	#[must_use]
	pub fn new(
		src_fs: Arc<dyn FileSystem>,
		src_path: impl Into<VPathBuf>,
		dst_fs: Arc<dyn FileSystem>,
		dst_path: impl Into<VPathBuf>,
	) -> Self {
		Self {
			src_fs,
			src_path: src_path.into(),
			dst_fs,
			dst_path: dst_path.into(),
			state: OperationState::Initialized,
			renamed_in_place: false,
		}
	}

	fn same_filesystem(&self) -> bool {
		Arc::ptr_eq(&self.src_fs, &self.dst_fs)
	}
}

impl Operation for Move {
	fn estimate(&mut self, session: &OperationSession) -> Result<()> {
		self.state = OperationState::Estimating;
		session.record_state("Move", self.state);

		if self.src_fs.entry(self.src_path.as_path()).is_err() {
			match session.policy().src {
				SrcPolicy::Skip => {
					self.state = OperationState::Skipped;
					session.record_state("Move", self.state);
					return Ok(());
				}
				_ => {
					if fatal(session, ErrorKind::NotFound)? {
						self.state = OperationState::Error(ErrorKind::NotFound);
						session.record_state("Move", self.state);
						return Ok(());
					}
				}
			}
		}

		self.state = OperationState::Estimated;
		session.record_state("Move", self.state);
		Ok(())
	}

	fn run(&mut self, session: &OperationSession) -> Result<()> {
		if self.state == OperationState::Skipped {
			return Ok(());
		}

		if self.state != OperationState::Estimated {
			if session.policy().estimate_on_run || session.policy().re_estimate_on_run {
				self.estimate(session)?;
				if matches!(self.state, OperationState::Skipped | OperationState::Error(_)) {
					return Ok(());
				}
			} else {
				return Err(Error::invalid_argument());
			}
		}

		self.state = OperationState::Running;
		session.record_state("Move", self.state);

		let result = if self.same_filesystem() {
			self.renamed_in_place = true;
			self.src_fs.move_entry(self.src_path.as_path(), self.dst_path.as_path())
		} else {
			self.renamed_in_place = false;

			let src_fs = self.src_fs.clone();
			let src_path = self.src_path.clone();
			let mut copy = CopyFile::new(src_fs.clone(), src_path.clone(), self.dst_fs.clone(), self.dst_path.clone());

			let copy_result = copy.estimate(session).and_then(|()| copy.run(session));

			match copy_result {
				Ok(()) => src_fs.delete(src_path.as_path()),
				Err(e) => Err(e),
			}
		};

		match result {
			Ok(()) => {
				self.state = OperationState::Completed;
				session.record_state("Move", self.state);
				Ok(())
			}
			Err(e) => {
				self.state = OperationState::Error(e.kind());
				session.record_state("Move", self.state);
				Err(e)
			}
		}
	}

	fn create_rollback(&self) -> Option<Box<dyn Operation>> {
		if self.state != OperationState::Completed {
			return None;
		}

		if self.renamed_in_place {
			Some(Box::new(Move::new(
				self.dst_fs.clone(),
				self.dst_path.clone(),
				self.src_fs.clone(),
				self.src_path.clone(),
			)))
		} else {
			Some(Box::new(Move::new(
				self.dst_fs.clone(),
				self.dst_path.clone(),
				self.src_fs.clone(),
				self.src_path.clone(),
			)))
		}
	}

	fn state(&self) -> OperationState {
		self.state
	}
}

pub struct Delete {
	fs: Arc<dyn FileSystem>,
	path: VPathBuf,
	state: OperationState,
}

impl Delete {
	#[must_use]
	pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<VPathBuf>) -> Self {
		Self {
			fs,
			path: path.into(),
			state: OperationState::Initialized,
		}
	}
}

impl Operation for Delete {
	fn estimate(&mut self, session: &OperationSession) -> Result<()> {
		self.state = OperationState::Estimating;
		session.record_state("Delete", self.state);

		if self.fs.entry(self.path.as_path()).is_err() {
			match session.policy().src {
				SrcPolicy::Skip => {
					self.state = OperationState::Skipped;
					session.record_state("Delete", self.state);
					return Ok(());
				}
				_ => {
					if fatal(session, ErrorKind::NotFound)? {
						self.state = OperationState::Error(ErrorKind::NotFound);
						session.record_state("Delete", self.state);
						return Ok(());
					}
				}
			}
		}

		self.state = OperationState::Estimated;
		session.record_state("Delete", self.state);
		Ok(())
	}

	fn run(&mut self, session: &OperationSession) -> Result<()> {
		if self.state == OperationState::Skipped {
			return Ok(());
		}

		if self.state != OperationState::Estimated {
			if session.policy().estimate_on_run || session.policy().re_estimate_on_run {
				self.estimate(session)?;
				if matches!(self.state, OperationState::Skipped | OperationState::Error(_)) {
					return Ok(());
				}
			} else {
				return Err(Error::invalid_argument());
			}
		}

		self.state = OperationState::Running;
		session.record_state("Delete", self.state);

		match self.fs.delete(self.path.as_path()) {
			Ok(()) => {
				self.state = OperationState::Completed;
				session.record_state("Delete", self.state);
				Ok(())
			}
			Err(e) => {
				self.state = OperationState::Error(e.kind());
				session.record_state("Delete", self.state);
				Err(e)
			}
		}
	}

	/// Deletion has nothing to restore from: no backup is taken, per spec.
	fn create_rollback(&self) -> Option<Box<dyn Operation>> {
		None
	}

	fn state(&self) -> OperationState {
		self.state
	}
}

pub struct CreateDirectory {
	fs: Arc<dyn FileSystem>,
	path: VPathBuf,
	state: OperationState,
	preexisted: bool,
}

impl CreateDirectory {
	#[must_use]
	pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<VPathBuf>) -> Self {
		Self {
			fs,
			path: path.into(),
			state: OperationState::Initialized,
			preexisted: false,
		}
	}
}

impl Operation for CreateDirectory {
	fn estimate(&mut self, session: &OperationSession) -> Result<()> {
		self.state = OperationState::Estimating;
		session.record_state("CreateDirectory", self.state);

		self.preexisted = self
			.fs
			.entry(self.path.as_path())
			.map(|e| e.is_directory())
			.unwrap_or(false);

		if self.preexisted && session.policy().dst == DstPolicy::Throw {
			if fatal(session, ErrorKind::AlreadyExistsDirectory)? {
				self.state = OperationState::Error(ErrorKind::AlreadyExistsDirectory);
				session.record_state("CreateDirectory", self.state);
				return Ok(());
			}
		}

		self.state = OperationState::Estimated;
		session.record_state("CreateDirectory", self.state);
		Ok(())
	}

	fn run(&mut self, session: &OperationSession) -> Result<()> {
		if self.state != OperationState::Estimated {
			if session.policy().estimate_on_run || session.policy().re_estimate_on_run {
				self.estimate(session)?;
				if matches!(self.state, OperationState::Skipped | OperationState::Error(_)) {
					return Ok(());
				}
			} else {
				return Err(Error::invalid_argument());
			}
		}

		if self.preexisted {
			self.state = OperationState::Completed;
			session.record_state("CreateDirectory", self.state);
			return Ok(());
		}

		self.state = OperationState::Running;
		session.record_state("CreateDirectory", self.state);

		match self.fs.create_directory(self.path.as_path()) {
			Ok(()) => {
				self.state = OperationState::Completed;
				session.record_state("CreateDirectory", self.state);
				Ok(())
			}
			Err(e) => {
				self.state = OperationState::Error(e.kind());
				session.record_state("CreateDirectory", self.state);
				Err(e)
			}
		}
	}

	fn create_rollback(&self) -> Option<Box<dyn Operation>> {
		if self.state == OperationState::Completed && !self.preexisted {
			Some(Box::new(Delete::new(self.fs.clone(), self.path.clone())))
		} else {
			None
		}
	}

	fn state(&self) -> OperationState {
		self.state
	}
}

#[cfg(test)]
mod test {
	use std::io::Write as _;

	use super::*;
	use crate::memory::MemoryFileSystem;
	use crate::option::{
		BrowseOption, CreateDirectoryOption, DeleteOption, FsOptions, MoveOption, OpenOption,
		OptionValue,
	};
	use crate::pool::BlockPoolConfig;

	fn backing() -> Arc<MemoryFileSystem> {
		let options = FsOptions::new()
			.with(OptionValue::Open(OpenOption {
				can_open: true,
				can_read: true,
				can_write: true,
				can_create_file: true,
			}))
			.with(OptionValue::Browse(BrowseOption {
				can_browse: true,
				can_get_entry: true,
			}))
			.with(OptionValue::CreateDirectory(CreateDirectoryOption {
				can_create_directory: true,
			}))
			.with(OptionValue::Delete(DeleteOption { can_delete: true }))
			.with(OptionValue::Move(MoveOption { can_move: true }));

		MemoryFileSystem::new(
			options,
			BlockPoolConfig {
				block_size: 4096,
				block_count: 64,
			},
		)
	}

	fn session() -> Arc<OperationSession> {
		OperationSession::new(
			crate::pool::BlockPool::new(BlockPoolConfig {
				block_size: 4096,
				block_count: 64,
			}),
			super::super::SessionConfig::default(),
		)
	}

	#[test]
	fn copy_file_round_trips_bytes() {
		let src = backing();
		let dst = backing();

		{
			let mut f = src.open(crate::path::VPath::new("/a.txt"), true, true).unwrap();
			f.write_all(b"hello world").unwrap();
		}

		let session = session();
		let mut op = CopyFile::new(src, "/a.txt", dst.clone(), "/b.txt");
		op.estimate(&session).unwrap();
		op.run(&session).unwrap();
		op.assert_successful().unwrap();

		let mut out = Vec::new();
		let mut stream = dst.open(crate::path::VPath::new("/b.txt"), false, false).unwrap();
		stream.read_to_end(&mut out).unwrap();
		assert_eq!(out, b"hello world");
	}

	#[test]
	fn copy_file_rollback_deletes_new_destination() {
		let src = backing();
		let dst = backing();
		drop(src.open(crate::path::VPath::new("/a.txt"), true, true).unwrap());

		let session = session();
		let mut op = CopyFile::new(src, "/a.txt", dst.clone(), "/a.txt");
		op.estimate(&session).unwrap();
		op.run(&session).unwrap();

		let rollback = op.create_rollback().unwrap();
		let mut rollback = rollback;
		rollback.estimate(&session).unwrap();
		rollback.run(&session).unwrap();

		assert!(dst.entry(crate::path::VPath::new("/a.txt")).is_err());
	}

	#[test]
	fn delete_has_no_rollback() {
		let fs = backing();
		drop(fs.open(crate::path::VPath::new("/a.txt"), true, true).unwrap());

		let session = session();
		let mut op = Delete::new(fs, "/a.txt");
		op.estimate(&session).unwrap();
		op.run(&session).unwrap();
		assert!(op.create_rollback().is_none());
	}

	#[test]
	fn create_directory_rollback_removes_it() {
		let fs = backing();
		let session = session();

		let mut op = CreateDirectory::new(fs.clone(), "/sub");
		op.estimate(&session).unwrap();
		op.run(&session).unwrap();
		assert!(fs.entry(crate::path::VPath::new("/sub")).is_ok());

		let mut rollback = op.create_rollback().unwrap();
		rollback.estimate(&session).unwrap();
		rollback.run(&session).unwrap();
		assert!(fs.entry(crate::path::VPath::new("/sub")).is_err());
	}
}
