//! Recursive tree compositions and ordered batches (spec §4.8).
//!
//! `CopyTree` and `MoveTree` are both expressed as a `TransferTree` with `delete_source`
//! toggled — the source's three named tree operations differ only in whether the source
//! subtree is removed once every child operation has run, not in how the tree is walked or
//! copied.

use std::sync::Arc;

use super::file_ops::{CopyFile, CreateDirectory, Delete};
use super::session::OperationSession;
use super::{Operation, OperationState};
use crate::entry::EntryKind;
use crate::error::{Error, Result};
use crate::fs_trait::FileSystem;
use crate::path::VPathBuf;

/// Walks `src_fs` under `root`, collecting every directory (depth-first, parents before
/// children) and every file path relative to `root`.
fn walk(src_fs: &Arc<dyn FileSystem>, root: &VPathBuf) -> Result<(Vec<VPathBuf>, Vec<VPathBuf>)> {
	let mut dirs = Vec::new();
	let mut files = Vec::new();
	let mut stack = vec![root.clone()];

	while let Some(dir) = stack.pop() {
		let listing = src_fs.browse(dir.as_path())?;

		for child in listing.children() {
			match child.kind() {
				EntryKind::Directory => {
					dirs.push(child.path().clone());
					stack.push(child.path().clone());
				}
				EntryKind::File { .. } => files.push(child.path().clone()),
				EntryKind::Drive(_) | EntryKind::MountPoint { .. } => {}
			}
		}
	}

	Ok((dirs, files))
}

fn relocate(path: &VPathBuf, src_root: &VPathBuf, dst_root: &VPathBuf) -> VPathBuf {
	match path.as_path().strip_prefix(src_root.as_path()) {
		Some(rel) => dst_root.join(rel.as_str()),
		None => dst_root.clone(),
	}
}

/// Shared implementation behind `CopyTree`/`MoveTree`: recursively copies every directory
/// and file under `src_root` into `dst_root`, optionally deleting the source subtree once
/// every child operation succeeds.
pub struct TransferTree {
	src_fs: Arc<dyn FileSystem>,
	src_root: VPathBuf,
	dst_fs: Arc<dyn FileSystem>,
	dst_root: VPathBuf,
	delete_source: bool,
	state: OperationState,
	children: Vec<Box<dyn Operation>>,
	src_dirs: Vec<VPathBuf>,
	src_files: Vec<VPathBuf>,
}

impl TransferTree {
	#[must_use]
	pub fn new(
		src_fs: Arc<dyn FileSystem>,
		src_root: impl Into<VPathBuf>,
		dst_fs: Arc<dyn FileSystem>,
		dst_root: impl Into<VPathBuf>,
		delete_source: bool,
	) -> Self {
		Self {
			src_fs,
			src_root: src_root.into(),
			dst_fs,
			dst_root: dst_root.into(),
			delete_source,
			state: OperationState::Initialized,
			children: Vec::new(),
			src_dirs: Vec::new(),
			src_files: Vec::new(),
		}
	}
}

impl Operation for TransferTree {
	fn estimate(&mut self, session: &OperationSession) -> Result<()> {
		self.state = OperationState::Estimating;
		session.record_state("TransferTree", self.state);

		let (dirs, files) = walk(&self.src_fs, &self.src_root)?;

		self.children.clear();

		for dir in &dirs {
			let dst_path = relocate(dir, &self.src_root, &self.dst_root);
			self.children.push(Box::new(CreateDirectory::new(self.dst_fs.clone(), dst_path)));

			if super::cancelled(session) {
				self.state = OperationState::Cancelled;
				session.record_state("TransferTree", self.state);
				return Ok(());
			}
		}

		for file in &files {
			let dst_path = relocate(file, &self.src_root, &self.dst_root);
			self.children.push(Box::new(CopyFile::new(
				self.src_fs.clone(),
				file.clone(),
				self.dst_fs.clone(),
				dst_path,
			)));
		}

		self.src_dirs = dirs;
		self.src_files = files;

		for child in &mut self.children {
			child.estimate(session)?;
		}

		self.state = OperationState::Estimated;
		session.record_state("TransferTree", self.state);
		Ok(())
	}

	fn run(&mut self, session: &OperationSession) -> Result<()> {
		if self.state != OperationState::Estimated {
			if session.policy().estimate_on_run || session.policy().re_estimate_on_run {
				self.estimate(session)?;
			} else {
				return Err(Error::invalid_argument());
			}
		}

		self.state = OperationState::Running;
		session.record_state("TransferTree", self.state);

		let mut first_error = None;

		for child in &mut self.children {
			if super::cancelled(session) {
				self.state = OperationState::Cancelled;
				session.record_state("TransferTree", self.state);
				return Ok(());
			}

			if let Err(e) = child.run(session) {
				if session.policy().cancel_on_error {
					session.cancel();
				}

				if session.policy().batch_continue_on_error {
					first_error.get_or_insert(e);
					continue;
				}

				self.state = OperationState::Error(e.kind());
				session.record_state("TransferTree", self.state);
				return Err(e);
			}
		}

		if let Some(e) = first_error {
			self.state = OperationState::Error(e.kind());
			session.record_state("TransferTree", self.state);
			return Err(e);
		}

		if self.delete_source {
			for file in &self.src_files {
				let _ = self.src_fs.delete(file.as_path());
			}

			for dir in self.src_dirs.iter().rev() {
				let _ = self.src_fs.delete(dir.as_path());
			}

			let _ = self.src_fs.delete(self.src_root.as_path());
		}

		self.state = OperationState::Completed;
		session.record_state("TransferTree", self.state);
		Ok(())
	}

	fn create_rollback(&self) -> Option<Box<dyn Operation>> {
		if self.state != OperationState::Completed {
			return None;
		}

		let rollbacks: Option<Vec<Box<dyn Operation>>> =
			self.children.iter().rev().map(|c| c.create_rollback()).collect();

		rollbacks.map(|ops| Box::new(Batch::new(ops)) as Box<dyn Operation>)
	}

	fn state(&self) -> OperationState {
		self.state
	}
}

/// Recursively copies a directory subtree, leaving the source in place.
pub struct CopyTree(TransferTree);

impl CopyTree {
	#[must_use]
	pub fn new(
		src_fs: Arc<dyn FileSystem>,
		src_root: impl Into<VPathBuf>,
		dst_fs: Arc<dyn FileSystem>,
		dst_root: impl Into<VPathBuf>,
	) -> Self {
		Self(TransferTree::new(src_fs, src_root, dst_fs, dst_root, false))
	}
}

impl Operation for CopyTree {
	fn estimate(&mut self, session: &OperationSession) -> Result<()> {
		self.0.estimate(session)
	}

	fn run(&mut self, session: &OperationSession) -> Result<()> {
		self.0.run(session)
	}

	fn create_rollback(&self) -> Option<Box<dyn Operation>> {
		self.0.create_rollback()
	}

	fn state(&self) -> OperationState {
		self.0.state()
	}
}

/// Recursively copies a directory subtree, then deletes the source once every child
/// operation has succeeded.
pub struct MoveTree(TransferTree);

impl MoveTree {
	#[must_use]
	pub fn new(
		src_fs: Arc<dyn FileSystem>,
		src_root: impl Into<VPathBuf>,
		dst_fs: Arc<dyn FileSystem>,
		dst_root: impl Into<VPathBuf>,
	) -> Self {
		Self(TransferTree::new(src_fs, src_root, dst_fs, dst_root, true))
	}
}

impl Operation for MoveTree {
	fn estimate(&mut self, session: &OperationSession) -> Result<()> {
		self.0.estimate(session)
	}

	fn run(&mut self, session: &OperationSession) -> Result<()> {
		self.0.run(session)
	}

	fn create_rollback(&self) -> Option<Box<dyn Operation>> {
		self.0.create_rollback()
	}

	fn state(&self) -> OperationState {
		self.0.state()
	}
}

/// An ordered list of operations sharing one session's policy. `Estimate` estimates each
/// child in turn; `Run` runs each in turn, honoring `BatchContinueOnError`.
pub struct Batch {
	ops: Vec<Box<dyn Operation>>,
	state: OperationState,
}

impl Batch {
	#[must_use]
	pub fn new(ops: Vec<Box<dyn Operation>>) -> Self {
		Self {
			ops,
			state: OperationState::Initialized,
		}
	}
}

impl Operation for Batch {
	fn estimate(&mut self, session: &OperationSession) -> Result<()> {
		self.state = OperationState::Estimating;
		session.record_state("Batch", self.state);

		for op in &mut self.ops {
			op.estimate(session)?;
		}

		self.state = OperationState::Estimated;
		session.record_state("Batch", self.state);
		Ok(())
	}

	fn run(&mut self, session: &OperationSession) -> Result<()> {
		if self.state != OperationState::Estimated {
			if session.policy().estimate_on_run || session.policy().re_estimate_on_run {
				self.estimate(session)?;
			} else {
				return Err(Error::invalid_argument());
			}
		}

		self.state = OperationState::Running;
		session.record_state("Batch", self.state);

		let mut first_error = None;

		for op in &mut self.ops {
			if super::cancelled(session) {
				self.state = OperationState::Cancelled;
				session.record_state("Batch", self.state);
				return Ok(());
			}

			if let Err(e) = op.run(session) {
				if session.policy().cancel_on_error {
					session.cancel();
				}

				if session.policy().batch_continue_on_error {
					first_error.get_or_insert(e);
					continue;
				}

				self.state = OperationState::Error(e.kind());
				session.record_state("Batch", self.state);
				return Err(e);
			}
		}

		if let Some(e) = first_error {
			self.state = OperationState::Error(e.kind());
			session.record_state("Batch", self.state);
			return Err(e);
		}

		self.state = OperationState::Completed;
		session.record_state("Batch", self.state);
		Ok(())
	}

	fn create_rollback(&self) -> Option<Box<dyn Operation>> {
		if self.state != OperationState::Completed {
			return None;
		}

		let rollbacks: Option<Vec<Box<dyn Operation>>> =
			self.ops.iter().rev().map(|op| op.create_rollback()).collect();

		rollbacks.map(|ops| Box::new(Batch::new(ops)) as Box<dyn Operation>)
	}

	fn state(&self) -> OperationState {
		self.state
	}
}

#[cfg(test)]
mod test {
	use std::io::Write;

	use super::*;
	use crate::memory::MemoryFileSystem;
	use crate::option::{BrowseOption, CreateDirectoryOption, DeleteOption, FsOptions, OpenOption, OptionValue};
	use crate::path::VPath;
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
			.with(OptionValue::Delete(DeleteOption { can_delete: true }));

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
	fn copy_tree_replicates_structure() {
		let src = backing();
		src.create_directory(VPath::new("/pkg")).unwrap();
		src.create_directory(VPath::new("/pkg/sub")).unwrap();
		{
			let mut f = src.open(VPath::new("/pkg/a.txt"), true, true).unwrap();
			f.write_all(b"a").unwrap();
		}
		{
			let mut f = src.open(VPath::new("/pkg/sub/b.txt"), true, true).unwrap();
			f.write_all(b"b").unwrap();
		}

		let dst = backing();
		let session = session();

		let mut op = CopyTree::new(src.clone(), "/pkg", dst.clone(), "/out");
		op.estimate(&session).unwrap();
		op.run(&session).unwrap();
		op.assert_successful().unwrap();

		assert!(dst.entry(VPath::new("/out/a.txt")).is_ok());
		assert!(dst.entry(VPath::new("/out/sub/b.txt")).is_ok());
		assert!(src.entry(VPath::new("/pkg/a.txt")).is_ok());
	}

	#[test]
	fn move_tree_removes_source() {
		let src = backing();
		src.create_directory(VPath::new("/pkg")).unwrap();
		drop(src.open(VPath::new("/pkg/a.txt"), true, true).unwrap());

		let dst = backing();
		let session = session();

		let mut op = MoveTree::new(src.clone(), "/pkg", dst.clone(), "/out");
		op.estimate(&session).unwrap();
		op.run(&session).unwrap();

		assert!(dst.entry(VPath::new("/out/a.txt")).is_ok());
		assert!(src.entry(VPath::new("/pkg")).is_err());
	}

	#[test]
	fn batch_runs_every_operation_in_order() {
		let fs = backing();
		let session = session();

		let ops: Vec<Box<dyn Operation>> = vec![
			Box::new(CreateDirectory::new(fs.clone(), "/a")),
			Box::new(CreateDirectory::new(fs.clone(), "/b")),
		];

		let mut batch = Batch::new(ops);
		batch.estimate(&session).unwrap();
		batch.run(&session).unwrap();

		assert!(fs.entry(VPath::new("/a")).is_ok());
		assert!(fs.entry(VPath::new("/b")).is_ok());
	}
}
