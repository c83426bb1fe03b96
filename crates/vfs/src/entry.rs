//! Immutable directory-listing snapshots (spec §3). An `Entry` describes one item as of
//! the moment it was produced; it is never mutated afterward, and a later `Browse` of the
//! same path produces new, independent snapshots.

use std::sync::Arc;
use std::time::SystemTime;

use crate::option::FsOptions;
use crate::path::VPathBuf;

/// `SystemTime`'s own minimum is platform-dependent; the spec's "min if unknown" sentinel
/// is represented explicitly as `None` instead of relying on `SystemTime::UNIX_EPOCH`
/// happening to sort first everywhere.
pub type Timestamp = Option<SystemTime>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveInfo {
	pub free_bytes: u64,
	pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct DriveMeta {
	pub info: DriveInfo,
	pub label: String,
	pub format: String,
}

/// One `(filesystem, option)` assignment backing a mount point, as reported by an Entry
/// of kind [`EntryKind::MountPoint`].
#[derive(Debug, Clone)]
pub struct MountAssignment {
	pub options: FsOptions,
}

#[derive(Debug, Clone)]
pub enum EntryKind {
	/// `length` is `-1` (`None`) if unknown.
	File { length: Option<u64> },
	Directory,
	Drive(DriveMeta),
	MountPoint { assignments: Vec<MountAssignment> },
}

/// An immutable snapshot describing one file, directory, drive, or mount point.
#[derive(Debug, Clone)]
pub struct Entry {
	path: VPathBuf,
	name: Arc<str>,
	modified: Timestamp,
	accessed: Timestamp,
	kind: EntryKind,
	attributes: u32,
	physical_path: Option<String>,
	/// Present when this entry was produced by a [`crate::decoration::FileSystemDecoration`]
	/// or [`crate::concat::ConcatFileSystem`]: the entry as the wrapped backend produced it,
	/// before path remapping.
	underlying: Option<Arc<Entry>>,
}

impl Entry {
	#[must_use]
	pub fn new(path: VPathBuf, kind: EntryKind) -> Self {
		let name = path.file_name().unwrap_or("").into();

		Self {
			path,
			name,
			modified: None,
			accessed: None,
			kind,
			attributes: 0,
			physical_path: None,
			underlying: None,
		}
	}

	#[must_use]
	pub fn with_modified(mut self, t: SystemTime) -> Self {
		self.modified = Some(t);
		self
	}

	#[must_use]
	pub fn with_accessed(mut self, t: SystemTime) -> Self {
		self.accessed = Some(t);
		self
	}

	#[must_use]
	pub fn with_attributes(mut self, attrs: u32) -> Self {
		self.attributes = attrs;
		self
	}

	#[must_use]
	pub fn with_physical_path(mut self, p: impl Into<String>) -> Self {
		self.physical_path = Some(p.into());
		self
	}

	#[must_use]
	pub fn with_underlying(mut self, underlying: Arc<Entry>) -> Self {
		self.underlying = Some(underlying);
		self
	}

	#[must_use]
	pub fn rebase(mut self, new_path: VPathBuf) -> Self {
		self.name = new_path.file_name().unwrap_or("").into();
		self.path = new_path;
		self
	}

	#[must_use]
	pub fn path(&self) -> &VPathBuf {
		&self.path
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn modified(&self) -> Timestamp {
		self.modified
	}

	#[must_use]
	pub fn accessed(&self) -> Timestamp {
		self.accessed
	}

	#[must_use]
	pub fn kind(&self) -> &EntryKind {
		&self.kind
	}

	#[must_use]
	pub fn attributes(&self) -> u32 {
		self.attributes
	}

	#[must_use]
	pub fn physical_path(&self) -> Option<&str> {
		self.physical_path.as_deref()
	}

	#[must_use]
	pub fn underlying(&self) -> Option<&Entry> {
		self.underlying.as_deref()
	}

	#[must_use]
	pub fn is_file(&self) -> bool {
		matches!(self.kind, EntryKind::File { .. })
	}

	#[must_use]
	pub fn is_directory(&self) -> bool {
		matches!(self.kind, EntryKind::Directory)
	}

	#[must_use]
	pub fn length(&self) -> Option<u64> {
		match self.kind {
			EntryKind::File { length } => length,
			_ => None,
		}
	}
}

/// A not-refreshed snapshot of one directory browse. Mutating the filesystem afterward
/// does not perturb a `DirectoryContent` already returned to a caller.
#[derive(Debug, Clone)]
pub struct DirectoryContent {
	path: VPathBuf,
	exists: bool,
	children: Vec<Entry>,
}

impl DirectoryContent {
	#[must_use]
	pub fn existing(path: VPathBuf, children: Vec<Entry>) -> Self {
		Self {
			path,
			exists: true,
			children,
		}
	}

	#[must_use]
	pub fn missing(path: VPathBuf) -> Self {
		Self {
			path,
			exists: false,
			children: Vec::new(),
		}
	}

	#[must_use]
	pub fn path(&self) -> &VPathBuf {
		&self.path
	}

	#[must_use]
	pub fn exists(&self) -> bool {
		self.exists
	}

	#[must_use]
	pub fn children(&self) -> &[Entry] {
		&self.children
	}
}
