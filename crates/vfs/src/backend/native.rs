//! A thin `std::fs`-backed [`FileSystem`] (spec §6). Exercises `FileSystemDecoration`,
//! `ConcatFileSystem`, and `VirtualFileSystem` against real storage in tests; it does not
//! attempt to replicate OS semantics beyond what the capability options already model
//! (permissions, extended attributes, hard links are all out of scope).
//!
//! `Observe` is left at the trait's default `NotSupported` body: OS change-notification
//! plumbing is an excluded external collaborator, and a backend that always reports
//! `NotSupported` for it is itself useful as the thing `ConcatFileSystem`'s observer fan-out
//! and `VirtualFileSystem`'s mount bridge get exercised against.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use crate::entry::{DirectoryContent, Entry, EntryKind};
use crate::error::{Error, ErrorKind, Result};
use crate::fs_trait::{FileSystem, Stream};
use crate::option::FsOptions;
use crate::path::{VPath, VPathBuf};

/// Bit set in `attributes` by `SetFileAttribute`/reported by `GetEntry` for a read-only
/// file, the one OS-ish attribute that maps cleanly onto every platform `std::fs` runs on.
pub const ATTR_READONLY: u32 = 0b1;

/// Roots every path at a real directory on the host OS.
pub struct NativeFileSystem {
	root: PathBuf,
	options: FsOptions,
}

impl NativeFileSystem {
	#[must_use]
	pub fn new(root: impl Into<PathBuf>, options: FsOptions) -> Arc<Self> {
		Arc::new(Self {
			root: root.into(),
			options,
		})
	}

	fn resolve(&self, path: &VPath) -> PathBuf {
		let mut real = self.root.clone();

		for component in path.components() {
			real.push(component.as_str());
		}

		real
	}

	fn entry_from_metadata(&self, path: VPathBuf, meta: &std::fs::Metadata) -> Entry {
		let kind = if meta.is_dir() {
			EntryKind::Directory
		} else {
			EntryKind::File {
				length: Some(meta.len()),
			}
		};

		let mut entry = Entry::new(path, kind);

		if let Ok(modified) = meta.modified() {
			entry = entry.with_modified(modified);
		}
		if let Ok(accessed) = meta.accessed() {
			entry = entry.with_accessed(accessed);
		}
		if meta.permissions().readonly() {
			entry = entry.with_attributes(ATTR_READONLY);
		}

		entry
	}
}

impl FileSystem for NativeFileSystem {
	fn options(&self) -> &FsOptions {
		&self.options
	}

	fn open(&self, path: &VPath, write: bool, create: bool) -> Result<Box<dyn Stream>> {
		let open_opt = self.options.open();

		if !open_opt.can_open {
			return Err(Error::not_supported());
		}
		if write && !open_opt.can_write {
			return Err(Error::new(ErrorKind::NoWriteAccess));
		}
		if !write && !open_opt.can_read {
			return Err(Error::new(ErrorKind::NoReadAccess));
		}

		let mut opts = OpenOptions::new();

		if write {
			opts.write(true);

			if create {
				if !open_opt.can_create_file {
					return Err(Error::not_supported());
				}

				opts.create(true);
			}
		} else {
			opts.read(true);
		}

		let file = opts.open(self.resolve(path))?;
		Ok(Box::new(file))
	}

	fn browse(&self, path: &VPath) -> Result<DirectoryContent> {
		if !self.options.browse().can_browse {
			return Err(Error::not_supported());
		}

		let real = self.resolve(path);

		if !real.exists() {
			return Ok(DirectoryContent::missing(path.to_owned_path()));
		}

		let mut children = Vec::new();

		for dirent in std::fs::read_dir(&real)? {
			let dirent = dirent?;
			let name = dirent.file_name().to_string_lossy().into_owned();
			let meta = dirent.metadata()?;
			let child_path = path.to_owned_path().join(&name);
			children.push(self.entry_from_metadata(child_path, &meta));
		}

		Ok(DirectoryContent::existing(path.to_owned_path(), children))
	}

	fn entry(&self, path: &VPath) -> Result<Entry> {
		if !self.options.browse().can_get_entry {
			return Err(Error::not_supported());
		}

		let meta = std::fs::metadata(self.resolve(path))?;
		Ok(self.entry_from_metadata(path.to_owned_path(), &meta))
	}

	fn move_entry(&self, from: &VPath, to: &VPath) -> Result<()> {
		if !self.options.move_().can_move {
			return Err(Error::not_supported());
		}

		std::fs::rename(self.resolve(from), self.resolve(to))?;
		Ok(())
	}

	fn delete(&self, path: &VPath) -> Result<()> {
		if !self.options.delete().can_delete {
			return Err(Error::not_supported());
		}

		let real = self.resolve(path);
		let meta = std::fs::metadata(&real)?;

		if meta.is_dir() {
			std::fs::remove_dir(&real)?;
		} else {
			std::fs::remove_file(&real)?;
		}

		Ok(())
	}

	fn create_directory(&self, path: &VPath) -> Result<()> {
		if !self.options.create_directory().can_create_directory {
			return Err(Error::not_supported());
		}

		std::fs::create_dir(self.resolve(path))?;
		Ok(())
	}

	fn set_attributes(&self, path: &VPath, attributes: u32) -> Result<()> {
		if !self.options.file_attribute().can_set_attribute {
			return Err(Error::not_supported());
		}

		let real = self.resolve(path);
		let mut perms = std::fs::metadata(&real)?.permissions();
		perms.set_readonly(attributes & ATTR_READONLY != 0);
		std::fs::set_permissions(&real, perms)?;
		Ok(())
	}
}
