//! Wraps one filesystem, remapping every path that crosses the boundary (spec §4.7).
//!
//! The motivating case is sub-path mounting (spec's `SubPath` option): a directory tree is
//! mounted such that only a subtree of it is visible, under a different outer name. The
//! remapping itself is pluggable behind [`PathConverter`] so other decorations (case
//! folding, read-only projection) can reuse the same wrapper shape.

use std::sync::Arc;

use crate::entry::{DirectoryContent, Entry};
use crate::error::{Error, Result};
use crate::event::{Dispatcher, Event, EventKind, Observer, ObserverHandle};
use crate::fs_trait::{FileSystem, Stream};
use crate::glob::Pattern;
use crate::option::FsOptions;
use crate::path::{VPath, VPathBuf};

/// Translates paths between a decoration's outer namespace and its wrapped filesystem's
/// inner namespace.
pub trait PathConverter: Send + Sync {
	fn to_inner(&self, outer: &VPath) -> Result<VPathBuf>;
	fn to_outer(&self, inner: &VPath) -> Result<VPathBuf>;
}

/// The common case: the outer namespace is the inner one with a fixed prefix stripped (or,
/// in reverse, added back).
pub struct PrefixConverter {
	prefix: VPathBuf,
}

impl PrefixConverter {
	#[must_use]
	pub fn new(prefix: impl Into<VPathBuf>) -> Self {
		Self {
			prefix: prefix.into().into_dir(),
		}
	}
}

impl PathConverter for PrefixConverter {
	/// The outer view has the prefix stripped off, so crossing back into the wrapped
	/// filesystem means adding it back.
	fn to_inner(&self, outer: &VPath) -> Result<VPathBuf> {
		Ok(self.prefix.join(outer.as_str()))
	}

	/// Only paths under the prefix are visible in the outer namespace at all.
	fn to_outer(&self, inner: &VPath) -> Result<VPathBuf> {
		inner
			.strip_prefix(self.prefix.as_path())
			.map(VPath::to_owned_path)
			.ok_or_else(Error::not_found)
	}
}

pub struct FileSystemDecoration {
	inner: Arc<dyn FileSystem>,
	converter: Arc<dyn PathConverter>,
	options: FsOptions,
}

impl FileSystemDecoration {
	#[must_use]
	pub fn new(inner: Arc<dyn FileSystem>, converter: Arc<dyn PathConverter>) -> Self {
		let options = inner.options().clone();
		Self {
			inner,
			converter,
			options,
		}
	}

	#[must_use]
	pub fn with_options(mut self, options: FsOptions) -> Self {
		self.options = options;
		self
	}

	fn rebase_entry(&self, entry: &Entry) -> Result<Entry> {
		let outer_path = self.converter.to_outer(entry.path())?;
		let original = entry.clone();
		Ok(entry.clone().rebase(outer_path).with_underlying(Arc::new(original)))
	}
}

impl FileSystem for FileSystemDecoration {
	fn options(&self) -> &FsOptions {
		&self.options
	}

	fn open(&self, path: &VPath, write: bool, create: bool) -> Result<Box<dyn Stream>> {
		let inner_path = self.converter.to_inner(path)?;
		self.inner.open(&inner_path, write, create)
	}

	fn browse(&self, path: &VPath) -> Result<DirectoryContent> {
		let inner_path = self.converter.to_inner(path)?;
		let content = self.inner.browse(&inner_path)?;

		let children = content
			.children()
			.iter()
			.map(|e| self.rebase_entry(e))
			.collect::<Result<Vec<_>>>()?;

		Ok(if content.exists() {
			DirectoryContent::existing(path.to_owned_path(), children)
		} else {
			DirectoryContent::missing(path.to_owned_path())
		})
	}

	fn entry(&self, path: &VPath) -> Result<Entry> {
		let inner_path = self.converter.to_inner(path)?;
		let entry = self.inner.entry(&inner_path)?;
		self.rebase_entry(&entry)
	}

	fn observe(
		&self,
		filter: Pattern,
		observer: Arc<dyn Observer>,
		dispatcher: Arc<dyn Dispatcher>,
	) -> Result<ObserverHandle> {
		let forwarder = Arc::new(RebaseObserver {
			converter: self.converter.clone(),
			filter,
			inner: observer,
		});

		self.inner.observe(Pattern::all(), forwarder, dispatcher)
	}

	fn move_entry(&self, from: &VPath, to: &VPath) -> Result<()> {
		let inner_from = self.converter.to_inner(from)?;
		let inner_to = self.converter.to_inner(to)?;
		self.inner.move_entry(&inner_from, &inner_to)
	}

	fn delete(&self, path: &VPath) -> Result<()> {
		let inner_path = self.converter.to_inner(path)?;
		self.inner.delete(&inner_path)
	}

	fn create_directory(&self, path: &VPath) -> Result<()> {
		let inner_path = self.converter.to_inner(path)?;
		self.inner.create_directory(&inner_path)
	}

	fn set_attributes(&self, path: &VPath, attributes: u32) -> Result<()> {
		let inner_path = self.converter.to_inner(path)?;
		self.inner.set_attributes(&inner_path, attributes)
	}
}

/// Rewrites an inner-namespace event into the decoration's outer namespace, dropping it
/// if the rewritten path falls outside the decoration's own subtree or the caller's filter.
struct RebaseObserver {
	converter: Arc<dyn PathConverter>,
	filter: Pattern,
	inner: Arc<dyn Observer>,
}

impl Observer for RebaseObserver {
	fn on_event(&self, event: &Event) {
		let Ok(outer_path) = self.converter.to_outer(&event.path) else {
			return;
		};

		if !self.filter.is_match(&outer_path) {
			return;
		}

		let kind = match &event.kind {
			EventKind::Rename { from } => {
				let Ok(outer_from) = self.converter.to_outer(from) else {
					return;
				};
				EventKind::Rename { from: outer_from }
			}
			other => other.clone(),
		};

		self.inner.on_event(&Event {
			path: outer_path,
			kind,
		});
	}

	fn on_error(&self, error: &Error) {
		self.inner.on_error(error);
	}

	fn on_completed(&self) {
		self.inner.on_completed();
	}
}

#[cfg(test)]
mod test {
	use std::sync::Mutex;

	use super::*;
	use crate::event::CallerThreadDispatcher;
	use crate::memory::MemoryFileSystem;
	use crate::option::{BrowseOption, CreateDirectoryOption, ObserveOption, OpenOption, OptionValue};
	use crate::pool::BlockPoolConfig;
	use std::io::Write;

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
			.with(OptionValue::Observe(ObserveOption { can_observe: true }));

		MemoryFileSystem::new(
			options,
			BlockPoolConfig {
				block_size: 32,
				block_count: 32,
			},
		)
	}

	#[test]
	fn subpath_hides_everything_outside_prefix() {
		let inner = backing();
		inner.create_directory(VPath::new("/sub")).unwrap();
		drop(inner.open(VPath::new("/sub/a.txt"), true, true).unwrap());
		drop(inner.open(VPath::new("/outside.txt"), true, true).unwrap());

		let deco = FileSystemDecoration::new(inner, Arc::new(PrefixConverter::new("/sub")));

		assert!(deco.entry(VPath::new("/a.txt")).is_ok());
		assert!(deco.entry(VPath::new("/outside.txt")).is_err());
	}

	#[test]
	fn events_are_rebased_into_outer_namespace() {
		let inner = backing();
		inner.create_directory(VPath::new("/sub")).unwrap();
		let deco = FileSystemDecoration::new(inner, Arc::new(PrefixConverter::new("/sub")));

		struct Rec(Mutex<Vec<VPathBuf>>);
		impl Observer for Rec {
			fn on_event(&self, event: &Event) {
				self.0.lock().unwrap().push(event.path.clone());
			}
		}

		let rec = Arc::new(Rec(Mutex::new(vec![])));
		let _handle = deco
			.observe(Pattern::all(), rec.clone(), Arc::new(CallerThreadDispatcher))
			.unwrap();

		let mut f = deco.open(VPath::new("/new.txt"), true, true).unwrap();
		f.write_all(b"x").unwrap();
		drop(f);

		assert_eq!(rec.0.lock().unwrap().as_slice(), &[VPathBuf::from("new.txt")]);
	}
}
