//! The single `FileSystem` trait (spec §4.1) that every backend, decoration, and
//! composition in this crate implements.
//!
//! The source expresses each capability (open, browse, observe, move, delete, ...) as its
//! own narrow interface and a backend opts into the ones it supports by implementing that
//! interface. Rust has no interface-inheritance story that matches it cleanly, and an
//! object-safe `dyn FileSystem` needs one concrete vtable, so every capability becomes a
//! method on one trait; a backend that doesn't support a capability simply inherits the
//! default `Err(ErrorKind::NotSupported)` body instead of the caller needing to downcast or
//! query for an optional interface.

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use crate::entry::{DirectoryContent, Entry};
use crate::error::{Error, Result};
use crate::event::{Dispatcher, Observer, ObserverHandle};
use crate::glob::Pattern;
use crate::option::FsOptions;
use crate::path::{VPath, VPathBuf};

/// A readable/writable/seekable handle returned by `Open`. Closing is simply dropping it;
/// a backend that needs to flush on close does so from its `Drop` impl.
pub trait Stream: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> Stream for T {}

/// One addressable filesystem: a native directory tree, an in-memory store, an archive
/// view, a decoration, a concatenation, or a whole mount tree. Every method defaults to
/// `NotSupported`; a backend overrides exactly the capabilities its [`FsOptions`] advertise.
pub trait FileSystem: Send + Sync {
	/// The capabilities this filesystem (or, for a mount tree, this *node*) was configured
	/// with. Callers are expected to check this before calling a capability method, but
	/// every method independently returns `NotSupported` if invoked anyway.
	fn options(&self) -> &FsOptions;

	fn open(&self, _path: &VPath, _write: bool, _create: bool) -> Result<Box<dyn Stream>> {
		Err(Error::not_supported())
	}

	fn browse(&self, _path: &VPath) -> Result<DirectoryContent> {
		Err(Error::not_supported())
	}

	fn entry(&self, _path: &VPath) -> Result<Entry> {
		Err(Error::not_supported())
	}

	fn observe(
		&self,
		_filter: Pattern,
		_observer: Arc<dyn Observer>,
		_dispatcher: Arc<dyn Dispatcher>,
	) -> Result<ObserverHandle> {
		Err(Error::not_supported())
	}

	fn move_entry(&self, _from: &VPath, _to: &VPath) -> Result<()> {
		Err(Error::not_supported())
	}

	fn delete(&self, _path: &VPath) -> Result<()> {
		Err(Error::not_supported())
	}

	fn create_directory(&self, _path: &VPath) -> Result<()> {
		Err(Error::not_supported())
	}

	fn mount(&self, _path: &VPath, _fs: Arc<dyn FileSystem>, _options: FsOptions) -> Result<()> {
		Err(Error::not_supported())
	}

	fn unmount(&self, _path: &VPath) -> Result<()> {
		Err(Error::not_supported())
	}

	fn list_mounts(&self) -> Result<Vec<VPathBuf>> {
		Err(Error::not_supported())
	}

	fn set_attributes(&self, _path: &VPath, _attributes: u32) -> Result<()> {
		Err(Error::not_supported())
	}
}
