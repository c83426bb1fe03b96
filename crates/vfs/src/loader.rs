//! The package-loader contract consumed by [`crate::vfs::VirtualFileSystem`] auto-mount.
//!
//! The source's five capability sub-contracts (open file, load file, use stream, load from
//! stream, use bytes) differ only in how bytes reach the loader, not in what the loader does
//! with them once it has them; they collapse here to one `load` method over an owned byte
//! buffer plus an extension match predicate.

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::fs_trait::FileSystem;

/// Produces a [`FileSystem`] from the bytes of a recognized archive format.
///
/// No concrete implementation ships in this crate (archive formats are an excluded
/// external collaborator, spec §1/§6); tests exercise auto-mount with a stub loader.
pub trait PackageLoader: Send + Sync + fmt::Debug {
	/// The lowercase file extension (without the leading dot) this loader claims, e.g.
	/// `"zip"`. Used case-insensitively, and to detect `AutoMount` union collisions.
	fn extension(&self) -> &str;

	/// Interprets `bytes` as this loader's archive format and produces a filesystem view
	/// over its contents.
	fn load(&self, bytes: Vec<u8>) -> Result<Arc<dyn FileSystem>, Error>;

	/// Whether this loader claims the given (lowercased, no leading dot) extension.
	fn matches(&self, extension: &str) -> bool {
		self.extension().eq_ignore_ascii_case(extension)
	}
}
