//! Crate-wide error type.
//!
//! Mirrors the hand-rolled `vfs::Error` idiom used elsewhere in this workspace: a flat
//! enum of causes plus a manual `Display`/`std::error::Error` impl, rather than pulling in
//! an error-derive crate for a handful of variants.

use std::fmt;

/// The kind of failure, independent of any wrapped cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// A path did not resolve to anything.
	NotFound,
	/// A destination path is already occupied by a file.
	AlreadyExistsFile,
	/// A destination path is already occupied by a directory.
	AlreadyExistsDirectory,
	/// A directory delete without `recurse` hit a non-empty directory.
	NotEmpty,
	NoReadAccess,
	NoWriteAccess,
	Unauthorized,
	/// The filesystem does not implement the requested operation.
	NotSupported,
	/// Malformed path, or an invalid mode/access/share combination.
	InvalidArgument,
	/// The block pool is exhausted with no hope of growth.
	OutOfSpace,
	/// An unexpected backend failure (wraps a `std::io::Error` in practice).
	Io,
	/// A cancellation token tripped mid-operation.
	Cancelled,
	/// The filesystem or stream was used after disposal.
	Disposed,
	/// A package loader could not interpret an archive's bytes.
	PackageLoadError,
	/// Two [`crate::option::FsOptions`] values could not be merged (e.g. an `AutoMount`
	/// extension collision, or two differing `SubPath`s).
	OptionCompositionUnsupported,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let msg = match self {
			Self::NotFound => "no entry found at the given path",
			Self::AlreadyExistsFile => "destination path is occupied by a file",
			Self::AlreadyExistsDirectory => "destination path is occupied by a directory",
			Self::NotEmpty => "directory is not empty",
			Self::NoReadAccess => "no read access",
			Self::NoWriteAccess => "no write access",
			Self::Unauthorized => "unauthorized",
			Self::NotSupported => "operation not supported by this filesystem",
			Self::InvalidArgument => "invalid argument",
			Self::OutOfSpace => "block pool exhausted",
			Self::Io => "backend I/O failure",
			Self::Cancelled => "operation cancelled",
			Self::Disposed => "used after disposal",
			Self::PackageLoadError => "package could not be loaded",
			Self::OptionCompositionUnsupported => "options could not be composed",
		};
		f.write_str(msg)
	}
}

/// The crate-wide error type. Every fallible operation returns `Result<T, Error>`.
#[derive(Debug)]
pub struct Error {
	kind: ErrorKind,
	cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
	#[must_use]
	pub fn new(kind: ErrorKind) -> Self {
		Self { kind, cause: None }
	}

	#[must_use]
	pub fn with_cause(
		kind: ErrorKind,
		cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
	) -> Self {
		Self {
			kind,
			cause: Some(cause.into()),
		}
	}

	#[must_use]
	pub fn kind(&self) -> ErrorKind {
		self.kind
	}

	#[must_use]
	pub fn not_found() -> Self {
		Self::new(ErrorKind::NotFound)
	}

	#[must_use]
	pub fn not_supported() -> Self {
		Self::new(ErrorKind::NotSupported)
	}

	#[must_use]
	pub fn not_empty() -> Self {
		Self::new(ErrorKind::NotEmpty)
	}

	#[must_use]
	pub fn out_of_space() -> Self {
		Self::new(ErrorKind::OutOfSpace)
	}

	#[must_use]
	pub fn invalid_argument() -> Self {
		Self::new(ErrorKind::InvalidArgument)
	}

	#[must_use]
	pub fn cancelled() -> Self {
		Self::new(ErrorKind::Cancelled)
	}

	#[must_use]
	pub fn disposed() -> Self {
		Self::new(ErrorKind::Disposed)
	}

	#[must_use]
	pub fn already_exists_file() -> Self {
		Self::new(ErrorKind::AlreadyExistsFile)
	}

	#[must_use]
	pub fn already_exists_directory() -> Self {
		Self::new(ErrorKind::AlreadyExistsDirectory)
	}

	#[must_use]
	pub fn option_composition_unsupported() -> Self {
		Self::new(ErrorKind::OptionCompositionUnsupported)
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.cause {
			Some(cause) => write!(f, "{}: {cause}", self.kind),
			None => write!(f, "{}", self.kind),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.cause.as_ref().map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
	}
}

impl From<std::io::Error> for Error {
	fn from(value: std::io::Error) -> Self {
		match value.kind() {
			std::io::ErrorKind::NotFound => Self::not_found(),
			std::io::ErrorKind::PermissionDenied => Self::new(ErrorKind::Unauthorized),
			std::io::ErrorKind::AlreadyExists => Self::already_exists_file(),
			std::io::ErrorKind::OutOfMemory => Self::out_of_space(),
			_ => Self::with_cause(ErrorKind::Io, value),
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
