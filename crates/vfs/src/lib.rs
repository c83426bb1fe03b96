//! # vfs
//!
//! A composable virtual file system: a path-addressed abstraction over heterogeneous
//! storage backends (native OS, in-memory, embedded, archive packages) that can be
//! overlaid (`ConcatFileSystem`), capability-narrowed (`FileSystemDecoration`), and mounted
//! into trees (`VirtualFileSystem`) behind one `FileSystem` trait. A transactional
//! operation engine (`ops`) builds copy/move/delete/tree/batch operations on top, with
//! estimate-then-run semantics, cancellation, and rollback.

mod backend;
mod concat;
mod decoration;
mod dispose;
mod entry;
mod error;
mod event;
mod fs_trait;
mod glob;
mod loader;
mod memory;
mod ops;
mod option;
mod path;
mod pool;
mod vfs;

#[cfg(test)]
mod scenarios;

pub use backend::NativeFileSystem;
pub use concat::ConcatFileSystem;
pub use decoration::{FileSystemDecoration, PathConverter, PrefixConverter};
pub use dispose::{BelateDispose, BelateGuard, Disposable};
pub use entry::{
	DirectoryContent, DriveInfo, DriveMeta, Entry, EntryKind, MountAssignment, Timestamp,
};
pub use error::{Error, ErrorKind, Result};
pub use event::{
	CallerThreadDispatcher, Dispatcher, Event, EventKind, Observer, ObserverHandle, ObserverList,
	TaskPoolDispatcher,
};
pub use fs_trait::{FileSystem, Stream};
pub use glob::Pattern;
pub use loader::PackageLoader;
pub use memory::{MemoryFileSystem, MemoryStream};
pub use ops::{
	Batch, CopyFile, CopyTree, CreateDirectory, Delete, DstPolicy, Move, MoveTree, Operation,
	OperationEvent, OperationPolicy, OperationSession, OperationState, ProgressObserver,
	SessionConfig, SrcPolicy, TransferTree,
};
pub use option::{
	AutoMountOption, BrowseOption, CreateDirectoryOption, DeleteOption, FileAttributeOption,
	FsOptions, MountOption, MoveOption, ObserveOption, OpenOption, OptionKind, OptionValue,
	PathInfoOption, SubPathOption, Token, TokenSet,
};
pub use path::{Components, VPath, VPathBuf};
pub use pool::{BlockHandle, BlockPool, BlockPoolConfig};
pub use vfs::VirtualFileSystem;
