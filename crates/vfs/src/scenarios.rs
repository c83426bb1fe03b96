//! End-to-end scenario tests exercising two or more components together, one per named
//! scenario rather than one per module: a round-trip through the memory filesystem, a pool
//! quota hit and recovery, a sub-path decoration, a concat shadow, a mount/unmount event
//! pair, an operation rollback, and a mid-run cancellation.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use crate::concat::ConcatFileSystem;
use crate::decoration::{FileSystemDecoration, PrefixConverter};
use crate::error::ErrorKind;
use crate::event::{CallerThreadDispatcher, Event, Observer};
use crate::fs_trait::FileSystem;
use crate::memory::MemoryFileSystem;
use crate::ops::{CopyFile, Operation, OperationSession, OperationState, SessionConfig};
use crate::option::{
	BrowseOption, CreateDirectoryOption, MountOption, ObserveOption, OpenOption, OptionValue,
};
use crate::option::FsOptions;
use crate::path::VPath;
use crate::pool::{BlockPool, BlockPoolConfig};
use crate::vfs::VirtualFileSystem;

fn rw_options() -> FsOptions {
	FsOptions::new()
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
}

#[test]
fn s1_memory_round_trip() {
	let fs = MemoryFileSystem::new(
		rw_options(),
		BlockPoolConfig {
			block_size: 1024,
			block_count: 16,
		},
	);

	fs.create_directory(VPath::new("/a/b/c")).unwrap();

	{
		let mut stream = fs.open(VPath::new("/a/b/c/file"), true, true).unwrap();
		stream.write_all(&[1, 2, 3]).unwrap();
	}

	let listing = fs.browse(VPath::new("/a/b/c")).unwrap();
	assert_eq!(listing.children().len(), 1);
	assert_eq!(listing.children()[0].name(), "file");
	assert_eq!(listing.children()[0].length(), Some(3));

	let mut stream = fs.open(VPath::new("/a/b/c/file"), false, false).unwrap();
	let mut buf = Vec::new();
	stream.read_to_end(&mut buf).unwrap();
	assert_eq!(buf, [1, 2, 3]);
}

#[test]
fn s2_pool_quota_out_of_space_then_recovers() {
	let fs = MemoryFileSystem::new(
		rw_options(),
		BlockPoolConfig {
			block_size: 1024,
			block_count: 2,
		},
	);

	{
		let mut file1 = fs.open(VPath::new("file1"), true, true).unwrap();
		file1.write_all(&[0u8; 1024]).unwrap();
	}

	{
		let mut file2 = fs.open(VPath::new("file2"), true, true).unwrap();
		let err = file2.write_all(&[0u8; 2048]).unwrap_err();
		assert_eq!(err.kind(), std::io::ErrorKind::OutOfMemory);
	}

	fs.delete(VPath::new("file1")).unwrap();

	{
		let mut file2 = fs.open(VPath::new("file2"), true, true).unwrap();
		file2.write_all(&[0u8; 2048]).unwrap();
	}

	assert_eq!(fs.entry(VPath::new("file2")).unwrap().length(), Some(2048));
}

#[test]
fn s3_decoration_subpath() {
	let inner = MemoryFileSystem::new(
		rw_options(),
		BlockPoolConfig {
			block_size: 64,
			block_count: 64,
		},
	);

	inner.create_directory(VPath::new("/tmp/dir")).unwrap();
	drop(inner.open(VPath::new("/tmp/dir/file.txt"), true, true).unwrap());

	let deco = FileSystemDecoration::new(inner, Arc::new(PrefixConverter::new("/tmp/")));

	let root_listing = deco.browse(VPath::new("")).unwrap();
	assert_eq!(root_listing.children().len(), 1);
	assert_eq!(root_listing.children()[0].name(), "dir");

	let dir_listing = deco.browse(VPath::new("/dir/")).unwrap();
	assert_eq!(dir_listing.children().len(), 1);
	assert_eq!(dir_listing.children()[0].name(), "file.txt");

	assert_eq!(deco.entry(VPath::new("/outside")).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn s4_concat_shadows_on_name_collision() {
	let ram1 = MemoryFileSystem::new(
		rw_options(),
		BlockPoolConfig {
			block_size: 1024,
			block_count: 8,
		},
	);
	{
		let mut s = ram1.open(VPath::new("file.txt"), true, true).unwrap();
		s.write_all(&[0u8; 1024]).unwrap();
	}

	let ram2 = MemoryFileSystem::new(
		rw_options(),
		BlockPoolConfig {
			block_size: 1024,
			block_count: 8,
		},
	);
	{
		let mut s = ram2.open(VPath::new("file.txt"), true, true).unwrap();
		s.write_all(&[0u8; 10]).unwrap();
	}

	let concat = ConcatFileSystem::new(vec![ram1, ram2]).unwrap();
	let listing = concat.browse(VPath::new("")).unwrap();

	assert_eq!(listing.children().len(), 1);
	assert_eq!(listing.children()[0].length(), Some(1024));
}

struct Recorder(Mutex<Vec<Event>>);

impl Observer for Recorder {
	fn on_event(&self, event: &Event) {
		self.0.lock().unwrap().push(event.clone());
	}
}

#[test]
fn s5_mount_and_unmount_synthesize_events() {
	let mut options = rw_options();
	options = options
		.with(OptionValue::Mount(MountOption {
			can_mount: true,
			can_unmount: true,
			can_list_mounts: true,
		}))
		.with(OptionValue::Observe(ObserveOption { can_observe: true }));

	let vfs = VirtualFileSystem::new(options);
	let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
	let _handle = vfs
		.observe(
			crate::glob::Pattern::all(),
			recorder.clone(),
			Arc::new(CallerThreadDispatcher),
		)
		.unwrap();

	let ram = MemoryFileSystem::new(
		rw_options().with(OptionValue::Observe(ObserveOption { can_observe: true })),
		BlockPoolConfig {
			block_size: 64,
			block_count: 64,
		},
	);
	ram.create_directory(VPath::new("/dir")).unwrap();
	drop(ram.open(VPath::new("/dir/file.txt"), true, true).unwrap());

	let mount_options = FsOptions::new().with(OptionValue::Observe(ObserveOption {
		can_observe: true,
	}));
	vfs.mount(VPath::new(""), ram, mount_options).unwrap();

	{
		let events = recorder.0.lock().unwrap();
		assert!(events.iter().any(|e| {
			matches!(e.kind, crate::event::EventKind::Create)
				&& e.path.as_path() == VPath::new("dir/file.txt")
		}));
	}

	vfs.unmount(VPath::new("")).unwrap();

	{
		let events = recorder.0.lock().unwrap();
		assert!(events.iter().any(|e| {
			matches!(e.kind, crate::event::EventKind::Delete)
				&& e.path.as_path() == VPath::new("dir/file.txt")
		}));
	}
}

#[test]
fn s6_operation_rollback_undoes_a_completed_copy() {
	let ms = MemoryFileSystem::new(
		rw_options(),
		BlockPoolConfig {
			block_size: 4096,
			block_count: 520,
		},
	);
	{
		let mut f = ms.open(VPath::new("file"), true, true).unwrap();
		f.write_all(&vec![7u8; 1024 * 1024]).unwrap();
	}

	let pool = BlockPool::new(BlockPoolConfig {
		block_size: 64 * 1024,
		block_count: 4,
	});
	let session = OperationSession::new(pool, SessionConfig::default());

	let mut copy = CopyFile::new(ms.clone(), "file", ms.clone(), "file.copy");
	copy.estimate(&session).unwrap();
	copy.run(&session).unwrap();
	copy.assert_successful().unwrap();
	assert!(copy.can_rollback());

	assert!(ms.entry(VPath::new("file")).is_ok());
	assert!(ms.entry(VPath::new("file.copy")).is_ok());

	ms.delete(VPath::new("file.copy")).unwrap();

	let mut copy = CopyFile::new(ms.clone(), "file", ms.clone(), "file.copy");
	copy.estimate(&session).unwrap();
	copy.run(&session).unwrap();
	copy.assert_successful().unwrap();

	let mut rollback = copy.create_rollback().expect("a completed, non-preexisting copy rolls back");
	rollback.estimate(&session).unwrap();
	rollback.run(&session).unwrap();
	rollback.assert_successful().unwrap();

	assert!(ms.entry(VPath::new("file.copy")).is_err());
}

/// Cancels its session the first time it sees a `Progress` event, guaranteeing the
/// operation under test is cancelled strictly mid-run rather than racing a timer against
/// however fast the in-memory copy loop happens to go.
struct CancelOnFirstProgress(std::sync::OnceLock<std::sync::Weak<OperationSession>>);

impl crate::ops::ProgressObserver for CancelOnFirstProgress {
	fn on_operation_event(&self, event: &crate::ops::OperationEvent) {
		if matches!(event, crate::ops::OperationEvent::Progress { .. }) {
			if let Some(session) = self.0.get().and_then(std::sync::Weak::upgrade) {
				session.cancel();
			}
		}
	}
}

#[test]
fn s7_cancellation_mid_run_stops_without_spurious_progress() {
	let ms = MemoryFileSystem::new(
		rw_options(),
		BlockPoolConfig {
			block_size: 4096,
			block_count: 4096,
		},
	);
	{
		let mut f = ms.open(VPath::new("big"), true, true).unwrap();
		f.write_all(&vec![1u8; 4 * 1024 * 1024]).unwrap();
	}

	let canceller = Arc::new(CancelOnFirstProgress(std::sync::OnceLock::new()));

	// A copy-buffer block the size of one progress interval means the very first
	// `record_progress` call lands after exactly one block, so cancellation fires on the
	// second loop iteration: demonstrably mid-run, never before the first byte moves.
	let pool = BlockPool::new(BlockPoolConfig {
		block_size: 4096,
		block_count: 1,
	});
	let session = OperationSession::new(
		pool,
		SessionConfig {
			progress_interval: 4096,
			observer: Some(canceller.clone()),
			..SessionConfig::default()
		},
	);
	canceller.0.set(Arc::downgrade(&session)).ok();

	let mut copy = CopyFile::new(ms.clone(), "big", ms.clone(), "big.copy");
	copy.estimate(&session).unwrap();
	copy.run(&session).unwrap();

	assert_eq!(copy.state(), OperationState::Cancelled);
	assert!(copy.create_rollback().is_none());

	let events = session.events();
	let last_state_is_cancelled = matches!(
		events.last(),
		Some(crate::ops::OperationEvent::State {
			state: OperationState::Cancelled,
			..
		})
	);
	assert!(last_state_is_cancelled, "no progress event may follow the Cancelled state event");

	let copy_entry = ms.entry(VPath::new("big.copy")).unwrap();
	let copied = copy_entry.length().unwrap_or(0);
	assert!(copied > 0, "cancellation must happen after at least one block, not before");
	assert!(copied < 4 * 1024 * 1024, "an incomplete copy must not reach the source's full length");
}
