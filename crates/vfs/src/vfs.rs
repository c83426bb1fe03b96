//! The mount tree: the top-level composition that routes a path to whichever mounted
//! filesystem claims the longest matching prefix, bridges every mount's events into one
//! namespace, and auto-mounts recognized archive files on first access (spec §4.7, C9).

use std::io::Read;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entry::{DirectoryContent, Entry, EntryKind, MountAssignment};
use crate::error::{Error, Result};
use crate::event::{
	CallerThreadDispatcher, Dispatcher, Event, EventKind, Observer, ObserverHandle, ObserverList,
};
use crate::fs_trait::{FileSystem, Stream};
use crate::glob::Pattern;
use crate::option::FsOptions;
use crate::path::{VPath, VPathBuf};

struct MountEntry {
	path: VPathBuf,
	fs: Arc<dyn FileSystem>,
	options: FsOptions,
	/// Kept alive for as long as the mount is registered; dropping it unsubscribes.
	_bridge: Option<ObserverHandle>,
}

pub struct VirtualFileSystem {
	options: FsOptions,
	mounts: RwLock<Vec<MountEntry>>,
	observers: Arc<ObserverList>,
}

impl VirtualFileSystem {
	#[must_use]
	pub fn new(options: FsOptions) -> Arc<Self> {
		Arc::new(Self {
			options,
			mounts: RwLock::new(Vec::new()),
			observers: ObserverList::new(),
		})
	}

	fn find_mount<'a>(
		&self,
		mounts: &'a [MountEntry],
		path: &VPath,
	) -> Option<(&'a MountEntry, VPathBuf)> {
		let best = mounts
			.iter()
			.filter(|m| path.starts_with(m.path.as_path()))
			.max_by_key(|m| m.path.byte_len())?;

		let relative = path
			.strip_prefix(best.path.as_path())
			.map(VPath::to_owned_path)
			.unwrap_or_else(VPathBuf::root);

		Some((best, relative))
	}

	/// Walks every ancestor of `path`, loading and mounting the first recognized archive
	/// file it finds that isn't already mounted. A no-op if no `AutoMount` loaders are
	/// configured.
	fn auto_mount_ancestors(&self, path: &VPath) -> Result<()> {
		let auto = self.options.auto_mount();

		if auto.loaders.is_empty() {
			return Ok(());
		}

		let mut current = VPathBuf::root();

		for component in path.components() {
			current = current.join(component.as_str());
			let dir_form = current.clone().into_dir();

			if self.mounts.read().iter().any(|m| m.path == dir_form) {
				continue;
			}

			let Some(ext) = current.as_path().extension() else {
				continue;
			};
			let Some(loader) = auto.loaders.iter().find(|l| l.matches(ext)) else {
				continue;
			};

			let bytes = {
				let mounts = self.mounts.read();
				let Some((entry, relative)) = self.find_mount(&mounts, current.as_path()) else {
					continue;
				};
				let mut stream = entry.fs.open(&relative, false, false)?;
				let mut buf = Vec::new();
				stream.read_to_end(&mut buf)?;
				buf
			};

			let loaded = loader.load(bytes)?;
			self.mount(current.as_path(), loaded, FsOptions::new())?;
		}

		Ok(())
	}

	/// Walks every file and directory `fs` can enumerate from its root and fires one event
	/// per entry, rebased under `mount_path`, via `make_event`. Used to synthesize the
	/// Create events a mount surfaces for content that already existed in the backend, and
	/// the symmetric Delete events an unmount surfaces for content it's about to drop.
	fn synthesize_mount_events(
		&self,
		fs: &Arc<dyn FileSystem>,
		mount_path: &VPathBuf,
		make_event: fn(VPathBuf) -> Event,
	) {
		let mut stack = vec![VPathBuf::root()];

		while let Some(inner_path) = stack.pop() {
			let Ok(content) = fs.browse(inner_path.as_path()) else {
				continue;
			};

			if !content.exists() {
				continue;
			}

			for child in content.children() {
				let outer_path = mount_path.join(child.path().as_str());
				self.observers.notify(make_event(outer_path));

				if child.is_directory() {
					stack.push(child.path().clone());
				}
			}
		}
	}
}

/// Rewrites a mounted filesystem's own (mount-relative) events into the virtual
/// filesystem's absolute namespace by prefixing the mount path.
struct MountBridgeObserver {
	prefix: VPathBuf,
	target: Arc<ObserverList>,
}

impl Observer for MountBridgeObserver {
	fn on_event(&self, event: &Event) {
		let path = self.prefix.join(event.path.as_str());

		let kind = match &event.kind {
			EventKind::Rename { from } => EventKind::Rename {
				from: self.prefix.join(from.as_str()),
			},
			other => other.clone(),
		};

		self.target.notify(Event { path, kind });
	}
}

impl FileSystem for VirtualFileSystem {
	fn options(&self) -> &FsOptions {
		&self.options
	}

	fn mount(&self, path: &VPath, fs: Arc<dyn FileSystem>, options: FsOptions) -> Result<()> {
		if !self.options.mount().can_mount {
			return Err(Error::not_supported());
		}

		let mount_path = path.to_owned_path().into_dir();
		let mut mounts = self.mounts.write();

		if mounts.iter().any(|m| m.path == mount_path) {
			return Err(Error::already_exists_directory());
		}

		let bridge = if options.observe().can_observe {
			let forwarder = Arc::new(MountBridgeObserver {
				prefix: mount_path.clone(),
				target: self.observers.clone(),
			});

			fs.observe(Pattern::all(), forwarder, Arc::new(CallerThreadDispatcher))
				.ok()
		} else {
			None
		};

		mounts.push(MountEntry {
			path: mount_path.clone(),
			fs: fs.clone(),
			options,
			_bridge: bridge,
		});

		drop(mounts);
		self.observers.notify(Event::create(mount_path.clone()));
		self.synthesize_mount_events(&fs, &mount_path, Event::create);
		Ok(())
	}

	fn unmount(&self, path: &VPath) -> Result<()> {
		if !self.options.mount().can_unmount {
			return Err(Error::not_supported());
		}

		let mount_path = path.to_owned_path().into_dir();
		let mut mounts = self.mounts.write();

		let idx = mounts
			.iter()
			.position(|m| m.path == mount_path)
			.ok_or_else(Error::not_found)?;
		let removed = mounts.remove(idx);
		drop(mounts);

		self.synthesize_mount_events(&removed.fs, &mount_path, Event::delete);
		self.observers.notify(Event::delete(mount_path));
		drop(removed);
		Ok(())
	}

	fn list_mounts(&self) -> Result<Vec<VPathBuf>> {
		if !self.options.mount().can_list_mounts {
			return Err(Error::not_supported());
		}

		Ok(self.mounts.read().iter().map(|m| m.path.clone()).collect())
	}

	fn open(&self, path: &VPath, write: bool, create: bool) -> Result<Box<dyn Stream>> {
		self.auto_mount_ancestors(path)?;
		let mounts = self.mounts.read();
		let (entry, relative) = self.find_mount(&mounts, path).ok_or_else(Error::not_found)?;
		entry.fs.open(&relative, write, create)
	}

	fn browse(&self, path: &VPath) -> Result<DirectoryContent> {
		self.auto_mount_ancestors(path)?;
		let mounts = self.mounts.read();
		let mount_path = path.to_owned_path().into_dir();

		let mut children = Vec::new();

		for entry in mounts.iter() {
			if entry.path.as_path() == mount_path.as_path() {
				continue;
			}

			let Some(rest) = entry.path.as_path().strip_prefix(mount_path.as_path()) else {
				continue;
			};

			let mut comps = rest.components();
			let Some(name) = comps.next() else { continue };

			if comps.next().is_none() {
				children.push(Entry::new(
					mount_path.join(name.as_str()),
					EntryKind::MountPoint {
						assignments: vec![MountAssignment {
							options: entry.options.clone(),
						}],
					},
				));
			}
		}

		let mut exists = !children.is_empty();

		if let Some((entry, relative)) = self.find_mount(&mounts, path) {
			if let Ok(content) = entry.fs.browse(&relative) {
				exists |= content.exists();

				for child in content.children() {
					children.push(child.clone().rebase(mount_path.join(child.name())));
				}
			}
		}

		Ok(if exists {
			DirectoryContent::existing(path.to_owned_path(), children)
		} else {
			DirectoryContent::missing(path.to_owned_path())
		})
	}

	fn entry(&self, path: &VPath) -> Result<Entry> {
		self.auto_mount_ancestors(path)?;
		let mounts = self.mounts.read();
		let mount_path = path.to_owned_path().into_dir();

		if let Some(m) = mounts.iter().find(|m| m.path.as_path() == mount_path.as_path()) {
			return Ok(Entry::new(
				path.to_owned_path(),
				EntryKind::MountPoint {
					assignments: vec![MountAssignment {
						options: m.options.clone(),
					}],
				},
			));
		}

		let (entry, relative) = self.find_mount(&mounts, path).ok_or_else(Error::not_found)?;
		let found = entry.fs.entry(&relative)?;
		Ok(found.rebase(path.to_owned_path()))
	}

	fn observe(
		&self,
		filter: Pattern,
		observer: Arc<dyn Observer>,
		dispatcher: Arc<dyn Dispatcher>,
	) -> Result<ObserverHandle> {
		if !self.options.observe().can_observe {
			return Err(Error::not_supported());
		}

		Ok(self.observers.add(filter, observer, dispatcher))
	}

	fn move_entry(&self, from: &VPath, to: &VPath) -> Result<()> {
		let mounts = self.mounts.read();
		let (entry_from, relative_from) =
			self.find_mount(&mounts, from).ok_or_else(Error::not_found)?;
		let (entry_to, relative_to) = self.find_mount(&mounts, to).ok_or_else(Error::not_found)?;

		if !Arc::ptr_eq(&entry_from.fs, &entry_to.fs) {
			return Err(Error::option_composition_unsupported());
		}

		entry_from.fs.move_entry(&relative_from, &relative_to)
	}

	fn delete(&self, path: &VPath) -> Result<()> {
		let mounts = self.mounts.read();
		let (entry, relative) = self.find_mount(&mounts, path).ok_or_else(Error::not_found)?;
		entry.fs.delete(&relative)
	}

	fn create_directory(&self, path: &VPath) -> Result<()> {
		let mounts = self.mounts.read();
		let (entry, relative) = self.find_mount(&mounts, path).ok_or_else(Error::not_found)?;
		entry.fs.create_directory(&relative)
	}

	fn set_attributes(&self, path: &VPath, attributes: u32) -> Result<()> {
		let mounts = self.mounts.read();
		let (entry, relative) = self.find_mount(&mounts, path).ok_or_else(Error::not_found)?;
		entry.fs.set_attributes(&relative, attributes)
	}
}

#[cfg(test)]
mod test {
	use std::io::Write;

	use super::*;
	use crate::memory::MemoryFileSystem;
	use crate::option::{
		BrowseOption, CreateDirectoryOption, MountOption, ObserveOption, OpenOption, OptionValue,
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
			.with(OptionValue::Observe(ObserveOption { can_observe: true }));

		MemoryFileSystem::new(
			options,
			BlockPoolConfig {
				block_size: 32,
				block_count: 32,
			},
		)
	}

	fn vfs() -> Arc<VirtualFileSystem> {
		VirtualFileSystem::new(FsOptions::new().with(OptionValue::Mount(MountOption {
			can_mount: true,
			can_unmount: true,
			can_list_mounts: true,
		})))
	}

	#[test]
	fn routes_by_longest_matching_mount_prefix() {
		let root = vfs();
		let backing_a = backing();
		let backing_b = backing();

		root.mount(VPath::new("/"), backing_a.clone(), backing_a.options().clone())
			.unwrap();
		root.mount(VPath::new("/deep/"), backing_b.clone(), backing_b.options().clone())
			.unwrap();

		drop(backing_a.open(VPath::new("/a.txt"), true, true).unwrap());
		drop(backing_b.open(VPath::new("/b.txt"), true, true).unwrap());

		assert!(root.entry(VPath::new("/a.txt")).is_ok());
		assert!(root.entry(VPath::new("/deep/b.txt")).is_ok());
	}

	#[test]
	fn mount_points_appear_in_parent_listing() {
		let root = vfs();
		let backing_a = backing();
		root.mount(VPath::new("/"), backing_a.clone(), backing_a.options().clone())
			.unwrap();

		let backing_b = backing();
		root.mount(VPath::new("/archive/"), backing_b, FsOptions::new())
			.unwrap();

		let listing = root.browse(VPath::new("/")).unwrap();
		assert!(listing
			.children()
			.iter()
			.any(|e| matches!(e.kind(), EntryKind::MountPoint { .. })));
	}

	#[test]
	fn events_bridge_with_mount_prefix() {
		use std::sync::Mutex;

		let root = vfs();
		let backing_a = backing();
		root.mount(VPath::new("sub/"), backing_a.clone(), backing_a.options().clone())
			.unwrap();

		struct Rec(Mutex<Vec<VPathBuf>>);
		impl Observer for Rec {
			fn on_event(&self, event: &Event) {
				self.0.lock().unwrap().push(event.path.clone());
			}
		}

		let rec = Arc::new(Rec(Mutex::new(vec![])));
		let _handle = root
			.observe(Pattern::all(), rec.clone(), Arc::new(CallerThreadDispatcher))
			.unwrap();

		let mut f = backing_a.open(VPath::new("/x.txt"), true, true).unwrap();
		f.write_all(b"y").unwrap();
		drop(f);

		assert!(rec
			.0
			.lock()
			.unwrap()
			.iter()
			.any(|p| p.as_path() == VPath::new("sub/x.txt")));
	}
}
