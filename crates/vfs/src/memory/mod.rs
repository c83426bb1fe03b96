//! An entirely in-memory [`crate::fs_trait::FileSystem`] backed by a fixed block pool
//! (spec §4.3). The largest single component: node storage (`node.rs`), the stream type
//! returned by `Open` (`stream.rs`), and the `FileSystem` impl tying them together (here).

mod node;
mod stream;

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

pub use stream::MemoryStream;

use self::node::{Node, OpenState, Tree};
use crate::dispose::BelateDispose;
use crate::entry::{DirectoryContent, Entry, EntryKind};
use crate::error::{Error, ErrorKind, Result};
use crate::event::{Dispatcher, Event, Observer, ObserverHandle, ObserverList};
use crate::fs_trait::{FileSystem, Stream};
use crate::glob::Pattern;
use crate::option::FsOptions;
use crate::path::{VPath, VPathBuf};
use crate::pool::{BlockPool, BlockPoolConfig};

pub struct MemoryFileSystem {
	options: FsOptions,
	pool: Arc<BlockPool>,
	tree: RwLock<Tree>,
	observers: Arc<ObserverList>,
	dispose: Arc<BelateDispose>,
}

impl MemoryFileSystem {
	#[must_use]
	pub fn new(options: FsOptions, pool_config: BlockPoolConfig) -> Arc<Self> {
		let pool = BlockPool::new(pool_config);
		let pool_for_dispose = pool.clone();

		let fs = Arc::new(Self {
			options,
			pool,
			tree: RwLock::new(Tree::new()),
			observers: ObserverList::new(),
			dispose: Arc::new(BelateDispose::new()),
		});

		fs.dispose.defer(move || pool_for_dispose.disconnect());
		fs
	}

	/// Tears the filesystem down: disconnects the block pool, waking any thread blocked in
	/// an `Open`-triggered write waiting on a free block.
	pub fn dispose(&self) {
		self.dispose.request_dispose();
	}

	fn case_sensitive(&self) -> bool {
		self.options.path_info().case_sensitive
	}

	fn entry_for_key(&self, tree: &Tree, path: &VPath, key: node::NodeKey) -> Entry {
		let node = tree.arena.get(key).expect("resolved key must be live");

		match node {
			Node::Dir(_) => Entry::new(path.to_owned_path(), EntryKind::Directory),
			Node::File(body) => {
				let body = body.lock();
				let mut entry = Entry::new(
					path.to_owned_path(),
					EntryKind::File {
						length: Some(body.length as u64),
					},
				)
				.with_attributes(body.attributes);

				if let Some(m) = body.modified {
					entry = entry.with_modified(m);
				}
				if let Some(a) = body.accessed {
					entry = entry.with_accessed(a);
				}

				entry
			}
		}
	}
}

impl FileSystem for MemoryFileSystem {
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

		let case_sensitive = self.case_sensitive();
		let mut tree = self.tree.write();
		let mut created = false;

		let key = match tree.resolve(path, case_sensitive) {
			Some(k) => {
				if tree.arena.get(k).and_then(Node::as_dir).is_some() {
					return Err(Error::invalid_argument());
				}
				k
			}
			None => {
				if !create || !open_opt.can_create_file {
					return Err(Error::not_found());
				}

				let (parent, name) = tree
					.resolve_parent(path, case_sensitive)
					.ok_or_else(Error::not_found)?;

				if tree.arena.get(parent).and_then(Node::as_dir).is_none() {
					return Err(Error::not_found());
				}

				let name = name.to_owned();
				let key = tree.arena.insert(Node::new_file());

				tree.arena
					.get_mut(parent)
					.and_then(Node::as_dir_mut)
					.expect("just checked above")
					.children
					.insert(name, key);

				created = true;
				key
			}
		};

		let body = tree
			.arena
			.get(key)
			.and_then(Node::as_file)
			.expect("resolved/created key is a file")
			.clone();

		drop(tree);

		{
			let mut guard = body.lock();

			match (&guard.open, write) {
				(OpenState::Writing, _) => return Err(Error::new(ErrorKind::Unauthorized)),
				(OpenState::Reading(_), true) => return Err(Error::new(ErrorKind::Unauthorized)),
				_ => {}
			}

			guard.open = if write {
				OpenState::Writing
			} else {
				match guard.open {
					OpenState::Reading(n) => OpenState::Reading(n + 1),
					_ => OpenState::Reading(1),
				}
			};
			guard.accessed = Some(SystemTime::now());
			if created {
				guard.modified = Some(SystemTime::now());
			}
		}

		if created {
			self.observers.notify(Event::create(path.to_owned_path()));
		}

		Ok(Box::new(MemoryStream::new(body, self.pool.clone(), write)))
	}

	fn browse(&self, path: &VPath) -> Result<DirectoryContent> {
		if !self.options.browse().can_browse {
			return Err(Error::not_supported());
		}

		let case_sensitive = self.case_sensitive();
		let tree = self.tree.read();

		let Some(key) = tree.resolve(path, case_sensitive) else {
			return Ok(DirectoryContent::missing(path.to_owned_path()));
		};

		let Some(dir) = tree.arena.get(key).and_then(Node::as_dir) else {
			return Err(Error::invalid_argument());
		};

		let children = dir
			.children
			.iter()
			.map(|(name, child_key)| {
				let child_path = path.to_owned_path().join(name);
				self.entry_for_key(&tree, &child_path, *child_key)
			})
			.collect();

		Ok(DirectoryContent::existing(path.to_owned_path(), children))
	}

	fn entry(&self, path: &VPath) -> Result<Entry> {
		if !self.options.browse().can_get_entry {
			return Err(Error::not_supported());
		}

		let case_sensitive = self.case_sensitive();
		let tree = self.tree.read();
		let key = tree.resolve(path, case_sensitive).ok_or_else(Error::not_found)?;
		Ok(self.entry_for_key(&tree, path, key))
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
		if !self.options.move_().can_move {
			return Err(Error::not_supported());
		}

		let case_sensitive = self.case_sensitive();
		let mut tree = self.tree.write();

		let (old_parent, old_name) = tree
			.resolve_parent(from, case_sensitive)
			.ok_or_else(Error::not_found)?;
		let key = tree
			.child(old_parent, old_name, case_sensitive)
			.ok_or_else(Error::not_found)?;

		let (new_parent, new_name) = tree
			.resolve_parent(to, case_sensitive)
			.ok_or_else(Error::not_found)?;

		if tree.child(new_parent, new_name, case_sensitive).is_some() {
			return Err(Error::already_exists_file());
		}

		tree.arena
			.get_mut(old_parent)
			.and_then(Node::as_dir_mut)
			.expect("resolved parent must be a directory")
			.children
			.shift_remove(old_name);

		tree.arena
			.get_mut(new_parent)
			.and_then(Node::as_dir_mut)
			.expect("resolved parent must be a directory")
			.children
			.insert(new_name.to_owned(), key);

		drop(tree);

		self.observers.notify(Event {
			path: to.to_owned_path(),
			kind: crate::event::EventKind::Rename {
				from: from.to_owned_path(),
			},
		});

		Ok(())
	}

	fn delete(&self, path: &VPath) -> Result<()> {
		if !self.options.delete().can_delete {
			return Err(Error::not_supported());
		}

		let case_sensitive = self.case_sensitive();
		let mut tree = self.tree.write();

		let (parent, name) = tree
			.resolve_parent(path, case_sensitive)
			.ok_or_else(Error::not_found)?;
		let key = tree
			.child(parent, name, case_sensitive)
			.ok_or_else(Error::not_found)?;

		if let Some(dir) = tree.arena.get(key).and_then(Node::as_dir) {
			if !dir.children.is_empty() {
				return Err(Error::not_empty());
			}
		}

		tree.arena
			.get_mut(parent)
			.and_then(Node::as_dir_mut)
			.expect("resolved parent must be a directory")
			.children
			.shift_remove(name);
		tree.arena.remove(key);

		drop(tree);

		self.observers.notify(Event::delete(path.to_owned_path()));
		Ok(())
	}

	/// Creates every missing prefix of `path` (cascading); an already-existing directory,
	/// including the target itself, is not an error.
	fn create_directory(&self, path: &VPath) -> Result<()> {
		if !self.options.create_directory().can_create_directory {
			return Err(Error::not_supported());
		}

		let case_sensitive = self.case_sensitive();
		let allow_empty = self.options.path_info().allow_empty_directory_name;
		let mut tree = self.tree.write();
		let mut current = tree.root;
		let mut created_any = false;

		for component in path.components() {
			if component.is_root() {
				continue;
			}

			let name = component.as_str();

			if name.is_empty() && !allow_empty {
				return Err(Error::invalid_argument());
			}

			current = match tree.child(current, name, case_sensitive) {
				Some(existing) => {
					if tree.arena.get(existing).and_then(Node::as_dir).is_none() {
						return Err(Error::already_exists_file());
					}
					existing
				}
				None => {
					let key = tree.arena.insert(Node::new_dir());
					tree.arena
						.get_mut(current)
						.and_then(Node::as_dir_mut)
						.expect("walked key is a directory")
						.children
						.insert(name.to_owned(), key);
					created_any = true;
					key
				}
			};
		}

		drop(tree);

		if created_any {
			self.observers.notify(Event::create(path.to_owned_path()));
		}

		Ok(())
	}

	fn set_attributes(&self, path: &VPath, attributes: u32) -> Result<()> {
		if !self.options.file_attribute().can_set_attribute {
			return Err(Error::not_supported());
		}

		let case_sensitive = self.case_sensitive();
		let tree = self.tree.read();
		let key = tree.resolve(path, case_sensitive).ok_or_else(Error::not_found)?;

		match tree.arena.get(key).expect("resolved key is live") {
			Node::File(body) => body.lock().attributes = attributes,
			Node::Dir(_) => return Err(Error::invalid_argument()),
		}

		self.observers.notify(Event::change(path.to_owned_path()));
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use std::io::{Read, Write};

	use super::*;
	use crate::option::{
		BrowseOption, CreateDirectoryOption, DeleteOption, MoveOption, OpenOption, OptionValue,
	};

	fn fixture() -> Arc<MemoryFileSystem> {
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
			.with(OptionValue::Delete(DeleteOption { can_delete: true }))
			.with(OptionValue::Move(MoveOption { can_move: true }));

		MemoryFileSystem::new(
			options,
			BlockPoolConfig {
				block_size: 64,
				block_count: 64,
			},
		)
	}

	#[test]
	fn write_then_read_roundtrips() {
		let fs = fixture();

		let mut stream = fs.open(VPath::new("/a.txt"), true, true).unwrap();
		stream.write_all(b"hello world").unwrap();
		drop(stream);

		let mut stream = fs.open(VPath::new("/a.txt"), false, false).unwrap();
		let mut buf = Vec::new();
		stream.read_to_end(&mut buf).unwrap();
		assert_eq!(buf, b"hello world");
	}

	#[test]
	fn write_spans_multiple_blocks() {
		let fs = fixture();
		let payload = vec![0xAB_u8; 200];

		let mut stream = fs.open(VPath::new("/big.bin"), true, true).unwrap();
		stream.write_all(&payload).unwrap();
		drop(stream);

		let mut stream = fs.open(VPath::new("/big.bin"), false, false).unwrap();
		let mut buf = Vec::new();
		stream.read_to_end(&mut buf).unwrap();
		assert_eq!(buf, payload);
	}

	#[test]
	fn concurrent_writers_are_rejected() {
		let fs = fixture();
		let _first = fs.open(VPath::new("/lock.txt"), true, true).unwrap();
		let second = fs.open(VPath::new("/lock.txt"), true, true);
		assert!(second.is_err());
	}

	#[test]
	fn multiple_readers_allowed() {
		let fs = fixture();
		drop(fs.open(VPath::new("/shared.txt"), true, true).unwrap());

		let r1 = fs.open(VPath::new("/shared.txt"), false, false);
		let r2 = fs.open(VPath::new("/shared.txt"), false, false);
		assert!(r1.is_ok());
		assert!(r2.is_ok());
	}

	#[test]
	fn directory_lifecycle() {
		let fs = fixture();
		fs.create_directory(VPath::new("/dir")).unwrap();
		drop(fs.open(VPath::new("/dir/file.txt"), true, true).unwrap());

		let listing = fs.browse(VPath::new("/dir")).unwrap();
		assert_eq!(listing.children().len(), 1);

		assert!(fs.delete(VPath::new("/dir")).is_err());
		fs.delete(VPath::new("/dir/file.txt")).unwrap();
		fs.delete(VPath::new("/dir")).unwrap();
	}

	#[test]
	fn move_entry_renames() {
		let fs = fixture();
		drop(fs.open(VPath::new("/old.txt"), true, true).unwrap());
		fs.move_entry(VPath::new("/old.txt"), VPath::new("/new.txt"))
			.unwrap();

		assert!(fs.entry(VPath::new("/old.txt")).is_err());
		assert!(fs.entry(VPath::new("/new.txt")).is_ok());
	}
}
