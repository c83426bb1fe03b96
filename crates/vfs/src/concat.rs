//! Overlays several filesystems under one namespace (spec §4.7): reads try each layer in
//! priority order and return the first hit; writes land on the first ("primary") layer.
//! Directory listings merge every layer's children, first-occurrence wins on name
//! collision — the same left-biased rule [`crate::option::FsOptions::join`] uses for
//! capability composition.

use std::collections::HashSet;
use std::sync::Arc;

use crate::entry::{DirectoryContent, Entry};
use crate::error::{Error, Result};
use crate::event::{
	CallerThreadDispatcher, Dispatcher, Event, Observer, ObserverHandle, ObserverList,
};
use crate::fs_trait::{FileSystem, Stream};
use crate::glob::Pattern;
use crate::option::FsOptions;
use crate::path::VPath;

pub struct ConcatFileSystem {
	layers: Vec<Arc<dyn FileSystem>>,
	options: FsOptions,
	observers: Arc<ObserverList>,
	_bridges: Vec<ObserverHandle>,
}

impl ConcatFileSystem {
	pub fn new(layers: Vec<Arc<dyn FileSystem>>) -> Result<Arc<Self>> {
		if layers.is_empty() {
			return Err(Error::invalid_argument());
		}

		let layer_options: Vec<FsOptions> = layers.iter().map(|l| l.options().clone()).collect();
		let options = FsOptions::join(layer_options.iter());

		let observers = ObserverList::new();
		let mut bridges = Vec::new();

		for layer in &layers {
			if !layer.options().observe().can_observe {
				continue;
			}

			let bridge = Arc::new(BridgeObserver {
				target: observers.clone(),
			});

			if let Ok(handle) = layer.observe(Pattern::all(), bridge, Arc::new(CallerThreadDispatcher)) {
				bridges.push(handle);
			}
		}

		Ok(Arc::new(Self {
			layers,
			options,
			observers,
			_bridges: bridges,
		}))
	}

	fn primary(&self) -> &Arc<dyn FileSystem> {
		&self.layers[0]
	}
}

/// Forwards every event from a wrapped layer into the concat's own observer list,
/// unchanged — layers share one flat namespace, so no path rewriting is needed here
/// (unlike [`crate::decoration::FileSystemDecoration`]'s bridge).
struct BridgeObserver {
	target: Arc<ObserverList>,
}

impl Observer for BridgeObserver {
	fn on_event(&self, event: &Event) {
		self.target.notify(event.clone());
	}
}

impl FileSystem for ConcatFileSystem {
	fn options(&self) -> &FsOptions {
		&self.options
	}

	fn open(&self, path: &VPath, write: bool, create: bool) -> Result<Box<dyn Stream>> {
		if write {
			return self.primary().open(path, true, create);
		}

		let mut last_err = Error::not_found();

		for layer in &self.layers {
			match layer.open(path, false, false) {
				Ok(stream) => return Ok(stream),
				Err(e) => last_err = e,
			}
		}

		Err(last_err)
	}

	fn browse(&self, path: &VPath) -> Result<DirectoryContent> {
		let mut seen = HashSet::new();
		let mut children = Vec::new();
		let mut exists = false;

		for layer in &self.layers {
			if let Ok(content) = layer.browse(path) {
				exists |= content.exists();

				for entry in content.children() {
					if seen.insert(entry.name().to_owned()) {
						children.push(entry.clone());
					}
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
		let mut last_err = Error::not_found();

		for layer in &self.layers {
			match layer.entry(path) {
				Ok(e) => return Ok(e),
				Err(e) => last_err = e,
			}
		}

		Err(last_err)
	}

	fn observe(
		&self,
		filter: Pattern,
		observer: Arc<dyn Observer>,
		dispatcher: Arc<dyn Dispatcher>,
	) -> Result<ObserverHandle> {
		Ok(self.observers.add(filter, observer, dispatcher))
	}

	fn move_entry(&self, from: &VPath, to: &VPath) -> Result<()> {
		self.primary().move_entry(from, to)
	}

	fn delete(&self, path: &VPath) -> Result<()> {
		let mut last_err = Error::not_found();

		for layer in &self.layers {
			match layer.delete(path) {
				Ok(()) => return Ok(()),
				Err(e) => last_err = e,
			}
		}

		Err(last_err)
	}

	fn create_directory(&self, path: &VPath) -> Result<()> {
		self.primary().create_directory(path)
	}

	fn set_attributes(&self, path: &VPath, attributes: u32) -> Result<()> {
		let mut last_err = Error::not_found();

		for layer in &self.layers {
			match layer.set_attributes(path, attributes) {
				Ok(()) => return Ok(()),
				Err(e) => last_err = e,
			}
		}

		Err(last_err)
	}
}

#[cfg(test)]
mod test {
	use std::io::{Read, Write};

	use super::*;
	use crate::memory::MemoryFileSystem;
	use crate::option::{BrowseOption, OpenOption, OptionValue};
	use crate::pool::BlockPoolConfig;

	fn layer() -> Arc<MemoryFileSystem> {
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
			}));

		MemoryFileSystem::new(
			options,
			BlockPoolConfig {
				block_size: 32,
				block_count: 32,
			},
		)
	}

	#[test]
	fn reads_fall_through_to_lower_layers() {
		let top = layer();
		let bottom = layer();
		drop(bottom.open(VPath::new("/only-bottom.txt"), true, true).unwrap());

		let concat = ConcatFileSystem::new(vec![top, bottom]).unwrap();
		assert!(concat.entry(VPath::new("/only-bottom.txt")).is_ok());
	}

	#[test]
	fn top_layer_shadows_bottom_on_name_collision() {
		let top = layer();
		let bottom = layer();

		{
			let mut t = top.open(VPath::new("/shared.txt"), true, true).unwrap();
			t.write_all(b"top").unwrap();
		}
		{
			let mut b = bottom.open(VPath::new("/shared.txt"), true, true).unwrap();
			b.write_all(b"bottom").unwrap();
		}

		let concat = ConcatFileSystem::new(vec![top, bottom]).unwrap();
		let mut stream = concat.open(VPath::new("/shared.txt"), false, false).unwrap();
		let mut buf = Vec::new();
		stream.read_to_end(&mut buf).unwrap();
		assert_eq!(buf, b"top");
	}

	#[test]
	fn writes_always_land_on_the_primary_layer() {
		let top = layer();
		let bottom = layer();
		let concat = ConcatFileSystem::new(vec![top.clone(), bottom.clone()]).unwrap();

		drop(concat.open(VPath::new("/new.txt"), true, true).unwrap());

		assert!(top.entry(VPath::new("/new.txt")).is_ok());
		assert!(bottom.entry(VPath::new("/new.txt")).is_err());
	}
}
