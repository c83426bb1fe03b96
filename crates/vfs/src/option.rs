//! The option algebra (spec §4.2): capability flags and structured options composed by
//! Join (first-occurrence), Union (most permissive), and Intersection (least permissive).
//!
//! `FsOptions` is an `IndexMap`-backed bag the same way `VFolder::files`/`subfolders` in the
//! teacher crate are `IndexSet`s rather than `HashSet`s: insertion order is preserved so
//! `ListMountPoints` and similar enumerations are deterministic.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::Error;
use crate::glob::Pattern;
use crate::loader::PackageLoader;
use crate::path::VPath;

/// Discriminant for the closed set of option kinds (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionKind {
	Open,
	Browse,
	Observe,
	Move,
	Delete,
	CreateDirectory,
	Mount,
	FileAttribute,
	PathInfo,
	SubPath,
	AutoMount,
	Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenOption {
	pub can_open: bool,
	pub can_read: bool,
	pub can_write: bool,
	pub can_create_file: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrowseOption {
	pub can_browse: bool,
	pub can_get_entry: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObserveOption {
	pub can_observe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveOption {
	pub can_move: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOption {
	pub can_delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateDirectoryOption {
	pub can_create_directory: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MountOption {
	pub can_mount: bool,
	pub can_unmount: bool,
	pub can_list_mounts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttributeOption {
	pub can_set_attribute: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathInfoOption {
	pub case_sensitive: bool,
	pub allow_empty_directory_name: bool,
}

impl Default for PathInfoOption {
	fn default() -> Self {
		Self {
			case_sensitive: true,
			allow_empty_directory_name: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPathOption {
	pub path: String,
}

#[derive(Clone)]
pub struct AutoMountOption {
	pub loaders: Vec<Arc<dyn PackageLoader>>,
}

impl fmt::Debug for AutoMountOption {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AutoMountOption")
			.field("loaders", &self.loaders.iter().map(|l| l.extension()).collect::<Vec<_>>())
			.finish()
	}
}

impl Default for AutoMountOption {
	fn default() -> Self {
		Self { loaders: Vec::new() }
	}
}

/// A single opaque credential (or cancellation object), scoped to the paths matched by
/// its glob patterns. `None` patterns means "applies everywhere"; `Some(vec![])` means
/// "applies nowhere".
#[derive(Clone)]
pub struct Token {
	pub type_key: String,
	pub payload: Arc<dyn Any + Send + Sync>,
	pub patterns: Option<Vec<Pattern>>,
}

impl fmt::Debug for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Token")
			.field("type_key", &self.type_key)
			.field("patterns", &self.patterns.as_ref().map(|p| p.len()))
			.finish()
	}
}

impl Token {
	#[must_use]
	pub fn new(type_key: impl Into<String>, payload: Arc<dyn Any + Send + Sync>) -> Self {
		Self {
			type_key: type_key.into(),
			payload,
			patterns: None,
		}
	}

	#[must_use]
	pub fn scoped(mut self, patterns: Vec<Pattern>) -> Self {
		self.patterns = Some(patterns);
		self
	}

	#[must_use]
	pub fn applies_to(&self, path: &VPath) -> bool {
		match &self.patterns {
			None => true,
			Some(pats) => pats.iter().any(|p| p.is_match(path)),
		}
	}
}

/// An ordered, appendable collection of [`Token`]s.
#[derive(Debug, Clone, Default)]
pub struct TokenSet {
	pub tokens: Vec<Token>,
}

impl TokenSet {
	/// Returns the payload of the first token whose type-key matches `key` and whose
	/// patterns match `path`.
	#[must_use]
	pub fn lookup(&self, path: &VPath, key: &str) -> Option<&(dyn Any + Send + Sync)> {
		self.tokens
			.iter()
			.find(|t| t.type_key == key && t.applies_to(path))
			.map(|t| t.payload.as_ref())
	}

	fn concat(a: &TokenSet, b: &TokenSet) -> TokenSet {
		let mut tokens = a.tokens.clone();
		tokens.extend(b.tokens.iter().cloned());
		TokenSet { tokens }
	}
}

/// The payload carried for one [`OptionKind`].
#[derive(Clone)]
pub enum OptionValue {
	Open(OpenOption),
	Browse(BrowseOption),
	Observe(ObserveOption),
	Move(MoveOption),
	Delete(DeleteOption),
	CreateDirectory(CreateDirectoryOption),
	Mount(MountOption),
	FileAttribute(FileAttributeOption),
	PathInfo(PathInfoOption),
	SubPath(SubPathOption),
	AutoMount(AutoMountOption),
	Token(TokenSet),
}

impl fmt::Debug for OptionValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Open(o) => o.fmt(f),
			Self::Browse(o) => o.fmt(f),
			Self::Observe(o) => o.fmt(f),
			Self::Move(o) => o.fmt(f),
			Self::Delete(o) => o.fmt(f),
			Self::CreateDirectory(o) => o.fmt(f),
			Self::Mount(o) => o.fmt(f),
			Self::FileAttribute(o) => o.fmt(f),
			Self::PathInfo(o) => o.fmt(f),
			Self::SubPath(o) => o.fmt(f),
			Self::AutoMount(o) => o.fmt(f),
			Self::Token(o) => o.fmt(f),
		}
	}
}

impl OptionValue {
	#[must_use]
	pub fn kind(&self) -> OptionKind {
		match self {
			Self::Open(_) => OptionKind::Open,
			Self::Browse(_) => OptionKind::Browse,
			Self::Observe(_) => OptionKind::Observe,
			Self::Move(_) => OptionKind::Move,
			Self::Delete(_) => OptionKind::Delete,
			Self::CreateDirectory(_) => OptionKind::CreateDirectory,
			Self::Mount(_) => OptionKind::Mount,
			Self::FileAttribute(_) => OptionKind::FileAttribute,
			Self::PathInfo(_) => OptionKind::PathInfo,
			Self::SubPath(_) => OptionKind::SubPath,
			Self::AutoMount(_) => OptionKind::AutoMount,
			Self::Token(_) => OptionKind::Token,
		}
	}

	/// Combines two instances of the *same* kind. `permissive` selects Union (true) vs.
	/// Intersection (false) semantics for the kinds where that distinction matters.
	fn combine(a: &OptionValue, b: &OptionValue, permissive: bool) -> Result<OptionValue, Error> {
		Ok(match (a, b) {
			(Self::Open(x), Self::Open(y)) => Self::Open(OpenOption {
				can_open: combine_bool(x.can_open, y.can_open, permissive),
				can_read: combine_bool(x.can_read, y.can_read, permissive),
				can_write: combine_bool(x.can_write, y.can_write, permissive),
				can_create_file: combine_bool(x.can_create_file, y.can_create_file, permissive),
			}),
			(Self::Browse(x), Self::Browse(y)) => Self::Browse(BrowseOption {
				can_browse: combine_bool(x.can_browse, y.can_browse, permissive),
				can_get_entry: combine_bool(x.can_get_entry, y.can_get_entry, permissive),
			}),
			(Self::Observe(x), Self::Observe(y)) => Self::Observe(ObserveOption {
				can_observe: combine_bool(x.can_observe, y.can_observe, permissive),
			}),
			(Self::Move(x), Self::Move(y)) => Self::Move(MoveOption {
				can_move: combine_bool(x.can_move, y.can_move, permissive),
			}),
			(Self::Delete(x), Self::Delete(y)) => Self::Delete(DeleteOption {
				can_delete: combine_bool(x.can_delete, y.can_delete, permissive),
			}),
			(Self::CreateDirectory(x), Self::CreateDirectory(y)) => {
				Self::CreateDirectory(CreateDirectoryOption {
					can_create_directory: combine_bool(
						x.can_create_directory,
						y.can_create_directory,
						permissive,
					),
				})
			}
			(Self::Mount(x), Self::Mount(y)) => Self::Mount(MountOption {
				can_mount: combine_bool(x.can_mount, y.can_mount, permissive),
				can_unmount: combine_bool(x.can_unmount, y.can_unmount, permissive),
				can_list_mounts: combine_bool(x.can_list_mounts, y.can_list_mounts, permissive),
			}),
			(Self::FileAttribute(x), Self::FileAttribute(y)) => {
				Self::FileAttribute(FileAttributeOption {
					can_set_attribute: combine_bool(x.can_set_attribute, y.can_set_attribute, permissive),
				})
			}
			(Self::PathInfo(x), Self::PathInfo(y)) => Self::PathInfo(PathInfoOption {
				// Case-insensitive is the more permissive matching behavior; requiring
				// both sides to demand sensitivity is the conservative call for union.
				case_sensitive: x.case_sensitive && y.case_sensitive,
				allow_empty_directory_name: combine_bool(
					x.allow_empty_directory_name,
					y.allow_empty_directory_name,
					permissive,
				),
			}),
			(Self::SubPath(x), Self::SubPath(y)) => {
				if x.path != y.path {
					return Err(Error::option_composition_unsupported());
				}

				Self::SubPath(x.clone())
			}
			(Self::AutoMount(x), Self::AutoMount(y)) => {
				if permissive {
					let mut loaders = x.loaders.clone();

					for cand in &y.loaders {
						if loaders.iter().any(|l| l.extension().eq_ignore_ascii_case(cand.extension())) {
							return Err(Error::option_composition_unsupported());
						}

						loaders.push(cand.clone());
					}

					Self::AutoMount(AutoMountOption { loaders })
				} else {
					let loaders = x
						.loaders
						.iter()
						.filter(|l| {
							y.loaders
								.iter()
								.any(|r| r.extension().eq_ignore_ascii_case(l.extension()))
						})
						.cloned()
						.collect();

					Self::AutoMount(AutoMountOption { loaders })
				}
			}
			(Self::Token(x), Self::Token(y)) => Self::Token(TokenSet::concat(x, y)),
			_ => unreachable!("combine() called on mismatched OptionValue kinds"),
		})
	}
}

fn combine_bool(a: bool, b: bool, permissive: bool) -> bool {
	if permissive {
		a || b
	} else {
		a && b
	}
}

/// An adaptable bag of [`OptionValue`]s, keyed by [`OptionKind`], preserving the order each
/// kind was first inserted.
#[derive(Debug, Clone, Default)]
pub struct FsOptions {
	map: IndexMap<OptionKind, OptionValue>,
}

impl FsOptions {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, value: OptionValue) -> Self {
		self.map.insert(value.kind(), value);
		self
	}

	#[must_use]
	pub fn get(&self, kind: OptionKind) -> Option<&OptionValue> {
		self.map.get(&kind)
	}

	#[must_use]
	pub fn kinds(&self) -> Vec<OptionKind> {
		self.map.keys().copied().collect()
	}

	#[must_use]
	pub fn open(&self) -> OpenOption {
		match self.get(OptionKind::Open) {
			Some(OptionValue::Open(o)) => *o,
			_ => OpenOption::default(),
		}
	}

	#[must_use]
	pub fn browse(&self) -> BrowseOption {
		match self.get(OptionKind::Browse) {
			Some(OptionValue::Browse(o)) => *o,
			_ => BrowseOption::default(),
		}
	}

	#[must_use]
	pub fn observe(&self) -> ObserveOption {
		match self.get(OptionKind::Observe) {
			Some(OptionValue::Observe(o)) => *o,
			_ => ObserveOption::default(),
		}
	}

	#[must_use]
	pub fn move_(&self) -> MoveOption {
		match self.get(OptionKind::Move) {
			Some(OptionValue::Move(o)) => *o,
			_ => MoveOption::default(),
		}
	}

	#[must_use]
	pub fn delete(&self) -> DeleteOption {
		match self.get(OptionKind::Delete) {
			Some(OptionValue::Delete(o)) => *o,
			_ => DeleteOption::default(),
		}
	}

	#[must_use]
	pub fn create_directory(&self) -> CreateDirectoryOption {
		match self.get(OptionKind::CreateDirectory) {
			Some(OptionValue::CreateDirectory(o)) => *o,
			_ => CreateDirectoryOption::default(),
		}
	}

	#[must_use]
	pub fn mount(&self) -> MountOption {
		match self.get(OptionKind::Mount) {
			Some(OptionValue::Mount(o)) => *o,
			_ => MountOption::default(),
		}
	}

	#[must_use]
	pub fn file_attribute(&self) -> FileAttributeOption {
		match self.get(OptionKind::FileAttribute) {
			Some(OptionValue::FileAttribute(o)) => *o,
			_ => FileAttributeOption::default(),
		}
	}

	#[must_use]
	pub fn path_info(&self) -> PathInfoOption {
		match self.get(OptionKind::PathInfo) {
			Some(OptionValue::PathInfo(o)) => *o,
			_ => PathInfoOption::default(),
		}
	}

	#[must_use]
	pub fn sub_path(&self) -> Option<&SubPathOption> {
		match self.get(OptionKind::SubPath) {
			Some(OptionValue::SubPath(o)) => Some(o),
			_ => None,
		}
	}

	#[must_use]
	pub fn auto_mount(&self) -> AutoMountOption {
		match self.get(OptionKind::AutoMount) {
			Some(OptionValue::AutoMount(o)) => o.clone(),
			_ => AutoMountOption::default(),
		}
	}

	#[must_use]
	pub fn token(&self) -> TokenSet {
		match self.get(OptionKind::Token) {
			Some(OptionValue::Token(o)) => o.clone(),
			_ => TokenSet::default(),
		}
	}

	/// Left-biased merge: the first bag to carry a given kind wins for that kind.
	#[must_use]
	pub fn join<'a>(bags: impl IntoIterator<Item = &'a FsOptions>) -> FsOptions {
		let mut out = FsOptions::new();

		for bag in bags {
			for (kind, value) in &bag.map {
				out.map.entry(*kind).or_insert_with(|| value.clone());
			}
		}

		out
	}

	/// The most permissive merge of two bags (spec §4.2).
	pub fn union(a: &FsOptions, b: &FsOptions) -> Result<FsOptions, Error> {
		Self::merge(a, b, true)
	}

	/// The least permissive merge of two bags (spec §4.2).
	pub fn intersection(a: &FsOptions, b: &FsOptions) -> Result<FsOptions, Error> {
		Self::merge(a, b, false)
	}

	fn merge(a: &FsOptions, b: &FsOptions, permissive: bool) -> Result<FsOptions, Error> {
		let mut out = FsOptions::new();

		for kind in [
			OptionKind::Open,
			OptionKind::Browse,
			OptionKind::Observe,
			OptionKind::Move,
			OptionKind::Delete,
			OptionKind::CreateDirectory,
			OptionKind::Mount,
			OptionKind::FileAttribute,
			OptionKind::PathInfo,
			OptionKind::SubPath,
			OptionKind::AutoMount,
			OptionKind::Token,
		] {
			match (a.get(kind), b.get(kind)) {
				(Some(x), Some(y)) => {
					out.map.insert(kind, OptionValue::combine(x, y, permissive)?);
				}
				(Some(x), None) => {
					out.map.insert(kind, x.clone());
				}
				(None, Some(y)) => {
					out.map.insert(kind, y.clone());
				}
				(None, None) => {}
			}
		}

		Ok(out)
	}
}
