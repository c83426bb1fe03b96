//! Glob pattern matching for observer filters and [`crate::option::Token`] path scopes.
//!
//! `*` matches any sequence within a single segment; `**` matches across segments
//! (including `/`); `?` matches exactly one non-separator character. An empty pattern
//! matches only the root directory itself, not any of its children.
//!
//! Translated to an anchored [`regex::Regex`] rather than hand-rolled, the way this corpus
//! reaches for `regex` elsewhere (`other_examples/manifests/saworbit-orbit`,
//! `.../joyshmitz-storage_ballast_helper`) for path/pattern classification.

use regex::{Regex, RegexBuilder};

use crate::error::Error;
use crate::path::VPath;

/// A compiled glob pattern. Cheap to clone (the underlying `Regex` is reference-counted).
#[derive(Debug, Clone)]
pub struct Pattern {
	source: String,
	regex: Option<Regex>,
	case_sensitive: bool,
}

impl Pattern {
	pub fn new(glob: &str, case_sensitive: bool) -> Result<Self, Error> {
		let regex = if glob.is_empty() {
			None
		} else {
			let translated = translate(glob);

			let regex = RegexBuilder::new(&translated)
				.case_insensitive(!case_sensitive)
				.build()
				.map_err(|e| Error::with_cause(crate::error::ErrorKind::InvalidArgument, e))?;

			Some(regex)
		};

		Ok(Self {
			source: glob.to_owned(),
			regex,
			case_sensitive,
		})
	}

	/// A pattern that matches every path (`**`).
	#[must_use]
	pub fn all() -> Self {
		Self::new("**", true).unwrap()
	}

	#[must_use]
	pub fn source(&self) -> &str {
		&self.source
	}

	#[must_use]
	pub fn is_match(&self, path: &VPath) -> bool {
		match &self.regex {
			None => path.is_root(),
			Some(re) => re.is_match(path.as_str()),
		}
	}
}

impl PartialEq for Pattern {
	fn eq(&self, other: &Self) -> bool {
		self.source == other.source && self.case_sensitive == other.case_sensitive
	}
}

impl Eq for Pattern {}

/// Translates a glob string into an anchored regex source string.
fn translate(glob: &str) -> String {
	let mut out = String::with_capacity(glob.len() * 2 + 2);
	out.push('^');

	let mut chars = glob.chars().peekable();

	while let Some(c) = chars.next() {
		match c {
			'*' => {
				if chars.peek() == Some(&'*') {
					chars.next();
					out.push_str(".*");
				} else {
					out.push_str("[^/]*");
				}
			}
			'?' => out.push_str("[^/]"),
			_ => out.push_str(&regex::escape(&c.to_string())),
		}
	}

	out.push('$');
	out
}
