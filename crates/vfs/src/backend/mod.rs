//! Concrete backends that sit outside the composition core (spec §6): real storage the
//! rest of the crate (decorations, concat, mount trees) can be exercised against.
//!
//! The HTTP and embedded-resource backends are external collaborators specified only by
//! the interfaces the core consumes; this module carries only the minimal native-OS-flavored
//! backend needed to drive the other components against something other than
//! [`crate::memory::MemoryFileSystem`] in tests.

mod native;

pub use native::NativeFileSystem;
