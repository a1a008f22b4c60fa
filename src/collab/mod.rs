//! Interfaces to subsystems this crate treats as external collaborators:
//! the virtual-memory allocator, the filesystem/inode cache, and the
//! trap/interrupt plumbing. None of them are implemented here; the
//! scheduler core only needs the contracts below.

pub mod fs;
pub mod trap;
pub mod vm;

pub use fs::{FileHandle, InodeHandle};
pub use vm::PageTable;
