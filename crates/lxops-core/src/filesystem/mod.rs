//! Host storage: copy-on-write volumes and plain directories.

pub mod directory;
pub mod volume;
