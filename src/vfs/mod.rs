//! The virtual file system: per-device inode trees plus the path cache in front of them (§3
//! "Inode", §4.6).

pub mod inode;
pub mod path_cache;

pub use inode::{Inode, InodeArena, InodeData, SharedInodeArena};
pub use path_cache::PathCache;
