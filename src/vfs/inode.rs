//! The in-memory inode arena (§3 "Inode", §9 "Cyclic inode graph").
//!
//! Inodes are stored in a flat arena keyed by a monotonically increasing id, never by pointer, so
//! the tree cannot alias or cycle by construction: a directory only ever holds child *ids*, and
//! every non-root inode records exactly one parent id.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::container::Container;

/// What an inode represents.
#[derive(Debug, Clone)]
pub enum InodeData {
    File {
        /// Cached content, lazily fetched through the host adapter on first read (§4.6).
        content: Option<Container<'static, u8>>,
        size: u64,
    },
    Directory {
        children: BTreeMap<String, u64>,
    },
}

impl InodeData {
    #[must_use]
    pub fn new_file() -> Self {
        InodeData::File {
            content: None,
            size: 0,
        }
    }

    #[must_use]
    pub fn new_directory() -> Self {
        InodeData::Directory {
            children: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        matches!(self, InodeData::Directory { .. })
    }
}

/// One node in a device's inode tree.
#[derive(Debug, Clone)]
pub struct Inode {
    pub id: u64,
    pub device_id: u32,
    pub parent: Option<u64>,
    pub name: String,
    pub data: InodeData,
    pub refs: u32,
    /// Set once the entry is unlinked; content and the slot itself are reclaimed once `refs`
    /// drops to zero (§3 "deletion marks the inode tombstoned until refs drop to zero").
    pub tombstoned: bool,
}

/// Per-device arena of inodes, addressable only by id.
pub struct InodeArena {
    device_id: u32,
    inner: RwLock<Inner>,
}

struct Inner {
    nodes: BTreeMap<u64, Inode>,
    next_id: u64,
}

impl InodeArena {
    /// Creates the arena with a root directory inode at id 0.
    #[must_use]
    pub fn new(device_id: u32) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            0,
            Inode {
                id: 0,
                device_id,
                parent: None,
                name: String::new(),
                data: InodeData::new_directory(),
                refs: 0,
                tombstoned: false,
            },
        );
        InodeArena {
            device_id,
            inner: RwLock::new(Inner { nodes, next_id: 1 }),
        }
    }

    #[must_use]
    pub fn root_id(&self) -> u64 {
        0
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<Inode> {
        self.inner.read().nodes.get(&id).cloned()
    }

    pub fn with_mut<R>(&self, id: u64, f: impl FnOnce(&mut Inode) -> R) -> Option<R> {
        let mut inner = self.inner.write();
        inner.nodes.get_mut(&id).map(f)
    }

    /// Creates a new child inode under `parent`, returning its id. Does not check for name
    /// collisions; callers resolve those before calling (§4.5 "Path resolution").
    pub fn create_child(&self, parent: u64, name: &str, data: InodeData) -> u64 {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.nodes.insert(
            id,
            Inode {
                id,
                device_id: self.device_id,
                parent: Some(parent),
                name: name.to_string(),
                data,
                refs: 0,
                tombstoned: false,
            },
        );
        if let Some(InodeData::Directory { children }) = inner.nodes.get_mut(&parent).map(|p| &mut p.data) {
            children.insert(name.to_string(), id);
        }
        id
    }

    pub fn lookup_child(&self, parent: u64, name: &str) -> Option<u64> {
        let inner = self.inner.read();
        match &inner.nodes.get(&parent)?.data {
            InodeData::Directory { children } => children.get(name).copied(),
            InodeData::File { .. } => None,
        }
    }

    /// Increments an inode's refcount; every open FD pins its inode this way (§3).
    pub fn pin(&self, id: u64) {
        let mut inner = self.inner.write();
        if let Some(node) = inner.nodes.get_mut(&id) {
            node.refs += 1;
        }
    }

    /// Decrements an inode's refcount, reclaiming it if it was tombstoned and has hit zero.
    pub fn unpin(&self, id: u64) {
        let mut inner = self.inner.write();
        let should_reclaim = if let Some(node) = inner.nodes.get_mut(&id) {
            node.refs = node.refs.saturating_sub(1);
            node.tombstoned && node.refs == 0
        } else {
            false
        };
        if should_reclaim {
            inner.nodes.remove(&id);
        }
    }

    /// Marks an inode tombstoned and removes it from its parent's child map, without touching
    /// other open FDs pinning it. Reclamation happens in [`Self::unpin`] once refs hit zero.
    pub fn tombstone(&self, id: u64) {
        let mut inner = self.inner.write();
        let parent = inner.nodes.get(&id).and_then(|n| n.parent);
        let name = inner.nodes.get(&id).map(|n| n.name.clone());
        if let (Some(parent), Some(name)) = (parent, name) {
            if let Some(InodeData::Directory { children }) = inner.nodes.get_mut(&parent).map(|p| &mut p.data) {
                children.remove(&name);
            }
        }
        let refs_zero = inner.nodes.get(&id).map(|n| n.refs == 0).unwrap_or(false);
        if let Some(node) = inner.nodes.get_mut(&id) {
            node.tombstoned = true;
        }
        if refs_zero {
            inner.nodes.remove(&id);
        }
    }

    /// Reconstructs the absolute path of `id` by walking parents bottom-up.
    #[must_use]
    pub fn full_path(&self, id: u64) -> Option<String> {
        let inner = self.inner.read();
        let mut segments = Vec::new();
        let mut current = id;
        loop {
            let node = inner.nodes.get(&current)?;
            if node.parent.is_none() {
                break;
            }
            segments.push(node.name.clone());
            current = node.parent.unwrap();
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }
}

pub type SharedInodeArena = Arc<InodeArena>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_and_looks_up_children() {
        let arena = InodeArena::new(0);
        let root = arena.root_id();
        let child = arena.create_child(root, "a", InodeData::new_directory());
        assert_eq!(arena.lookup_child(root, "a"), Some(child));
    }

    #[test]
    fn full_path_is_reconstructed_bottom_up() {
        let arena = InodeArena::new(0);
        let root = arena.root_id();
        let a = arena.create_child(root, "a", InodeData::new_directory());
        let b = arena.create_child(a, "b.txt", InodeData::new_file());
        assert_eq!(arena.full_path(b).unwrap(), "/a/b.txt");
    }

    #[test]
    fn tombstoned_inode_is_reclaimed_once_refs_hit_zero() {
        let arena = InodeArena::new(0);
        let root = arena.root_id();
        let file = arena.create_child(root, "f", InodeData::new_file());
        arena.pin(file);
        arena.tombstone(file);
        assert!(arena.get(file).is_some(), "still referenced, not reclaimed yet");
        assert_eq!(arena.lookup_child(root, "f"), None, "removed from parent's children");
        arena.unpin(file);
        assert!(arena.get(file).is_none(), "reclaimed once refs hit zero");
    }
}
