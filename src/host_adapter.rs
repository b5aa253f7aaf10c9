//! The host file-system adapter collaborator (§6.2).
//!
//! URIs are opaque to the core; mount configuration maps a mount point to a base URI and the
//! file-system driver (§4.6) concatenates sub-paths before calling through here.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errno::Errno;

/// Kind reported by [`HostFileSystem::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEntryType {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostStat {
    pub kind: HostEntryType,
    pub size: u64,
    pub mtime_ms: u64,
    pub ctime_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOptions {
    pub recursive: bool,
    pub use_trash: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenameOptions {
    pub overwrite: bool,
}

/// Capability set a collaborator supplies so the file-system driver can lazily materialize
/// backing storage (§6.2). Every method can fail with [`Errno::NoEntry`] (not found) or any other
/// `Errno` the underlying storage maps to.
#[async_trait]
pub trait HostFileSystem: Send + Sync {
    async fn stat(&self, uri: &str) -> Result<HostStat, Errno>;
    async fn read_file(&self, uri: &str) -> Result<Vec<u8>, Errno>;
    async fn write_file(&self, uri: &str, bytes: &[u8]) -> Result<(), Errno>;
    /// Returns `(name, type)` pairs for one directory level; no recursion.
    async fn read_directory(&self, uri: &str) -> Result<Vec<(String, HostEntryType)>, Errno>;
    async fn create_directory(&self, uri: &str) -> Result<(), Errno>;
    async fn delete(&self, uri: &str, options: DeleteOptions) -> Result<(), Errno>;
    async fn rename(&self, from: &str, to: &str, options: RenameOptions) -> Result<(), Errno>;
}

#[derive(Debug, Clone)]
enum MemoryEntry {
    File(Vec<u8>),
    Directory,
}

/// An in-memory [`HostFileSystem`] keyed by "/"-joined URI strings, for tests and demos that want
/// a mounted file system without a real host path underneath it (§4.13).
///
/// Directories are created implicitly by [`create_directory`](Self::create_directory) and by
/// writing a file under them; there is no notion of an unlisted ancestor.
#[derive(Debug, Default)]
pub struct MemoryHostFileSystem {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryHostFileSystem {
    #[must_use]
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(String::new(), MemoryEntry::Directory);
        MemoryHostFileSystem { entries: Mutex::new(entries) }
    }

    fn normalize(uri: &str) -> String {
        uri.trim_matches('/').to_string()
    }

    fn parent_of(uri: &str) -> String {
        match uri.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl HostFileSystem for MemoryHostFileSystem {
    async fn stat(&self, uri: &str) -> Result<HostStat, Errno> {
        let key = Self::normalize(uri);
        match self.entries.lock().get(&key) {
            Some(MemoryEntry::File(bytes)) => Ok(HostStat { kind: HostEntryType::File, size: bytes.len() as u64, mtime_ms: 0, ctime_ms: 0 }),
            Some(MemoryEntry::Directory) => Ok(HostStat { kind: HostEntryType::Directory, size: 0, mtime_ms: 0, ctime_ms: 0 }),
            None => Err(Errno::NoEntry),
        }
    }

    async fn read_file(&self, uri: &str) -> Result<Vec<u8>, Errno> {
        let key = Self::normalize(uri);
        match self.entries.lock().get(&key) {
            Some(MemoryEntry::File(bytes)) => Ok(bytes.clone()),
            Some(MemoryEntry::Directory) => Err(Errno::IsADirectory),
            None => Err(Errno::NoEntry),
        }
    }

    async fn write_file(&self, uri: &str, bytes: &[u8]) -> Result<(), Errno> {
        let key = Self::normalize(uri);
        let mut entries = self.entries.lock();
        if matches!(entries.get(&key), Some(MemoryEntry::Directory)) {
            return Err(Errno::IsADirectory);
        }
        entries.entry(Self::parent_of(&key)).or_insert(MemoryEntry::Directory);
        entries.insert(key, MemoryEntry::File(bytes.to_vec()));
        Ok(())
    }

    async fn read_directory(&self, uri: &str) -> Result<Vec<(String, HostEntryType)>, Errno> {
        let key = Self::normalize(uri);
        let entries = self.entries.lock();
        match entries.get(&key) {
            Some(MemoryEntry::Directory) => {}
            Some(MemoryEntry::File(_)) => return Err(Errno::NotADirectory),
            None => return Err(Errno::NoEntry),
        }
        let prefix = if key.is_empty() { String::new() } else { format!("{key}/") };
        let mut result = Vec::new();
        for (path, entry) in entries.iter() {
            if path.is_empty() || !path.starts_with(&prefix) {
                continue;
            }
            let rest = &path[prefix.len()..];
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            let kind = match entry {
                MemoryEntry::File(_) => HostEntryType::File,
                MemoryEntry::Directory => HostEntryType::Directory,
            };
            result.push((rest.to_string(), kind));
        }
        Ok(result)
    }

    async fn create_directory(&self, uri: &str) -> Result<(), Errno> {
        let key = Self::normalize(uri);
        let mut entries = self.entries.lock();
        if matches!(entries.get(&key), Some(MemoryEntry::File(_))) {
            return Err(Errno::FileExists);
        }
        entries.entry(Self::parent_of(&key)).or_insert(MemoryEntry::Directory);
        entries.insert(key, MemoryEntry::Directory);
        Ok(())
    }

    async fn delete(&self, uri: &str, options: DeleteOptions) -> Result<(), Errno> {
        let key = Self::normalize(uri);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            None => return Err(Errno::NoEntry),
            Some(MemoryEntry::Directory) => {
                let prefix = format!("{key}/");
                let has_children = entries.keys().any(|p| p.starts_with(&prefix));
                if has_children && !options.recursive {
                    return Err(Errno::DirectoryNotEmpty);
                }
                entries.retain(|p, _| p != &key && !p.starts_with(&prefix));
            }
            Some(MemoryEntry::File(_)) => {
                entries.remove(&key);
            }
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str, options: RenameOptions) -> Result<(), Errno> {
        let from_key = Self::normalize(from);
        let to_key = Self::normalize(to);
        let mut entries = self.entries.lock();
        if !options.overwrite && entries.contains_key(&to_key) {
            return Err(Errno::FileExists);
        }
        let entry = entries.remove(&from_key).ok_or(Errno::NoEntry)?;
        entries.entry(Self::parent_of(&to_key)).or_insert(MemoryEntry::Directory);
        entries.insert(to_key, entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips_through_the_memory_backing() {
        let fs = MemoryHostFileSystem::new();
        fs.write_file("dir/file.txt", b"hello").await.unwrap();
        assert_eq!(fs.read_file("dir/file.txt").await.unwrap(), b"hello");
        let listing = fs.read_directory("dir").await.unwrap();
        assert_eq!(listing, vec![("file.txt".to_string(), HostEntryType::File)]);
    }

    #[tokio::test]
    async fn deleting_a_nonempty_directory_requires_recursive() {
        let fs = MemoryHostFileSystem::new();
        fs.write_file("dir/file.txt", b"x").await.unwrap();
        let err = fs.delete("dir", DeleteOptions::default()).await.unwrap_err();
        assert_eq!(err, Errno::DirectoryNotEmpty);
        fs.delete("dir", DeleteOptions { recursive: true, ..Default::default() }).await.unwrap();
        assert!(matches!(fs.stat("dir").await, Err(Errno::NoEntry)));
    }

    #[tokio::test]
    async fn rename_moves_an_entry_to_a_new_uri() {
        let fs = MemoryHostFileSystem::new();
        fs.write_file("a.txt", b"data").await.unwrap();
        fs.rename("a.txt", "b.txt", RenameOptions::default()).await.unwrap();
        assert!(matches!(fs.stat("a.txt").await, Err(Errno::NoEntry)));
        assert_eq!(fs.read_file("b.txt").await.unwrap(), b"data");
    }
}
