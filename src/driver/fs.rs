//! The file-system driver: implements [`DeviceDriver`] against a mounted host adapter (§4.6).
//!
//! Reading a file lazily fetches its full content through the host adapter and caches it on the
//! inode; every subsequent read/write in this process operates on that cached buffer, and writes
//! are eagerly flushed back out. `fd_sync`/`fd_datasync` force a flush early.

use std::sync::Arc;

use async_trait::async_trait;

use crate::container::Container;
use crate::errno::Errno;
use crate::fd_table::{FdFlags, FileType};
use crate::host_adapter::{DeleteOptions, HostEntryType, HostFileSystem, RenameOptions};
use crate::vfs::{InodeArena, InodeData, PathCache};

use super::{DeviceDriver, DirEntry, FileStat, LookupFlags, OpenFlags, OpenedFile, Whence};

/// One mounted file system: a device id, its inode tree, a path cache, and the host adapter it is
/// backed by.
pub struct FileSystemDriver {
    device_id: u32,
    mount_point: String,
    base_uri: String,
    arena: InodeArena,
    path_cache: PathCache,
    adapter: Arc<dyn HostFileSystem>,
}

impl FileSystemDriver {
    #[must_use]
    pub fn new(device_id: u32, mount_point: impl Into<String>, base_uri: impl Into<String>, adapter: Arc<dyn HostFileSystem>) -> Self {
        FileSystemDriver {
            device_id,
            mount_point: mount_point.into(),
            base_uri: base_uri.into(),
            arena: InodeArena::new(device_id),
            path_cache: PathCache::default(),
            adapter,
        }
    }

    fn uri_for(&self, relative: &str) -> String {
        if relative.is_empty() {
            self.base_uri.clone()
        } else {
            format!("{}/{}", self.base_uri.trim_end_matches('/'), relative.trim_start_matches('/'))
        }
    }

    fn relative_path(&self, inode_id: u64) -> String {
        if let Some(cached) = self.path_cache.get(inode_id) {
            return cached;
        }
        let path = self.arena.full_path(inode_id).unwrap_or_default();
        let relative = path.trim_start_matches('/').to_string();
        self.path_cache.insert(inode_id, relative.clone());
        relative
    }

    async fn ensure_content_loaded(&self, inode_id: u64) -> Result<(), Errno> {
        let needs_fetch = matches!(
            self.arena.get(inode_id),
            Some(crate::vfs::Inode {
                data: InodeData::File { content: None, .. },
                ..
            })
        );
        if !needs_fetch {
            return Ok(());
        }
        let uri = self.uri_for(&self.relative_path(inode_id));
        let bytes = self.adapter.read_file(&uri).await?;
        self.arena.with_mut(inode_id, |node| {
            if let InodeData::File { content, size } = &mut node.data {
                *size = bytes.len() as u64;
                *content = Some(Container::Vec(bytes));
            }
        });
        Ok(())
    }

    async fn flush(&self, inode_id: u64) -> Result<(), Errno> {
        let bytes = self.arena.get(inode_id).and_then(|node| match node.data {
            InodeData::File { content: Some(c), .. } => Some(c.to_vec()),
            _ => None,
        });
        if let Some(bytes) = bytes {
            let uri = self.uri_for(&self.relative_path(inode_id));
            self.adapter.write_file(&uri, &bytes).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceDriver for FileSystemDriver {
    fn device_id(&self) -> u32 {
        self.device_id
    }

    async fn fd_close(&self, _inode_id: u64) -> Result<(), Errno> {
        Ok(())
    }

    async fn fd_fdstat_get(&self, _inode_id: u64) -> Result<FdFlags, Errno> {
        Ok(FdFlags::empty())
    }

    async fn fd_fdstat_set_flags(&self, _inode_id: u64, _flags: FdFlags) -> Result<(), Errno> {
        Ok(())
    }

    async fn fd_filestat_get(&self, inode_id: u64) -> Result<FileStat, Errno> {
        self.ensure_content_loaded(inode_id).await.ok();
        let node = self.arena.get(inode_id).ok_or(Errno::NoEntry)?;
        Ok(stat_from_node(&node))
    }

    async fn fd_filestat_set_size(&self, inode_id: u64, size: u64) -> Result<(), Errno> {
        self.ensure_content_loaded(inode_id).await?;
        self.arena.with_mut(inode_id, |node| {
            if let InodeData::File { content, size: node_size } = &mut node.data {
                let mut bytes = content.take().unwrap_or(Container::Vec(Vec::new())).to_vec();
                bytes.resize(size as usize, 0);
                *node_size = size;
                *content = Some(Container::Vec(bytes));
            }
        });
        self.flush(inode_id).await
    }

    async fn path_filestat_get(&self, dir_inode_id: u64, path: &str) -> Result<FileStat, Errno> {
        let inode_id = resolve_existing(&self.arena, dir_inode_id, path).ok_or(Errno::NoEntry)?;
        self.fd_filestat_get(inode_id).await
    }

    async fn fd_read(&self, inode_id: u64, cursor: u64, len: usize) -> Result<Vec<u8>, Errno> {
        self.ensure_content_loaded(inode_id).await?;
        let node = self.arena.get(inode_id).ok_or(Errno::NoEntry)?;
        match node.data {
            InodeData::File { content: Some(content), .. } => {
                let bytes = content.to_vec();
                let start = (cursor as usize).min(bytes.len());
                let end = (start + len).min(bytes.len());
                Ok(bytes[start..end].to_vec())
            }
            InodeData::File { content: None, .. } => Ok(Vec::new()),
            InodeData::Directory { .. } => Err(Errno::IsADirectory),
        }
    }

    async fn fd_write(&self, inode_id: u64, cursor: u64, data: &[u8], append: bool) -> Result<usize, Errno> {
        self.ensure_content_loaded(inode_id).await?;
        self.arena.with_mut(inode_id, |node| {
            if let InodeData::File { content, size } = &mut node.data {
                let mut bytes = content.take().unwrap_or(Container::Vec(Vec::new())).to_vec();
                let offset = if append { bytes.len() } else { cursor as usize };
                if offset > bytes.len() {
                    bytes.resize(offset, 0);
                }
                if offset + data.len() > bytes.len() {
                    bytes.resize(offset + data.len(), 0);
                }
                bytes[offset..offset + data.len()].copy_from_slice(data);
                *size = bytes.len() as u64;
                *content = Some(Container::Vec(bytes));
            }
        });
        self.flush(inode_id).await?;
        Ok(data.len())
    }

    async fn fd_pread(&self, inode_id: u64, offset: u64, len: usize) -> Result<Vec<u8>, Errno> {
        self.fd_read(inode_id, offset, len).await
    }

    async fn fd_pwrite(&self, inode_id: u64, offset: u64, data: &[u8]) -> Result<usize, Errno> {
        self.fd_write(inode_id, offset, data, false).await
    }

    async fn fd_seek(&self, inode_id: u64, cursor: u64, offset: i64, whence: Whence) -> Result<u64, Errno> {
        let size = self.arena.get(inode_id).map(|n| match n.data {
            InodeData::File { size, .. } => size,
            InodeData::Directory { .. } => 0,
        }).unwrap_or(0);
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => cursor as i64,
            Whence::End => size as i64,
        };
        let new_pos = base.saturating_add(offset).max(0);
        Ok(new_pos as u64)
    }

    async fn fd_tell(&self, cursor: u64) -> Result<u64, Errno> {
        Ok(cursor)
    }

    async fn fd_sync(&self, inode_id: u64) -> Result<(), Errno> {
        self.flush(inode_id).await
    }

    async fn fd_datasync(&self, inode_id: u64) -> Result<(), Errno> {
        self.flush(inode_id).await
    }

    async fn fd_allocate(&self, inode_id: u64, offset: u64, len: u64) -> Result<(), Errno> {
        let target = offset + len;
        self.fd_filestat_set_size(inode_id, target).await
    }

    async fn fd_readdir(&self, dir_inode_id: u64) -> Result<Vec<DirEntry>, Errno> {
        let relative = self.relative_path(dir_inode_id);
        let uri = self.uri_for(&relative);
        let entries = self.adapter.read_directory(&uri).await?;
        let mut result = Vec::with_capacity(entries.len());
        for (name, kind) in entries {
            let inode_id = match self.arena.lookup_child(dir_inode_id, &name) {
                Some(id) => id,
                None => {
                    let data = match kind {
                        HostEntryType::File => InodeData::new_file(),
                        HostEntryType::Directory => InodeData::new_directory(),
                    };
                    self.arena.create_child(dir_inode_id, &name, data)
                }
            };
            let filetype = match kind {
                HostEntryType::File => FileType::File,
                HostEntryType::Directory => FileType::Directory,
            };
            result.push(DirEntry { name, filetype, inode_id });
        }
        Ok(result)
    }

    async fn path_create_directory(&self, dir_inode_id: u64, path: &str) -> Result<(), Errno> {
        let uri = self.uri_for(&join_relative(&self.relative_path(dir_inode_id), path));
        self.adapter.create_directory(&uri).await?;
        let (parent, leaf) = resolve_parent(&self.arena, dir_inode_id, path);
        if self.arena.lookup_child(parent, &leaf).is_none() {
            self.arena.create_child(parent, &leaf, InodeData::new_directory());
        }
        Ok(())
    }

    async fn path_remove_directory(&self, dir_inode_id: u64, path: &str) -> Result<(), Errno> {
        let inode_id = resolve_existing(&self.arena, dir_inode_id, path).ok_or(Errno::NoEntry)?;
        let node = self.arena.get(inode_id).ok_or(Errno::NoEntry)?;
        match &node.data {
            InodeData::Directory { children } if !children.is_empty() => {
                return Err(Errno::DirectoryNotEmpty);
            }
            InodeData::File { .. } => return Err(Errno::NotADirectory),
            _ => {}
        }
        let uri = self.uri_for(&join_relative(&self.relative_path(dir_inode_id), path));
        self.adapter.delete(&uri, DeleteOptions::default()).await?;
        self.arena.tombstone(inode_id);
        self.path_cache.invalidate(inode_id);
        Ok(())
    }

    async fn path_open(&self, dir_inode_id: u64, path: &str, oflags: OpenFlags, _lookupflags: LookupFlags) -> Result<OpenedFile, Errno> {
        if path == "." {
            self.arena.pin(dir_inode_id);
            return Ok(OpenedFile { inode_id: dir_inode_id, filetype: FileType::Directory });
        }
        let existing = resolve_existing(&self.arena, dir_inode_id, path);
        let relative = join_relative(&self.relative_path(dir_inode_id), path);
        let uri = self.uri_for(&relative);

        let inode_id = match existing {
            Some(id) => {
                if oflags.excl {
                    return Err(Errno::FileExists);
                }
                id
            }
            None => {
                if !oflags.creat {
                    return Err(Errno::NoEntry);
                }
                self.adapter.write_file(&uri, &[]).await?;
                let (parent, leaf) = resolve_parent(&self.arena, dir_inode_id, path);
                self.arena.create_child(parent, &leaf, InodeData::new_file())
            }
        };

        let node = self.arena.get(inode_id).ok_or(Errno::NoEntry)?;
        if oflags.directory && !node.data.is_directory() {
            return Err(Errno::NotADirectory);
        }
        if oflags.trunc {
            if let InodeData::File { .. } = node.data {
                self.arena.with_mut(inode_id, |n| {
                    n.data = InodeData::File { content: Some(Container::Vec(Vec::new())), size: 0 };
                });
                self.flush(inode_id).await?;
            }
        }
        self.arena.pin(inode_id);
        let filetype = if node.data.is_directory() { FileType::Directory } else { FileType::File };
        Ok(OpenedFile { inode_id, filetype })
    }

    async fn path_rename(&self, src_dir: u64, src_path: &str, dst_dir: u64, dst_path: &str) -> Result<(), Errno> {
        let (dst_parent, dst_leaf) = resolve_parent(&self.arena, dst_dir, dst_path);
        if self.arena.lookup_child(dst_parent, &dst_leaf).is_some() {
            return Err(Errno::FileExists);
        }
        let inode_id = resolve_existing(&self.arena, src_dir, src_path).ok_or(Errno::NoEntry)?;
        let from_uri = self.uri_for(&join_relative(&self.relative_path(src_dir), src_path));
        let to_uri = self.uri_for(&join_relative(&self.relative_path(dst_dir), dst_path));
        self.adapter.rename(&from_uri, &to_uri, RenameOptions::default()).await?;
        self.arena.tombstone(inode_id);
        self.path_cache.invalidate(inode_id);
        let data = self.arena.get(inode_id).map(|n| n.data).unwrap_or(InodeData::new_file());
        self.arena.create_child(dst_parent, &dst_leaf, data);
        Ok(())
    }

    async fn path_unlink_file(&self, dir_inode_id: u64, path: &str) -> Result<(), Errno> {
        let inode_id = resolve_existing(&self.arena, dir_inode_id, path).ok_or(Errno::NoEntry)?;
        if matches!(self.arena.get(inode_id).map(|n| n.data), Some(InodeData::Directory { .. })) {
            return Err(Errno::IsADirectory);
        }
        let uri = self.uri_for(&join_relative(&self.relative_path(dir_inode_id), path));
        self.adapter.delete(&uri, DeleteOptions::default()).await?;
        self.arena.tombstone(inode_id);
        self.path_cache.invalidate(inode_id);
        Ok(())
    }

    fn fd_prestat_get(&self) -> Option<String> {
        Some(self.mount_point.clone())
    }
}

/// Walks every segment of `path` except the last, creating missing *intermediate* directory
/// inodes as in-memory placeholders (§4.5 "Path resolution"), and returns the final directory's
/// inode id alongside the leaf segment's name.
fn resolve_parent(arena: &InodeArena, dir_inode_id: u64, path: &str) -> (u64, String) {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let leaf = segments.pop().unwrap_or_default().to_string();
    let mut current = dir_inode_id;
    for segment in segments {
        current = match arena.lookup_child(current, segment) {
            Some(id) => id,
            None => arena.create_child(current, segment, InodeData::new_directory()),
        };
    }
    (current, leaf)
}

fn resolve_existing(arena: &InodeArena, dir_inode_id: u64, path: &str) -> Option<u64> {
    let (parent, leaf) = resolve_parent(arena, dir_inode_id, path);
    arena.lookup_child(parent, &leaf)
}

fn join_relative(base: &str, leaf: &str) -> String {
    if base.is_empty() {
        leaf.to_string()
    } else {
        format!("{base}/{leaf}")
    }
}

fn stat_from_node(node: &crate::vfs::Inode) -> FileStat {
    match &node.data {
        InodeData::File { size, .. } => FileStat {
            filetype: FileType::File,
            size: *size,
            mtime_ms: 0,
            ctime_ms: 0,
        },
        InodeData::Directory { .. } => FileStat {
            filetype: FileType::Directory,
            size: 0,
            mtime_ms: 0,
            ctime_ms: 0,
        },
    }
}
