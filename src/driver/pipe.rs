//! Pipe driver: a bounded byte channel between two FDs (§2 "Pseudo-terminal & pipe drivers").

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::errno::Errno;
use crate::fd_table::{FdFlags, FileType};

use super::{DeviceDriver, FileStat};

/// One end of a bounded in-process pipe. Reading drains bytes in FIFO order; writing that would
/// exceed the channel's capacity suspends until the reader catches up.
pub struct PipeDriver {
    device_id: u32,
    sender: Option<mpsc::Sender<Vec<u8>>>,
    receiver: Option<Mutex<mpsc::Receiver<Vec<u8>>>>,
}

impl PipeDriver {
    /// Creates a connected read/write pair sharing one bounded channel.
    #[must_use]
    pub fn pair(device_id: u32, capacity: usize) -> (PipeDriver, PipeDriver) {
        let (tx, rx) = mpsc::channel(capacity);
        let write_end = PipeDriver {
            device_id,
            sender: Some(tx),
            receiver: None,
        };
        let read_end = PipeDriver {
            device_id,
            sender: None,
            receiver: Some(Mutex::new(rx)),
        };
        (read_end, write_end)
    }
}

#[async_trait]
impl DeviceDriver for PipeDriver {
    fn device_id(&self) -> u32 {
        self.device_id
    }

    async fn fd_fdstat_get(&self, _inode_id: u64) -> Result<FdFlags, Errno> {
        Ok(FdFlags::empty())
    }

    async fn fd_filestat_get(&self, _inode_id: u64) -> Result<FileStat, Errno> {
        Ok(FileStat {
            filetype: FileType::Pipe,
            size: 0,
            mtime_ms: 0,
            ctime_ms: 0,
        })
    }

    async fn fd_read(&self, _inode_id: u64, _cursor: u64, len: usize) -> Result<Vec<u8>, Errno> {
        let Some(receiver) = &self.receiver else {
            return Err(Errno::BadFileDescriptor);
        };
        let mut receiver = receiver.lock().await;
        match receiver.recv().await {
            Some(mut chunk) => {
                chunk.truncate(len);
                Ok(chunk)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn fd_write(&self, _inode_id: u64, _cursor: u64, data: &[u8], _append: bool) -> Result<usize, Errno> {
        let Some(sender) = &self.sender else {
            return Err(Errno::BadFileDescriptor);
        };
        sender.send(data.to_vec()).await.map_err(|_| Errno::IoError)?;
        Ok(data.len())
    }

    async fn bytes_available(&self, _inode_id: u64) -> Option<usize> {
        Some(if self.receiver.is_some() { 1 } else { 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_on_one_end_are_read_on_the_other() {
        let (reader, writer) = PipeDriver::pair(0, 4);
        writer.fd_write(0, 0, b"hello", false).await.unwrap();
        let chunk = reader.fd_read(0, 0, 16).await.unwrap();
        assert_eq!(chunk, b"hello");
    }

    #[tokio::test]
    async fn reading_after_writer_drop_returns_empty() {
        let (reader, writer) = PipeDriver::pair(0, 4);
        drop(writer);
        let chunk = reader.fd_read(0, 0, 16).await.unwrap();
        assert!(chunk.is_empty());
    }
}
