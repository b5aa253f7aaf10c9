//! Console driver: a stdio stream backed directly by the embedding process's own stdout/stderr,
//! for `stdio: console` process options (§6.4).

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stderr, Stdout};
use tokio::sync::Mutex;

use crate::errno::Errno;
use crate::fd_table::{FdFlags, FileType};

use super::{DeviceDriver, FileStat};

enum Sink {
    Stdout(Stdout),
    Stderr(Stderr),
}

/// Write-only console sink. There is no line discipline here — unlike [`super::pty::PtyDriver`],
/// bytes are written straight through.
pub struct ConsoleDriver {
    device_id: u32,
    sink: Mutex<Sink>,
}

impl ConsoleDriver {
    #[must_use]
    pub fn stdout(device_id: u32) -> Self {
        ConsoleDriver {
            device_id,
            sink: Mutex::new(Sink::Stdout(tokio::io::stdout())),
        }
    }

    #[must_use]
    pub fn stderr(device_id: u32) -> Self {
        ConsoleDriver {
            device_id,
            sink: Mutex::new(Sink::Stderr(tokio::io::stderr())),
        }
    }
}

#[async_trait]
impl DeviceDriver for ConsoleDriver {
    fn device_id(&self) -> u32 {
        self.device_id
    }

    async fn fd_fdstat_get(&self, _inode_id: u64) -> Result<FdFlags, Errno> {
        Ok(FdFlags::empty())
    }

    async fn fd_filestat_get(&self, _inode_id: u64) -> Result<FileStat, Errno> {
        Ok(FileStat {
            filetype: FileType::CharacterDevice,
            size: 0,
            mtime_ms: 0,
            ctime_ms: 0,
        })
    }

    async fn fd_write(&self, _inode_id: u64, _cursor: u64, data: &[u8], _append: bool) -> Result<usize, Errno> {
        let mut sink = self.sink.lock().await;
        let result = match &mut *sink {
            Sink::Stdout(s) => s.write_all(data).await,
            Sink::Stderr(s) => s.write_all(data).await,
        };
        result.map_err(Errno::from)?;
        Ok(data.len())
    }

    async fn fd_read(&self, _inode_id: u64, _cursor: u64, _len: usize) -> Result<Vec<u8>, Errno> {
        Ok(Vec::new())
    }
}
