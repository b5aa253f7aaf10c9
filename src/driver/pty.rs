//! Pseudo-terminal driver: line discipline, echo, and `readline`/`prompt` (§4.7).
//!
//! A TTY FD has no backing file. Input arrives from an external terminal host over a bounded
//! channel; `fd_write` enqueues bytes the same way outbound. End-of-file is sticky: once it's been
//! observed, every later read keeps returning zero bytes (§4.7).

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::errno::Errno;
use crate::fd_table::{FdFlags, FileType};

use super::{DeviceDriver, FileStat};

const BACKSPACE: u8 = 0x08;
const DEL: u8 = 0x7f;
const INTERRUPT: u8 = 0x03;
const END_OF_FILE: u8 = 0x04;

/// Raised control events the line discipline surfaces as it consumes input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    Interrupt,
    EndOfFile,
}

struct LineDiscipline {
    buffer: Vec<u8>,
    history: Vec<Vec<u8>>,
    echo: bool,
    eof_seen: bool,
}

impl LineDiscipline {
    fn new(echo: bool) -> Self {
        LineDiscipline {
            buffer: Vec::new(),
            history: Vec::new(),
            echo,
            eof_seen: false,
        }
    }

    /// Feeds one input byte in. Returns a completed line once a newline is seen.
    fn feed(&mut self, byte: u8, echo_out: &mut Vec<u8>) -> Option<Vec<u8>> {
        match byte {
            b'\n' | b'\r' => {
                if self.echo {
                    echo_out.push(b'\n');
                }
                let line = std::mem::take(&mut self.buffer);
                self.history.push(line.clone());
                Some(line)
            }
            BACKSPACE | DEL => {
                if self.buffer.pop().is_some() && self.echo {
                    echo_out.extend_from_slice(&[BACKSPACE, b' ', BACKSPACE]);
                }
                None
            }
            INTERRUPT => None,
            END_OF_FILE => {
                self.eof_seen = true;
                None
            }
            other => {
                self.buffer.push(other);
                if self.echo {
                    echo_out.push(other);
                }
                None
            }
        }
    }
}

/// One pty endpoint: stdin side reads lines through a line discipline, stdout/stderr side pushes
/// bytes onto a bounded channel for the external terminal host to drain (§6.3).
pub struct PtyDriver {
    device_id: u32,
    echo: bool,
    input: Mutex<mpsc::Receiver<u8>>,
    output: mpsc::Sender<Vec<u8>>,
    discipline: Mutex<LineDiscipline>,
}

impl PtyDriver {
    #[must_use]
    pub fn new(device_id: u32, echo: bool, input: mpsc::Receiver<u8>, output: mpsc::Sender<Vec<u8>>) -> Self {
        PtyDriver {
            device_id,
            echo,
            input: Mutex::new(input),
            output,
            discipline: Mutex::new(LineDiscipline::new(echo)),
        }
    }

    /// Blocks until a full line (terminated by newline) is available, or EOF is observed.
    /// Returns an empty vector once EOF has already been seen (§4.7 "continue to return 0").
    pub async fn readline(&self) -> Result<Vec<u8>, Errno> {
        let mut discipline = self.discipline.lock().await;
        if discipline.eof_seen {
            return Ok(Vec::new());
        }
        let mut input = self.input.lock().await;
        loop {
            let Some(byte) = input.recv().await else {
                discipline.eof_seen = true;
                return Ok(Vec::new());
            };
            let mut echo_out = Vec::new();
            let line = discipline.feed(byte, &mut echo_out);
            if !echo_out.is_empty() {
                let _ = self.output.send(echo_out).await;
            }
            if let Some(line) = line {
                return Ok(line);
            }
            if discipline.eof_seen {
                return Ok(Vec::new());
            }
        }
    }

    /// Writes `prompt` then reads a line (§4.7).
    pub async fn prompt(&self, prompt: &[u8]) -> Result<Vec<u8>, Errno> {
        let _ = self.output.send(prompt.to_vec()).await;
        self.readline().await
    }
}

#[async_trait]
impl DeviceDriver for PtyDriver {
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

    async fn fd_read(&self, _inode_id: u64, _cursor: u64, len: usize) -> Result<Vec<u8>, Errno> {
        let mut line = self.readline().await?;
        line.truncate(len);
        Ok(line)
    }

    async fn fd_write(&self, _inode_id: u64, _cursor: u64, data: &[u8], _append: bool) -> Result<usize, Errno> {
        self.output.send(data.to_vec()).await.map_err(|_| Errno::IoError)?;
        Ok(data.len())
    }

    async fn bytes_available(&self, _inode_id: u64) -> Option<usize> {
        let discipline = self.discipline.lock().await;
        Some(if discipline.eof_seen { 0 } else { 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_and_completes_a_line() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let pty = PtyDriver::new(0, true, in_rx, out_tx);
        for byte in b"hi\n" {
            in_tx.send(*byte).await.unwrap();
        }
        let line = pty.readline().await.unwrap();
        assert_eq!(line, b"hi");
        let mut echoed = Vec::new();
        while let Ok(chunk) = out_rx.try_recv() {
            echoed.extend(chunk);
        }
        assert_eq!(echoed, b"hi\n");
    }

    #[tokio::test]
    async fn backspace_removes_the_last_character() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let pty = PtyDriver::new(0, false, in_rx, out_tx);
        for byte in [b'a', b'b', BACKSPACE, b'c', b'\n'] {
            in_tx.send(byte).await.unwrap();
        }
        let line = pty.readline().await.unwrap();
        assert_eq!(line, b"ac");
    }

    #[tokio::test]
    async fn eof_is_sticky() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, _out_rx) = mpsc::channel(16);
        let pty = PtyDriver::new(0, false, in_rx, out_tx);
        drop(in_tx);
        assert_eq!(pty.readline().await.unwrap(), Vec::<u8>::new());
        assert_eq!(pty.readline().await.unwrap(), Vec::<u8>::new());
    }
}
