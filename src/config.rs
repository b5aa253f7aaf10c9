//! Process configuration (§6.4), built in the teacher's `set_*`-returns-previous-value style:
//! a setter either accepts the new value and returns the one it replaced, or rejects it and
//! returns the value actually in effect, so callers can tell at a glance whether their request
//! took hold.

use std::collections::BTreeMap;

/// Only `utf-8` is supported; the enum exists so the option is explicit in `ProcessOptions`
/// rather than implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
}

/// One of the three stdio slots.
#[derive(Debug, Clone)]
pub enum StdioEndpoint {
    File { path: String, oflags: u32, fdflags: u32 },
    Terminal { handle: String },
    Pipe,
    Console,
}

#[derive(Debug, Clone)]
pub struct StdioOptions {
    pub stdin: StdioEndpoint,
    pub stdout: StdioEndpoint,
    pub stderr: StdioEndpoint,
}

impl Default for StdioOptions {
    fn default() -> Self {
        StdioOptions {
            stdin: StdioEndpoint::Console,
            stdout: StdioEndpoint::Console,
            stderr: StdioEndpoint::Console,
        }
    }
}

/// One mount entry (§6.4).
#[derive(Debug, Clone)]
pub enum MountEntry {
    WorkspaceFolder { mount_point: String },
    ExtensionLocation { path: String, mount_point: String },
    HostFileSystem { uri: String, mount_point: String },
}

impl MountEntry {
    #[must_use]
    pub fn mount_point(&self) -> &str {
        match self {
            MountEntry::WorkspaceFolder { mount_point }
            | MountEntry::ExtensionLocation { mount_point, .. }
            | MountEntry::HostFileSystem { mount_point, .. } => mount_point,
        }
    }
}

/// A sink that receives per-call trace lines and a final summary (§6.4, §4.10).
pub trait TraceSink: Send + Sync {
    fn trace(&self, line: &str);
    fn trace_summary(&self, summary: &str);
}

/// No-op sink used when `trace` is left unset.
#[derive(Default)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn trace(&self, _line: &str) {}
    fn trace_summary(&self, _summary: &str) {}
}

const MAX_ARGS: usize = 4096;
const MAX_MOUNTS: usize = 64;

/// Process-wide configuration, built incrementally. Each `set_*` returns the *previous* value on
/// success, or the *current* (unchanged) value if the request was rejected — mirroring the
/// `nearest-legal-value` convention used elsewhere in this codebase's builder-style configs.
pub struct ProcessOptions {
    args: Vec<String>,
    env: BTreeMap<String, String>,
    encoding: Encoding,
    stdio: StdioOptions,
    mounts: Vec<MountEntry>,
    trace: Option<Box<dyn TraceSink>>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        ProcessOptions {
            args: Vec::new(),
            env: BTreeMap::new(),
            encoding: Encoding::default(),
            stdio: StdioOptions::default(),
            mounts: Vec::new(),
            trace: None,
        }
    }
}

impl ProcessOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `argv`, rejecting (and returning the unchanged value) if it exceeds the limit
    /// this runtime accepts in a single call region allocation.
    pub fn set_args(&mut self, args: Vec<String>) -> Result<Vec<String>, Vec<String>> {
        if args.len() > MAX_ARGS {
            return Err(self.args.clone());
        }
        Ok(std::mem::replace(&mut self.args, args))
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn set_env(&mut self, env: BTreeMap<String, String>) -> BTreeMap<String, String> {
        std::mem::replace(&mut self.env, env)
    }

    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn set_stdio(&mut self, stdio: StdioOptions) -> StdioOptions {
        std::mem::replace(&mut self.stdio, stdio)
    }

    #[must_use]
    pub fn stdio(&self) -> &StdioOptions {
        &self.stdio
    }

    /// Appends a mount entry in declaration order, rejecting once [`MAX_MOUNTS`] is reached —
    /// mount order is part of the external `fd_prestat_get` contract (§4.4), so entries are never
    /// reordered.
    pub fn push_mount(&mut self, mount: MountEntry) -> Result<(), MountEntry> {
        if self.mounts.len() >= MAX_MOUNTS {
            return Err(mount);
        }
        self.mounts.push(mount);
        Ok(())
    }

    #[must_use]
    pub fn mounts(&self) -> &[MountEntry] {
        &self.mounts
    }

    pub fn set_trace(&mut self, sink: Box<dyn TraceSink>) {
        self.trace = Some(sink);
    }

    #[must_use]
    pub fn trace(&self) -> Option<&dyn TraceSink> {
        self.trace.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_args_returns_the_previous_value() {
        let mut options = ProcessOptions::new();
        options.set_args(vec!["a".into()]).unwrap();
        let previous = options.set_args(vec!["b".into()]).unwrap();
        assert_eq!(previous, vec!["a".to_string()]);
        assert_eq!(options.args(), &["b".to_string()]);
    }

    #[test]
    fn set_args_rejects_oversized_argv_and_leaves_it_unchanged() {
        let mut options = ProcessOptions::new();
        options.set_args(vec!["a".into()]).unwrap();
        let oversized = vec![String::new(); MAX_ARGS + 1];
        let rejected = options.set_args(oversized).unwrap_err();
        assert_eq!(rejected, vec!["a".to_string()]);
        assert_eq!(options.args(), &["a".to_string()]);
    }

    #[test]
    fn mounts_preserve_declaration_order() {
        let mut options = ProcessOptions::new();
        options
            .push_mount(MountEntry::WorkspaceFolder { mount_point: "/ws".into() })
            .unwrap();
        options
            .push_mount(MountEntry::HostFileSystem {
                uri: "file:///tmp".into(),
                mount_point: "/tmp".into(),
            })
            .unwrap();
        let points: Vec<&str> = options.mounts().iter().map(MountEntry::mount_point).collect();
        assert_eq!(points, vec!["/ws", "/tmp"]);
    }
}
