//! The service dispatcher (§4.3): looks up a call's handler, validates rights, invokes the
//! resolved FD's driver, and writes the result back into the call region.
//!
//! Runs single-threaded per service worker; calls from different compute workers may interleave
//! cooperatively across `await` points, but the dispatcher never starts a second call's handler
//! before the current one reaches its next suspension point (§5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ProcessOptions;
use crate::driver::{DeviceDriver, LookupFlags, OpenFlags, Whence};
use crate::errno::Errno;
use crate::fd_table::{FdFlags, FileDescriptor, FileType, SharedFdTable};
use crate::poll::{poll_oneoff, poll_oneoff_blocking, Clock, ClockId, PollEvent, Subscription};
use crate::process::Process;
use crate::rights::{ChildKind, Rights};
use crate::shared_region::SharedRegion;
use crate::trace::{trace_call, TraceCounters};
use crate::wire::argument::{ArgumentReader, ArgumentWriter};
use crate::wire::layout::{Header, RegionLayout};
use crate::wire::params::*;
use crate::wire::MethodId;

/// A secondary flag that, when set, asks an in-flight asynchronous handler to abort at its next
/// checkpoint with `canceled` (§4.3). The synchronous guest path can never set this on its own
/// call since the guest is blocked; it exists for fan-out work scheduled by handlers.
pub type CancelFlag = Arc<AtomicBool>;

struct MethodSizes {
    params: usize,
    result: usize,
}

fn sizes_for(method: MethodId) -> MethodSizes {
    use std::mem::size_of as sz;
    let (params, result) = match method {
        MethodId::ArgsGet | MethodId::EnvironGet => (0, 0),
        MethodId::ArgsSizesGet | MethodId::EnvironSizesGet => (0, sz::<U32Result>() * 2),
        MethodId::ClockResGet => (sz::<ClockResGetParams>(), sz::<U64Result>()),
        MethodId::ClockTimeGet => (sz::<ClockTimeGetParams>(), sz::<U64Result>()),
        MethodId::FdAdvise => (sz::<FdOffsetLen>(), 0),
        MethodId::FdAllocate => (sz::<FdOffsetLen>(), 0),
        MethodId::FdClose => (sz::<FdOnly>(), 0),
        MethodId::FdDatasync => (sz::<FdOnly>(), 0),
        MethodId::FdFdstatGet => (sz::<FdOnly>(), sz::<FdFdstatResult>()),
        MethodId::FdFdstatSetFlags => (sz::<FdAndU32>(), 0),
        MethodId::FdFdstatSetRights => (sz::<FdRights>(), 0),
        MethodId::FdFilestatGet => (sz::<FdOnly>(), sz::<FileStatResult>()),
        MethodId::FdFilestatSetSize => (sz::<FdAndU64>(), 0),
        MethodId::FdFilestatSetTimes => (sz::<FdOffsetLen>(), 0),
        MethodId::FdPread => (sz::<FdOffsetLen>(), 0),
        MethodId::FdPrestatGet => (sz::<FdOnly>(), sz::<PrestatResult>()),
        MethodId::FdPrestatDirName => (sz::<FdAndU32>(), 0),
        MethodId::FdPwrite => (sz::<FdAndU64>(), sz::<U32Result>()),
        MethodId::FdRead => (sz::<FdAndU32>(), 0),
        MethodId::FdReaddir => (sz::<FdAndU32>(), 0),
        MethodId::FdRenumber => (sz::<FdRenumber>(), 0),
        MethodId::FdSeek => (sz::<FdSeek>(), sz::<U64Result>()),
        MethodId::FdSync => (sz::<FdOnly>(), 0),
        MethodId::FdTell => (sz::<FdOnly>(), sz::<U64Result>()),
        MethodId::FdWrite => (sz::<FdOnly>(), sz::<U32Result>()),
        MethodId::PathCreateDirectory => (sz::<DirFdOnly>(), 0),
        MethodId::PathFilestatGet => (sz::<DirFdOnly>(), sz::<FileStatResult>()),
        MethodId::PathFilestatSetTimes => (sz::<DirFdOnly>(), 0),
        MethodId::PathLink => (sz::<TwoDirFds>(), 0),
        MethodId::PathOpen => (sz::<PathOpenParams>(), sz::<PathOpenResult>()),
        MethodId::PathRemoveDirectory => (sz::<DirFdOnly>(), 0),
        MethodId::PathRename => (sz::<TwoDirFds>(), 0),
        MethodId::PathSymlink => (sz::<DirFdOnly>(), 0),
        MethodId::PathUnlinkFile => (sz::<DirFdOnly>(), 0),
        // path_readlink has no fixed result: the resolved target lands entirely in binary_out.
        MethodId::PathReadlink => (sz::<FdOnly>(), 0),
        MethodId::PollOneoff => (0, 0),
        MethodId::ProcExit => (sz::<ProcExitParams>(), 0),
        MethodId::SchedYield => (0, 0),
        MethodId::RandomGet => (sz::<RandomGetParams>(), 0),
        MethodId::ThreadSpawn => (sz::<ThreadSpawnParams>(), sz::<U32Result>()),
        MethodId::Noop => (0, 0),
    };
    MethodSizes { params, result }
}

/// Classifies whether a method carries a variable payload inbound (paths, write buffers),
/// outbound (read results, directory listings), both at once, or neither. Most calls in this wire
/// convention (§4.1) only need one direction — multi-path calls like `path_rename` NUL-join their
/// strings into one inbound blob — but `path_readlink` and `poll_oneoff` take a variable-length
/// input and must hand back a variable-length output in the same call, so they get their own
/// reserved `binary_out` area instead of writing over their own input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    None,
    In,
    Out,
    InOut,
}

fn direction_for(method: MethodId) -> Direction {
    use MethodId::*;
    match method {
        FdPwrite | FdWrite | PathCreateDirectory | PathFilestatGet | PathFilestatSetTimes | PathLink | PathOpen
        | PathRemoveDirectory | PathRename | PathSymlink | PathUnlinkFile => Direction::In,
        FdPread | FdPrestatDirName | FdRead | FdReaddir | RandomGet | ArgsGet | EnvironGet => Direction::Out,
        PollOneoff | PathReadlink => Direction::InOut,
        _ => Direction::None,
    }
}

/// One mounted or stdio driver, keyed by the id the FD table's `driver_id` points at.
pub struct DriverRegistry {
    drivers: HashMap<u32, Arc<dyn DeviceDriver>>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        DriverRegistry { drivers: HashMap::new() }
    }

    pub fn insert(&mut self, driver_id: u32, driver: Arc<dyn DeviceDriver>) {
        self.drivers.insert(driver_id, driver);
    }

    #[must_use]
    pub fn get(&self, driver_id: u32) -> Option<Arc<dyn DeviceDriver>> {
        self.drivers.get(&driver_id).cloned()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one call needs resolved: the dispatcher, FD table, drivers, process, clock, and
/// configured process options, bundled so `dispatch` can be called without threading them all
/// through by hand.
pub struct Dispatcher {
    pub fd_table: SharedFdTable,
    pub drivers: DriverRegistry,
    pub process: Arc<Process>,
    pub clock: Clock,
    pub options: ProcessOptions,
    pub counters: TraceCounters,
}

impl Dispatcher {
    #[must_use]
    pub fn new(fd_table: SharedFdTable, drivers: DriverRegistry, process: Arc<Process>, options: ProcessOptions) -> Self {
        Dispatcher {
            fd_table,
            drivers,
            process,
            clock: Clock::default(),
            options,
            counters: TraceCounters::default(),
        }
    }

    /// Processes one call region end-to-end (§4.3 steps 1-6), then stores `errno` and wakes the
    /// waiter via [`SharedRegion::complete`].
    pub async fn dispatch(&self, region: Arc<SharedRegion>, cancel: Option<CancelFlag>) {
        let (method_id_raw, total_len) = region.with_bytes(|bytes| {
            let method_id = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            (method_id, bytes.len())
        });

        let resolved = MethodId::try_from(method_id_raw).ok();
        let errno = match resolved {
            None => Errno::NoHandlerFound,
            Some(method) => {
                if cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Acquire)) {
                    Errno::Canceled
                } else {
                    self.handle(method, &region, total_len).await
                }
            }
        };

        trace_call(self.options.trace(), &self.counters, resolved.unwrap_or(MethodId::Noop), errno);
        region.complete(errno.code());
    }

    async fn handle(&self, method: MethodId, region: &Arc<SharedRegion>, total_len: usize) -> Errno {
        let sizes = sizes_for(method);
        let direction = direction_for(method);

        // Result slot always sits right after params; binary areas come after that (§3).
        let result_offset_after_params = crate::wire::layout::align4(Header::SIZE + sizes.params);
        let binary_start = crate::wire::layout::align4(result_offset_after_params + sizes.result);

        // `binary_in`'s region-relative byte count below still includes up to 3 bytes of trailing
        // alignment padding (the region's total size only rounds up to a 4-byte multiple); every
        // consumer unwraps the real payload through `framed_payload`, which reads the 4-byte
        // little-endian length the guest stub prefixes it with (guest.rs).
        let (binary_in_size, binary_out_size) = match direction {
            Direction::None => (0, 0),
            Direction::In => (total_len.saturating_sub(binary_start), 0),
            // Out-direction sizes are filled in per-method below, once params are parsed; start
            // with zero and let the handler branch recompute the layout if it needs to grow the
            // region (it never does here -- the guest pre-sizes `binary_out` from the same
            // length it passes in `params`).
            Direction::Out => (0, total_len.saturating_sub(binary_start)),
            // Both directions are reserved up front: the length prefix at `binary_start` tells us
            // exactly where `binary_in` ends, and everything past its 4-byte alignment is `binary_out`.
            Direction::InOut => {
                let framed_len = region.with_bytes(|bytes| {
                    if bytes.len() < binary_start + 4 {
                        0
                    } else {
                        u32::from_le_bytes(bytes[binary_start..binary_start + 4].try_into().unwrap()) as usize
                    }
                });
                let binary_in_size = 4 + framed_len;
                let binary_out_start = crate::wire::layout::align4(binary_start + binary_in_size);
                (binary_in_size, total_len.saturating_sub(binary_out_start))
            }
        };

        let layout = RegionLayout::compute(sizes.params, sizes.result, binary_in_size, binary_out_size);

        self.dispatch_method(method, region, layout).await
    }

    async fn dispatch_method(&self, method: MethodId, region: &Arc<SharedRegion>, layout: RegionLayout) -> Errno {
        match method {
            MethodId::Noop | MethodId::SchedYield => Errno::Success,

            MethodId::ArgsSizesGet => {
                let argc = self.options.args().len() as u32;
                let buf_size: u32 = self.options.args().iter().map(|a| a.len() as u32 + 1).sum();
                region.with_bytes(|bytes| {
                    let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                    writer.put(&U32Result { value: argc });
                    writer.put(&U32Result { value: buf_size });
                });
                Errno::Success
            }
            MethodId::ArgsGet => {
                let joined = join_nul(self.options.args());
                write_binary_out(region, &layout, &joined);
                Errno::Success
            }
            MethodId::EnvironSizesGet => {
                let count = self.options.env().len() as u32;
                let buf_size: u32 = self
                    .options
                    .env()
                    .iter()
                    .map(|(k, v)| (k.len() + 1 + v.len() + 1) as u32)
                    .sum();
                region.with_bytes(|bytes| {
                    let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                    writer.put(&U32Result { value: count });
                    writer.put(&U32Result { value: buf_size });
                });
                Errno::Success
            }
            MethodId::EnvironGet => {
                let pairs: Vec<String> = self.options.env().iter().map(|(k, v)| format!("{k}={v}")).collect();
                let joined = join_nul(&pairs);
                write_binary_out(region, &layout, &joined);
                Errno::Success
            }

            MethodId::ClockResGet => {
                region.with_bytes(|bytes| {
                    let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                    writer.put(&U64Result { value: self.clock.resolution_ns(ClockId::Monotonic) });
                });
                Errno::Success
            }
            MethodId::ClockTimeGet => {
                let params: ClockTimeGetParams = read_params(region, &layout);
                let clock_id = if params.clock_id == 0 { ClockId::Realtime } else { ClockId::Monotonic };
                let now = self.clock.now_ns(clock_id);
                region.with_bytes(|bytes| {
                    let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                    writer.put(&U64Result { value: now });
                });
                Errno::Success
            }

            MethodId::FdClose => {
                let params: FdOnly = read_params(region, &layout);
                self.close_fd(params.fd).await
            }
            MethodId::FdRenumber => {
                let params: FdRenumber = read_params(region, &layout);
                match self.fd_table.renumber(params.from, params.to) {
                    Ok(()) => Errno::Success,
                    Err(e) => e,
                }
            }
            MethodId::FdFdstatSetRights => {
                let params: FdRights = read_params(region, &layout);
                let new_base = Rights::from_bits_truncate(params.rights_base);
                let new_inheriting = Rights::from_bits_truncate(params.rights_inheriting);
                match self.fd_table.update(params.fd, |fd| {
                    fd.rights_base = new_base;
                    fd.rights_inheriting = new_inheriting;
                }) {
                    Ok(()) => Errno::Success,
                    Err(e) => e,
                }
            }
            MethodId::FdFdstatSetFlags => {
                let params: FdAndU32 = read_params(region, &layout);
                let flags = FdFlags::from_bits_truncate(params.value as u16);
                match self.fd_table.update(params.fd, |fd| fd.fdflags = flags) {
                    Ok(()) => Errno::Success,
                    Err(e) => e,
                }
            }
            MethodId::FdFdstatGet => {
                let params: FdOnly = read_params(region, &layout);
                match self.fd_table.get_checked(params.fd) {
                    Err(e) => e,
                    Ok(fd) => {
                        region.with_bytes(|bytes| {
                            let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                            writer.put(&FdFdstatResult {
                                filetype: filetype_code(fd.kind),
                                flags: fd.fdflags.bits(),
                                _pad: 0,
                                rights_base: fd.rights_base.bits(),
                                rights_inheriting: fd.rights_inheriting.bits(),
                            });
                        });
                        Errno::Success
                    }
                }
            }

            MethodId::FdFilestatGet => {
                let params: FdOnly = read_params(region, &layout);
                self.with_driver_fd(params.fd, Rights::FD_FILESTAT_GET, |driver, fd| {
                    Box::pin(async move {
                        match driver.fd_filestat_get(fd.inode_id).await {
                            Ok(stat) => Ok(FileStatResult {
                                filetype: filetype_code(stat.filetype),
                                _pad: [0; 7],
                                size: stat.size,
                                mtime_ms: stat.mtime_ms,
                                ctime_ms: stat.ctime_ms,
                            }),
                            Err(e) => Err(e),
                        }
                    })
                })
                .await
                .map_or_else(
                    |e| e,
                    |result| {
                        region.with_bytes(|bytes| {
                            let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                            writer.put(&result);
                        });
                        Errno::Success
                    },
                )
            }
            MethodId::FdFilestatSetSize => {
                let params: FdAndU64 = read_params(region, &layout);
                self.fd_driver_unit(params.fd, Rights::FD_FILESTAT_SET_SIZE, |driver, fd| {
                    Box::pin(async move { driver.fd_filestat_set_size(fd.inode_id, params.value).await })
                })
                .await
            }
            MethodId::FdFilestatSetTimes => Errno::NoSystem,
            MethodId::PathFilestatSetTimes => Errno::NoSystem,

            MethodId::FdPrestatGet => {
                let params: FdOnly = read_params(region, &layout);
                match self.fd_table.get_checked(params.fd) {
                    Err(e) => e,
                    Ok(fd) => match self.drivers.get(fd.driver_id).and_then(|d| d.fd_prestat_get()) {
                        None => Errno::BadFileDescriptor,
                        Some(name) => {
                            region.with_bytes(|bytes| {
                                let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                                writer.put(&PrestatResult { pr_type: 0, _pad: [0; 3], name_len: name.len() as u32 });
                            });
                            Errno::Success
                        }
                    },
                }
            }
            MethodId::FdPrestatDirName => {
                let params: FdAndU32 = read_params(region, &layout);
                match self.fd_table.get_checked(params.fd) {
                    Err(e) => e,
                    Ok(fd) => match self.drivers.get(fd.driver_id).and_then(|d| d.fd_prestat_dir_name()) {
                        None => Errno::BadFileDescriptor,
                        Some(name) => {
                            write_binary_out(region, &layout, name.as_bytes());
                            Errno::Success
                        }
                    },
                }
            }

            MethodId::FdRead => {
                let params: FdAndU32 = read_params(region, &layout);
                let cursor = self.fd_table.get(params.fd).map(|fd| fd.cursor.offset).unwrap_or(0);
                let outcome = self
                    .fd_driver_bytes(params.fd, Rights::FD_READ, |driver, fd| {
                        Box::pin(async move { driver.fd_read(fd.inode_id, cursor, params.value as usize).await })
                    })
                    .await;
                match outcome {
                    Err(e) => e,
                    Ok(data) => {
                        let len = data.len() as u64;
                        let _ = self.fd_table.update(params.fd, |fd| fd.cursor.offset += len);
                        write_binary_out(region, &layout, &data);
                        Errno::Success
                    }
                }
            }
            MethodId::FdPread => {
                let params: FdOffsetLen = read_params(region, &layout);
                let outcome = self
                    .fd_driver_bytes(params.fd, Rights::FD_READ, |driver, fd| {
                        Box::pin(async move { driver.fd_pread(fd.inode_id, params.offset, params.len as usize).await })
                    })
                    .await;
                match outcome {
                    Err(e) => e,
                    Ok(data) => {
                        write_binary_out(region, &layout, &data);
                        Errno::Success
                    }
                }
            }
            MethodId::FdWrite => {
                let params: FdOnly = read_params(region, &layout);
                let data = region.with_bytes(|bytes| framed_payload(bytes, &layout).to_vec());
                let (cursor, append) = self
                    .fd_table
                    .get(params.fd)
                    .map(|fd| (fd.cursor.offset, fd.fdflags.contains(FdFlags::APPEND)))
                    .unwrap_or((0, false));
                let outcome = self
                    .fd_driver_bytes_write(params.fd, &data, |driver, fd, data| {
                        Box::pin(async move { driver.fd_write(fd.inode_id, cursor, data, append).await })
                    })
                    .await;
                match outcome {
                    Err(e) => e,
                    Ok(written) => {
                        let _ = self.fd_table.update(params.fd, |fd| fd.cursor.offset += written as u64);
                        region.with_bytes(|bytes| {
                            let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                            writer.put(&U32Result { value: written as u32 });
                        });
                        Errno::Success
                    }
                }
            }
            MethodId::FdPwrite => {
                let params: FdAndU64 = read_params(region, &layout);
                let data = region.with_bytes(|bytes| framed_payload(bytes, &layout).to_vec());
                let outcome = self
                    .fd_driver_bytes_write(params.fd, &data, |driver, fd, data| {
                        Box::pin(async move { driver.fd_pwrite(fd.inode_id, params.value, data).await })
                    })
                    .await;
                match outcome {
                    Err(e) => e,
                    Ok(written) => {
                        region.with_bytes(|bytes| {
                            let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                            writer.put(&U32Result { value: written as u32 });
                        });
                        Errno::Success
                    }
                }
            }
            MethodId::FdSeek => {
                let params: FdSeek = read_params(region, &layout);
                let whence = match params.whence {
                    0 => Whence::Set,
                    1 => Whence::Cur,
                    _ => Whence::End,
                };
                let cursor = self.fd_table.get(params.fd).map(|fd| fd.cursor.offset).unwrap_or(0);
                let outcome = self
                    .fd_driver_u64(params.fd, Rights::FD_SEEK, |driver, fd| {
                        Box::pin(async move { driver.fd_seek(fd.inode_id, cursor, params.offset, whence).await })
                    })
                    .await;
                match outcome {
                    Err(e) => e,
                    Ok(new_pos) => {
                        let _ = self.fd_table.update(params.fd, |fd| fd.cursor.offset = new_pos);
                        region.with_bytes(|bytes| {
                            let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                            writer.put(&U64Result { value: new_pos });
                        });
                        Errno::Success
                    }
                }
            }
            MethodId::FdTell => {
                let params: FdOnly = read_params(region, &layout);
                match self.fd_table.get_checked(params.fd) {
                    Err(e) => e,
                    Ok(fd) => {
                        if !fd.rights_base.contains(Rights::FD_TELL) {
                            return Errno::NotCapable;
                        }
                        region.with_bytes(|bytes| {
                            let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                            writer.put(&U64Result { value: fd.cursor.offset });
                        });
                        Errno::Success
                    }
                }
            }
            MethodId::FdSync => {
                let params: FdOnly = read_params(region, &layout);
                self.fd_driver_unit(params.fd, Rights::FD_SYNC, |driver, fd| Box::pin(async move { driver.fd_sync(fd.inode_id).await }))
                    .await
            }
            MethodId::FdDatasync => {
                let params: FdOnly = read_params(region, &layout);
                self.fd_driver_unit(params.fd, Rights::FD_DATASYNC, |driver, fd| {
                    Box::pin(async move { driver.fd_datasync(fd.inode_id).await })
                })
                .await
            }
            MethodId::FdAllocate => {
                let params: FdOffsetLen = read_params(region, &layout);
                self.fd_driver_unit(params.fd, Rights::FD_ALLOCATE, |driver, fd| {
                    Box::pin(async move { driver.fd_allocate(fd.inode_id, params.offset, params.len).await })
                })
                .await
            }
            MethodId::FdAdvise => {
                let params: FdOffsetLen = read_params(region, &layout);
                self.fd_driver_unit(params.fd, Rights::FD_ADVISE, |driver, fd| {
                    Box::pin(async move { driver.fd_advise(fd.inode_id, params.offset, params.len, 0).await })
                })
                .await
            }

            MethodId::FdReaddir => {
                let params: FdAndU32 = read_params(region, &layout);
                let outcome = self
                    .fd_driver_entries(params.fd, Rights::FD_READDIR, |driver, fd| {
                        Box::pin(async move { driver.fd_readdir(fd.inode_id).await })
                    })
                    .await;
                match outcome {
                    Err(e) => e,
                    Ok(entries) => {
                        let joined = entries
                            .iter()
                            .map(|e| format!("{}:{}", e.name, filetype_code(e.filetype)))
                            .collect::<Vec<_>>()
                            .join("\n");
                        write_binary_out(region, &layout, joined.as_bytes());
                        Errno::Success
                    }
                }
            }

            MethodId::PathCreateDirectory => {
                let params: DirFdOnly = read_params(region, &layout);
                let path = read_path(region, &layout);
                self.path_driver_unit(params.dir_fd, Rights::PATH_CREATE_DIRECTORY, |driver, fd| {
                    Box::pin(async move { driver.path_create_directory(fd.inode_id, &path).await })
                })
                .await
            }
            MethodId::PathRemoveDirectory => {
                let params: DirFdOnly = read_params(region, &layout);
                let path = read_path(region, &layout);
                self.path_driver_unit(params.dir_fd, Rights::PATH_REMOVE_DIRECTORY, |driver, fd| {
                    Box::pin(async move { driver.path_remove_directory(fd.inode_id, &path).await })
                })
                .await
            }
            MethodId::PathUnlinkFile => {
                let params: DirFdOnly = read_params(region, &layout);
                let path = read_path(region, &layout);
                self.path_driver_unit(params.dir_fd, Rights::PATH_UNLINK_FILE, |driver, fd| {
                    Box::pin(async move { driver.path_unlink_file(fd.inode_id, &path).await })
                })
                .await
            }
            MethodId::PathFilestatGet => {
                let params: DirFdOnly = read_params(region, &layout);
                let path = read_path(region, &layout);
                let outcome = self
                    .path_driver_result(params.dir_fd, Rights::PATH_FILESTAT_GET, |driver, fd| {
                        Box::pin(async move { driver.path_filestat_get(fd.inode_id, &path).await })
                    })
                    .await;
                match outcome {
                    Err(e) => e,
                    Ok(stat) => {
                        region.with_bytes(|bytes| {
                            let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                            writer.put(&FileStatResult {
                                filetype: filetype_code(stat.filetype),
                                _pad: [0; 7],
                                size: stat.size,
                                mtime_ms: stat.mtime_ms,
                                ctime_ms: stat.ctime_ms,
                            });
                        });
                        Errno::Success
                    }
                }
            }
            MethodId::PathOpen => {
                let params: PathOpenParams = read_params(region, &layout);
                let path = read_path(region, &layout);
                let oflags = OpenFlags {
                    creat: params.oflags & OFLAG_CREAT != 0,
                    directory: params.oflags & OFLAG_DIRECTORY != 0,
                    excl: params.oflags & OFLAG_EXCL != 0,
                    trunc: params.oflags & OFLAG_TRUNC != 0,
                };
                let lookupflags = LookupFlags {
                    symlink_follow: params.lookupflags & LOOKUPFLAG_SYMLINK_FOLLOW != 0,
                };
                let dir_fd = match self.fd_table.get_checked(params.dir_fd) {
                    Ok(fd) => fd,
                    Err(e) => return e,
                };
                if !dir_fd.rights_base.contains(Rights::PATH_OPEN) {
                    return Errno::NotCapable;
                }
                let driver = match self.drivers.get(dir_fd.driver_id) {
                    Some(d) => d,
                    None => return Errno::BadFileDescriptor,
                };
                match driver.path_open(dir_fd.inode_id, &path, oflags, lookupflags).await {
                    Err(e) => e,
                    Ok(opened) => {
                        let kind = if opened.filetype == FileType::Directory { ChildKind::Directory } else { ChildKind::File };
                        let requested = Rights::from_bits_truncate(params.rights_base) | Rights::from_bits_truncate(params.rights_inheriting);
                        let (rights_base, rights_inheriting) = Rights::inherit(dir_fd.rights_inheriting, requested, kind);
                        let new_fd = FileDescriptor {
                            device_id: dir_fd.device_id,
                            kind: opened.filetype,
                            rights_base,
                            rights_inheriting,
                            fdflags: FdFlags::from_bits_truncate(params.fdflags),
                            inode_id: opened.inode_id,
                            cursor: Default::default(),
                            driver_id: dir_fd.driver_id,
                        };
                        let handle = self.fd_table.allocate(new_fd);
                        region.with_bytes(|bytes| {
                            let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                            writer.put(&PathOpenResult { fd: handle });
                        });
                        Errno::Success
                    }
                }
            }
            MethodId::PathRename => {
                let params: TwoDirFds = read_params(region, &layout);
                let blob = region.with_bytes(|bytes| framed_payload(bytes, &layout).to_vec());
                let text = String::from_utf8_lossy(&blob);
                let mut parts = text.splitn(2, '\0');
                let src_path = parts.next().unwrap_or_default().to_string();
                let dst_path = parts.next().unwrap_or_default().to_string();
                let src_dir = match self.fd_table.get_checked(params.src_dir_fd) {
                    Ok(fd) => fd,
                    Err(e) => return e,
                };
                let dst_dir = match self.fd_table.get_checked(params.dst_dir_fd) {
                    Ok(fd) => fd,
                    Err(e) => return e,
                };
                if !src_dir.rights_base.contains(Rights::PATH_RENAME_SOURCE) || !dst_dir.rights_base.contains(Rights::PATH_RENAME_TARGET) {
                    return Errno::NotCapable;
                }
                let driver = match self.drivers.get(src_dir.driver_id) {
                    Some(d) => d,
                    None => return Errno::BadFileDescriptor,
                };
                match driver.path_rename(src_dir.inode_id, &src_path, dst_dir.inode_id, &dst_path).await {
                    Ok(()) => Errno::Success,
                    Err(e) => e,
                }
            }
            MethodId::PathLink => {
                let params: TwoDirFds = read_params(region, &layout);
                let blob = region.with_bytes(|bytes| framed_payload(bytes, &layout).to_vec());
                let text = String::from_utf8_lossy(&blob);
                let mut parts = text.splitn(2, '\0');
                let src_path = parts.next().unwrap_or_default().to_string();
                let dst_path = parts.next().unwrap_or_default().to_string();
                let src_dir = match self.fd_table.get_checked(params.src_dir_fd) {
                    Ok(fd) => fd,
                    Err(e) => return e,
                };
                let dst_dir = match self.fd_table.get_checked(params.dst_dir_fd) {
                    Ok(fd) => fd,
                    Err(e) => return e,
                };
                if !src_dir.rights_base.contains(Rights::PATH_LINK_SOURCE) || !dst_dir.rights_base.contains(Rights::PATH_LINK_TARGET) {
                    return Errno::NotCapable;
                }
                let driver = match self.drivers.get(src_dir.driver_id) {
                    Some(d) => d,
                    None => return Errno::BadFileDescriptor,
                };
                match driver.path_link(src_dir.inode_id, &src_path, dst_dir.inode_id, &dst_path).await {
                    Ok(()) => Errno::Success,
                    Err(e) => e,
                }
            }
            MethodId::PathSymlink => {
                let params: DirFdOnly = read_params(region, &layout);
                let blob = region.with_bytes(|bytes| framed_payload(bytes, &layout).to_vec());
                let text = String::from_utf8_lossy(&blob);
                let mut parts = text.splitn(2, '\0');
                let target = parts.next().unwrap_or_default().to_string();
                let path = parts.next().unwrap_or_default().to_string();
                self.path_driver_unit(params.dir_fd, Rights::PATH_SYMLINK, |driver, fd| {
                    Box::pin(async move { driver.path_symlink(&target, fd.inode_id, &path).await })
                })
                .await
            }
            MethodId::PathReadlink => {
                let params: FdOnly = read_params(region, &layout);
                let path = read_path(region, &layout);
                let outcome = self
                    .path_driver_string(params.fd, Rights::PATH_READLINK, |driver, fd| {
                        Box::pin(async move { driver.path_readlink(fd.inode_id, &path).await })
                    })
                    .await;
                match outcome {
                    Err(e) => e,
                    Ok(target) => {
                        write_binary_out(region, &layout, target.as_bytes());
                        Errno::Success
                    }
                }
            }

            MethodId::PollOneoff => {
                let subscriptions = region.with_bytes(|bytes| parse_subscriptions(framed_payload(bytes, &layout)));
                let is_fd_ready = |fd: u32, readable: bool| self.fd_table.get(fd).is_some() && readable;
                // A subscription set made up entirely of clock deadlines has nothing else that
                // could ever make it ready, so it blocks until the earliest deadline elapses
                // instead of reporting "not ready yet" once and returning.
                let events = if !subscriptions.is_empty() && subscriptions.iter().all(|s| matches!(s, Subscription::ClockDeadline { .. })) {
                    poll_oneoff_blocking(&self.clock, &subscriptions, is_fd_ready, std::time::Duration::from_millis(1))
                } else {
                    poll_oneoff(&self.clock, &subscriptions, is_fd_ready)
                };
                let encoded = events
                    .iter()
                    .map(|e| match e {
                        PollEvent::Clock => "clock".to_string(),
                        PollEvent::FdReadable(fd) => format!("r{fd}"),
                        PollEvent::FdWritable(fd) => format!("w{fd}"),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                write_binary_out(region, &layout, encoded.as_bytes());
                Errno::Success
            }

            MethodId::ProcExit => {
                let params: ProcExitParams = read_params(region, &layout);
                self.process.proc_exit(params.rval);
                Errno::Success
            }

            MethodId::RandomGet => {
                let params: RandomGetParams = read_params(region, &layout);
                let bytes: Vec<u8> = (0..params.len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(7)).collect();
                write_binary_out(region, &layout, &bytes);
                Errno::Success
            }

            MethodId::ThreadSpawn => {
                let (tid, _shutdown) = self.process.spawn_thread();
                region.with_bytes(|bytes| {
                    let mut writer = ArgumentWriter::new(&mut bytes[layout.result_range()]);
                    writer.put(&U32Result { value: tid });
                });
                Errno::Success
            }
        }
    }

    async fn close_fd(&self, handle: u32) -> Errno {
        let fd = match self.fd_table.get(handle) {
            Some(fd) => fd,
            None => return Errno::BadFileDescriptor,
        };
        if let Some(driver) = self.drivers.get(fd.driver_id) {
            let _ = driver.fd_close(fd.inode_id).await;
        }
        match self.fd_table.remove(handle) {
            Ok(()) => Errno::Success,
            Err(e) => e,
        }
    }

    /// Resolves `handle` to its FD and driver, failing with `not_capable` (§4.3 step 3, §3) if
    /// `required` is absent from the FD's `rights_base`.
    async fn with_driver_fd<T, F>(&self, handle: u32, required: Rights, f: F) -> Result<T, Errno>
    where
        F: FnOnce(Arc<dyn DeviceDriver>, FileDescriptor) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, Errno>> + Send>>,
    {
        let fd = self.fd_table.get_checked(handle)?;
        if !fd.rights_base.contains(required) {
            return Err(Errno::NotCapable);
        }
        let driver = self.drivers.get(fd.driver_id).ok_or(Errno::BadFileDescriptor)?;
        f(driver, fd).await
    }

    async fn fd_driver_unit<F>(&self, handle: u32, required: Rights, f: F) -> Errno
    where
        F: FnOnce(Arc<dyn DeviceDriver>, FileDescriptor) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Errno>> + Send>>,
    {
        match self.with_driver_fd(handle, required, f).await {
            Ok(()) => Errno::Success,
            Err(e) => e,
        }
    }

    async fn fd_driver_u64<F>(&self, handle: u32, required: Rights, f: F) -> Result<u64, Errno>
    where
        F: FnOnce(Arc<dyn DeviceDriver>, FileDescriptor) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<u64, Errno>> + Send>>,
    {
        self.with_driver_fd(handle, required, f).await
    }

    async fn fd_driver_bytes<F>(&self, handle: u32, required: Rights, f: F) -> Result<Vec<u8>, Errno>
    where
        F: FnOnce(Arc<dyn DeviceDriver>, FileDescriptor) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<u8>, Errno>> + Send>>,
    {
        self.with_driver_fd(handle, required, f).await
    }

    async fn fd_driver_bytes_write<'a, F>(&self, handle: u32, data: &'a [u8], f: F) -> Result<usize, Errno>
    where
        F: FnOnce(Arc<dyn DeviceDriver>, FileDescriptor, &'a [u8]) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<usize, Errno>> + Send + 'a>>,
    {
        let fd = self.fd_table.get_checked(handle)?;
        if !fd.rights_base.contains(Rights::FD_WRITE) {
            return Err(Errno::NotCapable);
        }
        let driver = self.drivers.get(fd.driver_id).ok_or(Errno::BadFileDescriptor)?;
        f(driver, fd, data).await
    }

    async fn fd_driver_entries<F>(&self, handle: u32, required: Rights, f: F) -> Result<Vec<crate::driver::DirEntry>, Errno>
    where
        F: FnOnce(
            Arc<dyn DeviceDriver>,
            FileDescriptor,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<crate::driver::DirEntry>, Errno>> + Send>>,
    {
        self.with_driver_fd(handle, required, f).await
    }

    async fn path_driver_unit<F>(&self, dir_handle: u32, required: Rights, f: F) -> Errno
    where
        F: FnOnce(Arc<dyn DeviceDriver>, FileDescriptor) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Errno>> + Send>>,
    {
        match self.with_driver_fd(dir_handle, required, f).await {
            Ok(()) => Errno::Success,
            Err(e) => e,
        }
    }

    async fn path_driver_result<F>(&self, dir_handle: u32, required: Rights, f: F) -> Result<crate::driver::FileStat, Errno>
    where
        F: FnOnce(
            Arc<dyn DeviceDriver>,
            FileDescriptor,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<crate::driver::FileStat, Errno>> + Send>>,
    {
        self.with_driver_fd(dir_handle, required, f).await
    }

    async fn path_driver_string<F>(&self, dir_handle: u32, required: Rights, f: F) -> Result<String, Errno>
    where
        F: FnOnce(Arc<dyn DeviceDriver>, FileDescriptor) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, Errno>> + Send>>,
    {
        self.with_driver_fd(dir_handle, required, f).await
    }
}

fn read_params<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable + Copy>(
    region: &Arc<SharedRegion>,
    layout: &RegionLayout,
) -> T {
    region.with_bytes(|bytes| {
        let mut reader = ArgumentReader::new(&bytes[layout.params_range()]);
        *reader.fetch::<T>().expect("param region sized from the same signature table")
    })
}

fn read_path(region: &Arc<SharedRegion>, layout: &RegionLayout) -> String {
    region.with_bytes(|bytes| String::from_utf8_lossy(framed_payload(bytes, layout)).into_owned())
}

/// Strips the 4-byte little-endian length prefix `HostConnection::call` puts ahead of every
/// `binary_in` payload, returning just the real bytes. The region's own size only rounds up to a
/// multiple of 4, so the prefix is the only reliable way to know where padding starts.
fn framed_payload<'a>(bytes: &'a [u8], layout: &RegionLayout) -> &'a [u8] {
    let blob = &bytes[layout.binary_in_range()];
    if blob.len() < 4 {
        return &blob[0..0];
    }
    let len = (u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize).min(blob.len() - 4);
    &blob[4..4 + len]
}

fn write_binary_out(region: &Arc<SharedRegion>, layout: &RegionLayout, data: &[u8]) {
    region.with_bytes(|bytes| {
        let range = layout.binary_out_range();
        let end = range.start + data.len().min(range.end - range.start);
        bytes[range.start..end].copy_from_slice(&data[..end - range.start]);
    });
}

fn join_nul(items: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for item in items {
        out.extend_from_slice(item.as_bytes());
        out.push(0);
    }
    out
}

fn filetype_code(kind: FileType) -> u8 {
    match kind {
        FileType::File => 0,
        FileType::Directory => 1,
        FileType::CharacterDevice => 2,
        FileType::Pipe => 3,
        FileType::Socket => 4,
    }
}

fn parse_subscriptions(blob: &[u8]) -> Vec<Subscription> {
    // One subscription per 9-byte record: 1-byte tag, 8-byte value (deadline_ns or fd as u64).
    blob.chunks_exact(9)
        .map(|chunk| {
            let value = u64::from_le_bytes(chunk[1..9].try_into().unwrap());
            match chunk[0] {
                0 => Subscription::ClockDeadline { deadline_ns: value },
                1 => Subscription::FdReadable { fd: value as u32 },
                _ => Subscription::FdWritable { fd: value as u32 },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessOptions;
    use crate::driver::DirEntry;
    use parking_lot::Mutex as PMutex;
    use zerocopy::IntoBytes;

    /// An in-memory single-file driver used only to exercise the dispatcher's read/write/seek
    /// paths without pulling in the full filesystem driver.
    struct MemoryFileDriver {
        device_id: u32,
        content: PMutex<Vec<u8>>,
    }

    #[async_trait::async_trait]
    impl DeviceDriver for MemoryFileDriver {
        fn device_id(&self) -> u32 {
            self.device_id
        }

        async fn fd_read(&self, _inode_id: u64, cursor: u64, len: usize) -> Result<Vec<u8>, Errno> {
            let content = self.content.lock();
            let start = (cursor as usize).min(content.len());
            let end = (start + len).min(content.len());
            Ok(content[start..end].to_vec())
        }

        async fn fd_write(&self, _inode_id: u64, cursor: u64, data: &[u8], append: bool) -> Result<usize, Errno> {
            let mut content = self.content.lock();
            let start = if append { content.len() } else { (cursor as usize).min(content.len()) };
            if start + data.len() > content.len() {
                content.resize(start + data.len(), 0);
            }
            content[start..start + data.len()].copy_from_slice(data);
            Ok(data.len())
        }

        async fn fd_readdir(&self, _dir_inode_id: u64) -> Result<Vec<DirEntry>, Errno> {
            Ok(Vec::new())
        }

        async fn path_readlink(&self, _dir_inode_id: u64, _path: &str) -> Result<String, Errno> {
            Ok("target.txt".to_string())
        }
    }

    fn dispatcher_with_memory_fd(initial: &[u8]) -> (Dispatcher, u32) {
        dispatcher_with_memory_fd_rights(initial, Rights::FD_READ | Rights::FD_WRITE | Rights::FD_SEEK | Rights::PATH_READLINK)
    }

    fn dispatcher_with_memory_fd_rights(initial: &[u8], rights_base: Rights) -> (Dispatcher, u32) {
        let fd_table = Arc::new(crate::fd_table::FdTable::new(|_| {}));
        let mut drivers = DriverRegistry::new();
        drivers.insert(0, Arc::new(MemoryFileDriver { device_id: 0, content: PMutex::new(initial.to_vec()) }));
        let handle = fd_table.allocate(FileDescriptor {
            device_id: 0,
            kind: FileType::File,
            rights_base,
            rights_inheriting: Rights::empty(),
            fdflags: FdFlags::empty(),
            inode_id: 1,
            cursor: Default::default(),
            driver_id: 0,
        });
        let (process, _exit_rx) = Process::new(Arc::clone(&fd_table));
        let mut options = ProcessOptions::new();
        options.set_args(vec!["program".into(), "arg1".into()]).unwrap();
        let dispatcher = Dispatcher::new(fd_table, drivers, process, options);
        (dispatcher, handle)
    }

    /// Mirrors `HostConnection::call`'s framing: a non-empty `binary_in` gets a 4-byte
    /// little-endian length prefix ahead of its real bytes.
    fn call_region(method: MethodId, params: &[u8], binary_in: &[u8], result_size: usize, binary_out_size: usize) -> Arc<SharedRegion> {
        let framed_len = if binary_in.is_empty() { 0 } else { 4 + binary_in.len() };
        let layout = RegionLayout::compute(params.len(), result_size, framed_len, binary_out_size);
        let region = SharedRegion::new(method.into(), layout);
        region.with_bytes(|bytes| {
            bytes[layout.params_range()].copy_from_slice(params);
            if !binary_in.is_empty() {
                let mut writer = ArgumentWriter::new(&mut bytes[layout.binary_in_range()]);
                writer.put(&(binary_in.len() as u32));
                writer.put_bytes(binary_in);
            }
        });
        region
    }

    #[tokio::test]
    async fn fd_write_then_fd_read_round_trips_through_the_driver() {
        let (dispatcher, handle) = dispatcher_with_memory_fd(b"");
        let write_params = FdOnly { fd: handle };
        let write_region = call_region(MethodId::FdWrite, write_params.as_bytes(), b"hello", std::mem::size_of::<U32Result>(), 0);
        dispatcher.dispatch(Arc::clone(&write_region), None).await;
        assert_eq!(write_region.errno(), Errno::Success.code());

        let read_params = FdAndU32 { fd: handle, value: 5 };
        let read_region = call_region(MethodId::FdRead, read_params.as_bytes(), &[], 0, 5);
        dispatcher.dispatch(Arc::clone(&read_region), None).await;
        assert_eq!(read_region.errno(), Errno::Success.code());
        let layout = RegionLayout::compute(std::mem::size_of::<FdAndU32>(), 0, 0, 5);
        let out = read_region.with_bytes(|bytes| bytes[layout.binary_out_range()].to_vec());
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn unknown_method_id_reports_no_handler_found() {
        let (dispatcher, _handle) = dispatcher_with_memory_fd(b"");
        let layout = RegionLayout::compute(0, 0, 0, 0);
        let region = SharedRegion::new(9_999, layout);
        dispatcher.dispatch(Arc::clone(&region), None).await;
        assert_eq!(region.errno(), Errno::NoHandlerFound.code());
    }

    #[tokio::test]
    async fn cancel_flag_short_circuits_a_pending_call() {
        let (dispatcher, handle) = dispatcher_with_memory_fd(b"data");
        let params = FdAndU32 { fd: handle, value: 4 };
        let region = call_region(MethodId::FdRead, params.as_bytes(), &[], 0, 4);
        let cancel: CancelFlag = Arc::new(AtomicBool::new(true));
        dispatcher.dispatch(Arc::clone(&region), Some(cancel)).await;
        assert_eq!(region.errno(), Errno::Canceled.code());
    }

    #[tokio::test]
    async fn path_readlink_writes_the_resolved_target_into_binary_out() {
        let (dispatcher, handle) = dispatcher_with_memory_fd(b"");
        let params = FdOnly { fd: handle };
        let region = call_region(MethodId::PathReadlink, params.as_bytes(), b"link.txt", 0, 16);
        dispatcher.dispatch(Arc::clone(&region), None).await;
        assert_eq!(region.errno(), Errno::Success.code());
        let layout = RegionLayout::compute(std::mem::size_of::<FdOnly>(), 0, 4 + 8, 16);
        let out = region.with_bytes(|bytes| bytes[layout.binary_out_range()].to_vec());
        assert_eq!(&out[..10], b"target.txt");
    }

    #[tokio::test]
    async fn path_readlink_without_the_right_fails_with_not_capable() {
        let (dispatcher, handle) = dispatcher_with_memory_fd_rights(b"", Rights::FD_READ);
        let params = FdOnly { fd: handle };
        let region = call_region(MethodId::PathReadlink, params.as_bytes(), b"link.txt", 0, 16);
        dispatcher.dispatch(Arc::clone(&region), None).await;
        assert_eq!(region.errno(), Errno::NotCapable.code());
    }

    #[tokio::test]
    async fn fd_read_without_the_right_fails_with_not_capable() {
        let (dispatcher, handle) = dispatcher_with_memory_fd_rights(b"data", Rights::FD_WRITE);
        let params = FdAndU32 { fd: handle, value: 4 };
        let region = call_region(MethodId::FdRead, params.as_bytes(), &[], 0, 4);
        dispatcher.dispatch(Arc::clone(&region), None).await;
        assert_eq!(region.errno(), Errno::NotCapable.code());
    }

    #[tokio::test]
    async fn poll_oneoff_reports_an_already_ready_fd() {
        let (dispatcher, handle) = dispatcher_with_memory_fd(b"");
        let sub = [1u8]
            .iter()
            .chain((handle as u64).to_le_bytes().iter())
            .copied()
            .collect::<Vec<u8>>();
        let region = call_region(MethodId::PollOneoff, &[], &sub, 0, 16);
        dispatcher.dispatch(Arc::clone(&region), None).await;
        assert_eq!(region.errno(), Errno::Success.code());
        let layout = RegionLayout::compute(0, 0, 4 + sub.len(), 16);
        let out = region.with_bytes(|bytes| bytes[layout.binary_out_range()].to_vec());
        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with(&format!("r{handle}")));
    }

    #[tokio::test]
    async fn args_get_reports_the_configured_argv() {
        let (dispatcher, _handle) = dispatcher_with_memory_fd(b"");
        let region = call_region(MethodId::ArgsGet, &[], &[], 0, 32);
        dispatcher.dispatch(Arc::clone(&region), None).await;
        assert_eq!(region.errno(), Errno::Success.code());
        let layout = RegionLayout::compute(0, 0, 0, 32);
        let out = region.with_bytes(|bytes| bytes[layout.binary_out_range()].to_vec());
        let nul = out.iter().position(|&b| b == 0).unwrap();
        assert_eq!(&out[..nul], b"program");
    }
}
