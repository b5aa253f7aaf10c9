//! Fixed-size parameter and result structs for each WASI call signature (§4.1).
//!
//! Variable-length data (paths, write buffers, directory listings, random bytes, ...) always
//! travels in the binary in/out payload areas instead of here; every struct below is exactly the
//! scalar part of a call's signature, laid out the way the guest stub and dispatcher agree on.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

macro_rules! wire_struct {
    ($name:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        #[repr(C)]
        #[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
        pub struct $name {
            $(pub $field: $ty),*
        }
    };
}

wire_struct!(FdOnly { fd: u32 });
wire_struct!(FdAndU32 { fd: u32, value: u32 });
wire_struct!(FdAndU64 { fd: u32, value: u64 });
wire_struct!(FdOffsetLen { fd: u32, offset: u64, len: u64 });
wire_struct!(FdSeek { fd: u32, offset: i64, whence: u8, _pad: [u8; 7] });
wire_struct!(FdRenumber { from: u32, to: u32 });
wire_struct!(FdRights { fd: u32, rights_base: u64, rights_inheriting: u64 });
wire_struct!(ClockTimeGetParams { clock_id: u32, precision: u64 });
wire_struct!(ClockResGetParams { clock_id: u32 });
wire_struct!(ProcExitParams { rval: i32 });
wire_struct!(RandomGetParams { len: u32 });
wire_struct!(ThreadSpawnParams { start_arg: u64 });

wire_struct!(U64Result { value: u64 });
wire_struct!(U32Result { value: u32 });
wire_struct!(I64Result { value: i64 });

wire_struct!(FdFdstatResult { filetype: u8, flags: u16, _pad: u8, rights_base: u64, rights_inheriting: u64 });
wire_struct!(FileStatResult { filetype: u8, _pad: [u8; 7], size: u64, mtime_ms: u64, ctime_ms: u64 });
wire_struct!(PrestatResult { pr_type: u8, _pad: [u8; 3], name_len: u32 });

/// `path_open`'s scalar part: the directory FD, rights, fdflags, and the open flag bits; the path
/// itself rides in `binary_in` as UTF-8 (no NUL terminator needed, since its length is implied by
/// the region's binary-in section size).
wire_struct!(PathOpenParams {
    dir_fd: u32,
    oflags: u8,
    lookupflags: u8,
    _pad: u16,
    fdflags: u16,
    _pad2: u16,
    rights_base: u64,
    rights_inheriting: u64,
});
wire_struct!(PathOpenResult { fd: u32 });

pub const OFLAG_CREAT: u8 = 1 << 0;
pub const OFLAG_DIRECTORY: u8 = 1 << 1;
pub const OFLAG_EXCL: u8 = 1 << 2;
pub const OFLAG_TRUNC: u8 = 1 << 3;

pub const LOOKUPFLAG_SYMLINK_FOLLOW: u8 = 1 << 0;

wire_struct!(DirFdOnly { dir_fd: u32 });
wire_struct!(TwoDirFds { src_dir_fd: u32, dst_dir_fd: u32 });
