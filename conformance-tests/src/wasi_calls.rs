//! Thin typed wrappers over [`HostConnection::call`] for the handful of WASI operations the
//! property and scenario tests drive. A real guest exercises these through generated bindings;
//! tests build the same wire calls by hand so the codec and dispatcher are exercised end to end.

use std::time::Duration;

use wasi_shm_host::errno::Errno;
use wasi_shm_host::guest::{HostConnection, TransferPlan};
use wasi_shm_host::wire::params::*;
use wasi_shm_host::wire::MethodId;
use zerocopy::IntoBytes;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a call split into its fixed-size result and variable-length binary payload, the
/// same split the dispatcher itself writes into `result_range()`/`binary_out_range()`.
struct Reply {
    result: Vec<u8>,
    binary_out: Vec<u8>,
}

fn call<P>(
    conn: &HostConnection<P>,
    method: MethodId,
    params: &[u8],
    result_len: usize,
    transfers: &TransferPlan,
) -> Result<Reply, Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let outcome = conn.call(method.into(), params, result_len, transfers, Some(TIMEOUT));
    if outcome.errno.is_success() {
        Ok(Reply { result: outcome.result, binary_out: outcome.binary_out })
    } else {
        Err(outcome.errno)
    }
}

pub fn path_open<P>(
    conn: &HostConnection<P>,
    dir_fd: u32,
    path: &str,
    oflags: u8,
    lookupflags: u8,
    rights_base: u64,
    rights_inheriting: u64,
    fdflags: u16,
) -> Result<u32, Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let params = PathOpenParams { dir_fd, oflags, lookupflags, _pad: 0, fdflags, _pad2: 0, rights_base, rights_inheriting };
    let transfers = TransferPlan { binary_in: path.as_bytes().to_vec(), binary_out_len: 0 };
    let reply = call(conn, MethodId::PathOpen, params.as_bytes(), std::mem::size_of::<PathOpenResult>(), &transfers)?;
    Ok(read::<PathOpenResult>(&reply.result).fd)
}

pub fn fd_write<P>(conn: &HostConnection<P>, fd: u32, data: &[u8]) -> Result<u32, Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let params = FdOnly { fd };
    let transfers = TransferPlan { binary_in: data.to_vec(), binary_out_len: 0 };
    let reply = call(conn, MethodId::FdWrite, params.as_bytes(), std::mem::size_of::<U32Result>(), &transfers)?;
    Ok(read::<U32Result>(&reply.result).value)
}

pub fn fd_read<P>(conn: &HostConnection<P>, fd: u32, len: u32) -> Result<Vec<u8>, Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    // fd_read carries no fixed result struct: the driver's bytes land directly in binary_out,
    // zero-padded out to `len` on a short read (see `write_binary_out`).
    let params = FdAndU32 { fd, value: len };
    let transfers = TransferPlan { binary_in: Vec::new(), binary_out_len: len as usize };
    let reply = call(conn, MethodId::FdRead, params.as_bytes(), 0, &transfers)?;
    Ok(reply.binary_out)
}

pub fn fd_readdir<P>(conn: &HostConnection<P>, fd: u32, buf_len: usize) -> Result<Vec<(String, u8)>, Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let params = FdAndU32 { fd, value: buf_len as u32 };
    let transfers = TransferPlan { binary_in: Vec::new(), binary_out_len: buf_len };
    let reply = call(conn, MethodId::FdReaddir, params.as_bytes(), 0, &transfers)?;
    let text = String::from_utf8_lossy(&reply.binary_out);
    Ok(text
        .trim_end_matches('\0')
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (name, code) = line.rsplit_once(':')?;
            Some((name.to_string(), code.parse().ok()?))
        })
        .collect())
}

pub fn fd_close<P>(conn: &HostConnection<P>, fd: u32) -> Result<(), Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let params = FdOnly { fd };
    call(conn, MethodId::FdClose, params.as_bytes(), 0, &TransferPlan::default()).map(|_| ())
}

pub fn fd_renumber<P>(conn: &HostConnection<P>, from: u32, to: u32) -> Result<(), Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let params = FdRenumber { from, to };
    call(conn, MethodId::FdRenumber, params.as_bytes(), 0, &TransferPlan::default()).map(|_| ())
}

pub fn fd_fdstat_get<P>(conn: &HostConnection<P>, fd: u32) -> Result<FdFdstatResult, Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let params = FdOnly { fd };
    let reply = call(conn, MethodId::FdFdstatGet, params.as_bytes(), std::mem::size_of::<FdFdstatResult>(), &TransferPlan::default())?;
    Ok(*read::<FdFdstatResult>(&reply.result))
}

pub fn fd_tell<P>(conn: &HostConnection<P>, fd: u32) -> Result<u64, Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let params = FdOnly { fd };
    let reply = call(conn, MethodId::FdTell, params.as_bytes(), std::mem::size_of::<U64Result>(), &TransferPlan::default())?;
    Ok(read::<U64Result>(&reply.result).value)
}

pub fn path_create_directory<P>(conn: &HostConnection<P>, dir_fd: u32, path: &str) -> Result<(), Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let params = DirFdOnly { dir_fd };
    let transfers = TransferPlan { binary_in: path.as_bytes().to_vec(), binary_out_len: 0 };
    call(conn, MethodId::PathCreateDirectory, params.as_bytes(), 0, &transfers).map(|_| ())
}

pub fn path_remove_directory<P>(conn: &HostConnection<P>, dir_fd: u32, path: &str) -> Result<(), Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let params = DirFdOnly { dir_fd };
    let transfers = TransferPlan { binary_in: path.as_bytes().to_vec(), binary_out_len: 0 };
    call(conn, MethodId::PathRemoveDirectory, params.as_bytes(), 0, &transfers).map(|_| ())
}

pub fn path_filestat_get<P>(conn: &HostConnection<P>, dir_fd: u32, path: &str) -> Result<FileStatResult, Errno>
where
    P: Fn(std::sync::Arc<wasi_shm_host::shared_region::SharedRegion>) + Send + Sync,
{
    let params = DirFdOnly { dir_fd };
    let transfers = TransferPlan { binary_in: path.as_bytes().to_vec(), binary_out_len: 0 };
    let reply = call(conn, MethodId::PathFilestatGet, params.as_bytes(), std::mem::size_of::<FileStatResult>(), &transfers)?;
    Ok(*read::<FileStatResult>(&reply.result))
}

fn read<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable + Copy>(bytes: &[u8]) -> &T {
    zerocopy::Ref::<_, T>::from_bytes(bytes).expect("result sized from the same signature table").into_ref()
}
