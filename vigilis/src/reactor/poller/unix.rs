//! Unix platform layer.
//!
//! Thin, `io::Result`-returning wrappers over the libc calls used by the
//! poller backends and by streams. Every descriptor created here is
//! non-blocking and close-on-exec.

use libc::{
    AF_INET, AF_INET6, EINPROGRESS, EPERM, F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC,
    O_APPEND, O_CLOEXEC, O_CREAT, O_NONBLOCK, O_RDONLY, O_RDWR, O_TRUNC, O_WRONLY, SO_ERROR,
    SO_REUSEADDR, SOCK_DGRAM, SOCK_STREAM, SOL_SOCKET, accept, bind, c_int, close, connect, fcntl,
    getsockname, getsockopt, listen, open, pipe, read, setsockopt, sockaddr, sockaddr_in,
    sockaddr_in6, sockaddr_storage, socket, socklen_t, write,
};
use std::ffi::CString;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::{io, mem};

pub use std::os::fd::RawFd;

/// Flags for opening a file read-only.
pub(crate) const READ_FLAGS: c_int = O_RDONLY;

/// Flags for opening (and truncating) a file write-only.
pub(crate) const WRITE_FLAGS: c_int = O_WRONLY | O_CREAT | O_TRUNC;

/// Flags for opening a file for both directions.
pub(crate) const READ_WRITE_FLAGS: c_int = O_RDWR;

/// Flags for creating a file, truncating any previous content.
pub(crate) const CREATE_FLAGS: c_int = O_RDWR | O_CREAT | O_TRUNC;

/// Flags for appending to a file, creating it if needed.
pub(crate) const APPEND_FLAGS: c_int = O_WRONLY | O_CREAT | O_APPEND;

/// Whether `fd` can name an open descriptor at all.
pub(crate) fn is_valid_fd(fd: RawFd) -> bool {
    fd >= 0
}

/// Whether a registration failure means the descriptor is always ready.
///
/// `epoll` refuses regular files with `EPERM`; such descriptors never
/// block and are treated as permanently ready by the poller.
pub(crate) fn is_unpollable(err: &io::Error) -> bool {
    err.raw_os_error() == Some(EPERM)
}

fn cvt(rc: c_int) -> io::Result<c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

/// Reads from a non-blocking descriptor.
pub(crate) fn sys_read(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Writes to a non-blocking descriptor.
pub(crate) fn sys_write(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    let n = unsafe { write(fd, buffer.as_ptr() as *const _, buffer.len()) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Closes a descriptor.
pub(crate) fn sys_close(fd: RawFd) -> io::Result<()> {
    cvt(unsafe { close(fd) }).map(|_| ())
}

/// Opens a file with `open(2)` in non-blocking mode.
pub(crate) fn sys_open(path: &Path, flags: c_int) -> io::Result<RawFd> {
    let path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a nul byte"))?;

    cvt(unsafe { open(path.as_ptr(), flags | O_NONBLOCK | O_CLOEXEC, 0o644) })
}

/// Sets a descriptor to non-blocking, close-on-exec mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = cvt(unsafe { fcntl(fd, F_GETFL) })?;
    cvt(unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) })?;

    let flags = cvt(unsafe { fcntl(fd, F_GETFD) })?;
    cvt(unsafe { fcntl(fd, F_SETFD, flags | FD_CLOEXEC) })?;

    Ok(())
}

fn new_socket(ty: c_int) -> io::Result<RawFd> {
    let fd = cvt(unsafe { socket(AF_INET, ty, 0) })?;

    if let Err(e) = sys_set_nonblocking(fd) {
        unsafe { close(fd) };
        return Err(e);
    }

    Ok(fd)
}

/// Creates a non-blocking IPv4 stream socket.
pub(crate) fn sys_tcp_socket() -> io::Result<RawFd> {
    new_socket(SOCK_STREAM)
}

/// Creates a non-blocking IPv4 datagram socket.
pub(crate) fn sys_udp_socket() -> io::Result<RawFd> {
    new_socket(SOCK_DGRAM)
}

/// Creates a pipe; returns `(read end, write end)`, both non-blocking.
pub(crate) fn sys_pipe() -> io::Result<(RawFd, RawFd)> {
    let mut fds = [0 as c_int; 2];
    cvt(unsafe { pipe(fds.as_mut_ptr()) })?;

    for fd in fds {
        if let Err(e) = sys_set_nonblocking(fd) {
            unsafe {
                close(fds[0]);
                close(fds[1]);
            }
            return Err(e);
        }
    }

    Ok((fds[0], fds[1]))
}

/// Binds a socket to an address.
pub(crate) fn sys_bind(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);
    cvt(unsafe { bind(fd, &storage as *const _ as *const sockaddr, len) }).map(|_| ())
}

/// Marks a socket as a listening socket.
pub(crate) fn sys_listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    cvt(unsafe { listen(fd, backlog) }).map(|_| ())
}

/// Accepts a pending connection.
///
/// The returned client socket is already non-blocking.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let client = cvt(unsafe { accept(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;

    if let Err(e) = sys_set_nonblocking(client) {
        unsafe { close(client) };
        return Err(e);
    }

    match sockaddr_storage_to_socketaddr(&storage) {
        Ok(addr) => Ok((client, addr)),
        Err(e) => {
            unsafe { close(client) };
            Err(e)
        }
    }
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    cvt(unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;
    sockaddr_storage_to_socketaddr(&storage)
}

/// Starts a non-blocking connect.
///
/// Returns `Ok(true)` when the connection completed immediately and
/// `Ok(false)` when it is in progress and completion will be signalled
/// by write readiness.
pub(crate) fn sys_connect(fd: RawFd, addr: &SocketAddr) -> io::Result<bool> {
    let (storage, len) = socketaddr_to_storage(addr);

    let rc = unsafe { connect(fd, &storage as *const _ as *const sockaddr, len) };
    if rc == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(EINPROGRESS) {
        Ok(false)
    } else {
        Err(err)
    }
}

/// Retrieves and clears the pending socket error (`SO_ERROR`).
pub(crate) fn sys_get_socket_error(fd: RawFd) -> io::Result<()> {
    let mut err: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    cvt(unsafe {
        getsockopt(
            fd,
            SOL_SOCKET,
            SO_ERROR,
            &mut err as *mut _ as *mut _,
            &mut len,
        )
    })?;

    if err != 0 {
        Err(io::Error::from_raw_os_error(err))
    } else {
        Ok(())
    }
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd) -> io::Result<()> {
    let yes: c_int = 1;
    cvt(unsafe {
        setsockopt(
            fd,
            SOL_SOCKET,
            SO_REUSEADDR,
            &yes as *const _ as *const _,
            mem::size_of::<c_int>() as socklen_t,
        )
    })
    .map(|_| ())
}

/// Converts a `sockaddr_storage` to a Rust `SocketAddr`.
fn sockaddr_storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }

        AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);

            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}

/// Converts a `SocketAddr` to a `sockaddr_storage`.
fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sa.sin_family = AF_INET as _;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }

        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sa.sin6_family = AF_INET6 as _;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            sa.sin6_flowinfo = v6.flowinfo();
            sa.sin6_scope_id = v6.scope_id();

            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}
