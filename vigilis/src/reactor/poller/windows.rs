//! Windows platform layer.
//!
//! Mirrors the Unix layer for the subset that Windows supports: WinSock
//! sockets only. Files and pipes are not pollable through `WSAPoll` and
//! are not offered on this platform.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::OnceLock;

use windows_sys::Win32::Networking::WinSock::{
    AF_INET, AF_INET6, FIONBIO, INVALID_SOCKET, SO_ERROR, SO_REUSEADDR, SOCK_DGRAM, SOCK_STREAM,
    SOCKADDR, SOCKADDR_IN, SOCKADDR_IN6, SOCKADDR_STORAGE, SOCKET, SOCKET_ERROR, SOL_SOCKET,
    WSADATA, WSAEWOULDBLOCK, WSAStartup, accept, bind, closesocket, connect, getsockname,
    getsockopt, ioctlsocket, listen, recv, send, setsockopt, socket,
};

/// Raw descriptor type on Windows: a WinSock `SOCKET`.
pub use std::os::windows::io::RawSocket as RawFd;

/// Creates a MAKEWORD value for the Winsock version.
#[inline]
const fn makeword(low: u8, high: u8) -> u16 {
    ((high as u16) << 8) | (low as u16)
}

/// Result of the one-time `WSAStartup` call.
static WINSOCK_INIT: OnceLock<i32> = OnceLock::new();

/// Initializes Winsock once per process.
pub(crate) fn ensure_winsock() -> io::Result<()> {
    let rc = *WINSOCK_INIT.get_or_init(|| unsafe {
        let mut data: WSADATA = mem::zeroed();
        WSAStartup(makeword(2, 2), &mut data as *mut _)
    });

    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(rc))
    }
}

/// Whether `fd` can name an open socket at all.
pub(crate) fn is_valid_fd(fd: RawFd) -> bool {
    fd != INVALID_SOCKET as RawFd
}

/// `WSAPoll` accepts every socket; nothing is ever refused as always-ready.
pub(crate) fn is_unpollable(_err: &io::Error) -> bool {
    false
}

/// Receives from a non-blocking socket.
pub(crate) fn sys_read(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let rc = unsafe { recv(fd as SOCKET, buffer.as_mut_ptr(), buffer.len() as i32, 0) };
    if rc == SOCKET_ERROR {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Sends on a non-blocking socket.
pub(crate) fn sys_write(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    let rc = unsafe { send(fd as SOCKET, buffer.as_ptr(), buffer.len() as i32, 0) };
    if rc == SOCKET_ERROR {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Closes a socket.
pub(crate) fn sys_close(fd: RawFd) -> io::Result<()> {
    if unsafe { closesocket(fd as SOCKET) } != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Sets a socket to non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let mut nonblocking: u32 = 1;
    if unsafe { ioctlsocket(fd as SOCKET, FIONBIO, &mut nonblocking) } != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn new_socket(ty: i32) -> io::Result<RawFd> {
    ensure_winsock()?;

    let fd = unsafe { socket(AF_INET as i32, ty, 0) };
    if fd == INVALID_SOCKET {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = sys_set_nonblocking(fd as RawFd) {
        unsafe { closesocket(fd) };
        return Err(e);
    }

    Ok(fd as RawFd)
}

/// Creates a non-blocking IPv4 stream socket.
pub(crate) fn sys_tcp_socket() -> io::Result<RawFd> {
    new_socket(SOCK_STREAM)
}

/// Creates a non-blocking IPv4 datagram socket.
pub(crate) fn sys_udp_socket() -> io::Result<RawFd> {
    new_socket(SOCK_DGRAM)
}

/// Binds a socket to an address.
pub(crate) fn sys_bind(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);
    if unsafe { bind(fd as SOCKET, &storage as *const _ as *const SOCKADDR, len) } != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Puts a socket into listening mode.
pub(crate) fn sys_listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    if unsafe { listen(fd as SOCKET, backlog) } != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Accepts a pending connection; the client socket is already non-blocking.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut storage: SOCKADDR_STORAGE = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<SOCKADDR_STORAGE>() as i32;

    let client = unsafe {
        accept(
            fd as SOCKET,
            &mut storage as *mut _ as *mut SOCKADDR,
            &mut len,
        )
    };
    if client == INVALID_SOCKET {
        return Err(io::Error::last_os_error());
    }

    let addr = sys_set_nonblocking(client as RawFd)
        .and_then(|()| sockaddr_storage_to_socketaddr(&storage));

    match addr {
        Ok(addr) => Ok((client as RawFd, addr)),
        Err(e) => {
            unsafe { closesocket(client) };
            Err(e)
        }
    }
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: SOCKADDR_STORAGE = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<SOCKADDR_STORAGE>() as i32;

    if unsafe {
        getsockname(
            fd as SOCKET,
            &mut storage as *mut _ as *mut SOCKADDR,
            &mut len,
        )
    } != 0
    {
        Err(io::Error::last_os_error())
    } else {
        sockaddr_storage_to_socketaddr(&storage)
    }
}

/// Starts a non-blocking connect.
///
/// Returns `Ok(true)` when connected immediately, `Ok(false)` while in progress.
pub(crate) fn sys_connect(fd: RawFd, addr: &SocketAddr) -> io::Result<bool> {
    let (storage, len) = socketaddr_to_storage(addr);

    let rc = unsafe { connect(fd as SOCKET, &storage as *const _ as *const SOCKADDR, len) };
    if rc == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(WSAEWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

/// Retrieves the pending socket error via `SO_ERROR`.
pub(crate) fn sys_get_socket_error(fd: RawFd) -> io::Result<()> {
    let mut err: i32 = 0;
    let mut len: i32 = mem::size_of::<i32>() as i32;

    let rc = unsafe {
        getsockopt(
            fd as SOCKET,
            SOL_SOCKET,
            SO_ERROR,
            &mut err as *mut _ as *mut u8,
            &mut len,
        )
    };

    if rc != 0 {
        Err(io::Error::last_os_error())
    } else if err != 0 {
        Err(io::Error::from_raw_os_error(err))
    } else {
        Ok(())
    }
}

/// Sets `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd) -> io::Result<()> {
    let yes: i32 = 1;
    if unsafe {
        setsockopt(
            fd as SOCKET,
            SOL_SOCKET,
            SO_REUSEADDR,
            &yes as *const _ as *const u8,
            mem::size_of::<i32>() as i32,
        )
    } != 0
    {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn sockaddr_storage_to_socketaddr(storage: &SOCKADDR_STORAGE) -> io::Result<SocketAddr> {
    unsafe {
        match storage.ss_family {
            AF_INET => {
                let sin = &*(storage as *const _ as *const SOCKADDR_IN);
                let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.S_un.S_addr));
                Ok(SocketAddr::V4(SocketAddrV4::new(
                    ip,
                    u16::from_be(sin.sin_port),
                )))
            }
            AF_INET6 => {
                let sin6 = &*(storage as *const _ as *const SOCKADDR_IN6);
                let ip = Ipv6Addr::from(sin6.sin6_addr.u.Byte);
                Ok(SocketAddr::V6(SocketAddrV6::new(
                    ip,
                    u16::from_be(sin6.sin6_port),
                    0,
                    0,
                )))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unsupported address family",
            )),
        }
    }
}

fn socketaddr_to_storage(addr: &SocketAddr) -> (SOCKADDR_STORAGE, i32) {
    let mut storage: SOCKADDR_STORAGE = unsafe { mem::zeroed() };
    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut SOCKADDR_IN) };
            sa.sin_family = AF_INET;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.S_un.S_addr = u32::from(*v4.ip()).to_be();
            (storage, mem::size_of::<SOCKADDR_IN>() as i32)
        }
        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut SOCKADDR_IN6) };
            sa.sin6_family = AF_INET6;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.u.Byte = v6.ip().octets();
            sa.Anonymous.sin6_scope_id = v6.scope_id();
            (storage, mem::size_of::<SOCKADDR_IN6>() as i32)
        }
    }
}
