use super::{ConnectionCallback, Stream, StreamKind};
use crate::error::{Error, Result};
use crate::reactor::poller::platform;
use crate::runtime::EventLoop;
use crate::time::Timer;

use std::cell::RefCell;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::rc::Rc;

/// Resolves `host` to the first IPv4 address it names.
///
/// Literal addresses are used as-is; names go through the system
/// resolver, which may block.
fn resolve_v4(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => Ok(SocketAddr::V4(SocketAddrV4::new(v4, port))),
            IpAddr::V6(_) => Err(Error::NotSupported("IPv6 addresses are not supported")),
        };
    }

    (host, port)
        .to_socket_addrs()
        .map_err(Error::Io)?
        .find(SocketAddr::is_ipv4)
        .ok_or(Error::InvalidArgument("host has no IPv4 address"))
}

impl Stream {
    /// Opens a non-blocking TCP socket.
    pub fn open_tcp(event_loop: &EventLoop) -> Result<Stream> {
        let fd = platform::sys_tcp_socket().map_err(Error::Io)?;
        Stream::from_fd(event_loop, StreamKind::Tcp, fd)
    }

    /// Opens a non-blocking UDP socket.
    ///
    /// After [`connect`](Self::connect), writes send datagrams to the peer
    /// and every read delivers one datagram.
    pub fn open_udp(event_loop: &EventLoop) -> Result<Stream> {
        let fd = platform::sys_udp_socket().map_err(Error::Io)?;
        Stream::from_fd(event_loop, StreamKind::Udp, fd)
    }

    /// Starts connecting to `host:port`.
    ///
    /// Completion is observed through write readiness: bytes written
    /// before the connection is established stay queued, and a failed
    /// connection is reported to the data and writable callbacks.
    ///
    /// A connect still pending after the loop's
    /// [`default_timeout_ms`](crate::LoopOptions::default_timeout_ms)
    /// fails the stream with [`Error::Timeout`].
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        let fd = self.ensure_socket()?;
        let addr = resolve_v4(host, port)?;

        let connected = platform::sys_connect(fd, &addr).map_err(Error::Io)?;
        self.inner.connecting.set(!connected);
        if !connected {
            self.arm_connect_timeout();
        }

        tracing::debug!(fd = ?fd, addr = %addr, connected, "connecting");

        self.update_interest()
    }

    fn arm_connect_timeout(&self) {
        let timeout_ms = self.inner.event_loop.options().default_timeout_ms;
        if timeout_ms == 0 {
            return;
        }

        let target = Rc::downgrade(&self.inner);
        let timer = Timer::start(&self.inner.event_loop, timeout_ms, 0, move |_| {
            let Some(inner) = target.upgrade() else {
                return;
            };

            let stream = Stream { inner };
            if stream.inner.connecting.replace(false) && stream.is_live() {
                tracing::debug!(fd = ?stream.fd(), timeout_ms, "connect timed out");
                stream.fail(Error::Timeout);
            }
        });

        let old = self.inner.connect_timer.replace(Some(timer));
        if let Some(old) = old {
            old.stop();
        }
    }

    /// Binds the socket to `host:port`, or to every interface when `host`
    /// is `None`. Port `0` picks an ephemeral port.
    pub fn bind(&self, host: Option<&str>, port: u16) -> Result<()> {
        let fd = self.ensure_socket()?;
        let addr = match host {
            Some(host) => resolve_v4(host, port)?,
            None => SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)),
        };

        platform::sys_set_reuseaddr(fd).map_err(Error::Io)?;
        platform::sys_bind(fd, &addr).map_err(Error::Io)?;

        Ok(())
    }

    /// Turns a bound TCP socket into a listener.
    ///
    /// A listener never reads: readiness is reported to the callback set
    /// with [`on_connection`](Self::on_connection).
    pub fn listen(&self, backlog: i32) -> Result<()> {
        let fd = self.ensure_socket()?;
        if self.inner.kind != StreamKind::Tcp {
            return Err(Error::NotSupported("only TCP streams can listen"));
        }

        platform::sys_listen(fd, backlog).map_err(Error::Io)?;
        self.inner.listening.set(true);

        tracing::debug!(fd = ?fd, backlog, "listening");

        self.update_interest()
    }

    /// Accepts one pending connection as a new stream on the same loop.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the stream is not listening,
    /// - [`Error::WouldBlock`] if no connection is pending.
    pub fn accept(&self) -> Result<Stream> {
        let fd = self.ensure_open()?;
        if !self.inner.listening.get() {
            return Err(Error::InvalidState("stream is not listening"));
        }

        let (client, peer) = platform::sys_accept(fd)?;
        tracing::debug!(fd = ?client, peer = %peer, "accepted");

        Stream::from_fd(&self.inner.event_loop, StreamKind::Tcp, client)
    }

    /// Sets the callback run when the listener has a connection to accept.
    pub fn on_connection<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&Stream) + 'static,
    {
        self.ensure_open()?;

        let callback: ConnectionCallback = Rc::new(RefCell::new(callback));
        let old = self.inner.on_connection.replace(Some(callback));
        drop(old);

        self.update_interest()
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let fd = self.ensure_socket()?;
        platform::sys_sockname(fd).map_err(Error::Io)
    }

    fn ensure_socket(&self) -> Result<platform::RawFd> {
        let fd = self.ensure_open()?;
        if !self.inner.kind.is_socket() {
            return Err(Error::NotSupported("operation requires a socket"));
        }

        Ok(fd)
    }
}
