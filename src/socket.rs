//! C2: a thin non-blocking TCP socket abstraction.
//!
//! `std::net::{TcpListener, TcpStream}` already provide bind/listen/accept/connect/
//! set_nonblocking/set_nodelay, so this module is mostly about giving `recv`/`send`/`poll` the
//! exact return-value contract the spec requires (-1 for would-block, 0 for orderly peer close,
//! `io::Error` for anything else), which the standard library does not expose directly.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

/// What the caller is waiting for readiness on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    Accept,
    Read,
    Write,
}

/// An owned, non-blocking TCP connection.
pub struct Socket {
    inner: TcpStream,
}

impl Socket {
    pub fn from_stream(inner: TcpStream) -> Self {
        Socket { inner }
    }

    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        Ok(Socket {
            inner: TcpStream::connect(addr)?,
        })
    }

    pub fn set_non_blocking(&self, value: bool) -> io::Result<()> {
        self.inner.set_nonblocking(value)
    }

    pub fn set_tcp_nodelay(&self, value: bool) -> io::Result<()> {
        self.inner.set_nodelay(value)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    /// Returns the number of bytes received, `0` on orderly peer close, or `-1` if the socket is
    /// non-blocking and the call would block.
    pub fn recv(&mut self, buf: &mut [u8]) -> io::Result<isize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n as isize),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(-1),
            Err(e) => Err(e),
        }
    }

    /// Returns the number of bytes sent, or `-1` if the socket is non-blocking and the call
    /// would block.
    pub fn send(&mut self, buf: &[u8]) -> io::Result<isize> {
        match self.inner.write(buf) {
            Ok(n) => Ok(n as isize),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(-1),
            Err(e) => Err(e),
        }
    }

    /// Waits until the socket is ready per `mode`, or `timeout` elapses. Returns `1` if ready,
    /// `0` on timeout.
    pub fn poll(&self, mode: PollMode, timeout: Duration) -> io::Result<i32> {
        poll_one(self.inner.as_raw_fd(), mode, timeout)
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

/// The listening half of a TCP socket.
pub struct ListenSocket {
    inner: TcpListener,
}

impl ListenSocket {
    /// Binds to `port` on all interfaces. `original_source/Socket.cpp::Bind` takes a
    /// `reuseAddress` flag and always passes it here; `std::net::TcpListener` has no before-bind
    /// hook to set `SO_REUSEADDR`, so this crate accepts the platform default instead of reaching
    /// for raw socket construction just for that option (see `DESIGN.md`).
    pub fn bind(port: u16) -> io::Result<Self> {
        let inner = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))?;
        Ok(ListenSocket { inner })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Waits up to `timeout` for a pending connection. Returns `1` if one is ready, `0` on
    /// timeout.
    pub fn poll_accept(&self, timeout: Duration) -> io::Result<i32> {
        poll_one(self.inner.as_raw_fd(), PollMode::Accept, timeout)
    }

    /// Accepts a pending connection. Only meaningful after `poll_accept` reports readiness.
    pub fn accept(&self) -> io::Result<(Socket, SocketAddr)> {
        let (stream, addr) = self.inner.accept()?;
        Ok((Socket::from_stream(stream), addr))
    }
}

impl AsRawFd for ListenSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

fn poll_one(fd: RawFd, mode: PollMode, timeout: Duration) -> io::Result<i32> {
    let events = match mode {
        PollMode::Accept | PollMode::Read => libc::POLLIN,
        PollMode::Write => libc::POLLOUT,
    };
    let mut pfd = [libc::pollfd {
        fd,
        events,
        revents: 0,
    }];
    poll_raw(&mut pfd, timeout)
}

/// Raw wrapper over `poll(2)` shared by the single-socket convenience methods above and the
/// scheduler's idle-set poller, which needs to wait on many fds at once.
pub fn poll_raw(fds: &mut [libc::pollfd], timeout: Duration) -> io::Result<i32> {
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    loop {
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(ret);
    }
}

/// Resolves `host` to an IPv4 dotted-quad string, mirroring
/// `original_source/Socket.cpp::Socket::GetHostIP`. Returns `None` if resolution fails or yields
/// no IPv4 address.
pub fn get_host_ip(host: &str) -> Option<String> {
    (host, 0u16)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4.ip().to_string()),
            SocketAddr::V6(_) => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_host_ip_resolves_localhost() {
        assert_eq!(get_host_ip("127.0.0.1").as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn nonblocking_recv_reports_would_block() {
        let listener = ListenSocket::bind(0).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = Socket::connect(addr).unwrap();
        client.set_non_blocking(true).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();
        server_side.set_non_blocking(true).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(server_side.recv(&mut buf).unwrap(), -1);
    }
}
