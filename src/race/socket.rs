use std::{
    io,
    net::{Shutdown, SocketAddr},
};

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::{io::Interest, net::TcpStream};
use tracing::warn;

#[cfg(unix)]
use std::os::fd::OwnedFd;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::{
    address::{Scheme, SocketAddress},
    options::ContextOptions,
    utils::{IoStream, PBF},
};

/// A socket whose non-blocking connect has been started but not confirmed.
pub trait PendingSocket: Send + Sync {
    /// Resolves once the socket is readable or writable.
    fn ready(&self) -> PBF<'_, io::Result<()>>;

    /// Read back the negotiated peer endpoint. Fails if the peer refused.
    fn peer_name(&self) -> io::Result<String>;

    /// The error the OS recorded for this socket, if any.
    fn take_error(&self) -> io::Result<Option<io::Error>>;

    fn local_addr(&self) -> Option<SocketAddr>;

    /// Shut down both directions. The handle is released when dropped.
    fn close(&mut self);

    fn into_io(self: Box<Self>) -> IoStream;
}

/// Opens non-blocking sockets toward a formatted address.
pub trait SocketOpener: Send + Sync {
    fn open(
        &self,
        address: &SocketAddress,
        options: &ContextOptions,
    ) -> io::Result<Box<dyn PendingSocket>>;
}

/// Opens real sockets through socket2 and hands them to tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSocketOpener;

impl SocketOpener for SystemSocketOpener {
    fn open(
        &self,
        address: &SocketAddress,
        options: &ContextOptions,
    ) -> io::Result<Box<dyn PendingSocket>> {
        match address.scheme {
            #[cfg(unix)]
            Scheme::Unix => {
                let path = address.path.as_deref().unwrap_or_default();
                Ok(Box::new(SystemSocket::Unix(open_unix(path)?)))
            }
            #[cfg(not(unix))]
            Scheme::Unix => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            )),
            Scheme::Tcp | Scheme::Tls => {
                let ip = address.host.parse().map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("{} is not an IP address", address.host),
                    )
                })?;
                let port = address.port.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "port missing")
                })?;
                let stream = open_tcp(SocketAddr::new(ip, port), options)?;
                Ok(Box::new(SystemSocket::Tcp(stream)))
            }
        }
    }
}

/// A non-blocking connect reports "still in flight" rather than success.
fn in_progress(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    false
}

fn apply_socket_options(socket: &Socket, options: &ContextOptions) {
    if let Some(nodelay) = options.tcp_nodelay {
        if let Err(e) = socket.set_nodelay(nodelay) {
            warn!("tcp set_nodelay error: {e}");
        }
    }
    if let Some(time) = options.tcp_keepalive {
        let keepalive = TcpKeepalive::new().with_time(time);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("tcp set_keepalive error: {e}");
        }
    }
}

fn open_tcp(addr: SocketAddr, options: &ContextOptions) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    // When handing a raw socket to tokio, O_NONBLOCK must already be set.
    socket.set_nonblocking(true)?;
    apply_socket_options(&socket, options);

    if cfg!(windows) {
        // Windows requires a socket be bound before calling connect
        let any: SocketAddr = match addr {
            SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
            SocketAddr::V6(_) => ([0, 0, 0, 0, 0, 0, 0, 0], 0).into(),
        };
        socket.bind(&any.into())?;
    }

    match socket.connect(&addr.into()) {
        Ok(()) => {}
        Err(e) if in_progress(&e) => {}
        Err(e) => return Err(e),
    }

    TcpStream::from_std(socket.into())
}

#[cfg(unix)]
fn open_unix(path: &str) -> io::Result<UnixStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    socket.set_nonblocking(true)?;

    match socket.connect(&socket2::SockAddr::unix(path)?) {
        Ok(()) => {}
        Err(e) if in_progress(&e) => {}
        Err(e) => return Err(e),
    }

    UnixStream::from_std(std::os::unix::net::UnixStream::from(OwnedFd::from(socket)))
}

enum SystemSocket {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl PendingSocket for SystemSocket {
    fn ready(&self) -> PBF<'_, io::Result<()>> {
        // Refusals show up as read readiness on some platforms and as write
        // readiness on others, so watch both.
        let interest = Interest::READABLE | Interest::WRITABLE;
        Box::pin(async move {
            match self {
                SystemSocket::Tcp(s) => s.ready(interest).await.map(|_| ()),
                #[cfg(unix)]
                SystemSocket::Unix(s) => s.ready(interest).await.map(|_| ()),
            }
        })
    }

    fn peer_name(&self) -> io::Result<String> {
        match self {
            SystemSocket::Tcp(s) => s.peer_addr().map(|a| a.to_string()),
            #[cfg(unix)]
            SystemSocket::Unix(s) => s.peer_addr().map(|a| match a.as_pathname() {
                Some(path) => format!("unix://{}", path.display()),
                None => String::from("unix://(unnamed)"),
            }),
        }
    }

    fn take_error(&self) -> io::Result<Option<io::Error>> {
        match self {
            SystemSocket::Tcp(s) => s.take_error(),
            #[cfg(unix)]
            SystemSocket::Unix(s) => s.take_error(),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            SystemSocket::Tcp(s) => s.local_addr().ok(),
            #[cfg(unix)]
            SystemSocket::Unix(_) => None,
        }
    }

    fn close(&mut self) {
        // The peer may already be gone; shutdown errors are expected then.
        let _ = match self {
            SystemSocket::Tcp(s) => SockRef::from(&*s).shutdown(Shutdown::Both),
            #[cfg(unix)]
            SystemSocket::Unix(s) => SockRef::from(&*s).shutdown(Shutdown::Both),
        };
    }

    fn into_io(self: Box<Self>) -> IoStream {
        match *self {
            SystemSocket::Tcp(s) => Box::new(s),
            #[cfg(unix)]
            SystemSocket::Unix(s) => Box::new(s),
        }
    }
}
