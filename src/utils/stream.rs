use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::debug;

use crate::options::{ContextOptions, TlsOptions};

/// Anything that can carry the bytes of an established connection.
pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncReadWrite for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type IoStream = Box<dyn AsyncReadWrite>;

/// A connected (and possibly encrypted) channel handed to the caller.
///
/// The stream remembers which peer it reached and the context options it was
/// opened with, so that a later layer (TLS) can read them back. Closing is
/// idempotent: after the first `close`, reads see EOF and writes fail with
/// `NotConnected`.
pub struct ConnStream {
    io: Option<IoStream>,
    peer_name: String,
    local_addr: Option<SocketAddr>,
    context: ContextOptions,
    requested_tls: TlsOptions,
    encrypted: bool,
}

impl ConnStream {
    pub fn new(io: impl AsyncReadWrite + 'static, peer_name: impl Into<String>) -> Self {
        Self::from_boxed(Box::new(io), peer_name)
    }

    pub fn from_boxed(io: IoStream, peer_name: impl Into<String>) -> Self {
        Self {
            io: Some(io),
            peer_name: peer_name.into(),
            local_addr: None,
            context: ContextOptions::default(),
            requested_tls: TlsOptions::default(),
            encrypted: false,
        }
    }

    pub fn with_local_addr(mut self, local_addr: Option<SocketAddr>) -> Self {
        self.local_addr = local_addr;
        self
    }

    /// Use `context` as the effective options. The TLS part also becomes
    /// the requested one; see [`ConnStream::with_requested_tls`].
    pub fn with_context(mut self, context: ContextOptions) -> Self {
        self.requested_tls = context.tls.clone();
        self.context = context;
        self
    }

    /// Record the TLS options as configured, before any hostname was filled in.
    pub fn with_requested_tls(mut self, tls: TlsOptions) -> Self {
        self.requested_tls = tls;
        self
    }

    /// The peer endpoint read back when the connection was validated.
    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn context(&self) -> &ContextOptions {
        &self.context
    }

    pub fn requested_tls(&self) -> &TlsOptions {
        &self.requested_tls
    }

    pub fn context_mut(&mut self) -> &mut ContextOptions {
        &mut self.context
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn is_closed(&self) -> bool {
        self.io.is_none()
    }

    /// Take the transport out, e.g. to run a handshake over it.
    /// The stream counts as closed until [`ConnStream::upgrade`] puts one back.
    pub fn take_io(&mut self) -> Option<IoStream> {
        self.io.take()
    }

    /// Install an encrypted transport in place of the plaintext one.
    pub fn upgrade(&mut self, io: IoStream) {
        self.io = Some(io);
        self.encrypted = true;
    }

    /// Drop the underlying transport. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.io.take().is_some() {
            debug!(peer = %self.peer_name, "stream closed");
        }
    }

    /// Flush and shut down the write half, then close.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        let result = match self.io.as_mut() {
            Some(io) => io.shutdown().await,
            None => Ok(()),
        };
        self.close();
        result
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream closed")
}

impl AsyncRead for ConnStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().io.as_mut() {
            Some(io) => Pin::new(io).poll_read(cx, buf),
            // A closed stream reads as EOF.
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncWrite for ConnStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().io.as_mut() {
            Some(io) => Pin::new(io).poll_write(cx, buf),
            None => Poll::Ready(Err(closed_error())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().io.as_mut() {
            Some(io) => Pin::new(io).poll_flush(cx),
            None => Poll::Ready(Err(closed_error())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().io.as_mut() {
            Some(io) => Pin::new(io).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
