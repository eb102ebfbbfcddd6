//! Scripted stand-ins for the DNS, socket, connector and TLS collaborators.

use std::{
    collections::{HashMap, VecDeque},
    future::pending,
    io,
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use tokio::{
    io::{duplex, DuplexStream},
    sync::oneshot,
};
use tokio_util::sync::CancellationToken;

use crate::{
    address::SocketAddress,
    connector::{ConnResult, Connector, TlsEngine},
    options::{ContextOptions, TlsOptions},
    race::{PendingSocket, SocketOpener},
    resolver::Resolver,
    utils::{BoxedError, ConnStream, ConnectError, IoStream, PBF},
};

enum Answer {
    Ip(IpAddr),
    Fail(String),
    Hang,
}

#[derive(Default)]
pub struct FakeResolver {
    answers: HashMap<String, Answer>,
    calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, host: &str, ip: &str) -> Self {
        let ip = ip.parse().unwrap();
        self.answers.insert(host.to_string(), Answer::Ip(ip));
        self
    }

    pub fn fail(mut self, host: &str, message: &str) -> Self {
        self.answers
            .insert(host.to_string(), Answer::Fail(message.to_string()));
        self
    }

    pub fn hang(mut self, host: &str) -> Self {
        self.answers.insert(host.to_string(), Answer::Hang);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Resolver for FakeResolver {
    fn resolve<'a>(&'a self, host: &'a str) -> PBF<'a, Result<IpAddr, BoxedError>> {
        self.calls.lock().unwrap().push(host.to_string());
        let result: Result<IpAddr, BoxedError> = match self.answers.get(host) {
            Some(Answer::Ip(ip)) => Ok(*ip),
            Some(Answer::Fail(message)) => Err(message.clone().into()),
            Some(Answer::Hang) => return Box::pin(pending()),
            None => Err(format!("unknown host {host}").into()),
        };
        Box::pin(async move { result })
    }
}

/// Test-side controls for a [`FakeSocket`].
pub struct FakeHandle {
    closes: AtomicUsize,
    ready_tx: Mutex<Option<oneshot::Sender<io::Result<()>>>>,
    remote: Mutex<Option<DuplexStream>>,
}

impl FakeHandle {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Deliver readiness. Returns false when nobody is listening any more.
    pub fn fire(&self) -> bool {
        self.send(Ok(()))
    }

    pub fn fire_err(&self, kind: io::ErrorKind) -> bool {
        self.send(Err(io::Error::from(kind)))
    }

    fn send(&self, result: io::Result<()>) -> bool {
        match self.ready_tx.lock().unwrap().take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// The far end of the stream once the socket was handed off.
    pub fn take_remote(&self) -> Option<DuplexStream> {
        self.remote.lock().unwrap().take()
    }
}

/// A socket whose readiness is delivered by hand. A `None` peer makes the
/// refusal probe fail.
pub struct FakeSocket {
    handle: Arc<FakeHandle>,
    ready_rx: Mutex<Option<oneshot::Receiver<io::Result<()>>>>,
    peer: Option<String>,
}

impl FakeSocket {
    pub fn new(peer: Option<&str>) -> (Self, Arc<FakeHandle>) {
        let (tx, rx) = oneshot::channel();
        let handle = Arc::new(FakeHandle {
            closes: AtomicUsize::new(0),
            ready_tx: Mutex::new(Some(tx)),
            remote: Mutex::new(None),
        });
        let socket = Self {
            handle: handle.clone(),
            ready_rx: Mutex::new(Some(rx)),
            peer: peer.map(String::from),
        };
        (socket, handle)
    }
}

impl PendingSocket for FakeSocket {
    fn ready(&self) -> PBF<'_, io::Result<()>> {
        let rx = self.ready_rx.lock().unwrap().take();
        Box::pin(async move {
            match rx {
                Some(rx) => match rx.await {
                    Ok(result) => result,
                    Err(_) => pending().await,
                },
                None => pending().await,
            }
        })
    }

    fn peer_name(&self) -> io::Result<String> {
        self.peer
            .clone()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn take_error(&self) -> io::Result<Option<io::Error>> {
        Ok(self
            .peer
            .is_none()
            .then(|| io::Error::from(io::ErrorKind::ConnectionRefused)))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn close(&mut self) {
        self.handle.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn into_io(self: Box<Self>) -> IoStream {
        let (local, remote) = duplex(1024);
        *self.handle.remote.lock().unwrap() = Some(remote);
        Box::new(local)
    }
}

/// Hands out scripted sockets in order and records what was opened.
#[derive(Default)]
pub struct FakeOpener {
    queue: Mutex<VecDeque<io::Result<FakeSocket>>>,
    opened: Mutex<Vec<(SocketAddress, ContextOptions)>>,
}

impl FakeOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(self, socket: FakeSocket) -> Self {
        self.queue.lock().unwrap().push_back(Ok(socket));
        self
    }

    pub fn push_error(self, error: io::Error) -> Self {
        self.queue.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn opened(&self) -> Vec<(SocketAddress, ContextOptions)> {
        self.opened.lock().unwrap().clone()
    }
}

impl SocketOpener for FakeOpener {
    fn open(
        &self,
        address: &SocketAddress,
        options: &ContextOptions,
    ) -> io::Result<Box<dyn PendingSocket>> {
        self.opened
            .lock()
            .unwrap()
            .push((address.clone(), options.clone()));
        match self.queue.lock().unwrap().pop_front() {
            Some(Ok(socket)) => Ok(Box::new(socket)),
            Some(Err(e)) => Err(e),
            None => Err(io::Error::from(io::ErrorKind::AddrNotAvailable)),
        }
    }
}

/// Records the targets it is asked for and returns in-memory streams.
pub struct FakeConnector {
    fail: bool,
    calls: Mutex<Vec<(String, u16)>>,
    remotes: Mutex<VecDeque<DuplexStream>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
            remotes: Mutex::new(VecDeque::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<(String, u16)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_remote(&self) -> Option<DuplexStream> {
        self.remotes.lock().unwrap().pop_front()
    }
}

impl Connector for FakeConnector {
    fn create_cancellable<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        _cancel: CancellationToken,
    ) -> ConnResult<'a> {
        self.calls.lock().unwrap().push((host.to_string(), port));
        let result = if self.fail {
            Err(ConnectError::ConnectionRefused {
                addr: format!("{host}:{port}"),
                source: None,
            })
        } else {
            let (local, remote) = duplex(1024);
            self.remotes.lock().unwrap().push_back(remote);
            let context = ContextOptions {
                tls: TlsOptions::default().normalized_for(host),
                ..Default::default()
            };
            // Like a real inner layer: names filled in, nothing configured.
            Ok(ConnStream::new(local, format!("{host}:{port}"))
                .with_context(context)
                .with_requested_tls(TlsOptions::default()))
        };
        Box::pin(async move { result })
    }
}

enum EngineMode {
    Succeed,
    Fail,
    Hang,
}

/// Records the options each handshake was asked to use.
pub struct FakeTlsEngine {
    mode: EngineMode,
    seen: Mutex<Vec<TlsOptions>>,
}

impl FakeTlsEngine {
    fn with_mode(mode: EngineMode) -> Self {
        Self {
            mode,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_mode(EngineMode::Succeed)
    }

    pub fn failing() -> Self {
        Self::with_mode(EngineMode::Fail)
    }

    pub fn hanging() -> Self {
        Self::with_mode(EngineMode::Hang)
    }

    pub fn seen(&self) -> Vec<TlsOptions> {
        self.seen.lock().unwrap().clone()
    }
}

impl TlsEngine for FakeTlsEngine {
    fn enable<'a>(
        &'a self,
        stream: &'a mut ConnStream,
        options: &'a TlsOptions,
    ) -> PBF<'a, Result<(), BoxedError>> {
        self.seen.lock().unwrap().push(options.clone());
        let result: Result<(), BoxedError> = match self.mode {
            EngineMode::Succeed => {
                // Pretend the same transport is now encrypted.
                if let Some(io) = stream.take_io() {
                    stream.upgrade(io);
                }
                Ok(())
            }
            EngineMode::Fail => Err("handshake failure".into()),
            EngineMode::Hang => return Box::pin(pending()),
        };
        Box::pin(async move { result })
    }
}
