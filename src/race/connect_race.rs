use std::{net::SocketAddr, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    address::SocketAddress,
    options::ContextOptions,
    utils::{ConnectError, IoStream},
};

use super::{race_deadline, validate, PendingSocket, Raced, SocketOpener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Created,
    SocketOpened,
    AwaitingReadiness,
    Validating,
    Connected,
    Refused,
    TimedOut,
    SocketOpenFailed,
    Cancelled,
}

/// One connect attempt and the socket it owns.
///
/// The socket leaves the attempt in exactly one of two ways: handed to the
/// caller by [`ConnectAttempt::into_connected`], or closed. Dropping an
/// unfinished attempt closes it.
pub struct ConnectAttempt {
    address: SocketAddress,
    addr: String,
    socket: Option<Box<dyn PendingSocket>>,
    timeout: Duration,
    deadline: Option<Instant>,
    state: AttemptState,
}

impl ConnectAttempt {
    pub fn new(address: SocketAddress, timeout: Duration) -> Self {
        Self {
            addr: address.to_string(),
            address,
            socket: None,
            timeout,
            deadline: None,
            state: AttemptState::Created,
        }
    }

    pub fn address(&self) -> &SocketAddress {
        &self.address
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn open(
        &mut self,
        opener: &dyn SocketOpener,
        options: &ContextOptions,
    ) -> Result<(), ConnectError> {
        match opener.open(&self.address, options) {
            Ok(socket) => {
                self.socket = Some(socket);
                self.state = AttemptState::SocketOpened;
                Ok(())
            }
            Err(source) => {
                self.state = AttemptState::SocketOpenFailed;
                Err(ConnectError::SocketOpen {
                    addr: self.addr.clone(),
                    source,
                })
            }
        }
    }

    async fn await_readiness(&mut self, cancel: &CancellationToken) -> Result<(), ConnectError> {
        self.state = AttemptState::AwaitingReadiness;
        // Timeouts too large for the clock have no deadline.
        self.deadline = Instant::now().checked_add(self.timeout);

        let raced = match self.socket.as_deref() {
            Some(socket) => race_deadline(socket.ready(), self.timeout, cancel).await,
            None => Raced::Cancelled,
        };

        // The readiness watch and the timer are both gone by now.
        match raced {
            Raced::Ready(Ok(())) => {
                self.state = AttemptState::Validating;
                Ok(())
            }
            Raced::Ready(Err(source)) => {
                self.close(AttemptState::SocketOpenFailed);
                Err(ConnectError::SocketOpen {
                    addr: self.addr.clone(),
                    source,
                })
            }
            Raced::TimedOut => {
                self.close(AttemptState::TimedOut);
                Err(ConnectError::Timeout {
                    addr: self.addr.clone(),
                    timeout: self.timeout,
                })
            }
            Raced::Cancelled => {
                self.close(AttemptState::Cancelled);
                Err(ConnectError::Cancelled {
                    addr: self.addr.clone(),
                })
            }
        }
    }

    /// Check whether the peer really accepted. Does not close on refusal.
    pub fn probe(&self) -> Result<String, ConnectError> {
        match self.socket.as_deref() {
            Some(socket) => validate(socket, &self.addr),
            None => Err(ConnectError::ConnectionRefused {
                addr: self.addr.clone(),
                source: None,
            }),
        }
    }

    /// Shut the socket down and record how the attempt ended.
    pub fn close(&mut self, state: AttemptState) {
        if let Some(mut socket) = self.socket.take() {
            socket.close();
            debug!(addr = %self.addr, ?state, "socket closed");
        }
        self.state = state;
    }

    /// Hand the socket over to the caller.
    pub fn into_connected(mut self) -> Result<(IoStream, Option<SocketAddr>), ConnectError> {
        match self.socket.take() {
            Some(socket) => {
                self.state = AttemptState::Connected;
                let local_addr = socket.local_addr();
                Ok((socket.into_io(), local_addr))
            }
            None => Err(ConnectError::ConnectionRefused {
                addr: self.addr.clone(),
                source: None,
            }),
        }
    }
}

impl Drop for ConnectAttempt {
    fn drop(&mut self) {
        if self.socket.is_some() {
            self.close(AttemptState::Cancelled);
        }
    }
}

/// Opens a socket and races its readiness against a timeout.
pub struct ConnectRace<'a> {
    opener: &'a dyn SocketOpener,
}

impl<'a> ConnectRace<'a> {
    pub fn new(opener: &'a dyn SocketOpener) -> Self {
        Self { opener }
    }

    /// Resolves with an attempt in the `Validating` state, or the typed reason
    /// it never got there. A failed open never enters the race.
    pub async fn begin(
        &self,
        address: SocketAddress,
        timeout: Duration,
        options: &ContextOptions,
        cancel: &CancellationToken,
    ) -> Result<ConnectAttempt, ConnectError> {
        let mut attempt = ConnectAttempt::new(address, timeout);
        debug!(addr = %attempt.addr, ?timeout, "connecting");

        attempt.open(self.opener, options)?;
        attempt.await_readiness(cancel).await?;
        Ok(attempt)
    }
}
