use std::{error::Error as StdError, io, time::Duration};

use thiserror::Error;

pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// Every way a connection attempt can end without a usable stream.
///
/// Each failure is terminal: by the time one of these is returned, the
/// attempt's timer is gone, its readiness watch is dropped, and its socket
/// has been closed.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The textual target could not be parsed.
    #[error("invalid address {input:?}: {reason}")]
    AddressParse { input: String, reason: String },

    /// A context option had an unknown key or a value of the wrong type.
    #[error("invalid option {key:?}: {reason}")]
    InvalidOption { key: String, reason: String },

    /// The DNS collaborator failed; its error is forwarded unchanged.
    #[error("failed to resolve {host}: {source}")]
    Resolution { host: String, source: BoxedError },

    /// The OS refused to open the socket or start the connect.
    #[error("connection to {addr} failed: {source}")]
    SocketOpen { addr: String, source: io::Error },

    #[error("timeout: failed to connect to {addr} after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    /// Readiness fired, but the peer endpoint could not be read back.
    #[error("connection to {addr} refused")]
    ConnectionRefused {
        addr: String,
        source: Option<io::Error>,
    },

    #[error("connection to {addr} cancelled")]
    Cancelled { addr: String },

    #[error("TLS handshake with {host} failed: {source}")]
    TlsHandshake { host: String, source: BoxedError },
}

impl ConnectError {
    pub fn address(input: impl ToString, reason: impl ToString) -> Self {
        Self::AddressParse {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn option(key: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidOption {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The OS error code behind a socket failure, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SocketOpen { source, .. } => source.raw_os_error(),
            Self::ConnectionRefused {
                source: Some(source),
                ..
            } => source.raw_os_error(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused { .. })
    }
}

pub type ConnectResult<T> = Result<T, ConnectError>;
