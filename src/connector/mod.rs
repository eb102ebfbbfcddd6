use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::utils::{ConnStream, ConnectError, PBF};

mod connector_secure;
mod connector_static;
mod connector_tcp;
mod tls_engine;

pub use connector_secure::*;
pub use connector_static::*;
pub use connector_tcp::*;
pub use tls_engine::*;

pub type ConnResult<'a> = PBF<'a, Result<ConnStream, ConnectError>>;

/// Anything that can turn a `(host, port)` pair into a connected stream.
pub trait Connector: Send + Sync {
    fn create<'a>(&'a self, host: &'a str, port: u16) -> ConnResult<'a> {
        self.create_cancellable(host, port, CancellationToken::new())
    }

    /// Like [`Connector::create`], but gives up with `Cancelled` as soon as
    /// `cancel` fires, whichever stage is pending.
    fn create_cancellable<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        cancel: CancellationToken,
    ) -> ConnResult<'a>;
}

impl<C: Connector + ?Sized> Connector for Arc<C> {
    fn create_cancellable<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        cancel: CancellationToken,
    ) -> ConnResult<'a> {
        (**self).create_cancellable(host, port, cancel)
    }
}
