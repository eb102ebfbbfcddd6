//! Asynchronous establishment of plaintext and TLS stream connections.
//!
//! A [`TcpConnector`] resolves a host, races a non-blocking connect against a
//! timeout and tells accepted sockets from refused ones. Decorators such as
//! [`StaticTargetConnector`] and [`SecureConnector`] wrap any [`Connector`].

pub mod address;
pub mod connector;
pub mod options;
pub mod race;
pub mod resolver;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use address::{Scheme, SocketAddress};
pub use connector::{
    ConnResult, Connector, NativeTlsEngine, SecureConnector, StaticTargetConnector, TcpConnector,
    TlsEngine,
};
pub use options::{ConnectorConfig, ContextOptions, TlsOptions, DEFAULT_CONNECT_TIMEOUT};
pub use race::{race_deadline, Raced};
pub use resolver::{HostnameResolver, Resolver, SystemResolver};
pub use utils::{BoxedError, ConnStream, ConnectError, ConnectResult};
