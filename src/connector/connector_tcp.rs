use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    address::{parse, Scheme, SocketAddress},
    options::{ConnectorConfig, ContextOptions},
    race::{or_cancel, AttemptState, ConnectRace, SocketOpener, SystemSocketOpener},
    resolver::{HostnameResolver, Resolver},
    utils::{ConnStream, ConnectError},
};

use super::{ConnResult, Connector};

/// The plaintext connector: resolve, race the connect, validate, wrap.
#[derive(Clone)]
pub struct TcpConnector {
    resolver: HostnameResolver,
    opener: Arc<dyn SocketOpener>,
    config: ConnectorConfig,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(ConnectorConfig::default())
    }
}

impl TcpConnector {
    /// A connector backed by the system resolver and real sockets.
    pub fn new(config: ConnectorConfig) -> Self {
        Self {
            resolver: HostnameResolver::default(),
            opener: Arc::new(SystemSocketOpener),
            config,
        }
    }

    pub fn with_parts(
        resolver: Arc<dyn Resolver>,
        opener: Arc<dyn SocketOpener>,
        config: ConnectorConfig,
    ) -> Self {
        Self {
            resolver: HostnameResolver::new(resolver),
            opener,
            config,
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// A sibling connector sharing resolver and opener but using `config`.
    pub fn with_config(&self, config: ConnectorConfig) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    /// Connect to `host:port` with `options` layered over the configured context.
    pub async fn create_with_options(
        &self,
        host: &str,
        port: u16,
        options: &ContextOptions,
        cancel: CancellationToken,
    ) -> Result<ConnStream, ConnectError> {
        let ip = match or_cancel(self.resolver.resolve(host), &cancel).await {
            Some(ip) => ip?,
            None => {
                return Err(ConnectError::Cancelled {
                    addr: format!("{host}:{port}"),
                })
            }
        };

        // Certificates name the host, not the address it resolved to.
        let mut context = self.config.context.merged_with(options);
        let requested = context.tls.clone();
        context.tls = context.tls.normalized_for(host);

        let address = SocketAddress::tcp(ip.to_string(), port);
        debug!(host, %ip, port, "resolved");
        let stream = self
            .create_socket_for_address(&address, &context, cancel)
            .await?;
        Ok(stream.with_requested_tls(requested))
    }

    /// Connect to an already resolved (or path-based) address. `context` is
    /// used as is.
    pub async fn create_socket_for_address(
        &self,
        address: &SocketAddress,
        context: &ContextOptions,
        cancel: CancellationToken,
    ) -> Result<ConnStream, ConnectError> {
        let timeout = context.timeout_or(self.config.connect_timeout);

        let mut attempt = ConnectRace::new(self.opener.as_ref())
            .begin(address.clone(), timeout, context, &cancel)
            .await?;

        let peer = match attempt.probe() {
            Ok(peer) => peer,
            Err(e) => {
                attempt.close(AttemptState::Refused);
                return Err(e);
            }
        };

        let (io, local_addr) = attempt.into_connected()?;
        debug!(%address, peer = %peer, "connected");
        Ok(ConnStream::from_boxed(io, peer)
            .with_local_addr(local_addr)
            .with_context(context.clone()))
    }

    /// Connect to a textual target such as `tcp://example.com:80` or
    /// `unix:///run/app.sock`. TLS is left to [`super::SecureConnector`].
    pub async fn create_for_target(
        &self,
        target: &str,
        cancel: CancellationToken,
    ) -> Result<ConnStream, ConnectError> {
        let address = parse(target)?;
        match address.scheme {
            Scheme::Unix => {
                self.create_socket_for_address(&address, &self.config.context, cancel)
                    .await
            }
            Scheme::Tcp | Scheme::Tls => {
                let port = address.require_port()?;
                self.create_with_options(&address.host, port, &ContextOptions::default(), cancel)
                    .await
            }
        }
    }
}

impl Connector for TcpConnector {
    fn create_cancellable<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        cancel: CancellationToken,
    ) -> ConnResult<'a> {
        Box::pin(async move {
            self.create_with_options(host, port, &ContextOptions::default(), cancel)
                .await
        })
    }
}
