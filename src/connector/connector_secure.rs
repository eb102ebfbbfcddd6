use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    options::{TlsOptions, TLS_KEYS},
    race::or_cancel,
    utils::{ConnStream, ConnectError},
};

use super::{ConnResult, Connector, NativeTlsEngine, TlsEngine};

/// Upgrades whatever the inner connector returns to TLS.
///
/// Configuration is persistent: [`SecureConnector::with_context`] returns a new
/// connector and leaves the receiver untouched, so one base can be shared by
/// call sites with different TLS needs.
#[derive(Clone)]
pub struct SecureConnector {
    inner: Arc<dyn Connector>,
    engine: Arc<dyn TlsEngine>,
    tls: TlsOptions,
}

impl SecureConnector {
    pub fn new(inner: Arc<dyn Connector>) -> Self {
        Self::with_engine(inner, Arc::new(NativeTlsEngine))
    }

    pub fn with_engine(inner: Arc<dyn Connector>, engine: Arc<dyn TlsEngine>) -> Self {
        Self {
            inner,
            engine,
            tls: TlsOptions::default(),
        }
    }

    pub fn tls_options(&self) -> &TlsOptions {
        &self.tls
    }

    /// A new connector with `map` merged into the TLS options. Keys may carry
    /// the `ssl.` prefix or not; a `null` value removes the entry.
    ///
    /// Unprefixed keys must be known TLS options. Any `ssl.*` key is accepted,
    /// unknown ones end up in the passthrough map.
    pub fn with_context(&self, map: &Map<String, Value>) -> Result<Self, ConnectError> {
        let mut tls = self.tls.clone();
        for (key, value) in map {
            let tls_key = match key.strip_prefix("ssl.") {
                Some(tls_key) => tls_key,
                None if TLS_KEYS.contains(&key.as_str()) => key.as_str(),
                None => return Err(ConnectError::option(key, "not a TLS option")),
            };
            tls.set(tls_key, value)?;
        }
        Ok(Self {
            tls,
            ..self.clone()
        })
    }

    /// A new connector with `tls` layered over the current options.
    pub fn with_tls_options(&self, tls: &TlsOptions) -> Self {
        Self {
            tls: self.tls.merged_with(tls),
            ..self.clone()
        }
    }

    async fn secure(
        &self,
        host: &str,
        port: u16,
        cancel: CancellationToken,
    ) -> Result<ConnStream, ConnectError> {
        // (unencrypted) connection succeeded
        let mut stream = self
            .inner
            .create_cancellable(host, port, cancel.clone())
            .await?;

        // Names the inner layers filled in may be a proxy or an IP; only
        // configured ones survive, the rest come from the host asked for here.
        let tls = stream
            .requested_tls()
            .merged_with(&self.tls)
            .normalized_for(host);
        stream.context_mut().tls = tls.clone();

        let handshake = or_cancel(self.engine.enable(&mut stream, &tls), &cancel).await;
        match handshake {
            Some(Ok(())) => {
                debug!(host, port, "secured");
                Ok(stream)
            }
            Some(Err(source)) => {
                // establishing encryption failed => close invalid connection and return error
                stream.close();
                Err(ConnectError::TlsHandshake {
                    host: host.to_string(),
                    source,
                })
            }
            None => {
                stream.close();
                Err(ConnectError::Cancelled {
                    addr: format!("tls://{host}:{port}"),
                })
            }
        }
    }
}

impl Connector for SecureConnector {
    fn create_cancellable<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        cancel: CancellationToken,
    ) -> ConnResult<'a> {
        Box::pin(self.secure(host, port, cancel))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::{io::AsyncReadExt, time::sleep};

    use super::*;
    use crate::{
        connector::{StaticTargetConnector, TcpConnector},
        options::ConnectorConfig,
        test_support::{FakeConnector, FakeOpener, FakeResolver, FakeSocket, FakeTlsEngine},
    };

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_names_follow_host_not_resolved_ip() {
        let (socket, handle) = FakeSocket::new(Some("93.184.216.34:443"));
        handle.fire();
        let tcp = TcpConnector::with_parts(
            Arc::new(FakeResolver::new().answer("example.com", "93.184.216.34")),
            Arc::new(FakeOpener::new().push(socket)),
            ConnectorConfig::default(),
        );
        let engine = Arc::new(FakeTlsEngine::succeeding());
        let secure = SecureConnector::with_engine(Arc::new(tcp), engine.clone());

        let stream = secure.create("example.com", 443).await.unwrap();
        assert!(stream.is_encrypted());

        let seen = engine.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].peer_name.as_deref(), Some("example.com"));
        assert_eq!(seen[0].sni_server_name.as_deref(), Some("example.com"));
        assert_eq!(seen[0].sni_enabled, Some(true));
        assert_eq!(seen[0].disable_compression, Some(true));
    }

    #[tokio::test]
    async fn test_names_through_static_target() {
        let inner = Arc::new(FakeConnector::new());
        let proxy = StaticTargetConnector::new(inner.clone(), "proxy.example.com", 8080);
        let engine = Arc::new(FakeTlsEngine::succeeding());
        let secure = SecureConnector::with_engine(Arc::new(proxy), engine.clone());

        secure.create("example.com", 443).await.unwrap();
        assert_eq!(inner.calls(), vec![(String::from("proxy.example.com"), 8080)]);
        assert_eq!(engine.seen()[0].peer_name.as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_handshake_failure_closes_stream() {
        let inner = Arc::new(FakeConnector::new());
        let engine = Arc::new(FakeTlsEngine::failing());
        let secure = SecureConnector::with_engine(inner.clone(), engine);

        let err = secure.create("example.com", 443).await.err().unwrap();
        assert!(matches!(err, ConnectError::TlsHandshake { .. }));

        // The plaintext connection was closed: its peer reads EOF.
        let mut remote = inner.take_remote().unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(remote.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inner_failure_skips_handshake() {
        let engine = Arc::new(FakeTlsEngine::succeeding());
        let secure =
            SecureConnector::with_engine(Arc::new(FakeConnector::failing()), engine.clone());

        let err = secure.create("example.com", 443).await.err().unwrap();
        assert!(err.is_refused());
        assert!(engine.seen().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_handshake() {
        let inner = Arc::new(FakeConnector::new());
        let secure = SecureConnector::with_engine(inner.clone(), Arc::new(FakeTlsEngine::hanging()));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = secure
            .create_cancellable("example.com", 443, cancel)
            .await
            .err()
            .unwrap();
        assert!(err.is_cancelled());
        let mut remote = inner.take_remote().unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(remote.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_with_context_is_persistent() {
        let base = SecureConnector::new(Arc::new(FakeConnector::new()))
            .with_context(&map(json!({ "ssl.peer_name": "base.example" })))
            .unwrap();

        let cleared = base.with_context(&map(json!({ "peer_name": null }))).unwrap();
        let named = base.with_context(&map(json!({ "peer_name": "x" }))).unwrap();

        assert_eq!(base.tls_options().peer_name.as_deref(), Some("base.example"));
        assert_eq!(cleared.tls_options().peer_name, None);
        assert_eq!(named.tls_options().peer_name.as_deref(), Some("x"));

        assert!(base.with_context(&map(json!({ "verify_peer": 1 }))).is_err());
    }

    #[test]
    fn test_with_context_rejects_non_tls_keys() {
        let base = SecureConnector::new(Arc::new(FakeConnector::new()));

        let err = base
            .with_context(&map(json!({ "connect_timeout": 5 })))
            .err()
            .unwrap();
        assert!(matches!(err, ConnectError::InvalidOption { .. }));
        assert!(base.with_context(&map(json!({ "tcp_nodelay": true }))).is_err());

        // Prefixed keys the crate does not know are passed through.
        let tls = base
            .with_context(&map(json!({ "ssl.ciphers": "HIGH", "verify_peer": false })))
            .unwrap();
        assert_eq!(tls.tls_options().passthrough.get("ciphers"), Some(&json!("HIGH")));
        assert_eq!(tls.tls_options().verify_peer, Some(false));
    }

    #[tokio::test]
    async fn test_configured_peer_name_survives_inner_layers() {
        let (socket, handle) = FakeSocket::new(Some("93.184.216.34:443"));
        handle.fire();
        let config = ConnectorConfig::default()
            .with_context(&map(json!({ "ssl.peer_name": "backend.internal" })))
            .unwrap();
        let tcp = TcpConnector::with_parts(
            Arc::new(FakeResolver::new().answer("example.com", "93.184.216.34")),
            Arc::new(FakeOpener::new().push(socket)),
            config,
        );
        let engine = Arc::new(FakeTlsEngine::succeeding());
        let secure = SecureConnector::with_engine(Arc::new(tcp), engine.clone());

        let stream = secure.create("example.com", 443).await.unwrap();
        let seen = engine.seen();
        assert_eq!(seen[0].peer_name.as_deref(), Some("backend.internal"));
        // Nothing configured the SNI name, so it follows the host.
        assert_eq!(seen[0].sni_server_name.as_deref(), Some("example.com"));
        assert_eq!(
            stream.context().tls.peer_name.as_deref(),
            Some("backend.internal")
        );
    }

    #[tokio::test]
    async fn test_proxy_host_name_does_not_leak() {
        let (socket, handle) = FakeSocket::new(Some("10.0.0.9:8443"));
        handle.fire();
        let tcp = TcpConnector::with_parts(
            Arc::new(FakeResolver::new().answer("proxy.example.com", "10.0.0.9")),
            Arc::new(FakeOpener::new().push(socket)),
            ConnectorConfig::default(),
        );
        let proxy = StaticTargetConnector::new(Arc::new(tcp), "proxy.example.com", 8443);
        let engine = Arc::new(FakeTlsEngine::succeeding());
        let secure = SecureConnector::with_engine(Arc::new(proxy), engine.clone());

        secure.create("example.com", 443).await.unwrap();
        let seen = engine.seen();
        assert_eq!(seen[0].peer_name.as_deref(), Some("example.com"));
        assert_eq!(seen[0].sni_server_name.as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_wildcard_peer_name_is_ignored() {
        let engine = Arc::new(FakeTlsEngine::succeeding());
        let secure = SecureConnector::with_engine(Arc::new(FakeConnector::new()), engine.clone())
            .with_context(&map(json!({ "ssl.CN_match": "*.example.com", "ssl.verify_peer": false })))
            .unwrap();

        secure.create("www.example.com", 443).await.unwrap();
        let seen = engine.seen();
        assert_eq!(seen[0].peer_name.as_deref(), Some("www.example.com"));
        assert_eq!(seen[0].verify_peer, Some(false));
    }
}
