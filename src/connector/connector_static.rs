use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ConnResult, Connector};

/// The host/port to connect to is set once during instantiation, the actual
/// target host/port is then ignored.
#[derive(Clone)]
pub struct StaticTargetConnector {
    inner: Arc<dyn Connector>,
    host: String,
    port: u16,
}

impl StaticTargetConnector {
    pub fn new(inner: Arc<dyn Connector>, host: impl Into<String>, port: u16) -> Self {
        Self {
            inner,
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Connector for StaticTargetConnector {
    fn create_cancellable<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        cancel: CancellationToken,
    ) -> ConnResult<'a> {
        debug!(
            requested = %format!("{host}:{port}"),
            target = %format!("{}:{}", self.host, self.port),
            "static target"
        );
        self.inner.create_cancellable(&self.host, self.port, cancel)
    }
}
