use std::{net::IpAddr, sync::Arc};

use tracing::debug;

use crate::{address::parse_ip_literal, utils::ConnectError};

use super::{Resolver, SystemResolver};

/// Front door for name resolution. IP literals never reach the DNS collaborator.
#[derive(Clone)]
pub struct HostnameResolver {
    resolver: Arc<dyn Resolver>,
}

impl Default for HostnameResolver {
    fn default() -> Self {
        Self::new(Arc::new(SystemResolver))
    }
}

impl HostnameResolver {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    pub async fn resolve(&self, host: &str) -> Result<IpAddr, ConnectError> {
        if let Some(ip) = parse_ip_literal(host) {
            return Ok(ip);
        }

        debug!(host, "resolving");
        self.resolver
            .resolve(host)
            .await
            .map_err(|source| ConnectError::Resolution {
                host: host.to_string(),
                source,
            })
    }
}
