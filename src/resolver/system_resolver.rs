use std::net::IpAddr;

use tokio::net::lookup_host;

use crate::utils::{BoxedError, PBF};

use super::Resolver;

/// Resolves through the operating system, off the caller's task.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

async fn lookup_first(host: &str) -> Result<IpAddr, BoxedError> {
    let mut addrs = lookup_host((host, 0)).await?;
    match addrs.next() {
        Some(addr) => Ok(addr.ip()),
        None => Err(format!("no addresses found for {host}").into()),
    }
}

impl Resolver for SystemResolver {
    fn resolve<'a>(&'a self, host: &'a str) -> PBF<'a, Result<IpAddr, BoxedError>> {
        Box::pin(lookup_first(host))
    }
}
