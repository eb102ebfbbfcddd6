mod hostname_resolver;
mod system_resolver;

use std::net::IpAddr;

use crate::utils::{BoxedError, PBF};

pub use hostname_resolver::*;
pub use system_resolver::*;

/// The DNS collaborator: turns a hostname into one IP address.
pub trait Resolver: Send + Sync {
    fn resolve<'a>(&'a self, host: &'a str) -> PBF<'a, Result<IpAddr, BoxedError>>;
}
