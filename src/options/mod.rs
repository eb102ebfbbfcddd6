mod connector_config;
mod context_options;
mod tls_options;
mod value;

pub use connector_config::*;
pub use context_options::*;
pub use tls_options::*;
