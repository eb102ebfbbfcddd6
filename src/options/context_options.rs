use std::time::Duration;

use serde_json::{Map, Value};

use crate::utils::ConnectError;

use super::{
    value::{opt_bool, opt_seconds},
    TlsOptions,
};

/// Per-connection options: timeout override, socket tuning and TLS settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextOptions {
    pub connect_timeout: Option<Duration>,
    pub tcp_nodelay: Option<bool>,
    pub tcp_keepalive: Option<Duration>,
    pub tls: TlsOptions,
}

impl ContextOptions {
    /// Build options from a mapping such as `{"connect_timeout": 5, "ssl.verify_peer": false}`.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ConnectError> {
        let mut options = Self::default();
        options.apply(map)?;
        Ok(options)
    }

    pub fn apply(&mut self, map: &Map<String, Value>) -> Result<(), ConnectError> {
        for (key, value) in map {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Set a single option. `ssl.*` keys go to the TLS options, and a nested
    /// `{"ssl": {...}}` object is accepted too.
    pub fn set(&mut self, key: &str, value: &Value) -> Result<(), ConnectError> {
        match key {
            "connect_timeout" => self.connect_timeout = opt_seconds(key, value)?,
            "tcp_nodelay" => self.tcp_nodelay = opt_bool(key, value)?,
            "tcp_keepalive" => self.tcp_keepalive = opt_seconds(key, value)?,
            "ssl" => match value {
                Value::Object(nested) => {
                    for (key, value) in nested {
                        self.tls.set(key, value)?;
                    }
                }
                Value::Null => self.tls = TlsOptions::default(),
                _ => return Err(ConnectError::option(key, "expected an object")),
            },
            _ => match key.strip_prefix("ssl.") {
                Some(tls_key) => self.tls.set(tls_key, value)?,
                None => return Err(ConnectError::option(key, "unknown option")),
            },
        }
        Ok(())
    }

    /// Field-wise merge where values set in `overrides` win.
    pub fn merged_with(&self, overrides: &ContextOptions) -> ContextOptions {
        ContextOptions {
            connect_timeout: overrides.connect_timeout.or(self.connect_timeout),
            tcp_nodelay: overrides.tcp_nodelay.or(self.tcp_nodelay),
            tcp_keepalive: overrides.tcp_keepalive.or(self.tcp_keepalive),
            tls: self.tls.merged_with(&overrides.tls),
        }
    }

    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.connect_timeout.unwrap_or(default)
    }
}
