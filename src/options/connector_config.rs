use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::utils::ConnectError;

use super::{value::opt_seconds, ContextOptions};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every attempt a connector makes.
/// Read-only once the connector is built; derive a new one to change it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    pub connect_timeout: Duration,
    pub context: ContextOptions,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            context: ContextOptions::default(),
        }
    }
}

/// On-disk form, e.g. `{"connect_timeout": 5, "context": {"ssl.cafile": "ca.pem"}}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    connect_timeout: Option<Value>,
    context: Map<String, Value>,
}

impl ConnectorConfig {
    pub fn from_json(text: &str) -> Result<Self, ConnectError> {
        let raw: RawConfig =
            serde_json::from_str(text).map_err(|e| ConnectError::option("<config>", e))?;

        let mut config = Self::default();
        if let Some(timeout) = raw
            .connect_timeout
            .as_ref()
            .map(|v| opt_seconds("connect_timeout", v))
            .transpose()?
            .flatten()
        {
            config.connect_timeout = timeout;
        }
        config.context.apply(&raw.context)?;
        Ok(config)
    }

    pub fn with_timeout(&self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self.clone()
        }
    }

    /// A new config with `map` applied on top of this one's context.
    pub fn with_context(&self, map: &Map<String, Value>) -> Result<Self, ConnectError> {
        let mut config = self.clone();
        config.context.apply(map)?;
        Ok(config)
    }
}
