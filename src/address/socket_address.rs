use std::{fmt::Display, str::FromStr};

use crate::utils::ConnectError;

use super::parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Tcp,
    Tls,
    Unix,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
            Scheme::Tls => "tls",
            Scheme::Unix => "unix",
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Scheme::Tcp),
            "tls" | "ssl" => Ok(Scheme::Tls),
            "unix" => Ok(Scheme::Unix),
            other => Err(ConnectError::address(s, format!("unsupported scheme {other:?}"))),
        }
    }
}

/// A parsed connection target.
///
/// `host` is never empty and never carries IPv6 brackets; they are added back
/// by [`parser::format`]. For `unix` targets only `path` matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketAddress {
    pub scheme: Scheme,
    pub host: String,
    pub port: Option<u16>,
    pub path: Option<String>,
}

impl SocketAddress {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: Scheme::Tcp,
            host: parser::strip_brackets(&host.into()).to_string(),
            port: Some(port),
            path: None,
        }
    }

    pub fn unix(path: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Unix,
            host: String::from(parser::DEFAULT_HOST),
            port: None,
            path: Some(path.into()),
        }
    }

    /// Same target, different host. Used to swap a hostname for its resolved IP.
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self {
            host: parser::strip_brackets(&host.into()).to_string(),
            ..self.clone()
        }
    }

    pub fn is_ip_literal(&self) -> bool {
        parser::is_ip_literal(&self.host)
    }

    /// The port, or an error naming the target when there is none.
    pub fn require_port(&self) -> Result<u16, ConnectError> {
        self.port
            .ok_or_else(|| ConnectError::address(self.to_string(), "port missing"))
    }
}

impl Display for SocketAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&parser::format(self))
    }
}

impl FromStr for SocketAddress {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse(s)
    }
}
