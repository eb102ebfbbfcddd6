use std::{collections::BTreeMap, path::PathBuf};

use serde_json::Value;

use crate::{address::parser::strip_brackets, utils::ConnectError};

use super::value::{opt_bool, opt_string};

/// TLS settings carried alongside a connection.
///
/// Unset fields fall back to the defaults exposed by the accessor methods.
/// Keys the crate does not understand are kept verbatim in `passthrough`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsOptions {
    pub peer_name: Option<String>,
    pub sni_enabled: Option<bool>,
    pub sni_server_name: Option<String>,
    pub disable_compression: Option<bool>,
    pub verify_peer: Option<bool>,
    pub verify_peer_name: Option<bool>,
    pub allow_self_signed: Option<bool>,
    pub ca_file: Option<PathBuf>,
    pub local_cert: Option<PathBuf>,
    pub local_pk: Option<PathBuf>,
    pub passphrase: Option<String>,
    pub passthrough: BTreeMap<String, Value>,
}

/// Short keys [`TlsOptions::set`] maps to a field.
pub const TLS_KEYS: &[&str] = &[
    "peer_name",
    "CN_match",
    "SNI_enabled",
    "SNI_server_name",
    "disable_compression",
    "verify_peer",
    "verify_peer_name",
    "allow_self_signed",
    "cafile",
    "local_cert",
    "local_pk",
    "passphrase",
];

fn is_wildcard(name: &str) -> bool {
    name.contains('*')
}

impl TlsOptions {
    pub fn sni_enabled(&self) -> bool {
        self.sni_enabled.unwrap_or(true)
    }

    pub fn disable_compression(&self) -> bool {
        self.disable_compression.unwrap_or(true)
    }

    pub fn verify_peer(&self) -> bool {
        self.verify_peer.unwrap_or(true)
    }

    pub fn verify_peer_name(&self) -> bool {
        self.verify_peer_name.unwrap_or(true)
    }

    pub fn allow_self_signed(&self) -> bool {
        self.allow_self_signed.unwrap_or(false)
    }

    /// Set one option by its short key (without the `ssl.` prefix).
    /// A JSON `null` removes the entry.
    pub fn set(&mut self, key: &str, value: &Value) -> Result<(), ConnectError> {
        let full = format!("ssl.{key}");
        match key {
            // CN_match is the legacy spelling of peer_name.
            "peer_name" | "CN_match" => self.peer_name = opt_string(&full, value)?,
            "SNI_enabled" => self.sni_enabled = opt_bool(&full, value)?,
            "SNI_server_name" => self.sni_server_name = opt_string(&full, value)?,
            "disable_compression" => self.disable_compression = opt_bool(&full, value)?,
            "verify_peer" => self.verify_peer = opt_bool(&full, value)?,
            "verify_peer_name" => self.verify_peer_name = opt_bool(&full, value)?,
            "allow_self_signed" => self.allow_self_signed = opt_bool(&full, value)?,
            "cafile" => self.ca_file = opt_string(&full, value)?.map(PathBuf::from),
            "local_cert" => self.local_cert = opt_string(&full, value)?.map(PathBuf::from),
            "local_pk" => self.local_pk = opt_string(&full, value)?.map(PathBuf::from),
            "passphrase" => self.passphrase = opt_string(&full, value)?,
            _ if value.is_null() => {
                self.passthrough.remove(key);
            }
            _ => {
                self.passthrough.insert(key.to_string(), value.clone());
            }
        }
        Ok(())
    }

    /// Field-wise merge where values set in `overrides` win.
    pub fn merged_with(&self, overrides: &TlsOptions) -> TlsOptions {
        let mut passthrough = self.passthrough.clone();
        passthrough.extend(
            overrides
                .passthrough
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        TlsOptions {
            peer_name: overrides.peer_name.clone().or_else(|| self.peer_name.clone()),
            sni_enabled: overrides.sni_enabled.or(self.sni_enabled),
            sni_server_name: overrides
                .sni_server_name
                .clone()
                .or_else(|| self.sni_server_name.clone()),
            disable_compression: overrides.disable_compression.or(self.disable_compression),
            verify_peer: overrides.verify_peer.or(self.verify_peer),
            verify_peer_name: overrides.verify_peer_name.or(self.verify_peer_name),
            allow_self_signed: overrides.allow_self_signed.or(self.allow_self_signed),
            ca_file: overrides.ca_file.clone().or_else(|| self.ca_file.clone()),
            local_cert: overrides.local_cert.clone().or_else(|| self.local_cert.clone()),
            local_pk: overrides.local_pk.clone().or_else(|| self.local_pk.clone()),
            passphrase: overrides.passphrase.clone().or_else(|| self.passphrase.clone()),
            passthrough,
        }
    }

    /// Fill in the names the certificate is checked against.
    ///
    /// `host` must be the hostname the caller asked for, not the address it
    /// resolved to. Explicit names win unless they are wildcards.
    pub fn normalized_for(&self, host: &str) -> TlsOptions {
        let host = strip_brackets(host);
        let pick = |name: &Option<String>| match name {
            Some(name) if !is_wildcard(name) => name.clone(),
            _ => host.to_string(),
        };
        TlsOptions {
            peer_name: Some(pick(&self.peer_name)),
            sni_enabled: Some(self.sni_enabled()),
            sni_server_name: Some(pick(&self.sni_server_name)),
            disable_compression: Some(self.disable_compression()),
            ..self.clone()
        }
    }
}
