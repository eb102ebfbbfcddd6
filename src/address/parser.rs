use std::net::{IpAddr, Ipv6Addr};

use crate::utils::ConnectError;

use super::{Scheme, SocketAddress};

pub const DEFAULT_HOST: &str = "localhost";

/// Remove the square brackets around an IPv6 literal, if present.
pub fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Parse `host` as an IPv4 or IPv6 literal. Bracketed IPv6 is accepted.
pub fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    strip_brackets(host).parse().ok()
}

pub fn is_ip_literal(host: &str) -> bool {
    parse_ip_literal(host).is_some()
}

/// Parse a textual target of the form `[scheme://]host[:port][/path]`.
///
/// A missing scheme means `tcp`. For `unix://` everything after the scheme is
/// the socket path.
pub fn parse(text: &str) -> Result<SocketAddress, ConnectError> {
    let raw = text.trim();
    if raw.is_empty() {
        return Err(ConnectError::address(text, "empty target"));
    }

    // A scheme is a leading word; "://" further in belongs to the path.
    let (scheme, rest) = match raw.split_once("://") {
        Some((scheme, rest)) if !scheme.contains(['/', ':', '@']) => {
            (scheme.parse::<Scheme>()?, rest)
        }
        _ => (Scheme::Tcp, raw),
    };

    if scheme == Scheme::Unix {
        if rest.is_empty() {
            return Err(ConnectError::address(text, "unix target without a path"));
        }
        return Ok(SocketAddress::unix(rest));
    }

    // The authority ends at the first slash, the rest is the path.
    let (authority, path) = match rest.find('/') {
        Some(found) => (&rest[..found], Some(rest[found..].to_string())),
        None => (rest, None),
    };

    // Credentials are not ours to use; skip them.
    let authority = authority.rfind('@').map_or(authority, |p| &authority[p + 1..]);

    let (host, port) = split_host_port(text, authority)?;

    Ok(SocketAddress {
        scheme,
        host: if host.is_empty() {
            String::from(DEFAULT_HOST)
        } else {
            host.to_string()
        },
        port,
        path,
    })
}

fn split_host_port<'a>(
    text: &str,
    authority: &'a str,
) -> Result<(&'a str, Option<u16>), ConnectError> {
    // Bracketed IPv6, optionally followed by a port.
    if let Some(inner) = authority.strip_prefix('[') {
        let end = inner
            .find(']')
            .ok_or_else(|| ConnectError::address(text, "unterminated '['"))?;
        let host = &inner[..end];
        if host.parse::<Ipv6Addr>().is_err() {
            return Err(ConnectError::address(text, "invalid IPv6 literal"));
        }
        let tail = &inner[end + 1..];
        let port = match tail.strip_prefix(':') {
            Some(port) => Some(parse_port(text, port)?),
            None if tail.is_empty() => None,
            None => return Err(ConnectError::address(text, "garbage after ']'")),
        };
        return Ok((host, port));
    }

    // A bare IPv6 literal cannot carry a port.
    if authority.matches(':').count() > 1 {
        return match authority.parse::<Ipv6Addr>() {
            Ok(_) => Ok((authority, None)),
            Err(_) => Err(ConnectError::address(
                text,
                "IPv6 hosts must be bracketed when a port follows",
            )),
        };
    }

    match authority.split_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(text, port)?))),
        None => Ok((authority, None)),
    }
}

fn parse_port(text: &str, port: &str) -> Result<u16, ConnectError> {
    port.parse::<u16>()
        .map_err(|_| ConnectError::address(text, format!("invalid port {port:?}")))
}

/// Serialize an address back to its textual form.
pub fn format(address: &SocketAddress) -> String {
    if address.scheme == Scheme::Unix {
        return format!(
            "{}://{}",
            address.scheme,
            address.path.as_deref().unwrap_or_default()
        );
    }

    let host = if address.host.contains(':') {
        // Enclose IPv6 addresses in square brackets before appending port.
        format!("[{}]", address.host)
    } else {
        address.host.clone()
    };

    match address.port {
        Some(port) => format!("{}://{}:{}", address.scheme, host, port),
        None => format!("{}://{}", address.scheme, host),
    }
}
