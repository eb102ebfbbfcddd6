use tracing::debug;

use crate::utils::ConnectError;

use super::PendingSocket;

/// Tell a genuinely connected socket from one the peer refused.
///
/// A connected socket can always report its peer; failing to read it back is
/// taken as proof of refusal. The socket is left open: closing it is up to the
/// caller.
pub fn validate(socket: &dyn PendingSocket, addr: &str) -> Result<String, ConnectError> {
    match socket.peer_name() {
        Ok(peer) => Ok(peer),
        Err(probe) => {
            // Prefer the OS's own reason (e.g. ECONNREFUSED) over the probe's ENOTCONN.
            let source = match socket.take_error() {
                Ok(Some(e)) => e,
                _ => probe,
            };
            debug!(addr, error = %source, "peer probe failed");
            Err(ConnectError::ConnectionRefused {
                addr: addr.to_string(),
                source: Some(source),
            })
        }
    }
}
