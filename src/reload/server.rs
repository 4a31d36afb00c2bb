//! WebSocket Server for Live Update
//!
//! Binds the hub's listening socket and accepts clients on a dedicated
//! thread. Completed handshakes are sent to the HubActor via channel.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tungstenite::WebSocket;

use super::registry::Endpoint;
use crate::actor::hub::HubError;
use crate::actor::messages::HubMsg;

/// Poll interval of the non-blocking accept loop
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Deadline for a peer to complete the WebSocket upgrade
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind the endpoint's listening socket.
///
/// Runs synchronously so a bind failure reaches the caller that asked for the hub.
pub fn bind(endpoint: &Endpoint) -> Result<(TcpListener, SocketAddr), HubError> {
    let listener = TcpListener::bind((endpoint.address.as_str(), endpoint.port)).map_err(
        |source| HubError::Bind {
            endpoint: endpoint.clone(),
            source,
        },
    )?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

/// Spawn the acceptor thread.
///
/// Each handshake runs on its own short-lived thread with a deadline, so a
/// peer that never upgrades cannot hold up the accept loop. Only open
/// sockets reach the actor. The thread exits once `stopped` is set.
pub fn spawn_acceptor(
    listener: TcpListener,
    hub_tx: mpsc::UnboundedSender<HubMsg>,
    stopped: Arc<AtomicBool>,
) {
    std::thread::spawn(move || {
        while !stopped.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    crate::debug!("hub"; "incoming connection: {}", addr);
                    if hub_tx.is_closed() {
                        crate::debug!("hub"; "actor gone, acceptor exiting");
                        break;
                    }
                    let hub_tx = hub_tx.clone();
                    std::thread::spawn(move || {
                        if let Some(ws) = handshake(stream, addr) {
                            let _ = hub_tx.send(HubMsg::Connect(ws, addr));
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    crate::log!("hub"; "accept error: {}", e);
                    std::thread::sleep(ACCEPT_POLL);
                }
            }
        }
    });
}

/// Handshake bounded by [`HANDSHAKE_TIMEOUT`], then switch to non-blocking
/// for polled reads.
fn handshake(stream: TcpStream, addr: SocketAddr) -> Option<WebSocket<TcpStream>> {
    // The accepted socket inherits non-blocking mode from the listener
    let prepared = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)))
        .and_then(|()| stream.set_write_timeout(Some(HANDSHAKE_TIMEOUT)));
    if let Err(e) = prepared {
        crate::debug!("hub"; "dropping {}: {}", addr, e);
        return None;
    }

    match tungstenite::accept(stream) {
        Ok(ws) => {
            let socket = ws.get_ref();
            let ready = socket
                .set_read_timeout(None)
                .and_then(|()| socket.set_write_timeout(None))
                .and_then(|()| socket.set_nonblocking(true));
            match ready {
                Ok(()) => Some(ws),
                Err(e) => {
                    crate::debug!("hub"; "dropping {}: {}", addr, e);
                    None
                }
            }
        }
        Err(e) => {
            crate::debug!("hub"; "handshake with {} failed: {}", addr, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral() {
        let endpoint = Endpoint::new("127.0.0.1", 0);
        let (_listener, addr) = bind(&endpoint).unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let endpoint = Endpoint::new("127.0.0.1", 0);
        let (_listener, addr) = bind(&endpoint).unwrap();

        let taken = Endpoint::new("127.0.0.1", addr.port());
        match bind(&taken) {
            Err(HubError::Bind { endpoint, .. }) => assert_eq!(endpoint, taken),
            other => panic!("expected bind error, got {:?}", other.map(|(_, a)| a)),
        }
    }
}
