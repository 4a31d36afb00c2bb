use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::{ClientHandle, ClientId, ClientSet, HubActor};

/// Poll interval of the reader thread
const READ_POLL: Duration = Duration::from_millis(50);

impl HubActor {
    /// Register a client whose handshake completed
    pub(super) fn on_connect(&mut self, ws: WebSocket<TcpStream>, peer: SocketAddr) {
        self.next_id += 1;
        let id = ClientId(self.next_id);

        let mut clients = self.clients.lock();
        clients.push(ClientHandle { id, peer, ws });
        crate::debug!("hub"; "client {} connected (total: {})", peer, clients.len());
    }

    /// Background thread to detect closed clients (non-blocking poll).
    ///
    /// Clients never send anything meaningful; reading only drives close
    /// handshakes, ping replies and flushes of queued frames.
    pub(super) fn client_reader_loop(clients: ClientSet, stopped: Arc<AtomicBool>) {
        while !stopped.load(Ordering::Acquire) {
            std::thread::sleep(READ_POLL);

            let mut clients_guard = clients.lock();
            let mut disconnected = Vec::new();

            for client in clients_guard.iter_mut() {
                match client.ws.read() {
                    Ok(Message::Close(_)) => disconnected.push(client.id),
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(ref e))
                        if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(_) => disconnected.push(client.id),
                }
            }

            for id in disconnected {
                on_disconnect(&mut clients_guard, id);
            }
        }
    }
}

/// Remove a client from the set. Removing an unknown id is a no-op.
pub(super) fn on_disconnect(clients: &mut Vec<ClientHandle>, id: ClientId) -> bool {
    let Some(index) = clients.iter().position(|c| c.id == id) else {
        return false;
    };
    let mut client = clients.swap_remove(index);
    // Push out a queued close reply, if any
    let _ = client.ws.flush();
    crate::debug!("hub"; "client {} disconnected (total: {})", client.peer, clients.len());
    true
}
