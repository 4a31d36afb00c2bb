use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::{CloseFrame, Message};

use super::HubActor;
use super::client_io::on_disconnect;
use crate::reload::message::Event;

impl HubActor {
    /// Send an event to every client in OPEN state.
    ///
    /// Closing or half-open clients are skipped; failed clients are dropped.
    pub(super) fn publish(&self, event: &Event) {
        let mut clients = self.clients.lock();

        if clients.is_empty() {
            crate::debug!("hub"; "no clients connected, {} on {} dropped", event.message.kind(), event.channel);
            return;
        }

        let frame = Message::Text(event.to_json().into());
        let mut sent = 0;
        let mut failed = Vec::new();

        for client in clients.iter_mut() {
            if !client.ws.can_write() {
                continue;
            }
            match client.ws.send(frame.clone()) {
                Ok(()) => sent += 1,
                // Frame stays queued, the reader thread flushes it
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    sent += 1;
                }
                Err(e) => {
                    crate::debug!("hub"; "send to {} failed: {}", client.peer, e);
                    failed.push(client.id);
                }
            }
        }

        for id in failed {
            on_disconnect(&mut clients, id);
        }

        crate::debug!("hub"; "{} on {} sent to {} clients", event.message.kind(), event.channel, sent);
    }

    /// Close every client with "going away"
    pub(super) fn close_all(&self) {
        let mut clients = self.clients.lock();
        for mut client in clients.drain(..) {
            let _ = client.ws.close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "hub closed".into(),
            }));
            let _ = client.ws.flush();
        }
    }
}
