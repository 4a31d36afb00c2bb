//! Hub Actor - Broadcast Endpoint
//!
//! One hub serves one (address, port) endpoint and every build variant
//! configured for it. It is responsible for:
//! - Tracking connected WebSocket clients
//! - Fanning out channel-scoped events in publish order
//! - Dropping clients that closed or failed
//!
//! # Architecture
//!
//! ```text
//! acceptor thread --[Connect]--> HubActor --[frame]--> Clients
//!                                   ^
//! Coordinator ------[Publish]-------+
//! reader thread  --[close detected]--> clients set
//! ```

mod client_io;
mod delivery;

#[cfg(test)]
mod tests;

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tungstenite::WebSocket;

use super::messages::HubMsg;
use crate::reload::message::{BuildResult, Event, Message};
use crate::reload::registry::Endpoint;
use crate::reload::server;

/// Hub setup errors
#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to bind {endpoint}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("hub must be started from within a tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Identifier of one connection, unique within its hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

/// A connected client, owned by its hub for the duration of the connection
struct ClientHandle {
    id: ClientId,
    peer: SocketAddr,
    ws: WebSocket<TcpStream>,
}

type ClientSet = Arc<Mutex<Vec<ClientHandle>>>;

/// Cloneable handle to a running hub.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubShared>,
}

struct HubShared {
    endpoint: Endpoint,
    local_addr: SocketAddr,
    tx: mpsc::UnboundedSender<HubMsg>,
    clients: ClientSet,
    stopped: Arc<AtomicBool>,
}

impl Hub {
    /// Bind the endpoint and start serving.
    ///
    /// Bind failures are returned to the caller; nothing is spawned in that case.
    pub fn start(endpoint: Endpoint) -> Result<Self, HubError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| HubError::NoRuntime)?;
        let (listener, local_addr) = server::bind(&endpoint)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let clients: ClientSet = Arc::new(Mutex::new(Vec::new()));
        let stopped = Arc::new(AtomicBool::new(false));

        server::spawn_acceptor(listener, tx.clone(), Arc::clone(&stopped));

        let reader_clients = Arc::clone(&clients);
        let reader_stopped = Arc::clone(&stopped);
        std::thread::spawn(move || {
            HubActor::client_reader_loop(reader_clients, reader_stopped);
        });

        let actor = HubActor::new(rx, Arc::clone(&clients), Arc::clone(&stopped));
        runtime.spawn(actor.run());

        crate::log!("hub"; "listening on {}", local_addr);

        Ok(Self {
            inner: Arc::new(HubShared {
                endpoint,
                local_addr,
                tx,
                clients,
                stopped,
            }),
        })
    }

    /// Endpoint this hub was requested for
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn is_listening(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire)
    }

    /// Number of currently registered clients
    pub fn client_count(&self) -> usize {
        self.inner.clients.lock().len()
    }

    /// Queue an event for every open client.
    ///
    /// Clients that are not connected right now never see it.
    pub fn publish(&self, event: Event) {
        if self.inner.tx.send(HubMsg::Publish(event)).is_err() {
            crate::debug!("hub"; "{} is shut down, event dropped", self.inner.endpoint);
        }
    }

    /// Publish `message` on `channel`
    pub fn broadcast(&self, channel: &str, message: Message) {
        self.publish(Event::new(channel, message));
    }

    /// Announce a finished build: `done`, then `replace` if it has no errors.
    pub fn announce_build(&self, channel: &str, result: &BuildResult) {
        for event in result.events(channel) {
            self.publish(event);
        }
    }

    /// Close every client and stop accepting.
    pub fn shutdown(&self) {
        let _ = self.inner.tx.send(HubMsg::Shutdown);
        // Stops acceptor and reader even if the actor's runtime is gone
        self.inner.stopped.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("endpoint", &self.inner.endpoint)
            .field("local_addr", &self.inner.local_addr)
            .finish()
    }
}

/// Hub Actor - owns the publish path of one hub
pub struct HubActor {
    /// Channel to receive messages
    rx: mpsc::UnboundedReceiver<HubMsg>,
    /// Connected clients (shared with the reader thread)
    clients: ClientSet,
    /// Set once shut down; stops acceptor and reader threads
    stopped: Arc<AtomicBool>,
    next_id: u64,
}

impl HubActor {
    fn new(rx: mpsc::UnboundedReceiver<HubMsg>, clients: ClientSet, stopped: Arc<AtomicBool>) -> Self {
        Self {
            rx,
            clients,
            stopped,
            next_id: 0,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                HubMsg::Connect(ws, peer) => {
                    self.on_connect(ws, peer);
                }

                HubMsg::Publish(event) => {
                    self.publish(&event);
                }

                HubMsg::Shutdown => {
                    crate::debug!("hub"; "shutting down");
                    self.close_all();
                    break;
                }
            }
        }
        self.stopped.store(true, Ordering::Release);
    }
}
