//! Actor Message Definitions
//!
//! ```text
//! acceptor thread --Connect--> HubActor <--Publish-- Coordinator
//! ```

use std::net::{SocketAddr, TcpStream};

use tungstenite::WebSocket;

use crate::reload::message::Event;

/// Messages to Hub Actor
pub enum HubMsg {
    /// Handshake completed, register client
    Connect(WebSocket<TcpStream>, SocketAddr),
    /// Fan out an event to every open client
    Publish(Event),
    /// Close all clients and stop listening
    Shutdown,
}
