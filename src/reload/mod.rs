//! Reload Module
//!
//! Server-side plumbing of the live-update protocol.
//!
//! # Modules
//!
//! - `message` - Wire frames (`done`, `replace`, `reload`) and build outcomes
//! - `registry` - One hub per `(address, port)` endpoint
//! - `server` - Listening socket and WebSocket handshake thread

pub mod message;
pub mod registry;
pub mod server;
