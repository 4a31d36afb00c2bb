//! Actor System for Live Updates
//!
//! Message-passing concurrency on the server side:
//!
//! ```text
//! Build pipeline --> Coordinator --> HubActor --> Clients
//!   (outcome)        (variants)     (broadcast)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types sent to hub actors
//! - `hub` - WebSocket broadcast per endpoint
//! - `coordinator` - Maps build variants to hubs

pub mod coordinator;
pub mod hub;
pub mod messages;

pub use coordinator::{BuildObserver, Coordinator};
