//! Endpoint Registry
//!
//! Maps `(address, port)` to the one hub serving it. Build variants that
//! share an endpoint share the hub; the registry is owned by the
//! coordinator and closed explicitly at teardown.

use std::fmt;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::actor::hub::{Hub, HubError};

/// Endpoint key: one hub per `(address, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Whether the address binds every interface
    pub fn is_wildcard(&self) -> bool {
        matches!(self.address.as_str(), "0.0.0.0" | "::" | "[::]")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Registry of running hubs, keyed by endpoint.
#[derive(Default)]
pub struct HubRegistry {
    hubs: Mutex<FxHashMap<Endpoint, Hub>>,
}

impl HubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the hub for `endpoint`, starting it on first request.
    ///
    /// The lock is held across startup so concurrent callers never bind twice.
    pub fn get_or_create(&self, endpoint: &Endpoint) -> Result<Hub, HubError> {
        let mut hubs = self.hubs.lock();
        if let Some(hub) = hubs.get(endpoint) {
            return Ok(hub.clone());
        }

        let hub = Hub::start(endpoint.clone())?;
        hubs.insert(endpoint.clone(), hub.clone());
        Ok(hub)
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<Hub> {
        self.hubs.lock().get(endpoint).cloned()
    }

    pub fn len(&self) -> usize {
        self.hubs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shut down every hub and empty the registry.
    pub fn close_all(&self) {
        let hubs: Vec<_> = self.hubs.lock().drain().map(|(_, hub)| hub).collect();
        for hub in hubs {
            crate::debug!("hub"; "closing {}", hub.endpoint());
            hub.shutdown();
        }
    }
}
