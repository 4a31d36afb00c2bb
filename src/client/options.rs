//! Client connection options.
//!
//! A client derives its defaults from the page (or process) it runs in and
//! lets the bootstrap object injected at build time override any field:
//!
//! ```text
//! page   http://localhost:8080/dashboard.html  -> ws, localhost, 8080
//! inject {"name":"dashboard","port":45678}     -> ws://localhost:45678, channel "dashboard"
//! ```

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;

/// Bootstrap object injected into client builds. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl BootstrapOptions {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s)
            .map_err(|e| ConfigError::Validation(format!("invalid bootstrap options: {e}")))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Location of the host page, source of the derived defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub scheme: String,
    pub hostname: String,
    pub port: Option<u16>,
}

impl PageLocation {
    pub fn parse(page: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(page)
            .map_err(|e| ConfigError::Validation(format!("invalid page url `{page}`: {e}")))?;
        let hostname = url
            .host_str()
            .ok_or_else(|| ConfigError::Validation(format!("page url `{page}` has no host")))?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            hostname: hostname.to_string(),
            port: url.port_or_known_default(),
        })
    }

    /// WebSocket scheme matching the page scheme (`http` -> `ws`, `https` -> `wss`)
    pub fn socket_protocol(&self) -> String {
        match self.scheme.strip_prefix("http") {
            Some(rest) => format!("ws{rest}"),
            None => self.scheme.clone(),
        }
    }
}

/// Fully resolved connection options of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub protocol: String,
    pub address: String,
    pub port: u16,
    /// Channel this client listens to
    pub name: String,
}

impl ClientOptions {
    /// Derive from the page location, then apply bootstrap overrides.
    pub fn resolve(location: &PageLocation, overrides: &BootstrapOptions) -> Result<Self, ConfigError> {
        let protocol = overrides
            .protocol
            .clone()
            .unwrap_or_else(|| location.socket_protocol());
        let address = overrides
            .address
            .clone()
            .unwrap_or_else(|| location.hostname.clone());
        let port = overrides
            .port
            .or(location.port)
            .ok_or_else(|| ConfigError::Validation("client port is required".into()))?;
        let name = overrides
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ConfigError::Validation("client channel name is required".into()))?;

        let protocol = protocol.trim_end_matches(':').to_string();
        if protocol != "ws" && protocol != "wss" {
            return Err(ConfigError::Validation(format!(
                "unsupported socket protocol `{protocol}`"
            )));
        }

        Ok(Self {
            protocol,
            address,
            port,
            name,
        })
    }

    /// Socket URL, e.g. `ws://localhost:45678`
    pub fn url(&self) -> String {
        let host = if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        };
        format!("{}://{}:{}", self.protocol, host, self.port)
    }
}
