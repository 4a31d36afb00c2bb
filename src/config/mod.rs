//! Configuration management for `refresh.toml`.
//!
//! # Sections
//!
//! | Section                | Purpose                                        |
//! |------------------------|------------------------------------------------|
//! | `[hub]`                | Default endpoint every variant publishes on    |
//! | `[variants.<name>]`    | One build variant (channel), optional endpoint |
//!
//! # Example
//!
//! ```toml
//! [hub]
//! address = "0.0.0.0"   # all interfaces
//! port = 45678
//!
//! [variants.dashboard]
//!
//! [variants.graphics]
//! port = 45679          # own hub for this variant
//! ```

mod error;

pub use error::{ConfigDiagnostic, ConfigDiagnostics, ConfigError};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::log;
use crate::reload::registry::Endpoint;

/// Default config file name
pub const CONFIG_FILE: &str = "refresh.toml";

/// Default hub address (all interfaces)
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";

/// Default hub port
pub const DEFAULT_PORT: u16 = 45678;

/// Hub endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Address to bind.
    /// - `0.0.0.0` (default): all interfaces
    /// - `127.0.0.1`: localhost only
    pub address: String,

    /// Port to bind (`0` picks a free port).
    pub port: u16,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// One build variant. Unset fields fall back to `[hub]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantConfig {
    pub address: Option<String>,
    pub port: Option<u16>,
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub hub: HubConfig,
    pub variants: BTreeMap<String, VariantConfig>,
}

impl RefreshConfig {
    /// Load and validate configuration from `path`.
    ///
    /// Unknown fields are reported and ignored.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();

        if self.hub.address.trim().is_empty() {
            diag.error("hub.address", "address must not be empty");
        }

        if self.variants.is_empty() {
            diag.error_with_hint(
                "variants",
                "no build variants configured",
                "add a section such as [variants.dashboard]",
            );
        }

        for (name, variant) in &self.variants {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                diag.error(
                    format!("variants.{name}"),
                    "variant name must be non-empty and contain no whitespace",
                );
            }
            if let Some(address) = &variant.address
                && address.trim().is_empty()
            {
                diag.error(format!("variants.{name}.address"), "address must not be empty");
            }
        }

        diag.into_result()
    }

    /// Override `[hub]` from the command line.
    pub fn apply_overrides(&mut self, address: Option<String>, port: Option<u16>) {
        if let Some(address) = address {
            self.hub.address = address;
        }
        if let Some(port) = port {
            self.hub.port = port;
        }
    }

    /// Endpoint the named variant publishes on
    pub fn endpoint_for(&self, variant: &str) -> Option<Endpoint> {
        let config = self.variants.get(variant)?;
        Some(Endpoint::new(
            config.address.clone().unwrap_or_else(|| self.hub.address.clone()),
            config.port.unwrap_or(self.hub.port),
        ))
    }
}
