//! Coordinator - Wires Build Variants to Hubs
//!
//! The Coordinator is a thin orchestrator that:
//! - Owns the endpoint registry
//! - Resolves each configured variant to the hub serving its endpoint
//! - Forwards build outcomes and forced reloads to that hub
//! - Derives the bootstrap object injected into each variant's client
//!
//! ```text
//! build pipeline --on_build_complete--> Coordinator --> Hub(address:port)
//!                                          |              |-- "dashboard"
//!                                          |              '-- "graphics"
//!                                          '--> Hub(other endpoint)
//! ```

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use super::hub::Hub;
use crate::client::BootstrapOptions;
use crate::config::RefreshConfig;
use crate::reload::message::{BuildResult, Message};
use crate::reload::registry::HubRegistry;

/// Receives the outcome of every build cycle.
pub trait BuildObserver {
    fn on_build_complete(&self, result: &BuildResult);
}

/// Publishes one variant's builds on its hub channel.
#[derive(Debug, Clone)]
pub struct VariantPublisher {
    channel: String,
    hub: Hub,
}

impl VariantPublisher {
    pub fn new(channel: impl Into<String>, hub: Hub) -> Self {
        Self {
            channel: channel.into(),
            hub,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Tell every client on this channel to reload fully.
    pub fn reload(&self) {
        self.hub.broadcast(&self.channel, Message::Reload);
    }
}

impl BuildObserver for VariantPublisher {
    fn on_build_complete(&self, result: &BuildResult) {
        crate::debug!(
            "hub"; "{} build {}: {} errors, {} warnings",
            self.channel,
            result.hash,
            result.errors.len(),
            result.warnings.len()
        );
        self.hub.announce_build(&self.channel, result);
    }
}

/// Hot-update file names for one variant.
///
/// Variants sharing an output tree need distinct names so their update
/// chunks and manifests do not overwrite each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotUpdateNames {
    pub chunk_filename: String,
    pub main_filename: String,
}

impl HotUpdateNames {
    pub fn for_variant(name: &str) -> Self {
        Self {
            chunk_filename: format!("{name}.[id].hot-update.js"),
            main_filename: format!("[runtime]-{name}.hot-update.json"),
        }
    }
}

/// Everything a variant's build needs to embed a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantBootstrap {
    pub variant: String,
    pub client: BootstrapOptions,
    pub hot_update: HotUpdateNames,
}

/// Coordinator - owns the registry and one publisher per running variant.
pub struct Coordinator {
    config: RefreshConfig,
    registry: HubRegistry,
    variants: BTreeMap<String, VariantPublisher>,
}

impl Coordinator {
    pub fn new(config: RefreshConfig) -> Self {
        Self {
            config,
            registry: HubRegistry::new(),
            variants: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn registry(&self) -> &HubRegistry {
        &self.registry
    }

    /// Start every configured variant.
    ///
    /// A variant whose hub cannot bind is logged and skipped; the others
    /// keep running. Fails only when no variant could start.
    pub fn start(&mut self) -> Result<()> {
        let names: Vec<String> = self.config.variants.keys().cloned().collect();
        for name in &names {
            if let Err(e) = self.start_variant(name) {
                crate::log!("error"; "variant {}: {:#}", name, e);
            }
        }

        if self.variants.is_empty() {
            anyhow::bail!("no build variant could be started");
        }
        crate::debug!("hub"; "{} variants on {} hubs", self.variants.len(), self.registry.len());
        Ok(())
    }

    /// Start one variant, reusing the hub of an identical endpoint.
    pub fn start_variant(&mut self, name: &str) -> Result<&VariantPublisher> {
        let endpoint = self
            .config
            .endpoint_for(name)
            .with_context(|| format!("unknown variant `{name}`"))?;
        let hub = self
            .registry
            .get_or_create(&endpoint)
            .with_context(|| format!("failed to start hub for `{name}`"))?;

        Ok(self
            .variants
            .entry(name.to_string())
            .or_insert_with(|| VariantPublisher::new(name, hub)))
    }

    pub fn variant(&self, name: &str) -> Option<&VariantPublisher> {
        self.variants.get(name)
    }

    pub fn variant_names(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    /// Forward a build outcome. Returns `false` for a variant that is not running.
    pub fn on_build_complete(&self, variant: &str, result: &BuildResult) -> bool {
        match self.variants.get(variant) {
            Some(publisher) => {
                publisher.on_build_complete(result);
                true
            }
            None => {
                crate::debug!("hub"; "build for unknown variant {} dropped", variant);
                false
            }
        }
    }

    /// Force a full reload of every client on `variant`.
    pub fn reload(&self, variant: &str) -> bool {
        match self.variants.get(variant) {
            Some(publisher) => {
                publisher.reload();
                true
            }
            None => false,
        }
    }

    /// Client bootstrap for a running variant.
    ///
    /// The address is only pinned when the hub is bound to a specific
    /// interface; for the wildcard the client uses its page hostname.
    pub fn bootstrap(&self, variant: &str) -> Option<VariantBootstrap> {
        let publisher = self.variants.get(variant)?;
        let hub = publisher.hub();
        let address = (!hub.endpoint().is_wildcard()).then(|| hub.endpoint().address.clone());

        Some(VariantBootstrap {
            variant: variant.to_string(),
            client: BootstrapOptions {
                protocol: None,
                address,
                port: Some(hub.local_addr().port()),
                name: Some(variant.to_string()),
            },
            hot_update: HotUpdateNames::for_variant(variant),
        })
    }

    /// Close every hub. Variants must be started again afterwards.
    pub fn shutdown(&mut self) {
        self.variants.clear();
        self.registry.close_all();
        crate::debug!("hub"; "stopped");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.registry.close_all();
    }
}
