//! Update applier seam.
//!
//! The client decides *when* to hot-swap; the host runtime decides *how*.

use std::future::Future;

use thiserror::Error;

/// Hot update failed; the client falls back to a full reload.
#[derive(Debug, Error)]
#[error("hot update failed: {0}")]
pub struct ApplyError(pub String);

impl ApplyError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Runtime capability for applying hot updates.
pub trait UpdateApplier: Send + Sync + 'static {
    /// `false` while an update is being applied
    fn is_idle(&self) -> bool;

    /// Build hash the runtime currently runs, if known
    fn current_version(&self) -> Option<String>;

    /// Apply the update towards build `target`.
    ///
    /// Runs detached from the client's event loop, so it must own what it needs.
    fn apply(&self, target: &str) -> impl Future<Output = Result<(), ApplyError>> + Send + 'static;
}
