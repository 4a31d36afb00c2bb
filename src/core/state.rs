//! Shutdown state for long-running commands.
//!
//! `SHUTDOWN` is set once Ctrl+C is received. Commands that own resources
//! (hubs, client sockets) subscribe with [`shutdown_signal`] so they can
//! close them before the process exits.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

/// How often async loops poll the shutdown channel
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Shutdown signal sender, set once a command subscribes
static SHUTDOWN_TX: OnceLock<Sender<()>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start
///
/// - Before [`shutdown_signal`]: exits immediately, nothing to clean up
/// - After [`shutdown_signal`]: notifies the subscribed command
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);

        if let Some(tx) = SHUTDOWN_TX.get() {
            crate::log!("serve"; "shutting down...");
            let _ = tx.send(());
        } else {
            std::process::exit(0);
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Subscribe to Ctrl+C.
///
/// Only the first subscriber is notified; later calls get a receiver that
/// still observes the [`is_shutdown`] flag through [`wait_for_shutdown`].
pub fn shutdown_signal() -> Receiver<()> {
    let (tx, rx) = channel::bounded::<()>(1);
    let _ = SHUTDOWN_TX.set(tx);
    rx
}

/// Resolve once Ctrl+C was received.
pub async fn wait_for_shutdown(rx: Receiver<()>) {
    loop {
        if rx.try_recv().is_ok() || is_shutdown() {
            crate::debug!("serve"; "shutdown signal received");
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}
