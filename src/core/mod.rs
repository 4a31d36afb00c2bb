//! Core process state shared by the commands.

mod state;

pub use state::{is_shutdown, setup_shutdown_handler, shutdown_signal, wait_for_shutdown};
