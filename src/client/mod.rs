//! Live Update Client
//!
//! Runs inside a development runtime, listens to one hub channel and
//! hot-swaps (or reloads) when a new build is announced.
//!
//! # Module Structure
//!
//! - `machine` - Connection and update state machine (no I/O)
//! - `transport` - WebSocket sockets feeding events back to the client
//! - `applier` - Runtime seam that applies hot updates
//! - `options` - Connection options from page location and bootstrap object

pub mod applier;
pub mod machine;
pub mod options;
pub mod transport;


use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::time::Sleep;

pub use applier::{ApplyError, UpdateApplier};
pub use machine::{Action, ClientMachine, ConnectionState, SocketEvent, SocketId};
pub use options::{BootstrapOptions, ClientOptions, PageLocation};
pub use transport::{Transport, WsTransport};

use crate::reload::message::DonePayload;

type ApplyFuture = Pin<Box<dyn Future<Output = Result<(), ApplyError>> + Send>>;

/// Why [`RefreshClient::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// Host must reload fully; this client instance is finished
    Reload,
    /// Shutdown signal fired
    Shutdown,
}

/// One client instance: state machine plus its transport and applier.
pub struct RefreshClient<T, A> {
    machine: ClientMachine,
    transport: T,
    applier: A,
    events_tx: transport::EventSender,
    events_rx: mpsc::UnboundedReceiver<(SocketId, SocketEvent)>,
}

impl<T: Transport, A: UpdateApplier> RefreshClient<T, A> {
    pub fn new(options: ClientOptions, transport: T, applier: A) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            machine: ClientMachine::new(options),
            transport,
            applier,
            events_tx,
            events_rx,
        }
    }

    pub fn machine(&self) -> &ClientMachine {
        &self.machine
    }

    pub fn applier(&self) -> &A {
        &self.applier
    }

    /// Connect and process events until a full reload is due or `shutdown` fires.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> ClientExit {
        tokio::pin!(shutdown);
        let mut timer: Option<Pin<Box<Sleep>>> = None;
        let mut in_flight: Option<ApplyFuture> = None;

        let mut actions = self.machine.connect();
        loop {
            for action in std::mem::take(&mut actions) {
                match action {
                    Action::Open(socket) => {
                        let url = self.machine.options().url();
                        self.transport.open(socket, &url, self.events_tx.clone());
                    }
                    Action::Close(socket, code) => self.transport.close(socket, code),
                    Action::ArmTimer(delay) => timer = Some(Box::pin(tokio::time::sleep(delay))),
                    Action::CancelTimer => timer = None,
                    Action::Apply(target) => {
                        crate::debug!("client"; "applying update {}", target);
                        in_flight = Some(Box::pin(self.applier.apply(&target)));
                    }
                    Action::Report(done) => report_build(&done),
                    Action::Reload => {
                        self.close_socket();
                        return ClientExit::Reload;
                    }
                }
            }

            actions = tokio::select! {
                _ = &mut shutdown => {
                    self.close_socket();
                    return ClientExit::Shutdown;
                }
                Some((socket, event)) = self.events_rx.recv() => {
                    self.machine.on_socket_event(socket, event, &self.applier)
                }
                _ = wait_timer(&mut timer) => {
                    timer = None;
                    self.machine.on_timer()
                }
                result = wait_apply(&mut in_flight) => {
                    in_flight = None;
                    self.machine.on_apply_finished(result, &self.applier)
                }
            };
        }
    }

    fn close_socket(&mut self) {
        if let Some(socket) = self.machine.socket() {
            self.transport.close(socket, machine::NORMAL_CLOSE);
        }
    }
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn wait_apply(in_flight: &mut Option<ApplyFuture>) -> Result<(), ApplyError> {
    match in_flight {
        Some(apply) => apply.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Surface a build outcome on the terminal
fn report_build(done: &DonePayload) {
    crate::debug!("client"; "build {} done", done.hash);

    if !done.errors.is_empty() {
        let mut detail = done.errors.join("\n");
        if !done.warnings.is_empty() {
            detail.push('\n');
            detail.push_str(&done.warnings.join("\n"));
        }
        crate::logger::status_error(&format!("build {} produced errors", done.hash), &detail);
    } else if !done.warnings.is_empty() {
        crate::logger::status_warning(&format!(
            "build {} produced warnings\n{}",
            done.hash,
            done.warnings.join("\n")
        ));
    } else {
        crate::logger::status_success(&format!("build {} done", done.hash));
    }
}
