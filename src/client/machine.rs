//! Client connection and update state machine.
//!
//! Pure state: every input returns the [`Action`]s the driver must perform.
//! Socket events carry the id of the socket they came from; events of a
//! superseded socket are ignored.
//!
//! ```text
//!                  connect()                 open
//! DISCONNECTED ---------------> CONNECTING ---------> CONNECTED
//!      ^                          ^    |                  |
//!      |  close 1000              |    | close != 1000    | close != 1000
//!      +--------------------------|----+------+-----------+
//!                       timer     |           v
//!                                 +--- RECONNECT_PENDING
//! ```

use std::time::Duration;

use super::applier::{ApplyError, UpdateApplier};
use super::options::ClientOptions;
use crate::reload::message::{DonePayload, Event, Message, ProtocolError};

/// Fixed delay before reconnecting after an abnormal close
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Close code of an intentional close
pub const NORMAL_CLOSE: u16 = 1000;

/// Apply rounds per `replace` before waiting for the next build
pub const MAX_APPLY_ROUNDS: u32 = 5;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectPending,
}

/// Identifier of one socket opened by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub u64);

/// Event reported by a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Text(String),
    Close(u16),
}

/// Side effect requested by the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Open(SocketId),
    Close(SocketId, u16),
    ArmTimer(Duration),
    CancelTimer,
    Apply(String),
    Report(DonePayload),
    Reload,
}

/// State of one client instance.
#[derive(Debug)]
pub struct ClientMachine {
    options: ClientOptions,
    state: ConnectionState,
    socket: Option<SocketId>,
    next_socket: u64,
    timer_armed: bool,
    latest_hash: Option<String>,
    applying: bool,
    apply_rounds: u32,
    reloading: bool,
}

impl ClientMachine {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            state: ConnectionState::Disconnected,
            socket: None,
            next_socket: 0,
            timer_armed: false,
            latest_hash: None,
            applying: false,
            apply_rounds: 0,
            reloading: false,
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn socket(&self) -> Option<SocketId> {
        self.socket
    }

    pub fn latest_hash(&self) -> Option<&str> {
        self.latest_hash.as_deref()
    }

    pub fn is_timer_armed(&self) -> bool {
        self.timer_armed
    }

    /// Open a fresh socket, superseding the current one and any pending timer.
    pub fn connect(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();

        if self.timer_armed {
            self.timer_armed = false;
            actions.push(Action::CancelTimer);
        }
        if let Some(old) = self.socket.take() {
            actions.push(Action::Close(old, NORMAL_CLOSE));
        }

        self.next_socket += 1;
        let socket = SocketId(self.next_socket);
        self.socket = Some(socket);
        self.state = ConnectionState::Connecting;
        actions.push(Action::Open(socket));

        crate::debug!("client"; "connecting to {}", self.options.url());
        actions
    }

    /// Reconnect timer fired
    pub fn on_timer(&mut self) -> Vec<Action> {
        if !self.timer_armed {
            return Vec::new();
        }
        self.timer_armed = false;
        self.connect()
    }

    /// Dispatch an event from socket `socket`
    pub fn on_socket_event<A: UpdateApplier>(
        &mut self,
        socket: SocketId,
        event: SocketEvent,
        applier: &A,
    ) -> Vec<Action> {
        if self.socket != Some(socket) {
            return Vec::new();
        }
        match event {
            SocketEvent::Open => {
                self.state = ConnectionState::Connected;
                crate::debug!("client"; "connected to {}", self.options.url());
                Vec::new()
            }
            SocketEvent::Close(code) => self.on_close(code),
            SocketEvent::Text(text) => self.on_text(&text, applier),
        }
    }

    fn on_close(&mut self, code: u16) -> Vec<Action> {
        self.socket = None;

        if code == NORMAL_CLOSE {
            self.state = ConnectionState::Disconnected;
            return Vec::new();
        }

        crate::debug!("client"; "connection closed ({}), retrying in {:?}", code, RECONNECT_DELAY);
        self.state = ConnectionState::ReconnectPending;
        if self.timer_armed {
            return Vec::new();
        }
        self.timer_armed = true;
        vec![Action::ArmTimer(RECONNECT_DELAY)]
    }

    fn on_text<A: UpdateApplier>(&mut self, text: &str, applier: &A) -> Vec<Action> {
        if self.state != ConnectionState::Connected {
            return Vec::new();
        }

        let event = match Event::from_json(text) {
            Ok(event) => event,
            Err(ProtocolError::UnknownType(kind)) => {
                crate::debug!("client"; "ignoring event type `{}`", kind);
                return Vec::new();
            }
            Err(e) => {
                match Event::channel_of(text) {
                    Some(channel) if channel != self.options.name => {
                        crate::debug!("client"; "discarding malformed message for `{}`: {}", channel, e);
                    }
                    _ => crate::log!("client"; "discarding malformed message: {}", e),
                }
                return Vec::new();
            }
        };

        if event.channel != self.options.name {
            return Vec::new();
        }

        match event.message {
            Message::Done(done) => vec![Action::Report(done)],
            Message::Reload => self.reload(),
            Message::Replace(replace) => {
                self.latest_hash = Some(replace.hash);
                self.try_apply(applier)
            }
        }
    }

    /// Start an update if one is due and the runtime is ready.
    fn try_apply<A: UpdateApplier>(&mut self, applier: &A) -> Vec<Action> {
        if self.reloading || self.applying || !applier.is_idle() {
            return Vec::new();
        }
        let Some(target) = self.update_target(applier) else {
            return Vec::new();
        };

        self.applying = true;
        self.apply_rounds = 1;
        vec![Action::Apply(target)]
    }

    /// Latest hash, if the runtime is not already running it
    fn update_target<A: UpdateApplier>(&self, applier: &A) -> Option<String> {
        let latest = self.latest_hash.as_deref()?;
        if applier.current_version().as_deref() == Some(latest) {
            return None;
        }
        Some(latest.to_string())
    }

    /// Update attempt finished.
    ///
    /// Success re-checks for a build that landed meanwhile; failure reloads.
    pub fn on_apply_finished<A: UpdateApplier>(
        &mut self,
        result: Result<(), ApplyError>,
        applier: &A,
    ) -> Vec<Action> {
        self.applying = false;

        if let Err(e) = result {
            crate::log!("client"; "{}, reloading", e);
            return self.reload();
        }

        if self.reloading || !applier.is_idle() {
            return Vec::new();
        }
        let Some(target) = self.update_target(applier) else {
            self.apply_rounds = 0;
            return Vec::new();
        };

        if self.apply_rounds >= MAX_APPLY_ROUNDS {
            crate::log!("client"; "still behind after {} updates, waiting for next build", self.apply_rounds);
            self.apply_rounds = 0;
            return Vec::new();
        }

        self.apply_rounds += 1;
        self.applying = true;
        vec![Action::Apply(target)]
    }

    fn reload(&mut self) -> Vec<Action> {
        if self.reloading {
            return Vec::new();
        }
        self.reloading = true;
        vec![Action::Reload]
    }
}
