//! Live Update Message Protocol
//!
//! Defines the JSON frame format for WebSocket communication between
//! a hub and the clients of every build variant sharing it.
//!
//! Every frame is a 3-element array:
//!
//! ```text
//! [channel, type, payload]
//! ["dashboard", "done", {"hash": "abc123", "errors": [], "warnings": []}]
//! ["dashboard", "replace", {"hash": "abc123"}]
//! ["dashboard", "reload", {}]
//! ```
//!
//! # Message Types
//!
//! - `done`: Build finished (informational, always sent)
//! - `replace`: Hot-swap to the given build (only sent for error-free builds)
//! - `reload`: Discard client state and reload fully

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Payload of a `done` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonePayload {
    pub hash: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Payload of a `replace` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacePayload {
    pub hash: String,
}

/// Event type tag (second array element).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Done,
    Replace,
    Reload,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Replace => "replace",
            Self::Reload => "reload",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "done" => Some(Self::Done),
            "replace" => Some(Self::Replace),
            "reload" => Some(Self::Reload),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed body of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Build finished (with or without errors)
    Done(DonePayload),
    /// Hot-swap to a newer build
    Replace(ReplacePayload),
    /// Full reload of the client runtime
    Reload,
}

impl Message {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Done(_) => EventKind::Done,
            Self::Replace(_) => EventKind::Replace,
            Self::Reload => EventKind::Reload,
        }
    }

    fn payload(&self) -> Value {
        match self {
            Self::Done(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            Self::Replace(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            Self::Reload => Value::Object(Default::default()),
        }
    }
}

/// A channel-scoped event as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub channel: String,
    pub message: Message,
}

/// Errors decoding an incoming frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame is not a [channel, type, payload] array: {0}")]
    Shape(#[source] serde_json::Error),

    #[error("unknown event type `{0}`")]
    UnknownType(String),

    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

impl Event {
    pub fn new(channel: impl Into<String>, message: Message) -> Self {
        Self {
            channel: channel.into(),
            message,
        }
    }

    /// Create a `done` event
    pub fn done(channel: impl Into<String>, result: &BuildResult) -> Self {
        Self::new(
            channel,
            Message::Done(DonePayload {
                hash: result.hash.clone(),
                errors: result.errors.clone(),
                warnings: result.warnings.clone(),
            }),
        )
    }

    /// Create a `replace` event
    pub fn replace(channel: impl Into<String>, hash: impl Into<String>) -> Self {
        Self::new(channel, Message::Replace(ReplacePayload { hash: hash.into() }))
    }

    /// Create a `reload` event
    pub fn reload(channel: impl Into<String>) -> Self {
        Self::new(channel, Message::Reload)
    }

    /// Serialize to the `[channel, type, payload]` JSON frame
    pub fn to_json(&self) -> String {
        let frame = (&self.channel, self.message.kind().as_str(), self.message.payload());
        // A tuple of string, str and Value always serializes
        serde_json::to_string(&frame).unwrap_or_default()
    }

    /// Channel named by a frame, even when the rest of it is invalid
    pub fn channel_of(s: &str) -> Option<String> {
        match serde_json::from_str::<Value>(s).ok()? {
            Value::Array(mut items) if !items.is_empty() => match items.swap_remove(0) {
                Value::String(channel) => Some(channel),
                _ => None,
            },
            _ => None,
        }
    }

    /// Parse a `[channel, type, payload]` JSON frame
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let (channel, kind, payload): (String, String, Value) =
            serde_json::from_str(s).map_err(ProtocolError::Shape)?;

        let kind = EventKind::parse(&kind).ok_or(ProtocolError::UnknownType(kind))?;
        let message = match kind {
            EventKind::Done => Message::Done(
                serde_json::from_value(payload)
                    .map_err(|source| ProtocolError::Payload { kind, source })?,
            ),
            EventKind::Replace => Message::Replace(
                serde_json::from_value(payload)
                    .map_err(|source| ProtocolError::Payload { kind, source })?,
            ),
            EventKind::Reload => Message::Reload,
        };

        Ok(Self { channel, message })
    }
}

/// Outcome of one build cycle, as reported by the build pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub hash: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl BuildResult {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..Default::default()
        }
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Events announcing this build on `channel`.
    ///
    /// `done` is always emitted; `replace` follows only for error-free builds.
    pub fn events(&self, channel: &str) -> Vec<Event> {
        let mut events = vec![Event::done(channel, self)];
        if !self.has_errors() {
            events.push(Event::replace(channel, &self.hash));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let json = Event::replace("dashboard", "abc123").to_json();
        assert_eq!(json, r#"["dashboard","replace",{"hash":"abc123"}]"#);

        let json = Event::reload("graphics").to_json();
        assert_eq!(json, r#"["graphics","reload",{}]"#);
    }

    #[test]
    fn test_done_payload() {
        let result = BuildResult::new("h1")
            .with_errors(vec!["boom".into()])
            .with_warnings(vec!["careful".into()]);
        let json = Event::done("dashboard", &result).to_json();
        assert!(json.starts_with(r#"["dashboard","done","#));
        assert!(json.contains(r#""errors":["boom"]"#));

        let parsed = Event::from_json(&json).unwrap();
        match parsed.message {
            Message::Done(done) => {
                assert_eq!(done.hash, "h1");
                assert_eq!(done.errors, vec!["boom"]);
                assert_eq!(done.warnings, vec!["careful"]);
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn test_reload_ignores_payload() {
        let parsed = Event::from_json(r#"["x","reload",{"anything":1}]"#).unwrap();
        assert_eq!(parsed.message, Message::Reload);
        assert_eq!(parsed.channel, "x");
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            Event::from_json("not json"),
            Err(ProtocolError::Shape(_))
        ));
        assert!(matches!(
            Event::from_json(r#"{"type":"reload"}"#),
            Err(ProtocolError::Shape(_))
        ));
        assert!(matches!(
            Event::from_json(r#"["x","replace"]"#),
            Err(ProtocolError::Shape(_))
        ));
        assert!(matches!(
            Event::from_json(r#"["x","replace",{}]"#),
            Err(ProtocolError::Payload {
                kind: EventKind::Replace,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_type() {
        match Event::from_json(r#"["x","invalidate",{}]"#) {
            Err(ProtocolError::UnknownType(kind)) => assert_eq!(kind, "invalidate"),
            other => panic!("expected unknown type, got {other:?}"),
        }
    }

    #[test]
    fn test_channel_of_malformed_frames() {
        assert_eq!(
            Event::channel_of(r#"["graphics","replace",{"nohash":1}]"#).as_deref(),
            Some("graphics")
        );
        assert_eq!(Event::channel_of(r#"["graphics"]"#).as_deref(), Some("graphics"));
        assert_eq!(Event::channel_of(r#"[1,"reload",{}]"#), None);
        assert_eq!(Event::channel_of("[]"), None);
        assert_eq!(Event::channel_of("garbage"), None);
    }

    #[test]
    fn test_build_events_skip_replace_on_errors() {
        let clean = BuildResult::new("ok");
        let kinds: Vec<_> = clean.events("d").iter().map(|e| e.message.kind()).collect();
        assert_eq!(kinds, vec![EventKind::Done, EventKind::Replace]);

        let broken = BuildResult::new("bad").with_errors(vec!["e".into()]);
        let kinds: Vec<_> = broken.events("d").iter().map(|e| e.message.kind()).collect();
        assert_eq!(kinds, vec![EventKind::Done]);
    }
}
