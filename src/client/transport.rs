//! Socket transport for the client.
//!
//! Each socket runs as its own task and reports [`SocketEvent`]s, tagged
//! with its id, into the client's event channel.

use futures_util::{SinkExt, StreamExt};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::machine::{SocketEvent, SocketId};

/// Close code reported when the connection dropped without a close frame
pub const ABNORMAL_CLOSE: u16 = 1006;

/// Close code reported for a close frame without a status
const NO_STATUS: u16 = 1005;

/// Sender side of the client's event channel
pub type EventSender = mpsc::UnboundedSender<(SocketId, SocketEvent)>;

/// Opens and closes sockets on behalf of the client.
pub trait Transport: Send + 'static {
    /// Start connecting; progress is reported through `events`.
    fn open(&mut self, socket: SocketId, url: &str, events: EventSender);

    /// Close `socket` with `code`. Unknown or finished sockets are ignored.
    fn close(&mut self, socket: SocketId, code: u16);
}

/// WebSocket transport over tokio-tungstenite.
#[derive(Default)]
pub struct WsTransport {
    sockets: FxHashMap<SocketId, oneshot::Sender<u16>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WsTransport {
    fn open(&mut self, socket: SocketId, url: &str, events: EventSender) {
        let (close_tx, close_rx) = oneshot::channel();
        self.sockets.retain(|_, tx| !tx.is_closed());
        self.sockets.insert(socket, close_tx);
        tokio::spawn(run_socket(socket, url.to_string(), events, close_rx));
    }

    fn close(&mut self, socket: SocketId, code: u16) {
        if let Some(tx) = self.sockets.remove(&socket) {
            let _ = tx.send(code);
        }
    }
}

/// Drive one socket until it closes.
async fn run_socket(
    socket: SocketId,
    url: String,
    events: EventSender,
    mut close_rx: oneshot::Receiver<u16>,
) {
    let emit = |event: SocketEvent| {
        let _ = events.send((socket, event));
    };

    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _)) => stream,
            Err(e) => {
                crate::debug!("client"; "connect to {} failed: {}", url, e);
                emit(SocketEvent::Close(ABNORMAL_CLOSE));
                return;
            }
        },
        code = &mut close_rx => {
            emit(SocketEvent::Close(code.unwrap_or(ABNORMAL_CLOSE)));
            return;
        }
    };

    emit(SocketEvent::Open);
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            code = &mut close_rx => {
                let code = code.unwrap_or(ABNORMAL_CLOSE);
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: "".into(),
                };
                let _ = write.send(Message::Close(Some(frame))).await;
                emit(SocketEvent::Close(code));
                return;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => emit(SocketEvent::Text(text.as_str().to_owned())),
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(NO_STATUS);
                    emit(SocketEvent::Close(code));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    crate::debug!("client"; "socket error: {}", e);
                    emit(SocketEvent::Close(ABNORMAL_CLOSE));
                    return;
                }
                None => {
                    emit(SocketEvent::Close(ABNORMAL_CLOSE));
                    return;
                }
            }
        }
    }
}
