use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::client_io::on_disconnect;
use super::{ClientHandle, ClientId, Hub};
use crate::reload::message::{BuildResult, Event, Message};
use crate::reload::registry::Endpoint;

type TestClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn start_hub() -> Hub {
    Hub::start(Endpoint::new("127.0.0.1", 0)).unwrap()
}

async fn connect(hub: &Hub) -> TestClient {
    let url = format!("ws://{}", hub.local_addr());
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn wait_for_clients(hub: &Hub, count: usize) {
    for _ in 0..200 {
        if hub.client_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} clients, have {}", hub.client_count());
}

async fn next_text(ws: &mut TestClient) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("read failed");
    match frame {
        WsMessage::Text(text) => text.as_str().to_owned(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_publish_reaches_connected_client() {
    let hub = start_hub();
    let mut client = connect(&hub).await;
    wait_for_clients(&hub, 1).await;

    hub.publish(Event::replace("dashboard", "abc123"));

    assert_eq!(
        next_text(&mut client).await,
        r#"["dashboard","replace",{"hash":"abc123"}]"#
    );
    hub.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_publish_without_clients_is_noop() {
    let hub = start_hub();
    hub.publish(Event::reload("dashboard"));
    hub.broadcast("graphics", Message::Reload);
    assert_eq!(hub.client_count(), 0);
    assert!(hub.is_listening());
    hub.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_every_client_gets_every_channel() {
    // Channel filtering happens on the client; the hub fans out to all
    let hub = start_hub();
    let mut first = connect(&hub).await;
    let mut second = connect(&hub).await;
    wait_for_clients(&hub, 2).await;

    hub.publish(Event::reload("graphics"));

    assert_eq!(next_text(&mut first).await, r#"["graphics","reload",{}]"#);
    assert_eq!(next_text(&mut second).await, r#"["graphics","reload",{}]"#);
    hub.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_events_arrive_in_publish_order() {
    let hub = start_hub();
    let mut client = connect(&hub).await;
    wait_for_clients(&hub, 1).await;

    hub.announce_build("dashboard", &BuildResult::new("h1"));
    hub.announce_build("dashboard", &BuildResult::new("h2"));

    let kinds: Vec<_> = [
        next_text(&mut client).await,
        next_text(&mut client).await,
        next_text(&mut client).await,
        next_text(&mut client).await,
    ]
    .iter()
    .map(|text| {
        let event = Event::from_json(text).unwrap();
        match event.message {
            Message::Done(done) => format!("done:{}", done.hash),
            Message::Replace(replace) => format!("replace:{}", replace.hash),
            Message::Reload => "reload".to_string(),
        }
    })
    .collect();

    assert_eq!(kinds, vec!["done:h1", "replace:h1", "done:h2", "replace:h2"]);
    hub.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_build_announces_done_only() {
    let hub = start_hub();
    let mut client = connect(&hub).await;
    wait_for_clients(&hub, 1).await;

    let broken = BuildResult::new("bad").with_errors(vec!["syntax error".into()]);
    hub.announce_build("dashboard", &broken);
    hub.publish(Event::reload("marker"));

    let first = Event::from_json(&next_text(&mut client).await).unwrap();
    assert!(matches!(first.message, Message::Done(_)));
    // Next frame is the marker, no replace in between
    let second = Event::from_json(&next_text(&mut client).await).unwrap();
    assert_eq!(second.channel, "marker");
    hub.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_closed_client_is_removed() {
    let hub = start_hub();
    let mut client = connect(&hub).await;
    wait_for_clients(&hub, 1).await;

    client.close(None).await.unwrap();
    wait_for_clients(&hub, 0).await;

    // Publishing after the removal must not fail or resurrect anything
    hub.publish(Event::reload("dashboard"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hub.client_count(), 0);
    hub.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_late_client_misses_earlier_events() {
    let hub = start_hub();
    hub.publish(Event::replace("dashboard", "early"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = connect(&hub).await;
    wait_for_clients(&hub, 1).await;
    hub.publish(Event::replace("dashboard", "late"));

    let event = Event::from_json(&next_text(&mut client).await).unwrap();
    assert_eq!(event, Event::replace("dashboard", "late"));
    hub.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_closes_clients_with_going_away() {
    let hub = start_hub();
    let mut client = connect(&hub).await;
    wait_for_clients(&hub, 1).await;

    hub.shutdown();

    let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for close");
    match frame {
        Some(Ok(WsMessage::Close(Some(close)))) => assert_eq!(u16::from(close.code), 1001),
        other => panic!("expected close frame, got {other:?}"),
    }
    assert!(!hub.is_listening());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_silent_peer_does_not_block_other_clients() {
    let hub = start_hub();

    // Connects but never sends the upgrade request
    let _silent = TcpStream::connect(hub.local_addr()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let url = format!("ws://{}", hub.local_addr());
    let (mut client, _) = tokio::time::timeout(Duration::from_secs(2), connect_async(url))
        .await
        .expect("handshake stalled behind a silent peer")
        .unwrap();
    wait_for_clients(&hub, 1).await;

    hub.publish(Event::reload("dashboard"));
    assert_eq!(next_text(&mut client).await, r#"["dashboard","reload",{}]"#);
    hub.shutdown();
}

/// Server-side handle over a plain loopback connection
fn raw_handle(id: u64) -> ClientHandle {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let peer = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (stream, _) = listener.accept().unwrap();
    drop(peer);
    ClientHandle {
        id: ClientId(id),
        peer: listener.local_addr().unwrap(),
        ws: tungstenite::WebSocket::from_raw_socket(stream, tungstenite::protocol::Role::Server, None),
    }
}

#[test]
fn test_disconnect_is_idempotent() {
    let mut clients = vec![raw_handle(1), raw_handle(2)];

    assert!(on_disconnect(&mut clients, ClientId(1)));
    assert!(!on_disconnect(&mut clients, ClientId(1)));
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].id, ClientId(2));

    // Never registered
    assert!(!on_disconnect(&mut clients, ClientId(7)));
    assert_eq!(clients.len(), 1);
}
