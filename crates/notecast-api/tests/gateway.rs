//! End-to-end: a real listener, real sockets, notes pushed live.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use notecast_api::router;
use notecast_types::events::NoteEvent;

use common::{TestApp, test_app};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: &TestApp) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = router(app.state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Next gateway event, skipping pings. `None` once the server closes.
async fn next_event(socket: &mut Socket) -> Option<NoteEvent> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = socket.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(serde_json::from_str(text.as_str()).unwrap()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
        None
    })
    .await
    .expect("timed out waiting for a gateway event")
}

async fn connect_with_token(addr: SocketAddr, token: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/ws?token={}", addr, token)).await.unwrap();
    socket
}

#[tokio::test]
async fn live_receiver_gets_pushed_and_rows_are_stored() {
    let app = test_app().await;
    let addr = serve(&app).await;
    let (_, a) = app.confirmed_user("Ada", "ada@example.com").await;
    let (b_id, b) = app.confirmed_user("Bob", "bob@example.com").await;
    let (c_id, c) = app.confirmed_user("Cy", "cy@example.com").await;

    let mut b_socket = connect_with_token(addr, &b).await;
    assert_eq!(next_event(&mut b_socket).await, Some(NoteEvent::Ready { user_id: b_id }));
    assert!(app.state.registry.lookup(b_id).is_some());
    assert!(app.state.registry.lookup(c_id).is_none());

    let (status, body) = app.send_note(&a, &[b_id, c_id], 1, "Party at 8").await;
    assert_eq!(status, StatusCode::OK);
    let b_note = Uuid::parse_str(body["noteIds"][0].as_str().unwrap()).unwrap();

    assert_eq!(
        next_event(&mut b_socket).await,
        Some(NoteEvent::NewNoteReceived {
            note_id: b_note,
            note_title: "Party at 8".into(),
        })
    );

    for token in [&b, &c] {
        let (status, timeline) = app.call(Method::GET, "/api/v1/notes", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(timeline["length"], 1);
    }
}

#[tokio::test]
async fn identify_frame_authenticates() {
    let app = test_app().await;
    let addr = serve(&app).await;
    let (b_id, b) = app.confirmed_user("Bob", "bob@example.com").await;

    let (mut socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    let identify = serde_json::json!({ "type": "identify", "data": { "token": b } });
    socket.send(Message::text(identify.to_string())).await.unwrap();

    assert_eq!(next_event(&mut socket).await, Some(NoteEvent::Ready { user_id: b_id }));
}

#[tokio::test]
async fn bad_identify_is_rejected_then_closed() {
    let app = test_app().await;
    let addr = serve(&app).await;

    let (mut socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    let identify = serde_json::json!({ "type": "identify", "data": { "token": "garbage" } });
    socket.send(Message::text(identify.to_string())).await.unwrap();

    match next_event(&mut socket).await {
        Some(NoteEvent::Rejected { message }) => {
            assert_eq!(message, "Invalid or expired token, please login again")
        }
        other => panic!("expected a rejection, got {:?}", other),
    }
    assert_eq!(next_event(&mut socket).await, None);
}

#[tokio::test]
async fn revoked_token_is_refused_at_handshake() {
    let app = test_app().await;
    let addr = serve(&app).await;
    let (_, b) = app.confirmed_user("Bob", "bob@example.com").await;

    let (status, _) = app.call(Method::POST, "/api/v1/auth/logout", Some(&b), None).await;
    assert_eq!(status, StatusCode::OK);

    match connect_async(format!("ws://{}/ws?token={}", addr, b)).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
        Err(e) => panic!("unexpected handshake error: {}", e),
        Ok(_) => panic!("revoked token was accepted"),
    }
}

#[tokio::test]
async fn newest_connection_wins() {
    let app = test_app().await;
    let addr = serve(&app).await;
    let (_, a) = app.confirmed_user("Ada", "ada@example.com").await;
    let (b_id, b) = app.confirmed_user("Bob", "bob@example.com").await;

    let mut first = connect_with_token(addr, &b).await;
    assert!(matches!(next_event(&mut first).await, Some(NoteEvent::Ready { .. })));
    let mut second = connect_with_token(addr, &b).await;
    assert!(matches!(next_event(&mut second).await, Some(NoteEvent::Ready { .. })));

    // The replaced connection is closed by the server.
    assert_eq!(next_event(&mut first).await, None);

    app.send_note(&a, &[b_id], 2, "Dinner?").await;
    match next_event(&mut second).await {
        Some(NoteEvent::NewNoteReceived { note_title, .. }) => assert_eq!(note_title, "Dinner?"),
        other => panic!("expected a note event, got {:?}", other),
    }

    second.close(None).await.unwrap();
    wait_until_offline(&app, b_id).await;
}

/// Poll the registry until the user's entry is gone.
async fn wait_until_offline(app: &TestApp, user_id: Uuid) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while app.state.registry.lookup(user_id).is_some() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connection was not unregistered after the client left");
}

#[tokio::test]
async fn closing_the_socket_unregisters() {
    let app = test_app().await;
    let addr = serve(&app).await;
    let (b_id, b) = app.confirmed_user("Bob", "bob@example.com").await;

    let mut socket = connect_with_token(addr, &b).await;
    assert_eq!(next_event(&mut socket).await, Some(NoteEvent::Ready { user_id: b_id }));
    assert!(app.state.registry.lookup(b_id).is_some());

    socket.close(None).await.unwrap();
    wait_until_offline(&app, b_id).await;
    assert!(app.state.registry.is_empty());
}

#[tokio::test]
async fn dropping_the_socket_unregisters() {
    let app = test_app().await;
    let addr = serve(&app).await;
    let (b_id, b) = app.confirmed_user("Bob", "bob@example.com").await;

    let mut socket = connect_with_token(addr, &b).await;
    assert_eq!(next_event(&mut socket).await, Some(NoteEvent::Ready { user_id: b_id }));

    // No close frame: the TCP stream just goes away
    drop(socket);
    wait_until_offline(&app, b_id).await;
}
