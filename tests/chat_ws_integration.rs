//! Integration tests for the chat widget WebSocket.
//!
//! Each test spins up the full Axum app on a random port, connects via
//! tokio-tungstenite, and walks the real frame protocol.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use efika_site::auth::{IdentityProvider, LocalIdentityProvider};
use efika_site::chatbot::Pacing;
use efika_site::leads::LeadSource;
use efika_site::server::{AppState, app_router};
use efika_site::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

type Ws = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the app on a random port, return (port, db).
async fn start_server() -> (u16, Arc<dyn Database>) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let key = SecretString::from("service-key");
    let provider: Arc<dyn IdentityProvider> = Arc::new(
        LocalIdentityProvider::new(db.clone(), Duration::from_secs(3600), key.clone())
            .with_bcrypt_cost(4),
    );
    let app = app_router(AppState::new(db.clone(), provider, key), Pacing::Instant, None);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, db)
}

async fn connect(port: u16) -> Ws {
    let (ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/chat"))
        .await
        .expect("WS connect failed");
    ws
}

async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Next JSON text frame.
async fn next_json(ws: &mut Ws) -> Value {
    loop {
        let msg = timeout(TEST_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("WS error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read frames until one satisfies `pred`.
async fn wait_for(ws: &mut Ws, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let frame = next_json(ws).await;
        if pred(&frame) {
            return frame;
        }
    }
}

fn bot_message_starting(frame: &Value, prefix: &str) -> bool {
    frame["type"] == "message"
        && frame["message"]["sender"] == "bot"
        && frame["message"]["text"]
            .as_str()
            .is_some_and(|t| t.starts_with(prefix))
}

#[tokio::test]
async fn connect_receives_closed_sync() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;
        let mut ws = connect(port).await;

        let sync = next_json(&mut ws).await;
        assert_eq!(sync["type"], "sync");
        assert_eq!(sync["view"]["is_open"], false);
        assert_eq!(sync["view"]["messages"].as_array().unwrap().len(), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn full_conversation_stores_lead() {
    timeout(TEST_TIMEOUT, async {
        let (port, db) = start_server().await;
        let mut ws = connect(port).await;
        next_json(&mut ws).await;

        send(&mut ws, json!({"action": "open"})).await;
        let menu = wait_for(&mut ws, |f| f["type"] == "state" && f["step"] == "menu").await;
        assert_eq!(menu["is_open"], true);
        assert_eq!(menu["quick_replies"].as_array().unwrap().len(), 5);

        send(&mut ws, json!({"action": "quick_reply", "option": "💝 Seguro de Vida"})).await;
        wait_for(&mut ws, |f| bot_message_starting(f, "Para prosseguir")).await;

        send(&mut ws, json!({"action": "message", "text": "Joana Prado"})).await;
        wait_for(&mut ws, |f| bot_message_starting(f, "Prazer em conhecê-lo, Joana Prado!")).await;

        send(&mut ws, json!({"action": "message", "text": "joana.example.com"})).await;
        wait_for(&mut ws, |f| bot_message_starting(f, "Por favor, digite um e-mail válido")).await;

        send(&mut ws, json!({"action": "message", "text": "joana@example.com"})).await;
        wait_for(&mut ws, |f| bot_message_starting(f, "Perfeito! Agora seu telefone")).await;

        send(&mut ws, json!({"action": "message", "text": "(11) 95555-0000"})).await;
        wait_for(&mut ws, |f| bot_message_starting(f, "Obrigada, Joana Prado!")).await;

        let lead = loop {
            if let Some(lead) = db.list_leads(10).await.unwrap().into_iter().next() {
                break lead;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert_eq!(lead.source, LeadSource::Chatbot);
        assert_eq!(lead.name.as_deref(), Some("Joana Prado"));
        assert_eq!(lead.email.as_deref(), Some("joana@example.com"));
        assert_eq!(lead.phone.as_deref(), Some("(11) 95555-0000"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn input_while_closed_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;
        let mut ws = connect(port).await;
        next_json(&mut ws).await;

        send(&mut ws, json!({"action": "message", "text": "oi"})).await;
        let rejected = next_json(&mut ws).await;
        assert_eq!(rejected["type"], "rejected");
        assert_eq!(rejected["reason"], "Chat session is closed");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn garbage_frame_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;
        let mut ws = connect(port).await;
        next_json(&mut ws).await;

        send(&mut ws, json!({"action": "dance"})).await;
        let rejected = next_json(&mut ws).await;
        assert_eq!(rejected["type"], "rejected");
        assert!(rejected["reason"].as_str().unwrap().starts_with("unrecognized frame"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn close_resets_the_session() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;
        let mut ws = connect(port).await;
        next_json(&mut ws).await;

        send(&mut ws, json!({"action": "open"})).await;
        wait_for(&mut ws, |f| f["type"] == "state" && f["step"] == "menu").await;
        send(&mut ws, json!({"action": "close"})).await;
        wait_for(&mut ws, |f| f["type"] == "closed").await;

        send(&mut ws, json!({"action": "sync"})).await;
        let sync = wait_for(&mut ws, |f| f["type"] == "sync").await;
        assert_eq!(sync["view"]["is_open"], false);
        assert_eq!(sync["view"]["messages"].as_array().unwrap().len(), 0);
        assert_eq!(sync["view"]["step"], "initial");
    })
    .await
    .expect("test timed out");
}
