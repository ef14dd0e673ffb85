//! Serves the router on a random port and talks to it with a real WebSocket client.
#![cfg(feature = "mock")]

use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use domain::message::DbMessageStore;
use domain::session::DbSessionValidator;
use domain::{messages, sessions};
use futures::{SinkExt, StreamExt};
use sea_orm::{DatabaseBackend, MockDatabase};
use serde_json::{json, Value};
use service::{config::Config, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn session(token: &str, user_id: i32) -> sessions::Model {
    let now = Utc::now();
    sessions::Model {
        session_id: token.to_string(),
        user_id,
        expires_at: (now + ChronoDuration::hours(24)).into(),
        created_at: now.into(),
    }
}

async fn start_test_server(db: MockDatabase) -> (SocketAddr, AppState) {
    let config = Config::try_parse_from(["social_network_rs"]).unwrap();
    let db = Arc::new(db.into_connection());
    let manager = Arc::new(ws::Manager::new(
        Arc::new(DbSessionValidator::new(db.clone())),
        Arc::new(DbMessageStore::new(db.clone())),
        config.connection_settings(),
    ));
    let app_state = AppState::new(config, &db, manager);

    let app = web::router::define_routes(app_state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, app_state)
}

async fn connect(addr: SocketAddr, token: Option<&str>) -> Result<Client, tungstenite::Error> {
    let mut request = format!("ws://{addr}/ws").into_client_request()?;
    if let Some(token) = token {
        request
            .headers_mut()
            .insert(COOKIE, format!("SN-session={token}").parse().unwrap());
    }
    let (client, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(client)
}

async fn wait_for_connections(app_state: &AppState, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while app_state.ws_manager.connection_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached the expected size");
}

async fn next_text(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("transport error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn upgrade_without_session_cookie_is_refused() {
    let (addr, app_state) = start_test_server(MockDatabase::new(DatabaseBackend::Postgres)).await;

    match connect(addr, None).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("handshake should not complete"),
    }
    assert_eq!(app_state.ws_manager.connection_count(), 0);
}

#[tokio::test]
async fn direct_message_reaches_the_recipient() -> anyhow::Result<()> {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![session("alice-token", 1)]])
        .append_query_results([vec![session("bob-token", 2)]])
        .append_query_results([vec![messages::Model {
            id: 1,
            sender_id: 1,
            receiver_id: 2,
            content: "hi bob".to_string(),
            created_at: Utc::now().into(),
        }]]);
    let (addr, app_state) = start_test_server(db).await;

    let mut alice = connect(addr, Some("alice-token")).await?;
    wait_for_connections(&app_state, 1).await;
    let mut bob = connect(addr, Some("bob-token")).await?;
    wait_for_connections(&app_state, 2).await;

    alice
        .send(Message::Text(
            json!({"type": "direct_message", "receiver_id": 2, "content": "hi bob"}).to_string(),
        ))
        .await?;

    let delivered = next_text(&mut bob).await;
    assert_eq!(delivered["type"], "direct_message");
    assert_eq!(delivered["sender_id"], 1);
    assert_eq!(delivered["content"], "hi bob");

    alice.close(None).await?;
    wait_for_connections(&app_state, 1).await;
    assert!(app_state.ws_manager.presence(2).online);
    assert!(!app_state.ws_manager.presence(1).online);

    Ok(())
}

#[tokio::test]
async fn shutdown_sends_going_away_and_empties_registry() -> anyhow::Result<()> {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![session("bob-token", 2)]]);
    let (addr, app_state) = start_test_server(db).await;

    let mut bob = connect(addr, Some("bob-token")).await?;
    wait_for_connections(&app_state, 1).await;

    app_state.ws_manager.shutdown().await;

    let frame = tokio::time::timeout(Duration::from_secs(5), bob.next())
        .await?
        .expect("stream ended before the close frame")?;
    match frame {
        Message::Close(Some(close)) => assert_eq!(u16::from(close.code), 1001),
        other => panic!("unexpected frame {other:?}"),
    }
    wait_for_connections(&app_state, 0).await;

    Ok(())
}
