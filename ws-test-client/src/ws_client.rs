use anyhow::Result;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use log::*;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Sink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub data: Value,
    pub timestamp: Instant,
}

pub struct Connection {
    pub user_label: String,
    sink: Sink,
    event_rx: mpsc::UnboundedReceiver<Event>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub async fn establish(ws_url: &str, cookie: &str, user_label: String) -> Result<Self> {
        let mut request = format!("{ws_url}/ws").into_client_request()?;
        request
            .headers_mut()
            .insert("Cookie", HeaderValue::from_str(cookie)?);

        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        debug!("{} upgraded with status {}", user_label, response.status());

        let (sink, mut stream) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let label = user_label.clone();
        let handle = tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(data) = serde_json::from_str::<Value>(&text) else {
                            warn!("Non-JSON text frame for {}: {}", label, text);
                            continue;
                        };
                        let event = Event {
                            event_type: data["type"].as_str().unwrap_or_default().to_string(),
                            data,
                            timestamp: Instant::now(),
                        };

                        if tx.send(event).is_err() {
                            debug!("WebSocket receiver dropped for {}", label);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Server closed the connection for {}: {:?}", label, frame);
                        let _ = tx.send(Event {
                            event_type: "close".to_string(),
                            data: serde_json::json!({
                                "code": frame.as_ref().map(|f| u16::from(f.code)),
                                "reason": frame.as_ref().map(|f| f.reason.to_string()),
                            }),
                            timestamp: Instant::now(),
                        });
                    }
                    Some(Ok(_)) => {
                        // Pings are answered by tungstenite itself
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", label, e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended for {}", label);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            user_label,
            sink,
            event_rx: rx,
            _handle: handle,
        })
    }

    pub async fn send_json(&mut self, value: Value) -> Result<()> {
        self.sink.send(Message::Text(value.to_string())).await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.sink.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.sink.send(Message::Close(None)).await?;
        Ok(())
    }

    pub async fn wait_for_event(&mut self, event_type: &str, timeout: Duration) -> Result<Event> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for event: {}", event_type);
            }

            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(event)) if event.event_type == event_type => {
                    return Ok(event);
                }
                Ok(Some(_)) => {
                    // Wrong event type, keep waiting
                    continue;
                }
                Ok(None) => {
                    anyhow::bail!("WebSocket connection closed");
                }
                Err(_) => {
                    anyhow::bail!("Timeout waiting for event: {}", event_type);
                }
            }
        }
    }

    /// Succeeds when nothing of `event_type` arrives within `window`.
    pub async fn expect_silence(&mut self, event_type: &str, window: Duration) -> Result<()> {
        match self.wait_for_event(event_type, window).await {
            Ok(event) => anyhow::bail!("Unexpected {} event: {}", event_type, event.data),
            Err(_) => Ok(()),
        }
    }
}
