//! Test realtime client.
//!
//! Speaks the JSON event framing over a WebSocket.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A realtime client connected to a test server.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub connection_id: String,
}

impl TestClient {
    /// Connect and consume the `connected` greeting.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(format!("ws://{addr}/")).await?;
        let mut client = Self {
            ws,
            connection_id: String::new(),
        };
        let greeting = client.expect_event("connected").await?;
        client.connection_id = greeting["connectionId"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(client)
    }

    pub async fn send_event(&mut self, event: &str, data: Value) -> anyhow::Result<()> {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.ws.send(Message::Text(frame)).await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, message: Message) -> anyhow::Result<()> {
        self.ws.send(message).await?;
        Ok(())
    }

    pub async fn join(&mut self, room: &str) -> anyhow::Result<()> {
        self.send_event("join_chat", json!(room)).await
    }

    pub async fn leave(&mut self, room: &str) -> anyhow::Result<()> {
        self.send_event("leave_chat", json!(room)).await
    }

    /// Next text frame as `(event, data)`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> anyhow::Result<(String, Value)> {
        loop {
            let message = tokio::time::timeout(timeout, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            match message {
                Message::Text(text) => {
                    let frame: Value = serde_json::from_str(&text)?;
                    let event = frame["event"].as_str().unwrap_or_default().to_string();
                    return Ok((event, frame["data"].clone()));
                }
                Message::Close(_) => anyhow::bail!("connection closed"),
                _ => continue,
            }
        }
    }

    /// Wait for `event` and return its data.
    pub async fn expect_event(&mut self, event: &str) -> anyhow::Result<Value> {
        let (got, data) = self.recv_timeout(Duration::from_secs(2)).await?;
        anyhow::ensure!(got == event, "expected `{event}`, got `{got}` with {data}");
        Ok(data)
    }

    /// Assert nothing arrives for `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> anyhow::Result<()> {
        match self.recv_timeout(window).await {
            Ok((event, data)) => anyhow::bail!("unexpected `{event}` frame: {data}"),
            Err(_) => Ok(()),
        }
    }

    /// Wait for the server to close the connection.
    pub async fn expect_closed(&mut self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.ws.next()).await? {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => return Ok(()),
                Some(Ok(_)) => continue,
            }
        }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
