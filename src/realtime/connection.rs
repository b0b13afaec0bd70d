//! Connection - handles one realtime (WebSocket) client.
//!
//! Each connection runs in its own task:
//!
//! ```text
//!   register sink ──▶ send `connected`
//!         │
//!         ▼
//!   tokio::select! { shutdown | outbound queue | inbound frame | idle deadline }
//!         │
//!         ▼
//!   remove from every room (implicit `disconnect`)
//! ```
//!
//! Inbound frames are handled one at a time, so a connection's events are
//! applied in arrival order.

use super::handlers::dispatch;
use super::protocol::{ClientEvent, OutboundFrame};
use super::rooms::{FrameSink, RoomRegistry};
use crate::error::EventError;
use crate::metrics;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Frames buffered for this client before new frames are dropped.
    pub outbound_queue: usize,
    /// Close the connection after this long without an inbound frame.
    pub idle_timeout: Duration,
}

/// A realtime client connection.
pub struct Connection<S> {
    id: String,
    ws: WebSocketStream<S>,
    rooms: Arc<RoomRegistry>,
    limits: ConnectionLimits,
    shutdown: CancellationToken,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        id: String,
        ws: WebSocketStream<S>,
        rooms: Arc<RoomRegistry>,
        limits: ConnectionLimits,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            ws,
            rooms,
            limits,
            shutdown,
        }
    }

    /// Run until the client leaves, goes idle, or the server shuts down.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            id,
            ws,
            rooms,
            limits,
            shutdown,
        } = self;

        let (tx, rx) = mpsc::channel(limits.outbound_queue.max(1));
        rooms.register(&id, tx.clone());
        metrics::realtime_connection_opened();
        info!("Realtime client connected");

        let result = event_loop(&id, ws, &rooms, tx, rx, limits, &shutdown).await;

        let left = rooms.remove_connection(&id);
        metrics::realtime_connection_closed();
        info!(rooms_left = left.len(), "Realtime client disconnected");
        result
    }
}

async fn event_loop<S>(
    id: &str,
    ws: WebSocketStream<S>,
    rooms: &RoomRegistry,
    tx: FrameSink,
    mut rx: mpsc::Receiver<Arc<OutboundFrame>>,
    limits: ConnectionLimits,
    shutdown: &CancellationToken,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    sink.send(Message::Text(OutboundFrame::connected(id).to_text()?))
        .await?;

    let idle = tokio::time::sleep(limits.idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let close = CloseFrame {
                    code: CloseCode::Away,
                    reason: "server shutting down".into(),
                };
                // The peer may already be gone.
                let _ = sink.send(Message::Close(Some(close))).await;
                return Ok(());
            }
            frame = rx.recv() => {
                let Some(frame) = frame else { return Ok(()) };
                sink.send(Message::Text(frame.to_text()?)).await?;
            }
            _ = &mut idle => {
                info!(timeout = ?limits.idle_timeout, "Realtime client idle, closing");
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            incoming = stream.next() => {
                let Some(message) = incoming else { return Ok(()) };
                idle.as_mut().reset(Instant::now() + limits.idle_timeout);
                match message? {
                    Message::Text(text) => handle_text(id, &text, rooms, &tx),
                    Message::Binary(_) => reply_error(&tx, &EventError::BinaryFrame),
                    Message::Close(frame) => {
                        debug!(?frame, "Client closed connection");
                        return Ok(());
                    }
                    // Pings are answered by tungstenite on the next flush.
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                }
            }
        }
    }
}

fn handle_text(id: &str, text: &str, rooms: &RoomRegistry, tx: &FrameSink) {
    match ClientEvent::parse(text) {
        Ok(event) => dispatch(rooms, id, event),
        Err(e) => {
            warn!(error = %e, "Rejected realtime frame");
            reply_error(tx, &e);
        }
    }
}

fn reply_error(tx: &FrameSink, err: &EventError) {
    if tx.try_send(Arc::new(OutboundFrame::error(err))).is_err() {
        metrics::record_frame_dropped();
    }
}
