//! Websocket plumbing: frame mapping, the `Transport` adapter and
//! reconnecting connects.
//!
//! DESIGN
//! ======
//! The socket is split once per connection. A spawned writer task owns the
//! sink and drains an unbounded channel of [`Frame`]s; [`WsTransport`] holds
//! the sending half, so `Transport::emit` stays synchronous and never blocks
//! the session. The read half stays with the caller's event loop.
//!
//! Inbound element broadcasts are only recognised without a `parent_id`;
//! frames answering one of our own requests carry one and are not merged,
//! except for the join reply (`room:snapshot`).

#[cfg(test)]
#[path = "ws_test.rs"]
mod ws_test;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use canvas::element::ElementId;
use canvas::sync::{Inbound, Outbound, Transport, TransportError};
use frames::{Frame, Status, syscall};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CliError;

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
pub type WsReader = SplitStream<WsStream>;

/// One live socket: the channel into its writer task and its read half.
pub struct Connection {
    pub tx: mpsc::UnboundedSender<Frame>,
    pub reader: WsReader,
    pub writer: JoinHandle<()>,
}

/// Exponential reconnect schedule.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub attempts: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(attempts: u32) -> Self {
        Self { initial: Duration::from_millis(250), max: Duration::from_secs(10), attempts }
    }

    /// Delay before retry number `attempt` (0-based): doubles each time,
    /// capped at `max`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial.saturating_mul(2_u32.saturating_pow(attempt)).min(self.max)
    }
}

/// [`Transport`] over the writer task's channel.
#[derive(Debug, Default)]
pub struct WsTransport {
    tx: Option<mpsc::UnboundedSender<Frame>>,
}

impl WsTransport {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn attach(&mut self, tx: mpsc::UnboundedSender<Frame>) {
        self.tx = Some(tx);
    }

    /// Drop the sender so the writer task can finish.
    pub fn detach(&mut self) {
        self.tx = None;
    }
}

impl Transport for WsTransport {
    fn emit(&mut self, message: Outbound) -> Result<(), TransportError> {
        let Some(tx) = &self.tx else {
            return Err(TransportError::Disconnected);
        };
        let frame = outbound_frame(message, Uuid::new_v4().to_string(), now_ms())
            .map_err(|err| TransportError::Send(err.to_string()))?;
        tx.send(frame).map_err(|_| TransportError::Disconnected)
    }

    fn is_connected(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Encode a coordinator message as a request frame.
///
/// # Errors
///
/// Returns the serialization error if an element cannot be encoded.
pub fn outbound_frame(message: Outbound, id: String, ts: i64) -> Result<Frame, serde_json::Error> {
    let (name, data) = match &message {
        Outbound::Join { room_id } => (syscall::ROOM_JOIN, json!({ "roomId": room_id })),
        Outbound::Upsert { room_id, element } => {
            (syscall::ELEMENT_UPSERT, json!({ "roomId": room_id, "element": serde_json::to_value(element)? }))
        }
        Outbound::Delete { room_id, id } => (syscall::ELEMENT_DELETE, json!({ "roomId": room_id, "id": id })),
        Outbound::Persist { room_id } => (syscall::ROOM_PERSIST, json!({ "roomId": room_id })),
        Outbound::Leave { room_id } => (syscall::ROOM_LEAVE, json!({ "roomId": room_id })),
    };
    Ok(Frame::request(id, ts, name, message.room_id(), data))
}

/// Translate a server frame into a coordinator message.
///
/// Returns `None` for frames the session does not consume; error frames are
/// logged.
#[must_use]
pub fn inbound_from_frame(frame: Frame) -> Option<Inbound> {
    if frame.status == Status::Error {
        warn!(
            syscall = %frame.syscall,
            message = frame.error_message().unwrap_or("unknown websocket error"),
            "server error"
        );
        return None;
    }
    if frame.status == Status::Request {
        return None;
    }
    let broadcast = frame.parent_id.is_none();
    match (frame.syscall.as_str(), frame.data) {
        (syscall::ROOM_SNAPSHOT, Value::Object(mut data)) => match data.remove("elements") {
            Some(Value::Array(elements)) => Some(Inbound::Snapshot(elements)),
            _ => Some(Inbound::Snapshot(Vec::new())),
        },
        (syscall::ELEMENT_UPSERT, Value::Object(mut data)) if broadcast => data.remove("element").map(Inbound::Upsert),
        (syscall::ELEMENT_DELETE, Value::Object(data)) if broadcast => {
            data.get("id").and_then(Value::as_str).map(|id| Inbound::Deleted(ElementId::from(id)))
        }
        (other, _) => {
            debug!(syscall = other, "ignoring frame");
            None
        }
    }
}

/// Open one socket and spawn its writer task.
///
/// # Errors
///
/// Returns [`CliError::WsConnect`] if the handshake fails.
pub async fn connect(url: &str) -> Result<Connection, CliError> {
    let (stream, _) = connect_async(url).await?;
    let (mut sink, reader) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = sink.send(Message::Binary(frames::encode_frame(&frame).into())).await {
                warn!(error = %err, syscall = %frame.syscall, "websocket write failed");
                return;
            }
        }
        if let Err(err) = sink.close().await {
            debug!(error = %err, "websocket close failed");
        }
    });
    info!(%url, "connected");
    Ok(Connection { tx, reader, writer })
}

/// Connect, retrying on failure according to `backoff`.
///
/// # Errors
///
/// Returns [`CliError::Unreachable`] once every attempt has failed.
pub async fn connect_with_backoff(url: &str, backoff: &Backoff) -> Result<Connection, CliError> {
    for attempt in 0..backoff.attempts {
        match connect(url).await {
            Ok(conn) => return Ok(conn),
            Err(err) => {
                let delay = backoff.delay(attempt);
                warn!(%url, attempt, error = %err, ?delay, "connect failed; retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(CliError::Unreachable { url: url.to_owned(), attempts: backoff.attempts })
}

/// Next decoded frame from the read half.
///
/// # Errors
///
/// Returns [`CliError::WsClosed`] when the peer closes and the socket or
/// codec error otherwise.
pub async fn next_frame(reader: &mut WsReader) -> Result<Frame, CliError> {
    loop {
        let Some(message) = reader.next().await else {
            return Err(CliError::WsClosed);
        };
        match message? {
            Message::Binary(bytes) => return frames::decode_frame(&bytes).map_err(CliError::from),
            Message::Close(_) => return Err(CliError::WsClosed),
            _ => {}
        }
    }
}

fn now_ms() -> i64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(duration.as_millis()).unwrap_or(0)
}
