//! Channel transport for the document room.
//!
//! A [`Channel`] is one open bidirectional connection to a document room:
//! an outbound frame sender and an inbound event receiver. The connection
//! manager owns the channel exclusively; nothing else touches the socket.
//!
//! [`Connector`] is the seam between the engine and the wire.
//! [`WsConnector`] opens real WebSocket connections and bridges them to
//! the channel's queues with a read pump and a write pump;
//! [`ScriptedConnector`] is the in-memory double used by tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::ChannelError;

/// Close code signalling voluntary departure; the server expects no
/// reconnection after it.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code used when the connection dropped without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Why a channel closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    /// Build a close reason from a wire close frame.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Voluntary departure.
    pub fn normal() -> Self {
        Self::new(NORMAL_CLOSURE, "user left the document")
    }

    /// The connection dropped without a close handshake.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(ABNORMAL_CLOSURE, reason)
    }

    /// Whether this closure was voluntary (no reconnection expected).
    pub fn is_voluntary(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

/// Inbound events surfaced by an open channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A text frame arrived.
    Frame(String),
    /// The channel closed; no further events follow.
    Closed(CloseReason),
}

/// One open connection to a document room.
///
/// Dropping the channel releases the outbound queue, which the transport
/// treats as voluntary departure (normal closure on the wire).
#[derive(Debug)]
pub struct Channel {
    /// Outbound frame queue.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Inbound event queue.
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Opens channels to document rooms.
#[trait_variant::make(Send)]
pub trait Connector: Send + Sync {
    /// Open a channel to the given endpoint.
    async fn open(&self, url: &Url) -> Result<Channel, ChannelError>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Clone, Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    async fn open(&self, url: &Url) -> Result<Channel, ChannelError> {
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        tracing::debug!(%url, "channel established");

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ChannelEvent>();

        // Write pump: drains the outbound queue. When the sender side is
        // dropped the user is leaving, so a normal-closure frame goes out.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!("channel write failed: {e}");
                    return;
                }
            }
            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "user left the document".into(),
            }));
            let _ = sink.send(close).await;
        });

        // Read pump: forwards frames until the socket closes, then reports
        // exactly one close event.
        tokio::spawn(async move {
            let mut closed = false;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(Message::Text(text)) => {
                        if event_tx.send(ChannelEvent::Frame(text)).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| CloseReason::new(u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or_else(|| CloseReason::abnormal("closed without status"));
                        let _ = event_tx.send(ChannelEvent::Closed(reason));
                        closed = true;
                        break;
                    }
                    Ok(_) => {
                        // Binary and ping/pong frames are not part of the
                        // protocol; tungstenite answers pings itself.
                    }
                    Err(e) => {
                        let _ = event_tx.send(ChannelEvent::Closed(CloseReason::abnormal(
                            e.to_string(),
                        )));
                        closed = true;
                        break;
                    }
                }
            }
            if !closed {
                let _ = event_tx.send(ChannelEvent::Closed(CloseReason::abnormal(
                    "connection reset",
                )));
            }
        });

        Ok(Channel {
            outbound: outbound_tx,
            events: event_rx,
        })
    }
}

/// One accepted open on a [`ScriptedConnector`]: the server side of the
/// channel pair.
#[derive(Debug)]
pub struct ScriptedLink {
    /// Frames the client sent.
    pub outbound: mpsc::UnboundedReceiver<String>,
    /// Inject frames and closes into the client.
    pub events: mpsc::UnboundedSender<ChannelEvent>,
}

impl ScriptedLink {
    /// Push an inbound frame to the client.
    pub fn send_frame(&self, text: impl Into<String>) {
        let _ = self.events.send(ChannelEvent::Frame(text.into()));
    }

    /// Close the channel from the server side.
    pub fn close(&self, reason: CloseReason) {
        let _ = self.events.send(ChannelEvent::Closed(reason));
    }

    /// Pop an outbound frame if one is queued.
    pub fn try_outbound(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Await the next outbound frame.
    pub async fn next_outbound(&mut self) -> Option<String> {
        self.outbound.recv().await
    }
}

/// A recorded open attempt.
#[derive(Clone, Debug)]
pub struct OpenAttempt {
    pub url: Url,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct ScriptedState {
    refuse_opens: AtomicU32,
    attempts: Mutex<Vec<OpenAttempt>>,
    links: Mutex<VecDeque<ScriptedLink>>,
    opened: Notify,
}

/// Scripted connector for tests and development.
///
/// Accepts opens by default, handing the test the server side of each
/// channel as a [`ScriptedLink`]. Opens can be refused to exercise the
/// reconnect path, and every attempt is recorded with its timestamp so
/// backoff schedules can be asserted exactly.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    state: Arc<ScriptedState>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` open attempts.
    pub fn refuse_next_opens(&self, n: u32) {
        self.state.refuse_opens.store(n, Ordering::SeqCst);
    }

    /// All open attempts seen so far, in order.
    pub fn attempts(&self) -> Vec<OpenAttempt> {
        self.state.attempts.lock().unwrap().clone()
    }

    /// Number of open attempts seen so far.
    pub fn attempt_count(&self) -> usize {
        self.state.attempts.lock().unwrap().len()
    }

    /// Pop the server side of an accepted open, if any.
    pub fn try_next_link(&self) -> Option<ScriptedLink> {
        self.state.links.lock().unwrap().pop_front()
    }

    /// Await the server side of the next accepted open.
    pub async fn next_link(&self) -> ScriptedLink {
        loop {
            if let Some(link) = self.try_next_link() {
                return link;
            }
            self.state.opened.notified().await;
        }
    }
}

impl Connector for ScriptedConnector {
    async fn open(&self, url: &Url) -> Result<Channel, ChannelError> {
        self.state.attempts.lock().unwrap().push(OpenAttempt {
            url: url.clone(),
            at: Instant::now(),
        });

        let refusals = self.state.refuse_opens.load(Ordering::SeqCst);
        if refusals > 0 {
            self.state.refuse_opens.store(refusals - 1, Ordering::SeqCst);
            return Err(ChannelError::Connect("open refused by script".to_string()));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ChannelEvent>();

        self.state.links.lock().unwrap().push_back(ScriptedLink {
            outbound: outbound_rx,
            events: event_tx,
        });
        self.state.opened.notify_one();

        Ok(Channel {
            outbound: outbound_tx,
            events: event_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_voluntary() {
        assert!(CloseReason::normal().is_voluntary());
        assert!(!CloseReason::abnormal("lost").is_voluntary());
        assert!(!CloseReason::new(1012, "service restart").is_voluntary());
    }

    #[tokio::test]
    async fn test_scripted_connector_accepts_and_records() {
        let connector = ScriptedConnector::new();
        let url = Url::parse("ws://localhost:8080/ws/1?token=t").unwrap();

        let mut channel = connector.open(&url).await.unwrap();
        assert_eq!(connector.attempt_count(), 1);

        let mut link = connector.next_link().await;
        channel.outbound.send("hello".to_string()).unwrap();
        assert_eq!(link.next_outbound().await.unwrap(), "hello");

        link.send_frame("world");
        assert_eq!(
            channel.events.recv().await.unwrap(),
            ChannelEvent::Frame("world".to_string())
        );
    }

    #[tokio::test]
    async fn test_scripted_connector_refuses_opens() {
        let connector = ScriptedConnector::new();
        let url = Url::parse("ws://localhost:8080/ws/1").unwrap();
        connector.refuse_next_opens(2);

        assert!(connector.open(&url).await.is_err());
        assert!(connector.open(&url).await.is_err());
        assert!(connector.open(&url).await.is_ok());
        assert_eq!(connector.attempt_count(), 3);
    }
}
