//! Connection lifecycle for the document channel.
//!
//! The manager owns the one channel a session may hold and runs the
//! connect / close / reconnect state machine. Transport failures never
//! escape: they become state transitions, observable through a watch
//! channel, plus dispositions the session turns into status signals.
//!
//! Reconnection backs off exponentially from the base delay and stops
//! after the configured attempt cap; after that the caller must call
//! connect again. An explicit disconnect cancels any pending retry and
//! clears the document id first, so a stale retry can never reconnect an
//! abandoned session.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use url::Url;

use crate::error::{ChannelError, SyncError, SyncResult};
use crate::transport::{Channel, ChannelEvent, CloseReason, Connector};

/// Lifecycle state of the document channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel and no pending retry.
    Idle,
    /// An open is in progress.
    Connecting,
    /// The channel is live.
    Open,
    /// A voluntary close is in progress.
    Closing,
    /// The channel dropped abnormally; a retry is pending.
    Reconnecting,
}

/// Result of a connect or retry attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The channel is open.
    Opened,
    /// The open failed; a retry is scheduled.
    RetryScheduled,
    /// The attempt cap is exhausted; no further automatic attempts.
    GaveUp,
    /// The attempt was abandoned (no document, bad endpoint); nothing
    /// scheduled.
    Aborted,
}

/// Result of handling a channel close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Normal-closure code: voluntary departure, no reconnection.
    Voluntary,
    /// Abnormal close; a retry is scheduled.
    RetryScheduled,
    /// Abnormal close and the attempt cap is exhausted.
    GaveUp,
}

/// Owns the channel and its lifecycle.
#[derive(Debug)]
pub struct ConnectionManager<N> {
    connector: N,
    ws_base: String,
    base_delay: Duration,
    max_attempts: u32,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    document_id: Option<i64>,
    reconnect_attempt: u32,
    reconnect_at: Option<Instant>,
    channel: Option<Channel>,
}

impl<N: Connector> ConnectionManager<N> {
    /// Create a manager. Returns the manager and a watch receiver that
    /// observes every state transition.
    pub fn new(
        connector: N,
        ws_base: impl Into<String>,
        base_delay: Duration,
        max_attempts: u32,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        (
            Self {
                connector,
                ws_base: ws_base.into(),
                base_delay,
                max_attempts,
                state: ConnectionState::Idle,
                state_tx,
                document_id: None,
                reconnect_attempt: 0,
                reconnect_at: None,
                channel: None,
            },
            state_rx,
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The document this manager is bound to, if any.
    pub fn document_id(&self) -> Option<i64> {
        self.document_id
    }

    /// Number of reconnect attempts made since the last successful open.
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// When the pending retry fires, if one is scheduled.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Connect to a document room. Resets the attempt counter.
    pub async fn connect(&mut self, document_id: i64, token: &str) -> ConnectOutcome {
        self.document_id = Some(document_id);
        self.reconnect_attempt = 0;
        self.reconnect_at = None;
        self.open_once(token).await
    }

    /// Run the pending retry. The attempt counter keeps counting from
    /// where the last failure left it.
    pub async fn retry(&mut self, token: &str) -> ConnectOutcome {
        self.reconnect_at = None;
        self.open_once(token).await
    }

    /// Handle a channel close event.
    pub fn handle_close(&mut self, reason: &CloseReason) -> CloseDisposition {
        self.channel = None;
        tracing::info!(code = reason.code, reason = %reason.reason, "channel closed");

        if reason.is_voluntary() {
            self.reconnect_at = None;
            self.set_state(ConnectionState::Idle);
            return CloseDisposition::Voluntary;
        }
        match self.schedule_retry() {
            ConnectOutcome::RetryScheduled => CloseDisposition::RetryScheduled,
            _ => CloseDisposition::GaveUp,
        }
    }

    /// Voluntarily close. Cancels the pending retry before the channel
    /// goes down and clears the document id, then settles in `Idle`.
    pub fn disconnect(&mut self) {
        self.reconnect_at = None;
        if self.channel.is_some() {
            self.set_state(ConnectionState::Closing);
        }
        // Dropping the channel releases the outbound queue; the transport
        // sends the normal-closure code on its way out.
        self.channel = None;
        self.document_id = None;
        self.set_state(ConnectionState::Idle);
    }

    /// Queue a frame on the open channel.
    pub fn send_frame(&mut self, frame: String) -> SyncResult<()> {
        if self.state != ConnectionState::Open {
            return Err(SyncError::NotConnected);
        }
        match &self.channel {
            Some(channel) => channel
                .outbound
                .send(frame)
                .map_err(|_| SyncError::NotConnected),
            None => Err(SyncError::NotConnected),
        }
    }

    /// Await the next channel event. Pends forever while no channel is
    /// open; returns `None` if the channel's pumps vanished without a
    /// close event (treated as an abnormal close by the caller).
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        match self.channel.as_mut() {
            Some(channel) => channel.events.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn open_once(&mut self, token: &str) -> ConnectOutcome {
        let Some(document_id) = self.document_id else {
            self.set_state(ConnectionState::Idle);
            return ConnectOutcome::Aborted;
        };
        let url = match self.endpoint(document_id, token) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("cannot build channel endpoint: {e}");
                self.set_state(ConnectionState::Idle);
                return ConnectOutcome::Aborted;
            }
        };

        self.set_state(ConnectionState::Connecting);
        match self.connector.open(&url).await {
            Ok(channel) => {
                self.channel = Some(channel);
                self.reconnect_attempt = 0;
                self.set_state(ConnectionState::Open);
                tracing::info!(document_id, "connected to document room");
                ConnectOutcome::Opened
            }
            Err(e) => {
                tracing::warn!(document_id, "channel open failed: {e}");
                self.schedule_retry()
            }
        }
    }

    /// The channel address carries the document id in the path and the
    /// bearer token as a query parameter — the only authentication slot
    /// the channel type offers, since it forbids custom headers.
    fn endpoint(&self, document_id: i64, token: &str) -> Result<Url, ChannelError> {
        let address = format!(
            "{}/ws/{}?token={}",
            self.ws_base.trim_end_matches('/'),
            document_id,
            token
        );
        Ok(Url::parse(&address)?)
    }

    fn schedule_retry(&mut self) -> ConnectOutcome {
        if self.reconnect_attempt >= self.max_attempts {
            tracing::warn!(
                attempts = self.reconnect_attempt,
                "max reconnect attempts reached; giving up"
            );
            self.reconnect_at = None;
            self.set_state(ConnectionState::Idle);
            return ConnectOutcome::GaveUp;
        }

        let delay = self.base_delay * 2u32.saturating_pow(self.reconnect_attempt);
        self.reconnect_attempt += 1;
        self.reconnect_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Reconnecting);
        tracing::info!(
            attempt = self.reconnect_attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        ConnectOutcome::RetryScheduled
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "connection state");
        }
        self.state = state;
        let _ = self.state_tx.send(state);
    }
}
