//! The per-editor sync session.
//!
//! A [`Session`] is created on editor activation and destroyed on
//! deactivation — exactly one per open editor, never two channels for the
//! same editor instance. All mutable engine state (connection manager,
//! edit policy, autosave coordinator) lives inside one actor task;
//! commands, channel events, timer deadlines and save completions are
//! multiplexed through a single `select!` loop, so every mutation happens
//! on one logical context and no lock guards any of it.
//!
//! Durable saves are the one exception to "everything in the loop": the
//! persistence round trip runs in its own task so a slow API cannot stall
//! frame handling, and its completion re-enters the loop as an event
//! carrying the generation snapshot the save was taken at.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use protocol::{EditPayload, Envelope, MessageKind};
use store::{CredentialProvider, Document, DocumentDraft, DocumentStore, StoreResult};

use crate::autosave::{AutosaveCoordinator, SaveStatus, SaveTrigger};
use crate::config::SyncConfig;
use crate::connection::{CloseDisposition, ConnectOutcome, ConnectionManager, ConnectionState};
use crate::dispatcher::{EventDispatcher, Subscription};
use crate::edit_sync::{EditSyncPolicy, PresenceEntry, RemoteOutcome};
use crate::error::{SyncError, SyncResult};
use crate::transport::{ChannelEvent, CloseReason, Connector};

/// Stream of session events handed to the caller at activation.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// Observable happenings of a session — the consumable status signals.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The connection state changed.
    Connection(ConnectionState),
    /// All automatic reconnect attempts are exhausted; nothing further
    /// happens until `connect()` is called again.
    ReconnectGaveUp,
    /// A remote edit replaced the local content.
    ContentReplaced {
        user_id: i64,
        username: String,
        content: String,
    },
    /// A join/leave was appended to the activity log.
    Activity(PresenceEntry),
    /// The save status changed.
    SaveStatus(SaveStatus),
}

/// Commands from the editor into the actor.
enum SessionCommand {
    EditContent(String),
    EditTitle(String),
    Save {
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Publish {
        kind: MessageKind,
        payload: Option<serde_json::Value>,
    },
    Connect {
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Deactivate {
        reply: oneshot::Sender<()>,
    },
}

/// Completion of a spawned save task.
struct SaveOutcome {
    generation: u64,
    trigger: SaveTrigger,
    result: StoreResult<Document>,
}

/// Handle to a live sync session.
///
/// Cheap operations (edits, publishes) are fire-and-forget into the
/// actor; lifecycle operations await an acknowledgment so their
/// guarantees (no pending timers after disconnect, no open channel after
/// deactivate) hold when the call returns.
pub struct Session {
    document_id: i64,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    dispatcher: Arc<EventDispatcher>,
    task: JoinHandle<()>,
}

impl Session {
    /// Activate a session: load the document, then connect to its room.
    ///
    /// Fails synchronously with [`SyncError::CredentialMissing`] when no
    /// credential is available — no attempt is made. A failed first open
    /// is not an activation error: the session comes up reconnecting.
    pub async fn activate<N, S, C>(
        config: SyncConfig,
        connector: N,
        store: Arc<S>,
        credentials: Arc<C>,
        document_id: i64,
    ) -> SyncResult<(Session, Document, SessionEvents)>
    where
        N: Connector + 'static,
        S: DocumentStore + 'static,
        C: CredentialProvider + 'static,
    {
        let credential = credentials
            .credential()
            .ok_or(SyncError::CredentialMissing)?;
        let document = store.fetch(document_id).await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (save_tx, save_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(EventDispatcher::new());

        let (conn, state_rx) = ConnectionManager::new(
            connector,
            config.ws_base.clone(),
            config.base_reconnect_delay,
            config.max_reconnect_attempts,
        );
        let policy = EditSyncPolicy::new(
            config.edit_debounce,
            credential.user_id,
            document.title.clone(),
            document.content.clone(),
        );
        let autosave = AutosaveCoordinator::new(config.autosave_delay, config.saved_notice);

        let actor = SessionActor {
            document_id,
            store,
            credentials,
            dispatcher: Arc::clone(&dispatcher),
            conn,
            policy,
            autosave,
            cmd_rx,
            events: event_tx,
            save_tx,
            save_rx,
            manual_reply: None,
        };
        let task = tokio::spawn(actor.run());

        Ok((
            Session {
                document_id,
                cmd_tx,
                state_rx,
                dispatcher,
                task,
            },
            document,
            event_rx,
        ))
    }

    /// The document this session is bound to.
    pub fn document_id(&self) -> i64 {
        self.document_id
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch every connection state transition.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The session's message dispatcher.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Subscribe to inbound messages of a kind.
    pub fn subscribe<F>(&self, kind: MessageKind, handler: F) -> Subscription
    where
        F: Fn(&Envelope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.dispatcher.on(kind, handler)
    }

    /// Record a local content change.
    pub fn edit_content(&self, content: impl Into<String>) -> SyncResult<()> {
        self.command(SessionCommand::EditContent(content.into()))
    }

    /// Record a local title change.
    pub fn edit_title(&self, title: impl Into<String>) -> SyncResult<()> {
        self.command(SessionCommand::EditTitle(title.into()))
    }

    /// Send a message to the room (cursor updates and the like).
    pub fn publish(
        &self,
        kind: MessageKind,
        payload: Option<serde_json::Value>,
    ) -> SyncResult<()> {
        self.command(SessionCommand::Publish { kind, payload })
    }

    /// Trigger a manual save. Completes when the persistence call does;
    /// fails with [`SyncError::SaveInFlight`] if a save is already
    /// outstanding.
    pub async fn save(&self) -> SyncResult<()> {
        let (reply, response) = oneshot::channel();
        self.command(SessionCommand::Save { reply })?;
        response.await.map_err(|_| SyncError::SessionClosed)?
    }

    /// Connect again after a disconnect or a reconnect give-up. Resets
    /// the attempt counter.
    pub async fn connect(&self) -> SyncResult<()> {
        let (reply, response) = oneshot::channel();
        self.command(SessionCommand::Connect { reply })?;
        response.await.map_err(|_| SyncError::SessionClosed)?
    }

    /// Voluntarily close the channel. When this returns, the pending
    /// reconnect is cancelled, no timers remain and no channel is open.
    pub async fn disconnect(&self) -> SyncResult<()> {
        let (reply, response) = oneshot::channel();
        self.command(SessionCommand::Disconnect { reply })?;
        response.await.map_err(|_| SyncError::SessionClosed)
    }

    /// Deactivate the session: disconnect, release every subscription
    /// and stop the actor.
    pub async fn deactivate(self) {
        let Session { cmd_tx, task, .. } = self;
        let (reply, response) = oneshot::channel();
        if cmd_tx.send(SessionCommand::Deactivate { reply }).is_ok() {
            let _ = response.await;
        }
        let _ = task.await;
    }

    fn command(&self, command: SessionCommand) -> SyncResult<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| SyncError::SessionClosed)
    }
}

/// What woke the actor loop.
enum Wake {
    Command(Option<SessionCommand>),
    Channel(Option<ChannelEvent>),
    EditDebounce,
    AutosaveDue,
    NoticeDue,
    ReconnectDue,
    SaveDone(SaveOutcome),
}

struct SessionActor<N, S, C> {
    document_id: i64,
    store: Arc<S>,
    credentials: Arc<C>,
    dispatcher: Arc<EventDispatcher>,
    conn: ConnectionManager<N>,
    policy: EditSyncPolicy,
    autosave: AutosaveCoordinator,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    save_tx: mpsc::UnboundedSender<SaveOutcome>,
    save_rx: mpsc::UnboundedReceiver<SaveOutcome>,
    manual_reply: Option<oneshot::Sender<SyncResult<()>>>,
}

impl<N, S, C> SessionActor<N, S, C>
where
    N: Connector + 'static,
    S: DocumentStore + 'static,
    C: CredentialProvider + 'static,
{
    async fn run(mut self) {
        self.initial_connect().await;

        loop {
            match self.next_wake().await {
                Wake::Command(None) => {
                    // Every handle is gone; tear down like a deactivate.
                    self.shutdown();
                    break;
                }
                Wake::Command(Some(command)) => {
                    if self.handle_command(command).await {
                        break;
                    }
                }
                Wake::Channel(event) => self.handle_channel_event(event),
                Wake::EditDebounce => self.broadcast_edit(),
                Wake::AutosaveDue => self.run_autosave(),
                Wake::NoticeDue => {
                    self.autosave.notice_elapsed();
                    self.emit_status();
                }
                Wake::ReconnectDue => self.run_retry().await,
                Wake::SaveDone(outcome) => self.finish_save(outcome),
            }
        }

        tracing::debug!(document_id = self.document_id, "session actor stopped");
    }

    /// Multiplex everything the actor reacts to. The deadline branches
    /// are disabled (not merely far away) while their timer is unset.
    async fn next_wake(&mut self) -> Wake {
        let edit_at = self.policy.broadcast_deadline();
        let save_at = self.autosave.save_deadline();
        let notice_at = self.autosave.notice_deadline();
        let retry_at = self.conn.reconnect_deadline();

        tokio::select! {
            command = self.cmd_rx.recv() => Wake::Command(command),
            event = self.conn.next_event() => Wake::Channel(event),
            outcome = self.save_rx.recv() => match outcome {
                Some(outcome) => Wake::SaveDone(outcome),
                None => Wake::Command(None),
            },
            _ = sleep_until(edit_at.unwrap_or_else(Instant::now)), if edit_at.is_some() => {
                Wake::EditDebounce
            }
            _ = sleep_until(save_at.unwrap_or_else(Instant::now)), if save_at.is_some() => {
                Wake::AutosaveDue
            }
            _ = sleep_until(notice_at.unwrap_or_else(Instant::now)), if notice_at.is_some() => {
                Wake::NoticeDue
            }
            _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                Wake::ReconnectDue
            }
        }
    }

    async fn initial_connect(&mut self) {
        match self.credentials.credential() {
            Some(credential) => {
                let outcome = self.conn.connect(self.document_id, &credential.token).await;
                self.report_connect(outcome);
            }
            None => {
                tracing::error!(
                    document_id = self.document_id,
                    "no credential at activation; session starts disconnected"
                );
            }
        }
    }

    /// Returns `true` when the actor should stop.
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::EditContent(content) => {
                self.policy.note_content_change(content);
                self.autosave.note_local_edit();
            }
            SessionCommand::EditTitle(title) => {
                self.policy.note_title_change(title);
                self.autosave.note_local_edit();
            }
            SessionCommand::Save { reply } => match self.autosave.begin(SaveTrigger::Manual) {
                Ok(generation) => {
                    self.manual_reply = Some(reply);
                    self.spawn_save(generation, SaveTrigger::Manual);
                    self.emit_status();
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            SessionCommand::Publish { kind, payload } => {
                let envelope = Envelope::outbound(kind, self.document_id, payload);
                self.send_envelope(&envelope);
            }
            SessionCommand::Connect { reply } => match self.credentials.credential() {
                Some(credential) => {
                    let outcome = self.conn.connect(self.document_id, &credential.token).await;
                    self.report_connect(outcome);
                    let result = match outcome {
                        ConnectOutcome::Opened | ConnectOutcome::RetryScheduled => Ok(()),
                        ConnectOutcome::GaveUp => Err(SyncError::MaxReconnectExceeded),
                        ConnectOutcome::Aborted => Err(SyncError::NotConnected),
                    };
                    let _ = reply.send(result);
                }
                None => {
                    let _ = reply.send(Err(SyncError::CredentialMissing));
                }
            },
            SessionCommand::Disconnect { reply } => {
                self.disconnect_all();
                let _ = reply.send(());
            }
            SessionCommand::Deactivate { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    fn handle_channel_event(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Frame(text)) => self.handle_frame(&text),
            Some(ChannelEvent::Closed(reason)) => self.handle_closed(reason),
            // The pumps vanished without a close handshake.
            None => self.handle_closed(CloseReason::abnormal("channel dropped")),
        }
    }

    fn handle_frame(&mut self, text: &str) {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                // A malformed frame costs exactly itself, never the session.
                tracing::warn!("dropping malformed frame: {e}");
                return;
            }
        };

        self.dispatcher.dispatch(&envelope);

        match self.policy.apply_remote(&envelope) {
            RemoteOutcome::ContentReplaced { content } => {
                self.emit(SessionEvent::ContentReplaced {
                    user_id: envelope.user_id,
                    username: envelope.username.clone(),
                    content,
                });
            }
            RemoteOutcome::Presence(entry) => self.emit(SessionEvent::Activity(entry)),
            RemoteOutcome::SelfEcho | RemoteOutcome::Ignored => {}
        }
    }

    fn handle_closed(&mut self, reason: CloseReason) {
        match self.conn.handle_close(&reason) {
            CloseDisposition::Voluntary => {
                self.emit(SessionEvent::Connection(ConnectionState::Idle));
            }
            CloseDisposition::RetryScheduled => {
                self.emit(SessionEvent::Connection(ConnectionState::Reconnecting));
            }
            CloseDisposition::GaveUp => {
                self.emit(SessionEvent::Connection(ConnectionState::Idle));
                self.emit(SessionEvent::ReconnectGaveUp);
            }
        }
    }

    async fn run_retry(&mut self) {
        match self.credentials.credential() {
            Some(credential) => {
                let outcome = self.conn.retry(&credential.token).await;
                self.report_connect(outcome);
            }
            None => {
                tracing::error!("no credential at reconnect time; abandoning retry");
                self.conn.disconnect();
                self.emit(SessionEvent::Connection(ConnectionState::Idle));
            }
        }
    }

    fn report_connect(&mut self, outcome: ConnectOutcome) {
        match outcome {
            ConnectOutcome::Opened => {
                self.emit(SessionEvent::Connection(ConnectionState::Open));
            }
            ConnectOutcome::RetryScheduled => {
                self.emit(SessionEvent::Connection(ConnectionState::Reconnecting));
            }
            ConnectOutcome::GaveUp => {
                self.emit(SessionEvent::Connection(ConnectionState::Idle));
                self.emit(SessionEvent::ReconnectGaveUp);
            }
            ConnectOutcome::Aborted => {
                self.emit(SessionEvent::Connection(ConnectionState::Idle));
            }
        }
    }

    /// The edit debounce expired: broadcast the full current content.
    fn broadcast_edit(&mut self) {
        let content = self.policy.debounce_fired();
        let payload = match serde_json::to_value(EditPayload { content }) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::error!("failed to encode edit payload: {e}");
                return;
            }
        };
        let envelope = Envelope::outbound(MessageKind::Edit, self.document_id, payload);
        self.send_envelope(&envelope);
    }

    fn send_envelope(&mut self, envelope: &Envelope) {
        let frame = match envelope.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("failed to encode frame: {e}");
                return;
            }
        };
        if let Err(e) = self.conn.send_frame(frame) {
            tracing::warn!(kind = %envelope.kind, "send skipped: {e}");
        }
    }

    fn run_autosave(&mut self) {
        if !self.autosave.autosave_due() {
            return;
        }
        if let Ok(generation) = self.autosave.begin(SaveTrigger::Auto) {
            self.spawn_save(generation, SaveTrigger::Auto);
            self.emit_status();
        }
    }

    /// Issue the full title+content replace off the actor loop. The
    /// generation snapshot travels with the task so completion can tell
    /// whether a newer edit raced it.
    fn spawn_save(&mut self, generation: u64, trigger: SaveTrigger) {
        let draft = DocumentDraft::new(self.policy.title(), self.policy.content());
        let store = Arc::clone(&self.store);
        let done = self.save_tx.clone();
        let document_id = self.document_id;

        tokio::spawn(async move {
            let result = store.replace(document_id, &draft).await;
            let _ = done.send(SaveOutcome {
                generation,
                trigger,
                result,
            });
        });
    }

    fn finish_save(&mut self, outcome: SaveOutcome) {
        let reply = match outcome.trigger {
            SaveTrigger::Manual => self.manual_reply.take(),
            SaveTrigger::Auto => None,
        };

        match outcome.result {
            Ok(_) => {
                let cleared = self.autosave.complete_success(outcome.generation);
                tracing::info!(
                    document_id = self.document_id,
                    cleared,
                    "document saved"
                );
                self.emit_status();
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
            }
            Err(e) => {
                tracing::error!(document_id = self.document_id, "save failed: {e}");
                self.autosave.complete_failure();
                self.emit_status();
                if let Some(reply) = reply {
                    let _ = reply.send(Err(SyncError::Persistence(e)));
                }
            }
        }
    }

    /// Voluntary close: cancel the pending retry, drop the channel and
    /// every timer.
    fn disconnect_all(&mut self) {
        self.conn.disconnect();
        self.policy.cancel();
        self.autosave.cancel();
        self.emit(SessionEvent::Connection(ConnectionState::Idle));
    }

    fn shutdown(&mut self) {
        self.disconnect_all();
        self.dispatcher.clear();
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn emit_status(&self) {
        let _ = self
            .events
            .send(SessionEvent::SaveStatus(self.autosave.status()));
    }
}
