//! Edit synchronization policy.
//!
//! Decides when local edits go out and how remote edits come in. Local
//! changes restart a short debounce; on quiet expiry the session
//! broadcasts one `edit` frame carrying the full current content — always
//! the whole document, never a delta. Remote edits replace local content
//! unconditionally (last-write-wins; no timestamps, no version vectors).
//! That replacement policy loses keystrokes under rapid concurrent edits
//! from multiple users; it is the documented conflict model of this
//! system, not something this module tries to repair.
//!
//! The policy also suppresses self-echo (a relayed frame stamped with the
//! local user's id) and keeps the session's presence activity log.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use protocol::{Envelope, MessageKind};

/// A join/leave observation for the activity log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    pub user_id: i64,
    pub username: String,
    pub event: PresenceEvent,
}

/// What a presence entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceEvent {
    Joined,
    Left,
}

/// Result of applying one inbound envelope to the policy.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteOutcome {
    /// The frame was our own broadcast relayed back; nothing changed.
    SelfEcho,
    /// Remote content replaced local content.
    ContentReplaced { content: String },
    /// A join/leave was appended to the activity log.
    Presence(PresenceEntry),
    /// Nothing for the policy in this frame.
    Ignored,
}

/// Local-edit debounce and remote-edit application.
#[derive(Debug)]
pub struct EditSyncPolicy {
    debounce: Duration,
    local_user_id: i64,
    title: String,
    content: String,
    broadcast_at: Option<Instant>,
    activity: Vec<PresenceEntry>,
}

impl EditSyncPolicy {
    /// Create a policy seeded with the loaded document state.
    pub fn new(
        debounce: Duration,
        local_user_id: i64,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            debounce,
            local_user_id,
            title: title.into(),
            content: content.into(),
            broadcast_at: None,
            activity: Vec::new(),
        }
    }

    /// Current document title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Current document content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The session's presence activity log, oldest first.
    pub fn activity(&self) -> &[PresenceEntry] {
        &self.activity
    }

    /// When the pending broadcast fires, if one is scheduled.
    pub fn broadcast_deadline(&self) -> Option<Instant> {
        self.broadcast_at
    }

    /// Record a local content change and restart the debounce.
    pub fn note_content_change(&mut self, content: String) {
        self.content = content;
        self.broadcast_at = Some(Instant::now() + self.debounce);
    }

    /// Record a local title change and restart the debounce.
    pub fn note_title_change(&mut self, title: String) {
        self.title = title;
        self.broadcast_at = Some(Instant::now() + self.debounce);
    }

    /// The debounce expired: take the content to broadcast.
    ///
    /// Whatever content is live right now goes out — a remote overwrite
    /// that landed while the debounce was pending is what gets broadcast.
    pub fn debounce_fired(&mut self) -> String {
        self.broadcast_at = None;
        self.content.clone()
    }

    /// Cancel the pending broadcast, if any.
    pub fn cancel(&mut self) {
        self.broadcast_at = None;
    }

    /// Apply one inbound envelope.
    pub fn apply_remote(&mut self, envelope: &Envelope) -> RemoteOutcome {
        match &envelope.kind {
            MessageKind::Edit => {
                if envelope.user_id == self.local_user_id {
                    tracing::debug!(user_id = envelope.user_id, "ignoring self-echoed edit");
                    return RemoteOutcome::SelfEcho;
                }
                match envelope.edit_payload() {
                    Ok(payload) => {
                        self.content = payload.content.clone();
                        RemoteOutcome::ContentReplaced {
                            content: payload.content,
                        }
                    }
                    Err(e) => {
                        tracing::warn!("dropping edit frame: {e}");
                        RemoteOutcome::Ignored
                    }
                }
            }
            MessageKind::Join | MessageKind::Leave => {
                if envelope.user_id == self.local_user_id {
                    return RemoteOutcome::Ignored;
                }
                let entry = PresenceEntry {
                    user_id: envelope.user_id,
                    username: envelope.username.clone(),
                    event: match envelope.kind {
                        MessageKind::Join => PresenceEvent::Joined,
                        _ => PresenceEvent::Left,
                    },
                };
                self.activity.push(entry.clone());
                RemoteOutcome::Presence(entry)
            }
            _ => RemoteOutcome::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LOCAL_USER: i64 = 3;

    fn policy() -> EditSyncPolicy {
        EditSyncPolicy::new(Duration::from_millis(500), LOCAL_USER, "Notes", "Hello")
    }

    fn edit_from(user_id: i64, content: &str) -> Envelope {
        Envelope {
            kind: MessageKind::Edit,
            document_id: 7,
            user_id,
            username: "somebody".to_string(),
            payload: Some(serde_json::json!({ "content": content })),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_change_restarts_debounce() {
        let mut policy = policy();
        policy.note_content_change("H".to_string());
        let first = policy.broadcast_deadline().unwrap();

        tokio::time::advance(Duration::from_millis(300)).await;
        policy.note_content_change("He".to_string());
        let second = policy.broadcast_deadline().unwrap();

        assert_eq!(second - first, Duration::from_millis(300));
        assert_eq!(policy.debounce_fired(), "He");
        assert!(policy.broadcast_deadline().is_none());
    }

    #[tokio::test]
    async fn test_title_change_also_schedules_broadcast() {
        let mut policy = policy();
        policy.note_title_change("Renamed".to_string());
        assert!(policy.broadcast_deadline().is_some());
        assert_eq!(policy.title(), "Renamed");
    }

    #[tokio::test]
    async fn test_self_echo_never_mutates_content() {
        let mut policy = policy();
        let outcome = policy.apply_remote(&edit_from(LOCAL_USER, "spoofed"));
        assert_eq!(outcome, RemoteOutcome::SelfEcho);
        assert_eq!(policy.content(), "Hello");
    }

    #[tokio::test]
    async fn test_remote_edit_replaces_content_unconditionally() {
        let mut policy = policy();
        policy.note_content_change("local draft".to_string());

        let outcome = policy.apply_remote(&edit_from(9, "remote wins"));
        assert_eq!(
            outcome,
            RemoteOutcome::ContentReplaced {
                content: "remote wins".to_string()
            }
        );
        assert_eq!(policy.content(), "remote wins");
    }

    #[tokio::test]
    async fn test_remote_overwrite_keeps_pending_broadcast() {
        let mut policy = policy();
        policy.note_content_change("local draft".to_string());
        let deadline = policy.broadcast_deadline();

        policy.apply_remote(&edit_from(9, "remote wins"));
        // The pending broadcast survives and now carries the live content.
        assert_eq!(policy.broadcast_deadline(), deadline);
        assert_eq!(policy.debounce_fired(), "remote wins");
    }

    #[tokio::test]
    async fn test_malformed_edit_payload_is_dropped() {
        let mut policy = policy();
        let envelope = Envelope {
            kind: MessageKind::Edit,
            document_id: 7,
            user_id: 9,
            username: "mallory".to_string(),
            payload: Some(serde_json::json!({ "content": 42 })),
        };
        assert_eq!(policy.apply_remote(&envelope), RemoteOutcome::Ignored);
        assert_eq!(policy.content(), "Hello");
    }

    #[tokio::test]
    async fn test_join_and_leave_append_to_activity_log() {
        let mut policy = policy();

        let join = Envelope {
            kind: MessageKind::Join,
            document_id: 7,
            user_id: 9,
            username: "bob".to_string(),
            payload: None,
        };
        let leave = Envelope {
            kind: MessageKind::Leave,
            ..join.clone()
        };

        assert!(matches!(
            policy.apply_remote(&join),
            RemoteOutcome::Presence(_)
        ));
        assert!(matches!(
            policy.apply_remote(&leave),
            RemoteOutcome::Presence(_)
        ));

        let activity = policy.activity();
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].event, PresenceEvent::Joined);
        assert_eq!(activity[1].event, PresenceEvent::Left);
        assert_eq!(activity[0].username, "bob");
    }

    #[tokio::test]
    async fn test_own_join_is_not_logged() {
        let mut policy = policy();
        let join = Envelope {
            kind: MessageKind::Join,
            document_id: 7,
            user_id: LOCAL_USER,
            username: "me".to_string(),
            payload: None,
        };
        assert_eq!(policy.apply_remote(&join), RemoteOutcome::Ignored);
        assert!(policy.activity().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_and_unknown_kinds_are_ignored() {
        let mut policy = policy();
        let cursor = Envelope {
            kind: MessageKind::Cursor,
            document_id: 7,
            user_id: 9,
            username: "bob".to_string(),
            payload: Some(serde_json::json!({ "position": 4 })),
        };
        assert_eq!(policy.apply_remote(&cursor), RemoteOutcome::Ignored);
        assert_eq!(policy.content(), "Hello");
    }

    proptest! {
        #[test]
        fn prop_self_echo_suppression_holds_for_any_payload(
            payload in proptest::option::of(proptest::arbitrary::any::<String>())
        ) {
            let mut policy = EditSyncPolicy::new(
                Duration::from_millis(500),
                LOCAL_USER,
                "Notes",
                "Hello",
            );
            let envelope = Envelope {
                kind: MessageKind::Edit,
                document_id: 7,
                user_id: LOCAL_USER,
                username: "me".to_string(),
                payload: payload.map(|content| serde_json::json!({ "content": content })),
            };

            prop_assert_eq!(policy.apply_remote(&envelope), RemoteOutcome::SelfEcho);
            prop_assert_eq!(policy.content(), "Hello");
        }
    }
}
