//! The frame envelope and typed payload views.
//!
//! The envelope shape is shared with the server:
//! `{type, documentId, userId, username, payload}`. Identity fields on
//! outbound frames are placeholders — the server stamps the authenticated
//! identity on relay and is the sole authority for it, so nothing here
//! ever trusts a locally asserted `user_id`.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::kind::MessageKind;

/// A single frame on the document channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message kind tag.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// The document room this frame belongs to.
    pub document_id: i64,
    /// Sender identity, stamped by the server on relay.
    #[serde(default)]
    pub user_id: i64,
    /// Sender display name, stamped by the server on relay.
    #[serde(default)]
    pub username: String,
    /// Kind-specific data, opaque at the envelope layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Envelope {
    /// Build an outbound envelope with placeholder identity.
    ///
    /// The client never asserts its own identity: `user_id` is zero and
    /// the username empty, and a compliant server overwrites both before
    /// relaying to the room.
    pub fn outbound(
        kind: MessageKind,
        document_id: i64,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind,
            document_id,
            user_id: 0,
            username: String::new(),
            payload,
        }
    }

    /// Parse a frame received from the channel.
    pub fn from_json(frame: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Serialize for the outbound path.
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Extract the typed payload of an `edit` frame.
    pub fn edit_payload(&self) -> ProtocolResult<EditPayload> {
        self.typed_payload(MessageKind::Edit)
    }

    /// Extract the typed payload of a `cursor` frame.
    pub fn cursor_payload(&self) -> ProtocolResult<CursorPayload> {
        self.typed_payload(MessageKind::Cursor)
    }

    fn typed_payload<T: for<'de> Deserialize<'de>>(
        &self,
        kind: MessageKind,
    ) -> ProtocolResult<T> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| ProtocolError::MissingPayload(kind.clone()))?;
        serde_json::from_value(payload.clone())
            .map_err(|source| ProtocolError::InvalidPayload { kind, source })
    }
}

/// Payload of an `edit` frame: the full current document content.
///
/// Always the whole document, never a delta — the sync policy is
/// last-write-wins replacement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPayload {
    pub content: String,
}

/// Payload of a `cursor` frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPayload {
    pub position: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_frame_round_trip() {
        let frame = r#"{"type":"edit","documentId":7,"userId":3,"username":"alice","payload":{"content":"Hello"}}"#;
        let envelope = Envelope::from_json(frame).unwrap();

        assert_eq!(envelope.kind, MessageKind::Edit);
        assert_eq!(envelope.document_id, 7);
        assert_eq!(envelope.user_id, 3);
        assert_eq!(envelope.username, "alice");
        assert_eq!(envelope.edit_payload().unwrap().content, "Hello");

        let encoded = envelope.to_json().unwrap();
        let decoded = Envelope::from_json(&encoded).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_outbound_identity_is_placeholder() {
        let envelope = Envelope::outbound(
            MessageKind::Edit,
            7,
            Some(serde_json::json!({"content": "Hello"})),
        );

        assert_eq!(envelope.user_id, 0);
        assert!(envelope.username.is_empty());

        let encoded = envelope.to_json().unwrap();
        assert!(encoded.contains("\"userId\":0"));
    }

    #[test]
    fn test_unknown_kind_passes_through() {
        let frame = r#"{"type":"reaction","documentId":1,"userId":2,"username":"bob","payload":{"emoji":"+1"}}"#;
        let envelope = Envelope::from_json(frame).unwrap();

        assert_eq!(envelope.kind, MessageKind::Unknown("reaction".to_string()));
        assert_eq!(
            envelope.payload.as_ref().unwrap()["emoji"],
            serde_json::json!("+1")
        );
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        let result = Envelope::from_json("{not json");
        assert!(matches!(result, Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn test_identity_fields_default_when_absent() {
        let frame = r#"{"type":"join","documentId":4}"#;
        let envelope = Envelope::from_json(frame).unwrap();
        assert_eq!(envelope.user_id, 0);
        assert!(envelope.username.is_empty());
        assert!(envelope.payload.is_none());
    }

    #[test]
    fn test_missing_payload_extraction_fails() {
        let envelope = Envelope::outbound(MessageKind::Edit, 1, None);
        assert!(matches!(
            envelope.edit_payload(),
            Err(ProtocolError::MissingPayload(MessageKind::Edit))
        ));
    }

    #[test]
    fn test_wrong_payload_shape_fails() {
        let envelope = Envelope::outbound(
            MessageKind::Cursor,
            1,
            Some(serde_json::json!({"position": "not a number"})),
        );
        assert!(matches!(
            envelope.cursor_payload(),
            Err(ProtocolError::InvalidPayload { .. })
        ));
    }
}
