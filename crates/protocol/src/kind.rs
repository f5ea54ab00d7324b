//! Message-kind vocabulary for the document channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind tag of a channel frame.
///
/// Known kinds form a closed vocabulary; anything else is preserved
/// verbatim in [`MessageKind::Unknown`] so that newer servers can ship
/// kinds this client has never heard of and subscribers to that literal
/// tag still receive them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Whole-document content replacement.
    Edit,
    /// A user entered the document room.
    Join,
    /// A user left the document room.
    Leave,
    /// Cursor position update.
    Cursor,
    /// Any tag outside the known vocabulary, kept verbatim.
    Unknown(String),
}

impl MessageKind {
    /// The wire tag for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Edit => "edit",
            MessageKind::Join => "join",
            MessageKind::Leave => "leave",
            MessageKind::Cursor => "cursor",
            MessageKind::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for MessageKind {
    fn from(tag: &str) -> Self {
        match tag {
            "edit" => MessageKind::Edit,
            "join" => MessageKind::Join,
            "leave" => MessageKind::Leave,
            "cursor" => MessageKind::Cursor,
            other => MessageKind::Unknown(other.to_string()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        MessageKind::from(tag.as_str())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_tags_round_trip() {
        for tag in ["edit", "join", "leave", "cursor"] {
            let kind = MessageKind::from(tag);
            assert!(!matches!(kind, MessageKind::Unknown(_)));
            assert_eq!(kind.as_str(), tag);
        }
    }

    #[test]
    fn test_unknown_tag_preserved_verbatim() {
        let kind = MessageKind::from("presence-v2");
        assert_eq!(kind, MessageKind::Unknown("presence-v2".to_string()));
        assert_eq!(kind.as_str(), "presence-v2");
    }

    #[test]
    fn test_serde_as_bare_string() {
        let json = serde_json::to_string(&MessageKind::Edit).unwrap();
        assert_eq!(json, "\"edit\"");

        let kind: MessageKind = serde_json::from_str("\"ping\"").unwrap();
        assert_eq!(kind, MessageKind::Unknown("ping".to_string()));
    }

    #[test]
    fn test_unknown_kinds_with_same_tag_are_equal() {
        assert_eq!(MessageKind::from("x"), MessageKind::from("x"));
        assert_ne!(MessageKind::from("x"), MessageKind::from("y"));
    }

    proptest! {
        #[test]
        fn prop_every_tag_survives_the_round_trip(tag in "[a-z0-9_:-]{1,24}") {
            let kind = MessageKind::from(tag.as_str());
            prop_assert_eq!(kind.as_str(), tag.as_str());

            let json = serde_json::to_string(&kind).unwrap();
            let back: MessageKind = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, kind);
        }
    }
}
