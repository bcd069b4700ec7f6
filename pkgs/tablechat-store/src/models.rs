//! Domain types for reservation conversations

use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::entities::{conversation_messages, conversations};

/// Conversation kind. Only reservation-linked conversations exist today.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Reservation,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Reservation => "reservation",
        }
    }
}

impl FromStr for ConversationKind {
    type Err = DbErr;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "reservation" => Ok(ConversationKind::Reservation),
            other => Err(DbErr::Type(format!("unknown conversation kind: {}", other))),
        }
    }
}

/// Role of the sender of a single message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SenderRole {
    User,
    Restaurant,
    Admin,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::User => "USER",
            SenderRole::Restaurant => "RESTAURANT",
            SenderRole::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderRole {
    type Err = DbErr;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "USER" => Ok(SenderRole::User),
            "RESTAURANT" => Ok(SenderRole::Restaurant),
            "ADMIN" => Ok(SenderRole::Admin),
            other => Err(DbErr::Type(format!("unknown sender role: {}", other))),
        }
    }
}

/// Role a participant plays in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    User,
    Restaurant,
}

/// The two parties of a reservation conversation. Fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participants {
    pub user_id: String,
    pub restaurant_id: String,
}

impl Participants {
    /// Guest and restaurant must be different parties
    pub fn are_distinct(&self) -> bool {
        self.user_id != self.restaurant_id
    }

    /// Participant id -> role, one entry per participant.
    ///
    /// Only meaningful when [`are_distinct`](Self::are_distinct) holds, otherwise
    /// the restaurant entry replaces the user entry.
    /// `ConversationStore::get_or_create` refuses such participants.
    pub fn roles(&self) -> BTreeMap<String, ParticipantRole> {
        let mut roles = BTreeMap::new();
        roles.insert(self.user_id.clone(), ParticipantRole::User);
        roles.insert(self.restaurant_id.clone(), ParticipantRole::Restaurant);
        roles
    }
}

/// Cheap change marker for a set of conversations and their messages.
///
/// Two reads return equal watermarks only if nothing in the set was
/// created, closed, appended to or marked read in between.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    pub conversations: i64,
    pub revisions: i64,
}

/// Conversation tied to exactly one reservation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub kind: ConversationKind,
    pub reservation_id: String,
    pub participants: Participants,
    pub participant_roles: BTreeMap<String, ParticipantRole>,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl TryFrom<conversations::Model> for Conversation {
    type Error = DbErr;

    fn try_from(model: conversations::Model) -> Result<Self, Self::Error> {
        let participant_roles = serde_json::from_str(&model.participant_roles_json)
            .map_err(|e| DbErr::Type(format!("invalid participant roles: {}", e)))?;

        Ok(Self {
            id: model.id,
            kind: model.kind.parse()?,
            reservation_id: model.reservation_id,
            participants: Participants {
                user_id: model.user_id,
                restaurant_id: model.restaurant_id,
            },
            participant_roles,
            last_message: model.last_message,
            last_message_at: from_millis(model.last_message_at),
            created_at: from_millis(model.created_at),
            is_active: model.is_active,
        })
    }
}

/// A single message inside a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl TryFrom<conversation_messages::Model> for ConversationMessage {
    type Error = DbErr;

    fn try_from(model: conversation_messages::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            conversation_id: model.conversation_id,
            sender_id: model.sender_id,
            sender_role: model.sender_role.parse()?,
            text: model.text,
            created_at: from_millis(model.created_at),
            is_read: model.is_read,
        })
    }
}

/// Message body that has already been trimmed and checked for emptiness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageText(String);

impl MessageText {
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_text_is_trimmed() {
        let text = MessageText::parse("  hello there \n").unwrap();
        assert_eq!(text.as_str(), "hello there");
    }

    #[test]
    fn test_blank_message_text_is_rejected() {
        assert!(MessageText::parse("").is_none());
        assert!(MessageText::parse("   \t\n").is_none());
    }

    #[test]
    fn test_sender_role_round_trips_through_storage_form() {
        for role in [SenderRole::User, SenderRole::Restaurant, SenderRole::Admin] {
            assert_eq!(role.as_str().parse::<SenderRole>().unwrap(), role);
        }
        assert!("GUEST".parse::<SenderRole>().is_err());
    }

    #[test]
    fn test_sender_role_serializes_uppercase() {
        let json = serde_json::to_string(&SenderRole::Restaurant).unwrap();
        assert_eq!(json, "\"RESTAURANT\"");
    }

    #[test]
    fn test_participant_roles() {
        let participants = Participants {
            user_id: "user-1".to_string(),
            restaurant_id: "resto-9".to_string(),
        };

        let roles = participants.roles();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles["user-1"], ParticipantRole::User);
        assert_eq!(roles["resto-9"], ParticipantRole::Restaurant);
        assert!(participants.are_distinct());
    }

    #[test]
    fn test_same_id_on_both_sides_is_not_distinct() {
        let participants = Participants {
            user_id: "owner-1".to_string(),
            restaurant_id: "owner-1".to_string(),
        };
        assert!(!participants.are_distinct());
    }
}
