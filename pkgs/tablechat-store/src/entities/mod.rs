//! Sea-ORM entities for tablechat-store

pub mod conversation_messages;
pub mod conversations;

pub use conversation_messages::Entity as ConversationMessage;
pub use conversations::Entity as Conversation;
