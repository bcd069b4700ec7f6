//! Conversation entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kind: String, // "reservation"
    #[sea_orm(unique)]
    pub reservation_id: String, // at most one conversation per reservation
    pub user_id: String,
    pub restaurant_id: String,
    pub participant_roles_json: String, // {"<participant id>": "user" | "restaurant"}
    pub last_message: String,           // Preview text for list views
    pub last_message_at: i64,           // Sort key for list views (ms)
    pub created_at: i64,
    pub is_active: bool,
    pub revision: i64, // Bumped on every write to the conversation or its messages
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::conversation_messages::Entity")]
    Messages,
}

impl Related<super::conversation_messages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
