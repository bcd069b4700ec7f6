use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum ConversationMessages {
    Table,
    Seq,
    Id,
    ConversationId,
    SenderId,
    SenderRole,
    Text,
    CreatedAt,
    IsRead,
}

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260110_000002_create_conversation_messages_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConversationMessages::Table)
                    .col(
                        ColumnDef::new(ConversationMessages::Seq)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ConversationMessages::Id)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ConversationMessages::ConversationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConversationMessages::SenderId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConversationMessages::SenderRole)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConversationMessages::Text).string().not_null())
                    .col(
                        ColumnDef::new(ConversationMessages::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConversationMessages::IsRead)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversation_messages_conversation")
                            .from(
                                ConversationMessages::Table,
                                ConversationMessages::ConversationId,
                            )
                            .to(Conversations::Table, Conversations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_messages_order")
                    .table(ConversationMessages::Table)
                    .col(ConversationMessages::ConversationId)
                    .col(ConversationMessages::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ConversationMessages::Table).to_owned())
            .await
    }
}
