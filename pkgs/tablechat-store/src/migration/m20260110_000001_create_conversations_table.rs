use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
    Kind,
    ReservationId,
    UserId,
    RestaurantId,
    ParticipantRolesJson,
    LastMessage,
    LastMessageAt,
    CreatedAt,
    IsActive,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260110_000001_create_conversations_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversations::Table)
                    .col(
                        ColumnDef::new(Conversations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Conversations::Kind)
                            .string()
                            .not_null()
                            .default("reservation"),
                    )
                    .col(
                        ColumnDef::new(Conversations::ReservationId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversations::UserId).string().not_null())
                    .col(
                        ColumnDef::new(Conversations::RestaurantId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::ParticipantRolesJson)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::LastMessage)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Conversations::LastMessageAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        // The uniqueness of reservation_id is what makes get-or-create race safe.
        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_reservation")
                    .table(Conversations::Table)
                    .col(Conversations::ReservationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_user")
                    .table(Conversations::Table)
                    .col(Conversations::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_restaurant")
                    .table(Conversations::Table)
                    .col(Conversations::RestaurantId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Conversations::Table).to_owned())
            .await
    }
}
