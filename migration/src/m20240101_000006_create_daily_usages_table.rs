use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DailyUsages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DailyUsages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(DailyUsages::UserId).uuid().not_null())
                    .col(ColumnDef::new(DailyUsages::UsageDate).date().not_null())
                    .col(ColumnDef::new(DailyUsages::GenerationCount).integer().not_null().default(0))
                    .col(ColumnDef::new(DailyUsages::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(DailyUsages::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_daily_usages_user_id")
                            .from(DailyUsages::Table, DailyUsages::UserId)
                            .to(Users::Users, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_user_date")
                    .table(DailyUsages::Table)
                    .col(DailyUsages::UserId)
                    .col(DailyUsages::UsageDate)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DailyUsages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DailyUsages {
    Table,
    Id,
    UserId,
    UsageDate,
    GenerationCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Users,
    Id,
}
