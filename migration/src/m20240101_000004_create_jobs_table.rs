use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Jobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Jobs::UserId).uuid().not_null())
                    .col(ColumnDef::new(Jobs::JobType).string_len(20).not_null())
                    .col(ColumnDef::new(Jobs::Status).string_len(20).not_null())
                    .col(ColumnDef::new(Jobs::Prompt).text().not_null())
                    .col(ColumnDef::new(Jobs::NegativePrompt).text().null())
                    .col(ColumnDef::new(Jobs::AspectRatio).string_len(20).not_null().default("1:1"))
                    .col(ColumnDef::new(Jobs::Seed).big_integer().null())
                    .col(ColumnDef::new(Jobs::Steps).integer().not_null().default(30))
                    .col(ColumnDef::new(Jobs::Strength).double().null())
                    .col(ColumnDef::new(Jobs::Model).string_len(100).null())
                    .col(ColumnDef::new(Jobs::SourceImageId).uuid().null())
                    .col(ColumnDef::new(Jobs::MaskData).text().null())
                    .col(ColumnDef::new(Jobs::MaskRegion).json().null())
                    .col(ColumnDef::new(Jobs::ErrorMessage).text().null())
                    .col(ColumnDef::new(Jobs::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Jobs::StartedAt).timestamp().null())
                    .col(ColumnDef::new(Jobs::CompletedAt).timestamp().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_jobs_user_id")
                            .from(Jobs::Table, Jobs::UserId)
                            .to(Users::Users, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_jobs_user_status")
                    .table(Jobs::Table)
                    .col(Jobs::UserId)
                    .col(Jobs::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_jobs_created_at")
                    .table(Jobs::Table)
                    .col(Jobs::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    UserId,
    JobType,
    Status,
    Prompt,
    NegativePrompt,
    AspectRatio,
    Seed,
    Steps,
    Strength,
    Model,
    SourceImageId,
    MaskData,
    MaskRegion,
    ErrorMessage,
    CreatedAt,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum Users {
    Users,
    Id,
}
