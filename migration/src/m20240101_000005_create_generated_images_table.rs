use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GeneratedImages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(GeneratedImages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(GeneratedImages::UserId).uuid().not_null())
                    // One result per job.
                    .col(ColumnDef::new(GeneratedImages::JobId).uuid().not_null().unique_key())
                    .col(ColumnDef::new(GeneratedImages::FilePath).string_len(500).not_null())
                    .col(ColumnDef::new(GeneratedImages::ThumbnailPath).string_len(500).null())
                    .col(ColumnDef::new(GeneratedImages::Width).integer().not_null())
                    .col(ColumnDef::new(GeneratedImages::Height).integer().not_null())
                    .col(ColumnDef::new(GeneratedImages::FileSize).big_integer().not_null())
                    .col(ColumnDef::new(GeneratedImages::MimeType).string_len(50).not_null())
                    .col(ColumnDef::new(GeneratedImages::Prompt).text().not_null())
                    .col(ColumnDef::new(GeneratedImages::NegativePrompt).text().null())
                    .col(ColumnDef::new(GeneratedImages::Parameters).json().not_null())
                    .col(ColumnDef::new(GeneratedImages::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(GeneratedImages::ExpiresAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_generated_images_user_id")
                            .from(GeneratedImages::Table, GeneratedImages::UserId)
                            .to(Users::Users, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_generated_images_job_id")
                            .from(GeneratedImages::Table, GeneratedImages::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_generated_images_expires_at")
                    .table(GeneratedImages::Table)
                    .col(GeneratedImages::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GeneratedImages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GeneratedImages {
    Table,
    Id,
    UserId,
    JobId,
    FilePath,
    ThumbnailPath,
    Width,
    Height,
    FileSize,
    MimeType,
    Prompt,
    NegativePrompt,
    Parameters,
    CreatedAt,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum Users {
    Users,
    Id,
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
}
