use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Presets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Presets::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Presets::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Presets::NameKo).string_len(100).null())
                    .col(ColumnDef::new(Presets::Description).text().null())
                    .col(ColumnDef::new(Presets::DescriptionKo).text().null())
                    .col(ColumnDef::new(Presets::Category).string_len(30).not_null())
                    .col(ColumnDef::new(Presets::DefaultPrompt).text().null())
                    .col(ColumnDef::new(Presets::DefaultNegativePrompt).text().null())
                    .col(ColumnDef::new(Presets::RecommendedSteps).integer().not_null().default(30))
                    .col(ColumnDef::new(Presets::RecommendedStrength).double().null())
                    .col(ColumnDef::new(Presets::Icon).string_len(50).null())
                    .col(ColumnDef::new(Presets::ThumbnailUrl).string_len(500).null())
                    .col(ColumnDef::new(Presets::IsSystem).boolean().not_null().default(false))
                    .col(ColumnDef::new(Presets::IsActive).boolean().not_null().default(true))
                    .col(ColumnDef::new(Presets::SortOrder).integer().not_null().default(0))
                    .col(ColumnDef::new(Presets::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Presets::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Presets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Presets {
    Table,
    Id,
    Name,
    NameKo,
    Description,
    DescriptionKo,
    Category,
    DefaultPrompt,
    DefaultNegativePrompt,
    RecommendedSteps,
    RecommendedStrength,
    Icon,
    ThumbnailUrl,
    IsSystem,
    IsActive,
    SortOrder,
    CreatedAt,
    UpdatedAt,
}
