use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "presets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub name_ko: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description_ko: Option<String>,
    pub category: PresetCategory,
    #[sea_orm(column_type = "Text", nullable)]
    pub default_prompt: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub default_negative_prompt: Option<String>,
    pub recommended_steps: i32,
    #[sea_orm(column_type = "Double", nullable)]
    pub recommended_strength: Option<f64>,
    pub icon: Option<String>,
    pub thumbnail_url: Option<String>,
    pub is_system: bool,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(
    EnumIter, DeriveActiveEnum, Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(30))")]
#[serde(rename_all = "snake_case")]
pub enum PresetCategory {
    #[sea_orm(string_value = "background_replace")]
    BackgroundReplace,
    #[sea_orm(string_value = "object_remove")]
    ObjectRemove,
    #[sea_orm(string_value = "object_add")]
    ObjectAdd,
    #[sea_orm(string_value = "style_transfer")]
    StyleTransfer,
    #[sea_orm(string_value = "restoration")]
    Restoration,
    #[sea_orm(string_value = "custom")]
    Custom,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
