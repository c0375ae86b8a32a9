use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    #[sea_orm(unique)]
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job::Entity")]
    Job,
    #[sea_orm(has_many = "super::daily_usage::Entity")]
    DailyUsage,
    #[sea_orm(has_many = "super::generated_image::Entity")]
    GeneratedImage,
}

impl Related<super::job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl Related<super::daily_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DailyUsage.def()
    }
}

impl Related<super::generated_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GeneratedImage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
