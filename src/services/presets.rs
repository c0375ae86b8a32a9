use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entities::preset::{self, PresetCategory};

/// Built-in inpainting presets, upserted by name.
pub struct SystemPreset {
    pub name: &'static str,
    pub name_ko: &'static str,
    pub description: &'static str,
    pub description_ko: &'static str,
    pub category: PresetCategory,
    pub default_prompt: &'static str,
    pub default_negative_prompt: &'static str,
    pub recommended_steps: i32,
    pub recommended_strength: f64,
    pub icon: &'static str,
    pub sort_order: i32,
}

pub static SYSTEM_PRESETS: &[SystemPreset] = &[
    SystemPreset {
        name: "Remove Object",
        name_ko: "오브젝트 제거",
        description: "Remove unwanted objects from the image",
        description_ko: "이미지에서 원하지 않는 오브젝트를 제거합니다",
        category: PresetCategory::ObjectRemove,
        default_prompt: "clean background, seamless, natural blend",
        default_negative_prompt: "artifacts, distortion, blur, unnatural",
        recommended_steps: 30,
        recommended_strength: 0.85,
        icon: "trash",
        sort_order: 1,
    },
    SystemPreset {
        name: "Replace Background",
        name_ko: "배경 교체",
        description: "Replace the background with a new scene",
        description_ko: "배경을 새로운 장면으로 교체합니다",
        category: PresetCategory::BackgroundReplace,
        default_prompt: "beautiful scenery, natural lighting, high quality",
        default_negative_prompt: "blurry, low quality, artifacts",
        recommended_steps: 35,
        recommended_strength: 0.9,
        icon: "image",
        sort_order: 2,
    },
    SystemPreset {
        name: "Add Object",
        name_ko: "오브젝트 추가",
        description: "Add new objects to the selected area",
        description_ko: "선택한 영역에 새로운 오브젝트를 추가합니다",
        category: PresetCategory::ObjectAdd,
        default_prompt: "detailed, realistic, natural integration",
        default_negative_prompt: "floating, unnatural, distorted",
        recommended_steps: 30,
        recommended_strength: 0.8,
        icon: "plus-circle",
        sort_order: 3,
    },
    SystemPreset {
        name: "Style Transfer",
        name_ko: "스타일 변환",
        description: "Change the style of the selected area",
        description_ko: "선택한 영역의 스타일을 변경합니다",
        category: PresetCategory::StyleTransfer,
        default_prompt: "artistic, stylized, creative",
        default_negative_prompt: "ugly, deformed, low quality",
        recommended_steps: 40,
        recommended_strength: 0.75,
        icon: "palette",
        sort_order: 4,
    },
    SystemPreset {
        name: "Restore & Repair",
        name_ko: "복원 및 수정",
        description: "Repair damaged or missing parts of the image",
        description_ko: "이미지의 손상되거나 누락된 부분을 복원합니다",
        category: PresetCategory::Restoration,
        default_prompt: "restored, clean, sharp, high quality",
        default_negative_prompt: "noise, artifacts, blur, damage",
        recommended_steps: 35,
        recommended_strength: 0.7,
        icon: "wand",
        sort_order: 5,
    },
    SystemPreset {
        name: "Face Enhance",
        name_ko: "얼굴 보정",
        description: "Enhance and beautify facial features",
        description_ko: "얼굴 특징을 향상시키고 아름답게 만듭니다",
        category: PresetCategory::Restoration,
        default_prompt: "beautiful face, clear skin, natural, detailed features",
        default_negative_prompt: "deformed, ugly, blurry, unnatural",
        recommended_steps: 30,
        recommended_strength: 0.6,
        icon: "user",
        sort_order: 6,
    },
    SystemPreset {
        name: "Sky Replacement",
        name_ko: "하늘 교체",
        description: "Replace the sky with a dramatic new one",
        description_ko: "하늘을 드라마틱한 새로운 하늘로 교체합니다",
        category: PresetCategory::BackgroundReplace,
        default_prompt: "beautiful sky, dramatic clouds, sunset, vibrant colors",
        default_negative_prompt: "dull, gray, boring, flat",
        recommended_steps: 30,
        recommended_strength: 0.9,
        icon: "cloud",
        sort_order: 7,
    },
    SystemPreset {
        name: "Custom Edit",
        name_ko: "사용자 정의 편집",
        description: "Free-form editing with your own prompt",
        description_ko: "자유 형식으로 직접 프롬프트를 입력하여 편집합니다",
        category: PresetCategory::Custom,
        default_prompt: "",
        default_negative_prompt: "low quality, blurry, artifacts",
        recommended_steps: 30,
        recommended_strength: 0.8,
        icon: "edit",
        sort_order: 99,
    },
];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    pub updated: usize,
}

/// Inserts missing system presets and overwrites existing ones with the
/// built-in values. Rows created by admins are left alone.
pub async fn seed_presets<C: ConnectionTrait>(db: &C) -> Result<SeedReport, DbErr> {
    let mut report = SeedReport::default();
    let now = Utc::now().naive_utc();

    for seed in SYSTEM_PRESETS {
        let existing = preset::Entity::find()
            .filter(preset::Column::Name.eq(seed.name))
            .filter(preset::Column::IsSystem.eq(true))
            .one(db)
            .await?;

        let is_new = existing.is_none();
        let mut active: preset::ActiveModel = match existing {
            Some(model) => model.into(),
            None => preset::ActiveModel {
                id: Set(Uuid::new_v4()),
                thumbnail_url: Set(None),
                is_system: Set(true),
                is_active: Set(true),
                created_at: Set(now),
                ..Default::default()
            },
        };

        active.name = Set(seed.name.to_string());
        active.name_ko = Set(Some(seed.name_ko.to_string()));
        active.description = Set(Some(seed.description.to_string()));
        active.description_ko = Set(Some(seed.description_ko.to_string()));
        active.category = Set(seed.category);
        active.default_prompt = Set(Some(seed.default_prompt.to_string()));
        active.default_negative_prompt = Set(Some(seed.default_negative_prompt.to_string()));
        active.recommended_steps = Set(seed.recommended_steps);
        active.recommended_strength = Set(Some(seed.recommended_strength));
        active.icon = Set(Some(seed.icon.to_string()));
        active.sort_order = Set(seed.sort_order);
        active.updated_at = Set(now);

        if is_new {
            active.insert(db).await?;
            report.created += 1;
        } else {
            active.update(db).await?;
            report.updated += 1;
        }

        tracing::debug!(name = seed.name, "seeded preset");
    }

    tracing::info!(created = report.created, updated = report.updated, "preset seeding completed");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;
    use sea_orm::PaginatorTrait;

    #[tokio::test]
    async fn seeding_twice_updates_instead_of_duplicating() {
        let db = setup_db().await;

        let first = seed_presets(&db).await.unwrap();
        assert_eq!(first, SeedReport { created: 8, updated: 0 });

        let second = seed_presets(&db).await.unwrap();
        assert_eq!(second, SeedReport { created: 0, updated: 8 });
        assert_eq!(preset::Entity::find().count(&db).await.unwrap(), 8);
    }
}
