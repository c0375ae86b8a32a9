use serde::Serialize;
use utoipa::ToSchema;

pub const DEFAULT_MODEL: &str = "runwayml/stable-diffusion-v1-5";

/// Hosted defaults when a remote request names no model.
pub const REMOTE_TEXT2IMG_MODEL: &str = "stabilityai/stable-diffusion-xl-base-1.0";
pub const REMOTE_IMG2IMG_MODEL: &str = "stabilityai/stable-diffusion-xl-refiner-1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Text2Img,
    Img2Img,
    Inpaint,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Text2Img => "text2img",
            Task::Img2Img => "img2img",
            Task::Inpaint => "inpaint",
        }
    }
}

impl From<crate::entities::job::JobType> for Task {
    fn from(job_type: crate::entities::job::JobType) -> Self {
        use crate::entities::job::JobType;
        match job_type {
            JobType::Text2Img => Task::Text2Img,
            JobType::Img2Img => Task::Img2Img,
            JobType::Inpaint => Task::Inpaint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    StableDiffusion,
    StableDiffusionXl,
    Flux,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub family: ModelFamily,
    pub vram_requirement: &'static str,
    pub base_resolution: u32,
    pub tasks: &'static [Task],
    /// Checkpoint used for masked generation, when the family has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inpaint_checkpoint: Option<&'static str>,
}

impl ModelInfo {
    pub fn supports(&self, task: Task) -> bool {
        self.tasks.contains(&task)
    }
}

const ALL_TASKS: &[Task] = &[Task::Text2Img, Task::Img2Img, Task::Inpaint];

pub static MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "runwayml/stable-diffusion-v1-5",
        name: "Stable Diffusion 1.5",
        description: "Lightweight model, runs in 4GB of VRAM",
        family: ModelFamily::StableDiffusion,
        vram_requirement: "4GB",
        base_resolution: 512,
        tasks: ALL_TASKS,
        inpaint_checkpoint: Some("runwayml/stable-diffusion-inpainting"),
    },
    ModelInfo {
        id: "stabilityai/stable-diffusion-2-1",
        name: "Stable Diffusion 2.1",
        description: "Improved quality, 6GB of VRAM recommended",
        family: ModelFamily::StableDiffusion,
        vram_requirement: "6GB",
        base_resolution: 768,
        tasks: ALL_TASKS,
        inpaint_checkpoint: Some("stabilityai/stable-diffusion-2-inpainting"),
    },
    ModelInfo {
        id: "stabilityai/stable-diffusion-xl-base-1.0",
        name: "Stable Diffusion XL",
        description: "High quality generation, 8GB of VRAM recommended",
        family: ModelFamily::StableDiffusionXl,
        vram_requirement: "8GB",
        base_resolution: 1024,
        tasks: &[Task::Text2Img, Task::Img2Img],
        inpaint_checkpoint: Some("diffusers/stable-diffusion-xl-1.0-inpainting-0.1"),
    },
    ModelInfo {
        id: "black-forest-labs/FLUX.1-schnell",
        name: "FLUX.1 schnell",
        description: "Fast FLUX variant, needs 12GB of VRAM",
        family: ModelFamily::Flux,
        vram_requirement: "12GB",
        base_resolution: 1024,
        tasks: &[Task::Text2Img],
        inpaint_checkpoint: None,
    },
    ModelInfo {
        id: "black-forest-labs/FLUX.1-dev",
        name: "FLUX.1 dev",
        description: "Highest quality FLUX variant, needs 16GB or more of VRAM",
        family: ModelFamily::Flux,
        vram_requirement: "16GB+",
        base_resolution: 1024,
        tasks: &[Task::Text2Img],
        inpaint_checkpoint: None,
    },
];

pub fn find(model_id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == model_id)
}

pub fn is_known(model_id: &str) -> bool {
    find(model_id).is_some()
}

// (ratio, width, height) per base resolution
const DIMENSIONS_1024: &[(&str, u32, u32)] = &[
    ("1:1", 1024, 1024),
    ("16:9", 1344, 768),
    ("9:16", 768, 1344),
    ("4:3", 1152, 896),
    ("3:4", 896, 1152),
    ("3:2", 1216, 832),
    ("2:3", 832, 1216),
];

const DIMENSIONS_768: &[(&str, u32, u32)] = &[
    ("1:1", 768, 768),
    ("16:9", 1024, 576),
    ("9:16", 576, 1024),
    ("4:3", 896, 672),
    ("3:4", 672, 896),
    ("3:2", 912, 608),
    ("2:3", 608, 912),
];

const DIMENSIONS_512: &[(&str, u32, u32)] = &[
    ("1:1", 512, 512),
    ("16:9", 680, 384),
    ("9:16", 384, 680),
    ("4:3", 600, 448),
    ("3:4", 448, 600),
    ("3:2", 608, 408),
    ("2:3", 408, 608),
];

pub const ASPECT_RATIOS: &[&str] = &["1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3"];

fn table_for(base_resolution: u32) -> &'static [(&'static str, u32, u32)] {
    match base_resolution {
        512 => DIMENSIONS_512,
        768 => DIMENSIONS_768,
        _ => DIMENSIONS_1024,
    }
}

/// Output size for `aspect_ratio` at the model's native resolution.
/// Unknown models use the 1024 table; unknown ratios give the base square.
pub fn dimensions_for(model_id: &str, aspect_ratio: &str) -> (u32, u32) {
    let base = find(model_id).map(|m| m.base_resolution).unwrap_or(1024);
    table_for(base)
        .iter()
        .find(|(ratio, _, _)| *ratio == aspect_ratio)
        .map(|(_, w, h)| (*w, *h))
        .unwrap_or((base, base))
}
