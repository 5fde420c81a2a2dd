use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::params::ImageResolution;

pub const CAP_IMAGE: &str = "image";
pub const CAP_EDIT: &str = "edit";
pub const CAP_IMAGE_SIZE: &str = "image_size";
pub const CAP_SEARCH_GROUNDING: &str = "search_grounding";
pub const CAP_TEXT: &str = "text";
pub const CAP_VISION: &str = "vision";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Baseline,
    Premium,
}

impl ModelTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelTier::Baseline => "baseline",
            ModelTier::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub tier: ModelTier,
    pub capabilities: Vec<String>,
    /// Largest output the model can produce. Models without the
    /// `image_size` capability always render at this size.
    pub max_resolution: Option<ImageResolution>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }

    pub fn can_render(&self, resolution: ImageResolution) -> bool {
        self.max_resolution
            .map(|ceiling| resolution <= ceiling)
            .unwrap_or(false)
    }
}

/// Capability matrix for every backend model the studio can target.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    /// First image model of `tier` that also has every `required` capability.
    pub fn image_model(&self, tier: ModelTier, required: &[&str]) -> Option<&ModelSpec> {
        self.models.values().find(|model| {
            model.tier == tier
                && model.supports(CAP_IMAGE)
                && required.iter().all(|capability| model.supports(capability))
        })
    }

    pub fn text_model(&self) -> Option<&ModelSpec> {
        self.models.values().find(|model| model.supports(CAP_TEXT))
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str,
                      tier: ModelTier,
                      capabilities: &[&str],
                      max_resolution: Option<ImageResolution>| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: "gemini".to_string(),
                tier,
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                max_resolution,
            },
        );
    };

    insert(
        "gemini-2.5-flash-image",
        ModelTier::Baseline,
        &[CAP_IMAGE, CAP_EDIT],
        Some(ImageResolution::OneK),
    );
    insert(
        "gemini-3-pro-image-preview",
        ModelTier::Premium,
        &[CAP_IMAGE, CAP_EDIT, CAP_IMAGE_SIZE, CAP_SEARCH_GROUNDING],
        Some(ImageResolution::FourK),
    );
    insert(
        "gemini-3-flash-preview",
        ModelTier::Baseline,
        &[CAP_TEXT, CAP_VISION],
        None,
    );

    map
}
