use serde_json::{json, Map, Value};

use super::registry::{
    ModelRegistry, ModelSpec, ModelTier, CAP_EDIT, CAP_IMAGE_SIZE, CAP_SEARCH_GROUNDING,
};
use crate::params::{AspectRatio, ImageResolution};
use crate::session::PlanTier;

/// Inputs that decide which backend variant a generation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierRequest {
    pub plan: PlanTier,
    pub resolution: ImageResolution,
    pub aspect_ratio: AspectRatio,
    pub use_web_grounding: bool,
    pub is_mask_edit: bool,
}

/// Backend image configuration, shaped by what the target model accepts.
///
/// Models without size control only ever receive the `Baseline` variant, so
/// `imageSize` and grounding cannot leak into their requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageConfig {
    Baseline {
        aspect_ratio: AspectRatio,
    },
    Premium {
        aspect_ratio: AspectRatio,
        image_size: ImageResolution,
        google_search: bool,
    },
}

impl ImageConfig {
    pub fn aspect_ratio(&self) -> AspectRatio {
        match self {
            ImageConfig::Baseline { aspect_ratio } | ImageConfig::Premium { aspect_ratio, .. } => {
                *aspect_ratio
            }
        }
    }

    pub fn image_size(&self) -> Option<ImageResolution> {
        match self {
            ImageConfig::Baseline { .. } => None,
            ImageConfig::Premium { image_size, .. } => Some(*image_size),
        }
    }

    pub fn google_search(&self) -> bool {
        matches!(
            self,
            ImageConfig::Premium {
                google_search: true,
                ..
            }
        )
    }

    /// The always-valid subset: aspect ratio only.
    pub fn reduced(&self) -> ImageConfig {
        ImageConfig::Baseline {
            aspect_ratio: self.aspect_ratio(),
        }
    }

    /// `generationConfig` object for the request payload.
    pub fn generation_config(&self) -> Value {
        let mut image_config = Map::new();
        image_config.insert(
            "aspectRatio".to_string(),
            Value::String(self.aspect_ratio().as_str().to_string()),
        );
        if let Some(size) = self.image_size() {
            image_config.insert(
                "imageSize".to_string(),
                Value::String(size.as_str().to_string()),
            );
        }
        json!({ "imageConfig": image_config })
    }

    /// `tools` array for the request payload, when grounding is on.
    pub fn tools(&self) -> Option<Value> {
        self.google_search()
            .then(|| json!([{ "googleSearch": {} }]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub tier: ModelTier,
    pub config: ImageConfig,
    pub reason: Option<String>,
    /// Retries must keep targeting an edit-capable model.
    pub is_mask_edit: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TierSelector {
    pub registry: ModelRegistry,
}

impl TierSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    pub fn select(&self, request: &TierRequest) -> Result<ModelSelection, String> {
        let baseline = self.baseline_model(request.is_mask_edit)?;

        let mut wants_premium = Vec::new();
        if request.plan.is_highest() {
            wants_premium.push(format!("plan '{}'", request.plan.as_str()));
        }
        if !baseline.can_render(request.resolution) {
            wants_premium.push(format!("resolution {}", request.resolution));
        }
        if request.use_web_grounding {
            wants_premium.push("web grounding".to_string());
        }
        if wants_premium.is_empty() {
            return Ok(ModelSelection {
                model: baseline.clone(),
                tier: ModelTier::Baseline,
                config: config_for(baseline, request),
                reason: None,
                is_mask_edit: request.is_mask_edit,
            });
        }

        let mut required = Vec::new();
        if request.is_mask_edit {
            required.push(CAP_EDIT);
        }
        if request.use_web_grounding {
            required.push(CAP_SEARCH_GROUNDING);
        }
        if !baseline.can_render(request.resolution) {
            required.push(CAP_IMAGE_SIZE);
        }

        match self.registry.image_model(ModelTier::Premium, &required) {
            Some(premium) => Ok(ModelSelection {
                model: premium.clone(),
                tier: ModelTier::Premium,
                config: config_for(premium, request),
                reason: Some(format!(
                    "Premium model selected for {}.",
                    wants_premium.join(", ")
                )),
                is_mask_edit: request.is_mask_edit,
            }),
            None => Ok(ModelSelection {
                model: baseline.clone(),
                tier: ModelTier::Baseline,
                config: config_for(baseline, request),
                reason: Some(format!(
                    "No premium model available for {}; using baseline.",
                    wants_premium.join(", ")
                )),
                is_mask_edit: request.is_mask_edit,
            }),
        }
    }

    /// Baseline retry target for a failed premium selection. `None` when the
    /// selection already targets the baseline tier.
    pub fn fallback(&self, selection: &ModelSelection) -> Option<ModelSelection> {
        if selection.tier != ModelTier::Premium {
            return None;
        }
        let required: &[&str] = if selection.is_mask_edit { &[CAP_EDIT] } else { &[] };
        let model = self
            .registry
            .image_model(ModelTier::Baseline, required)?
            .clone();
        Some(ModelSelection {
            model,
            tier: ModelTier::Baseline,
            config: selection.config.reduced(),
            reason: Some(format!(
                "Fell back from '{}' to baseline.",
                selection.model.name
            )),
            is_mask_edit: selection.is_mask_edit,
        })
    }

    fn baseline_model(&self, is_mask_edit: bool) -> Result<&ModelSpec, String> {
        let required: &[&str] = if is_mask_edit { &[CAP_EDIT] } else { &[] };
        self.registry
            .image_model(ModelTier::Baseline, required)
            .ok_or_else(|| "No baseline image model available.".to_string())
    }
}

fn config_for(model: &ModelSpec, request: &TierRequest) -> ImageConfig {
    let aspect_ratio = request.aspect_ratio.normalized();
    if !model.supports(CAP_IMAGE_SIZE) {
        return ImageConfig::Baseline { aspect_ratio };
    }
    ImageConfig::Premium {
        aspect_ratio,
        image_size: request.resolution,
        google_search: request.use_web_grounding && model.supports(CAP_SEARCH_GROUNDING),
    }
}
