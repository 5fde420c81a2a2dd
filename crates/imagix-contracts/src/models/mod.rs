mod registry;
mod selectors;

pub use registry::{
    ModelRegistry, ModelSpec, ModelTier, CAP_EDIT, CAP_IMAGE, CAP_IMAGE_SIZE,
    CAP_SEARCH_GROUNDING, CAP_TEXT, CAP_VISION,
};
pub use selectors::{ImageConfig, ModelSelection, TierRequest, TierSelector};
