use serde::{Deserialize, Serialize};

use crate::encoding::EncodedImage;
use crate::models::TierRequest;
use crate::params::{AspectRatio, ImageResolution};
use crate::session::PlanTier;

/// Upper bound on reference images attached to one request.
pub const MAX_REFERENCE_IMAGES: usize = 5;

pub const DEFAULT_STYLE: &str = "Cinematic";
pub const ASSISTED_STYLE: &str = "High-End Photorealistic Studio";
pub const EDIT_STYLE: &str = "Photorealistic";
pub const VARIATION_SUFFIX: &str = " Give me a creative variation of this scene.";
pub const DEFAULT_CAMERA_SETTING: &str = "Default";

/// One image generation or masked edit. Built fresh per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub style: Option<String>,
    pub camera: Option<String>,
    #[serde(default)]
    pub references: Vec<EncodedImage>,
    pub mask: Option<EncodedImage>,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub resolution: ImageResolution,
    #[serde(default)]
    pub use_web_grounding: bool,
    #[serde(default)]
    pub plan: PlanTier,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: None,
            camera: None,
            references: Vec::new(),
            mask: None,
            aspect_ratio: AspectRatio::default(),
            resolution: ImageResolution::default(),
            use_web_grounding: false,
            plan: PlanTier::default(),
        }
    }

    pub fn is_mask_edit(&self) -> bool {
        self.mask.is_some()
    }

    pub fn tier_request(&self) -> TierRequest {
        TierRequest {
            plan: self.plan,
            resolution: self.resolution,
            aspect_ratio: self.aspect_ratio,
            use_web_grounding: self.use_web_grounding,
            is_mask_edit: self.is_mask_edit(),
        }
    }

    /// The single text part sent after the image parts.
    ///
    /// Masked edits use a fixed instruction around the edit text and never
    /// carry the style or camera prefix.
    pub fn text_part(&self) -> String {
        if self.is_mask_edit() {
            return mask_edit_instruction(&self.prompt);
        }
        let style = self
            .style
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_STYLE);
        let mut pieces = vec![format!("Style: {style}.")];
        if let Some(camera) = self
            .camera
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            pieces.push(format!("Camera/Lens: {camera}."));
        }
        let prompt = self.prompt.trim();
        if !prompt.is_empty() {
            pieces.push(prompt.to_string());
        }
        pieces.join(" ")
    }
}

pub fn mask_edit_instruction(edit: &str) -> String {
    format!(
        "EDIT INSTRUCTION: Modify the image area covered by the white mask. {}. Keep the rest of the image exactly as is. Match the style, lighting, and perspective of the original image.",
        edit.trim()
    )
}

/// Combines camera angle and lens the way the studio panel reports them.
/// `None` when both are left at their default.
pub fn camera_descriptor(angle: Option<&str>, lens: Option<&str>) -> Option<String> {
    let angle = angle.unwrap_or(DEFAULT_CAMERA_SETTING);
    let lens = lens.unwrap_or(DEFAULT_CAMERA_SETTING);
    if angle == DEFAULT_CAMERA_SETTING && lens == DEFAULT_CAMERA_SETTING {
        return None;
    }
    Some(format!("{angle}, {lens}"))
}

/// A raw idea to be rewritten into a generation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnhanceRequest {
    pub idea: String,
    #[serde(default)]
    pub references: Vec<EncodedImage>,
    pub style: Option<String>,
    pub camera: Option<String>,
    /// Swaps explicit style and camera for a fixed studio-photography brief.
    #[serde(default)]
    pub assisted: bool,
}

impl EnhanceRequest {
    /// Checks the inputs the studio panel insists on before spending a call.
    pub fn validate(&self) -> Result<(), String> {
        if self.assisted {
            return Ok(());
        }
        if self.style.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            return Err("Please select a Style to proceed.".to_string());
        }
        if self.camera.is_none() {
            return Err("Please select a Camera Angle to proceed.".to_string());
        }
        if self.idea.trim().is_empty() && self.references.is_empty() {
            return Err("Please describe your vision.".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_part_joins_style_camera_prompt() {
        let mut request = GenerationRequest::new("a red fox in snow");
        request.style = Some("Cinematic".to_string());
        request.camera = Some("Low Angle, 35mm".to_string());
        assert_eq!(
            request.text_part(),
            "Style: Cinematic. Camera/Lens: Low Angle, 35mm. a red fox in snow"
        );
    }

    #[test]
    fn plain_text_part_defaults_style_and_skips_missing_camera() {
        let request = GenerationRequest::new("a lighthouse");
        assert_eq!(request.text_part(), "Style: Cinematic. a lighthouse");
    }

    #[test]
    fn mask_text_part_uses_edit_template_only() {
        let mut request = GenerationRequest::new("make the sky purple");
        request.style = Some("Anime".to_string());
        request.camera = Some("Wide, 24mm".to_string());
        request.mask = Some(EncodedImage::new("image/png", "MASK"));

        let text = request.text_part();
        assert_eq!(text, mask_edit_instruction("make the sky purple"));
        assert!(text.contains("make the sky purple"));
        assert!(!text.contains("Style:"));
        assert!(!text.contains("Camera/Lens:"));
        assert!(!text.contains("Anime"));
    }

    #[test]
    fn camera_descriptor_requires_a_non_default_setting() {
        assert_eq!(camera_descriptor(None, None), None);
        assert_eq!(camera_descriptor(Some("Default"), Some("Default")), None);
        assert_eq!(
            camera_descriptor(Some("Top Down"), None).as_deref(),
            Some("Top Down, Default")
        );
    }

    #[test]
    fn tier_request_reflects_mask() {
        let mut request = GenerationRequest::new("x");
        assert!(!request.tier_request().is_mask_edit);
        request.mask = Some(EncodedImage::new("image/png", "M"));
        assert!(request.tier_request().is_mask_edit);
    }

    #[test]
    fn enhance_validation() {
        let mut request = EnhanceRequest {
            idea: "a castle".to_string(),
            ..Default::default()
        };
        assert_eq!(
            request.validate(),
            Err("Please select a Style to proceed.".to_string())
        );
        request.style = Some("Noir".to_string());
        assert_eq!(
            request.validate(),
            Err("Please select a Camera Angle to proceed.".to_string())
        );
        request.camera = Some("Eye Level, 50mm".to_string());
        assert!(request.validate().is_ok());

        request.idea.clear();
        assert_eq!(
            request.validate(),
            Err("Please describe your vision.".to_string())
        );
        request.references.push(EncodedImage::new("image/png", "R"));
        assert!(request.validate().is_ok());

        let assisted = EnhanceRequest {
            assisted: true,
            ..Default::default()
        };
        assert!(assisted.validate().is_ok());
    }
}
