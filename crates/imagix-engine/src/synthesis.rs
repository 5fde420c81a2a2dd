use std::sync::Arc;

use imagix_contracts::encoding::data_url;
use imagix_contracts::errors::{classify, GenerationError};
use imagix_contracts::models::{ModelRegistry, ModelSelection, ModelTier, TierSelector};
use imagix_contracts::request::{EnhanceRequest, GenerationRequest, MAX_REFERENCE_IMAGES};
use serde_json::{json, Value};

use crate::backend::GenerationBackend;

const ENHANCE_TEMPERATURE: f64 = 1.0;
const ENHANCE_THINKING_BUDGET: u64 = 4000;

const ASSISTED_STYLE_BRIEF: &str = "MODE: Commercial Studio Photography. The goal is to create an image that looks like a real, high-budget commercial photoshoot. Use professional studio lighting (softbox, rim light, butterfly lighting), 8k resolution, ultra-realistic textures, and precise color grading. No cartoon, anime, or painterly effects unless explicitly requested.";
const ASSISTED_CAMERA_BRIEF: &str = "Camera: Medium Format Digital (e.g., Phase One XF). Lens: 85mm Portrait or 50mm Standard. Aperture: f/8 for sharpness. Lighting: Three-point studio setup.";

/// Rewrites a raw idea into a detailed generation prompt. One request, no
/// retries.
pub struct PromptSynthesisClient {
    backend: Arc<dyn GenerationBackend>,
    model: String,
}

impl PromptSynthesisClient {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        registry: &ModelRegistry,
    ) -> Result<Self, GenerationError> {
        let model = registry
            .text_model()
            .ok_or_else(|| GenerationError::Unknown("No text model available.".to_string()))?;
        Ok(Self {
            backend,
            model: model.name.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn enhance(&self, request: &EnhanceRequest) -> Result<String, GenerationError> {
        let payload = enhance_payload(request);
        let response = self
            .backend
            .generate_content(&self.model, &payload)
            .map_err(|err| classify(&err))?;
        let text = response_text(&response);
        if text.is_empty() {
            return Err(GenerationError::Unknown(
                "No text generated from the model.".to_string(),
            ));
        }
        Ok(text)
    }
}

pub fn enhance_system_instruction(request: &EnhanceRequest) -> String {
    let (style_line, camera_line) = if request.assisted {
        (
            ASSISTED_STYLE_BRIEF.to_string(),
            ASSISTED_CAMERA_BRIEF.to_string(),
        )
    } else {
        (
            format!("Target Style: {}", request.style.as_deref().unwrap_or("General")),
            format!("Camera Angle: {}", request.camera.as_deref().unwrap_or("Neutral")),
        )
    };
    format!(
        "You are an expert AI art director and Commercial Photographer.\n\
         Your task: Convert a raw description and optional reference images into a highly detailed image generation prompt.\n\
         \n\
         {style_line}\n\
         {camera_line}\n\
         \n\
         Guidelines:\n\
         1. Analyze reference images (if any) for style, palette, and composition.\n\
         2. Enhance the text description with visual keywords specific to the chosen style and camera angle.\n\
         3. If the user provided a very short description, expand on it creatively.\n\
         4. Provide technical details: lighting, depth of field, texture, and medium.\n\
         5. Output ONLY the raw prompt text. Do not add intro/outro text."
    )
}

pub fn enhance_payload(request: &EnhanceRequest) -> Value {
    let idea = request.idea.trim();
    let base_text = if !idea.is_empty() {
        idea.to_string()
    } else if request.assisted {
        "Create a masterpiece commercial product shot.".to_string()
    } else {
        format!(
            "Create a {} image.",
            request.style.as_deref().unwrap_or("General")
        )
    };

    let mut parts = vec![json!({ "text": base_text })];
    parts.extend(
        request
            .references
            .iter()
            .take(MAX_REFERENCE_IMAGES)
            .map(|image| image.to_inline_part()),
    );

    json!({
        "systemInstruction": { "parts": [{ "text": enhance_system_instruction(request) }] },
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "temperature": ENHANCE_TEMPERATURE,
            "thinkingConfig": { "thinkingBudget": ENHANCE_THINKING_BUDGET },
        },
    })
}

/// Joined non-thought text of the first candidate, trimmed.
fn response_text(response: &Value) -> String {
    first_candidate_parts(response)
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("")
        .trim()
        .to_string()
}

fn first_candidate_parts(response: &Value) -> Vec<Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// A generated image as a data-URL plus how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub image_data_url: String,
    pub mime_type: String,
    pub model: String,
    pub tier: ModelTier,
    /// Set when the premium attempt failed and the baseline model answered.
    pub fallback_from: Option<String>,
    pub fallback_reason: Option<String>,
}

/// Issues generation and masked-edit requests, degrading once from the
/// premium model to the baseline model when the premium attempt fails.
pub struct ImageSynthesisClient {
    backend: Arc<dyn GenerationBackend>,
    selector: TierSelector,
}

impl ImageSynthesisClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, selector: TierSelector) -> Self {
        Self { backend, selector }
    }

    pub fn selector(&self) -> &TierSelector {
        &self.selector
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        let selection = self
            .selector
            .select(&request.tier_request())
            .map_err(GenerationError::Unknown)?;
        if let Some(reason) = selection.reason.as_deref() {
            tracing::debug!(model = %selection.model.name, "{reason}");
        }
        let parts = request_parts(request);

        let primary_err = match self.attempt(&selection, &parts) {
            Ok(result) => return Ok(result),
            Err(err) => err,
        };
        // A content refusal is final; the baseline model must not be asked.
        if matches!(primary_err, GenerationError::SafetyRejected(_)) {
            return Err(primary_err);
        }
        let Some(fallback) = self.selector.fallback(&selection) else {
            return Err(primary_err);
        };

        tracing::warn!(
            from = %selection.model.name,
            to = %fallback.model.name,
            error = %primary_err,
            "premium generation failed; retrying once on baseline model"
        );
        match self.attempt(&fallback, &parts) {
            Ok(mut result) => {
                result.fallback_from = Some(selection.model.name.clone());
                result.fallback_reason = Some(primary_err.to_string());
                Ok(result)
            }
            Err(fallback_err) => Err(prefer_quota(fallback_err, primary_err)),
        }
    }

    fn attempt(
        &self,
        selection: &ModelSelection,
        parts: &[Value],
    ) -> Result<GenerationResult, GenerationError> {
        let payload = image_payload(parts, selection);
        let response = self
            .backend
            .generate_content(&selection.model.name, &payload)
            .map_err(|err| classify(&err))?;
        let (mime_type, data) = extract_image(&response)?;
        Ok(GenerationResult {
            image_data_url: data_url(&mime_type, &data),
            mime_type,
            model: selection.model.name.clone(),
            tier: selection.tier,
            fallback_from: None,
            fallback_reason: None,
        })
    }
}

/// Reference images, then the mask, then one text part.
pub fn request_parts(request: &GenerationRequest) -> Vec<Value> {
    let mut parts: Vec<Value> = request
        .references
        .iter()
        .map(|image| image.to_inline_part())
        .collect();
    if let Some(mask) = request.mask.as_ref() {
        parts.push(mask.to_inline_part());
    }
    parts.push(json!({ "text": request.text_part() }));
    parts
}

pub fn image_payload(parts: &[Value], selection: &ModelSelection) -> Value {
    let mut payload = json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": selection.config.generation_config(),
    });
    if let Some(tools) = selection.config.tools() {
        payload["tools"] = tools;
    }
    payload
}

/// First inline image of the first candidate as `(mime, base64)`.
pub fn extract_image(response: &Value) -> Result<(String, String), GenerationError> {
    let candidates = response
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let Some(candidate) = candidates.first() else {
        let block_reason = response
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str);
        return Err(match block_reason {
            Some(reason) => GenerationError::refusal(&format!("prompt blocked ({reason})")),
            None => GenerationError::NoImage,
        });
    };

    let parts = first_candidate_parts(response);
    for part in &parts {
        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .unwrap_or("image/png");
        return Ok((mime_type.to_string(), data.to_string()));
    }

    let text = response_text(response);
    if !text.is_empty() {
        return Err(GenerationError::refusal(&text));
    }
    match candidate.get("finishReason").and_then(Value::as_str) {
        Some(reason) if reason != "STOP" => {
            Err(GenerationError::refusal(&format!("finish reason {reason}")))
        }
        _ => Err(GenerationError::NoImage),
    }
}

/// After a failed fallback, a quota failure from either attempt wins, the
/// fallback's own classification first.
fn prefer_quota(fallback_err: GenerationError, primary_err: GenerationError) -> GenerationError {
    if !fallback_err.is_rate_limited() && primary_err.is_rate_limited() {
        return primary_err;
    }
    fallback_err
}
