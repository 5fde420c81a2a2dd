use std::io::Cursor;
use std::sync::Arc;

use anyhow::{bail, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imagix_contracts::errors::BackendError;
use imagix_contracts::models::{ModelRegistry, CAP_TEXT};
use imagix_contracts::params::{AspectRatio, ImageResolution};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::{BackendKind, EngineConfig};

/// One multimodal `generateContent` call against a named model.
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate_content(&self, model: &str, payload: &Value) -> Result<Value, BackendError>;
}

pub fn build_backend(
    config: &EngineConfig,
    registry: &ModelRegistry,
) -> Result<Arc<dyn GenerationBackend>> {
    match config.backend {
        BackendKind::Dryrun => Ok(Arc::new(DryrunBackend::new(registry.clone()))),
        BackendKind::Gemini => {
            let Some(api_key) = config.api_key.clone() else {
                bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set (or use IMAGIX_BACKEND=dryrun)");
            };
            Ok(Arc::new(GeminiBackend::new(&config.api_base, api_key)))
        }
    }
}

pub struct GeminiBackend {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(api_base: &str, api_key: String) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_content(&self, model: &str, payload: &Value) -> Result<Value, BackendError> {
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(payload)
            .send()
            .map_err(|err| {
                BackendError::transport(format!("Gemini request failed ({endpoint}): {err}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| BackendError::transport(format!("Gemini response body read failed: {err}")))?;
        if !status.is_success() {
            return Err(BackendError::from_response("Gemini", status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|err| {
            BackendError::transport(format!("Gemini returned invalid JSON payload: {err}"))
        })
    }
}

/// Offline backend. Text models echo the idea with a fixed art-direction
/// tail; image models return a solid PNG coloured by a hash of the prompt.
pub struct DryrunBackend {
    registry: ModelRegistry,
}

impl DryrunBackend {
    /// Preview images are rendered at this fraction of the requested size.
    const PREVIEW_SCALE: u32 = 8;

    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    fn text_response(&self, payload: &Value) -> Value {
        let idea = last_text_part(payload).unwrap_or_default();
        let text = format!(
            "{}, highly detailed, balanced composition, professional lighting, sharp focus",
            idea.trim().trim_end_matches('.')
        );
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP",
            }]
        })
    }

    fn image_response(&self, model: &str, payload: &Value) -> Result<Value, BackendError> {
        let image_config = payload
            .get("generationConfig")
            .and_then(|config| config.get("imageConfig"));
        let ratio = image_config
            .and_then(|config| config.get("aspectRatio"))
            .and_then(Value::as_str)
            .and_then(AspectRatio::parse)
            .unwrap_or_default();
        let size = image_config
            .and_then(|config| config.get("imageSize"))
            .and_then(Value::as_str)
            .and_then(ImageResolution::parse)
            .unwrap_or_default();
        let (width, height) = ratio.dimensions(size.long_edge() / Self::PREVIEW_SCALE);

        let prompt = last_text_part(payload).unwrap_or_default();
        let digest = Sha256::digest(prompt.as_bytes());
        let image = RgbImage::from_pixel(width, height, Rgb([digest[0], digest[1], digest[2]]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| BackendError::transport(format!("dryrun PNG encode failed: {err}")))?;

        Ok(json!({
            "responseId": hex::encode(&digest[..8]),
            "modelVersion": model,
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "inlineData": {
                            "mimeType": "image/png",
                            "data": BASE64.encode(bytes),
                        }
                    }]
                },
                "finishReason": "STOP",
            }]
        }))
    }
}

impl GenerationBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_content(&self, model: &str, payload: &Value) -> Result<Value, BackendError> {
        let Some(spec) = self.registry.get(model) else {
            return Err(BackendError {
                http_status: Some(404),
                body: json!({"error": {"code": 404, "status": "NOT_FOUND"}}),
                message: format!("dryrun: model '{model}' not found"),
            });
        };
        if spec.supports(CAP_TEXT) {
            return Ok(self.text_response(payload));
        }
        self.image_response(model, payload)
    }
}

fn last_text_part(payload: &Value) -> Option<String> {
    payload
        .get("contents")?
        .as_array()?
        .iter()
        .filter_map(|content| content.get("parts").and_then(Value::as_array))
        .flatten()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_payload(text: &str, ratio: &str, size: Option<&str>) -> Value {
        let mut image_config = json!({ "aspectRatio": ratio });
        if let Some(size) = size {
            image_config["imageSize"] = json!(size);
        }
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": { "imageConfig": image_config },
        })
    }

    #[test]
    fn gemini_endpoint_accepts_bare_and_prefixed_names() {
        let backend = GeminiBackend::new("https://example.test/v1beta/", "k".to_string());
        assert_eq!(
            backend.endpoint_for_model("gemini-2.5-flash-image"),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            backend.endpoint_for_model("models/gemini-3-pro-image-preview"),
            "https://example.test/v1beta/models/gemini-3-pro-image-preview:generateContent"
        );
    }

    #[test]
    fn build_backend_requires_key_for_gemini() {
        let mut config = EngineConfig::dryrun();
        let registry = ModelRegistry::default();
        assert_eq!(
            build_backend(&config, &registry).map(|b| b.name().to_string()).ok(),
            Some("dryrun".to_string())
        );
        config.backend = BackendKind::Gemini;
        assert!(build_backend(&config, &registry).is_err());
        config.api_key = Some("key".to_string());
        assert_eq!(
            build_backend(&config, &registry).map(|b| b.name().to_string()).ok(),
            Some("gemini".to_string())
        );
    }

    #[test]
    fn dryrun_image_matches_requested_ratio() -> anyhow::Result<()> {
        let backend = DryrunBackend::new(ModelRegistry::default());
        let response = backend.generate_content(
            "gemini-3-pro-image-preview",
            &image_payload("a fox", "16:9", Some("2K")),
        )?;
        let data = response["candidates"][0]["content"]["parts"][0]["inlineData"]["data"]
            .as_str()
            .unwrap_or_default();
        let decoded = image::load_from_memory(&BASE64.decode(data)?)?;
        assert_eq!((decoded.width(), decoded.height()), (256, 144));
        Ok(())
    }

    #[test]
    fn dryrun_colour_is_stable_per_prompt() -> anyhow::Result<()> {
        let backend = DryrunBackend::new(ModelRegistry::default());
        let payload = image_payload("same prompt", "1:1", None);
        let first = backend.generate_content("gemini-2.5-flash-image", &payload)?;
        let second = backend.generate_content("gemini-2.5-flash-image", &payload)?;
        assert_eq!(first["responseId"], second["responseId"]);
        assert_eq!(
            first["candidates"][0]["content"]["parts"][0],
            second["candidates"][0]["content"]["parts"][0]
        );
        Ok(())
    }

    #[test]
    fn dryrun_text_model_returns_text() -> anyhow::Result<()> {
        let backend = DryrunBackend::new(ModelRegistry::default());
        let response = backend.generate_content(
            "gemini-3-flash-preview",
            &json!({ "contents": [{ "parts": [{ "text": "a quiet harbour." }] }] }),
        )?;
        let text = response["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();
        assert!(text.starts_with("a quiet harbour, highly detailed"));
        Ok(())
    }

    #[test]
    fn dryrun_unknown_model_is_not_found() {
        let backend = DryrunBackend::new(ModelRegistry::default());
        let err = backend
            .generate_content("nope", &json!({}))
            .err()
            .map(|err| err.http_status);
        assert_eq!(err, Some(Some(404)));
    }
}
