use serde_json::{Map, Value};

/// Shown in place of any rate-limit or quota failure.
pub const BUSY_MESSAGE: &str = "System is busy right now. Please retry in a few moments.";

const REFUSAL_MAX_CHARS: usize = 512;

/// Closed set of failures surfaced to callers of the synthesis clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("{}", BUSY_MESSAGE)]
    RateLimited,
    #[error("Generation blocked by safety filters: {0}")]
    SafetyRejected(String),
    #[error("No image data returned from the API.")]
    NoImage,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Free limit reached ({limit} images). Please upgrade your plan.")]
    UsageLimitReached { limit: u64 },
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Unknown(String),
}

impl GenerationError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GenerationError::RateLimited)
    }

    pub fn refusal(text: &str) -> Self {
        GenerationError::SafetyRejected(truncate_text(text.trim(), REFUSAL_MAX_CHARS))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::RateLimited => "rate_limited",
            GenerationError::SafetyRejected(_) => "safety_rejected",
            GenerationError::NoImage => "no_image",
            GenerationError::PermissionDenied(_) => "permission_denied",
            GenerationError::UsageLimitReached { .. } => "usage_limit",
            GenerationError::InvalidRequest(_) => "invalid_request",
            GenerationError::Unknown(_) => "unknown",
        }
    }
}

/// Failure captured at the network boundary, before classification.
///
/// `body` holds the decoded error envelope when the backend returned JSON,
/// otherwise `Null`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub http_status: Option<u16>,
    pub body: Value,
    pub message: String,
}

impl BackendError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            http_status: None,
            body: Value::Null,
            message: message.into(),
        }
    }

    pub fn from_response(backend: &str, status: u16, raw_body: &str) -> Self {
        let body: Value = serde_json::from_str(raw_body).unwrap_or(Value::Null);
        let detail = body
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| truncate_text(raw_body.trim(), REFUSAL_MAX_CHARS));
        Self {
            http_status: Some(status),
            body,
            message: format!("{backend} request failed ({status}): {detail}"),
        }
    }

    /// Flattens the failure into the loosely shaped error object the
    /// classifiers understand: `{status, message, error: {...}}`.
    pub fn as_error_value(&self) -> Value {
        let mut envelope = Map::new();
        if let Some(status) = self.http_status {
            envelope.insert("status".to_string(), Value::Number(status.into()));
        }
        envelope.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(inner) = self.body.get("error") {
            envelope.insert("error".to_string(), inner.clone());
        } else if !self.body.is_null() {
            envelope.insert("error".to_string(), self.body.clone());
        }
        Value::Object(envelope)
    }
}

/// Detects rate-limit or quota signatures on an error object or on its
/// nested `error` field.
pub fn is_quota_error(error: &Value) -> bool {
    matches_quota_shape(error) || error.get("error").is_some_and(matches_quota_shape)
}

pub fn is_permission_error(error: &Value) -> bool {
    matches_permission_shape(error) || error.get("error").is_some_and(matches_permission_shape)
}

fn matches_quota_shape(value: &Value) -> bool {
    if let Some(text) = value.as_str() {
        return quota_message(text);
    }
    numeric_field(value, "status") == Some(429)
        || numeric_field(value, "code") == Some(429)
        || string_field(value, "status") == Some("RESOURCE_EXHAUSTED")
        || string_field(value, "message").is_some_and(quota_message)
}

fn matches_permission_shape(value: &Value) -> bool {
    if let Some(text) = value.as_str() {
        return permission_message(text);
    }
    numeric_field(value, "status") == Some(403)
        || numeric_field(value, "code") == Some(403)
        || string_field(value, "status") == Some("PERMISSION_DENIED")
        || string_field(value, "message").is_some_and(permission_message)
}

fn quota_message(message: &str) -> bool {
    message.contains("429")
        || message.contains("RESOURCE_EXHAUSTED")
        || message.to_ascii_lowercase().contains("quota")
}

fn permission_message(message: &str) -> bool {
    message.contains("403") || message.contains("PERMISSION_DENIED")
}

fn numeric_field(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

fn string_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Maps a raw backend failure onto the closed error set.
pub fn classify(error: &BackendError) -> GenerationError {
    let shape = error.as_error_value();
    if is_quota_error(&shape) {
        return GenerationError::RateLimited;
    }
    if is_permission_error(&shape) {
        return GenerationError::PermissionDenied(error.message.clone());
    }
    GenerationError::Unknown(error.message.clone())
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
