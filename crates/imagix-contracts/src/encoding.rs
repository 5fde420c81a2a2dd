use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// An image ready to be inlined into a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub mime_type: String,
    pub payload: String,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            payload: payload.into(),
        }
    }

    /// Parses `data:image/<subtype>;base64,<payload>`.
    ///
    /// The subtype is restricted to ASCII letters and `+`, and the payload must
    /// be a non-empty single line. The payload itself is not decoded here.
    pub fn from_data_url(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix("data:")?;
        let (mime_type, payload) = rest.split_once(";base64,")?;
        let subtype = mime_type.strip_prefix("image/")?;
        if subtype.is_empty()
            || !subtype
                .chars()
                .all(|ch| ch.is_ascii_alphabetic() || ch == '+')
        {
            return None;
        }
        if payload.is_empty() || payload.contains(|ch: char| ch == '\n' || ch == '\r') {
            return None;
        }
        Some(Self::new(mime_type, payload))
    }

    pub fn to_data_url(&self) -> String {
        data_url(&self.mime_type, &self.payload)
    }

    /// The `inlineData` part shape accepted by the generation backend.
    pub fn to_inline_part(&self) -> Value {
        json!({
            "inlineData": {
                "mimeType": self.mime_type,
                "data": self.payload,
            }
        })
    }
}

pub fn data_url(mime_type: &str, payload: &str) -> String {
    format!("data:{mime_type};base64,{payload}")
}

/// Encodes every well-formed data-URL and silently drops the rest, so one
/// corrupt reference never blocks a generation.
pub fn encode_references<I, S>(urls: I) -> Vec<EncodedImage>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    urls.into_iter()
        .filter_map(|url| EncodedImage::from_data_url(url.as_ref()))
        .collect()
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let lowered = mime_type.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    if lowered.contains("svg") {
        return "svg";
    }
    "png"
}

pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
