use std::collections::VecDeque;
use std::sync::Mutex;

use imagix_contracts::errors::BackendError;
use serde_json::{json, Value};

use crate::backend::GenerationBackend;

/// Replays queued responses in order and records every call.
pub(crate) struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<Value, BackendError>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedBackend {
    pub(crate) fn new(responses: Vec<Result<Value, BackendError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate_content(&self, model: &str, payload: &Value) -> Result<Value, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), payload.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::transport("no scripted response left")))
    }
}

pub(crate) fn image_response(mime_type: &str, data: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "parts": [{ "inlineData": { "mimeType": mime_type, "data": data } }] },
            "finishReason": "STOP",
        }]
    })
}

pub(crate) fn text_response(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }] },
            "finishReason": "STOP",
        }]
    })
}
