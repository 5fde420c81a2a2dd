use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use imagix_contracts::encoding::{encode_references, EncodedImage};
use imagix_contracts::errors::GenerationError;
use imagix_contracts::events::{
    payload, EventWriter, GENERATION_FAILED, GENERATION_STARTED, HISTORY_DELETED,
    IMAGE_GENERATED, MODEL_FALLBACK, PLAN_CHANGED, PROMPT_ENHANCED, SESSION_STARTED,
};
use imagix_contracts::history::{GenerationHistory, HistoryItem, PromptEditor, PromptHistory};
use imagix_contracts::models::{ModelRegistry, TierSelector};
use imagix_contracts::params::{AspectRatio, ImageResolution};
use imagix_contracts::request::{
    EnhanceRequest, GenerationRequest, ASSISTED_STYLE, DEFAULT_STYLE, EDIT_STYLE,
    VARIATION_SUFFIX,
};
use imagix_contracts::session::{PlanTier, UserSession};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::{build_backend, GenerationBackend};
use crate::config::EngineConfig;
use crate::files::write_data_url;
use crate::synthesis::{GenerationResult, ImageSynthesisClient, PromptSynthesisClient};

/// Workspace state that survives between invocations, kept in `studio.json`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudioState {
    #[serde(default)]
    pub prompt_history: PromptHistory,
    #[serde(default)]
    pub displayed_url: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub assisted: bool,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub resolution: ImageResolution,
}

impl StudioState {
    fn load(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed writing {}", path.display()))
    }
}

/// Inputs for one `generate` call. `count` images are produced one after
/// another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    pub prompt: Option<String>,
    pub references: Vec<EncodedImage>,
    /// Data-URL references, such as earlier results. Malformed ones are
    /// dropped.
    pub reference_urls: Vec<String>,
    pub style: Option<String>,
    pub camera: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub resolution: ImageResolution,
    pub use_web_grounding: bool,
    pub count: u32,
    pub variation: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            prompt: None,
            references: Vec::new(),
            reference_urls: Vec::new(),
            style: None,
            camera: None,
            aspect_ratio: AspectRatio::default(),
            resolution: ImageResolution::default(),
            use_web_grounding: false,
            count: 1,
            variation: false,
        }
    }
}

impl GenerateOptions {
    /// File references followed by every well-formed data-URL reference.
    pub fn encoded_references(&self) -> Vec<EncodedImage> {
        let decoded = encode_references(&self.reference_urls);
        if decoded.len() < self.reference_urls.len() {
            tracing::warn!(
                dropped = self.reference_urls.len() - decoded.len(),
                "skipping malformed reference images"
            );
        }
        self.references.iter().cloned().chain(decoded).collect()
    }
}

/// Owns the user session, both histories and the event log, and applies the
/// plan gating around every synthesis call.
///
/// Methods take `&mut self`, so only one enhancement or generation can be in
/// flight per studio.
pub struct Studio {
    state_dir: PathBuf,
    session: UserSession,
    history: GenerationHistory,
    state: StudioState,
    editor: PromptEditor,
    events: EventWriter,
    prompts: PromptSynthesisClient,
    images: ImageSynthesisClient,
}

impl Studio {
    pub fn open(state_dir: impl Into<PathBuf>, config: &EngineConfig) -> Result<Self> {
        let registry = ModelRegistry::default();
        let backend = build_backend(config, &registry)?;
        Self::with_backend(state_dir, backend, registry)
    }

    pub fn with_backend(
        state_dir: impl Into<PathBuf>,
        backend: Arc<dyn GenerationBackend>,
        registry: ModelRegistry,
    ) -> Result<Self> {
        let state_dir = state_dir.into();
        fs::create_dir_all(&state_dir)
            .with_context(|| format!("failed creating {}", state_dir.display()))?;

        let session = UserSession::load(state_dir.join("session.json"), now_ms());
        let history = GenerationHistory::load(state_dir.join("history.json"));
        let mut state = StudioState::load(&state_dir.join("studio.json"));
        let editor = PromptEditor::new(std::mem::take(&mut state.prompt_history));
        let events = EventWriter::new(
            state_dir.join("events.jsonl"),
            uuid::Uuid::new_v4().to_string(),
        );
        let backend_name = backend.name().to_string();
        let prompts = PromptSynthesisClient::new(backend.clone(), &registry)?;
        let images = ImageSynthesisClient::new(backend, TierSelector::new(Some(registry)));

        events.emit(
            SESSION_STARTED,
            payload(json!({
                "state_dir": state_dir.to_string_lossy().to_string(),
                "backend": backend_name,
                "plan": session.plan.as_str(),
                "history_items": history.len(),
            })),
        )?;
        tracing::debug!(state_dir = %state_dir.display(), backend = %backend_name, "studio opened");

        Ok(Self {
            state_dir,
            session,
            history,
            state,
            editor,
            events,
            prompts,
            images,
        })
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn session(&self) -> &UserSession {
        &self.session
    }

    pub fn history(&self) -> &GenerationHistory {
        &self.history
    }

    pub fn state(&self) -> &StudioState {
        &self.state
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn displayed_url(&self) -> Option<&str> {
        self.state.displayed_url.as_deref()
    }

    pub fn displayed_item(&self) -> Option<&HistoryItem> {
        let idx = self.history.navigator().position(self.displayed_url())?;
        self.history.items.get(idx)
    }

    /// The prompt as last typed, committed or not.
    pub fn current_prompt(&self) -> Option<&str> {
        Some(self.editor.text()).filter(|text| !text.is_empty())
    }

    pub fn prompt_history(&self) -> &PromptHistory {
        self.editor.history()
    }

    /// Flushes session, history and studio state to disk.
    pub fn save(&self) -> Result<()> {
        self.session.save()?;
        self.history.save()?;
        let mut snapshot = self.state.clone();
        snapshot.prompt_history = self.editor.history().clone();
        snapshot.save(&self.state_dir.join("studio.json"))
    }

    /// Rewrites a raw idea into a prompt and restarts the prompt history from
    /// it.
    pub fn enhance(&mut self, request: &EnhanceRequest) -> Result<String> {
        request.validate().map_err(GenerationError::InvalidRequest)?;
        let text = self.prompts.enhance(request)?;

        self.editor.reset(text.clone());
        self.state.style = request.style.clone();
        self.state.camera = request.camera.clone();
        self.state.assisted = request.assisted;
        self.events.emit(
            PROMPT_ENHANCED,
            payload(json!({
                "model": self.prompts.model(),
                "assisted": request.assisted,
                "references": request.references.len(),
                "chars": text.chars().count(),
            })),
        )?;
        self.save()?;
        tracing::info!(chars = text.chars().count(), "prompt enhanced");
        Ok(text)
    }

    /// Produces `options.count` images sequentially. A failure stops the
    /// batch; images already produced stay in history.
    pub fn generate(&mut self, options: &GenerateOptions) -> Result<Vec<HistoryItem>> {
        let prompt = options
            .prompt
            .clone()
            .or_else(|| self.current_prompt().map(str::to_string))
            .unwrap_or_default();
        let references = options.encoded_references();
        if prompt.trim().is_empty() && references.is_empty() {
            return Err(GenerationError::InvalidRequest("Please describe your vision.".to_string()).into());
        }
        self.session.check_generation_allowed(options.variation)?;
        if let Some(explicit) = options.prompt.as_deref() {
            self.commit_prompt(explicit);
        }

        let style = options
            .style
            .clone()
            .or_else(|| self.state.style.clone())
            .unwrap_or_else(|| self.default_style().to_string());
        let camera = options.camera.clone().or_else(|| self.state.camera.clone());
        self.state.aspect_ratio = options.aspect_ratio;
        self.state.resolution = options.resolution;

        let mut produced = Vec::new();
        for index in 0..options.count.max(1) {
            self.session.check_generation_allowed(options.variation)?;

            let mut request = GenerationRequest::new(if options.variation {
                format!("{prompt}{VARIATION_SUFFIX}")
            } else {
                prompt.clone()
            });
            request.style = Some(style.clone());
            request.camera = camera.clone();
            request.references = references.clone();
            request.aspect_ratio = options.aspect_ratio;
            request.resolution = self.session.effective_resolution(options.resolution);
            request.use_web_grounding = options.use_web_grounding;
            request.plan = self.session.plan;

            self.events.emit(
                GENERATION_STARTED,
                payload(json!({
                    "index": index,
                    "count": options.count.max(1),
                    "prompt": prompt,
                    "aspect_ratio": request.aspect_ratio.as_str(),
                    "resolution": request.resolution.as_str(),
                    "web_grounding": request.use_web_grounding,
                    "variation": options.variation,
                    "references": request.references.len(),
                })),
            )?;
            let item = self.run_generation(&request, prompt.clone())?;
            produced.push(item);
        }
        Ok(produced)
    }

    /// Edits the displayed image inside the white area of `mask`.
    pub fn magic_edit(
        &mut self,
        mask: EncodedImage,
        edit: &str,
        style: Option<String>,
    ) -> Result<HistoryItem> {
        let Some(displayed) = self.displayed_url() else {
            return Err(GenerationError::InvalidRequest("No image to edit.".to_string()).into());
        };
        let references = encode_references([displayed]);
        if references.is_empty() {
            tracing::warn!("displayed image is not a data URL; editing from the mask alone");
        }
        if edit.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("Please describe the edit.".to_string()).into());
        }
        self.session.check_edit_allowed()?;

        let mut request = GenerationRequest::new(edit.trim());
        request.style = Some(style.unwrap_or_else(|| EDIT_STYLE.to_string()));
        request.references = references;
        request.mask = Some(mask);
        request.aspect_ratio = self.state.aspect_ratio;
        request.resolution = self.session.effective_resolution(self.state.resolution);
        request.plan = self.session.plan;

        self.events.emit(
            GENERATION_STARTED,
            payload(json!({
                "index": 0,
                "count": 1,
                "prompt": edit.trim(),
                "mask_edit": true,
                "aspect_ratio": request.aspect_ratio.as_str(),
                "resolution": request.resolution.as_str(),
            })),
        )?;
        self.run_generation(&request, format!("Edit: {}", edit.trim()))
    }

    fn run_generation(
        &mut self,
        request: &GenerationRequest,
        history_prompt: String,
    ) -> Result<HistoryItem> {
        let result = match self.images.generate(request) {
            Ok(result) => result,
            Err(err) => {
                self.events.emit(
                    GENERATION_FAILED,
                    payload(json!({
                        "error_kind": err.kind(),
                        "error": err.to_string(),
                    })),
                )?;
                self.save()?;
                tracing::warn!(error = %err, "generation failed");
                return Err(err.into());
            }
        };
        if let Some(from) = result.fallback_from.as_deref() {
            self.events.emit(
                MODEL_FALLBACK,
                payload(json!({
                    "from_model": from,
                    "to_model": result.model,
                    "reason": result.fallback_reason,
                })),
            )?;
        }

        let item = self.commit_result(&result, history_prompt);
        self.events.emit(
            IMAGE_GENERATED,
            payload(json!({
                "id": item.id,
                "model": result.model,
                "tier": result.tier.as_str(),
                "mime_type": result.mime_type,
                "usage_count": self.session.usage_count,
            })),
        )?;
        self.save()?;
        tracing::info!(id = %item.id, model = %result.model, "image generated");
        Ok(item)
    }

    fn commit_result(&mut self, result: &GenerationResult, prompt: String) -> HistoryItem {
        let item = self
            .history
            .record(result.image_data_url.clone(), prompt, now_ms());
        self.session.record_generation();
        self.state.displayed_url = Some(item.url.clone());
        item
    }

    fn default_style(&self) -> &'static str {
        if self.state.assisted {
            ASSISTED_STYLE
        } else {
            DEFAULT_STYLE
        }
    }

    /// Shows the next older generation.
    pub fn undo_generation(&mut self) -> Result<Option<HistoryItem>> {
        let older = self
            .history
            .navigator()
            .undo(self.displayed_url())
            .cloned();
        self.show(older)
    }

    /// Shows the next newer generation.
    pub fn redo_generation(&mut self) -> Result<Option<HistoryItem>> {
        let newer = self
            .history
            .navigator()
            .redo(self.displayed_url())
            .cloned();
        self.show(newer)
    }

    fn show(&mut self, item: Option<HistoryItem>) -> Result<Option<HistoryItem>> {
        if let Some(item) = item.as_ref() {
            self.state.displayed_url = Some(item.url.clone());
            self.save()?;
        }
        Ok(item)
    }

    /// Removes an entry. The displayed image stays on screen even when it is
    /// the one removed.
    pub fn delete_history(&mut self, id: &str) -> Result<Option<HistoryItem>> {
        let removed = self.history.delete(id);
        if let Some(item) = removed.as_ref() {
            self.events.emit(
                HISTORY_DELETED,
                payload(json!({ "id": item.id, "remaining": self.history.len() })),
            )?;
            self.save()?;
        }
        Ok(removed)
    }

    pub fn export(&self, id: &str, dir: &Path) -> Result<PathBuf> {
        let Some(item) = self.history.get(id) else {
            anyhow::bail!("no history entry with id '{id}'");
        };
        write_data_url(&item.url, dir, &format!("imagix-{}", item.id))
    }

    fn commit_prompt(&mut self, text: &str) -> bool {
        self.editor.type_text(text, Instant::now());
        self.editor.flush()
    }

    /// Commits `text` immediately, bypassing the typing debounce.
    pub fn set_prompt(&mut self, text: &str) -> Result<bool> {
        let changed = self.commit_prompt(text);
        if changed {
            self.save()?;
        }
        Ok(changed)
    }

    /// Records a keystroke; it becomes an undo step once [`Studio::poll_prompt`]
    /// sees typing idle for the debounce window.
    pub fn type_prompt(&mut self, text: &str, now: Instant) {
        self.editor.type_text(text, now);
    }

    pub fn poll_prompt(&mut self, now: Instant) -> Result<bool> {
        let committed = self.editor.poll(now);
        if committed {
            self.save()?;
        }
        Ok(committed)
    }

    pub fn flush_prompt(&mut self) -> Result<bool> {
        let committed = self.editor.flush();
        if committed {
            self.save()?;
        }
        Ok(committed)
    }

    pub fn undo_prompt(&mut self) -> Result<Option<String>> {
        let pending = self.editor.has_pending();
        let moved = self.editor.undo();
        if moved || pending {
            self.save()?;
        }
        Ok(moved.then(|| self.editor.text().to_string()))
    }

    pub fn redo_prompt(&mut self) -> Result<Option<String>> {
        let pending = self.editor.has_pending();
        let moved = self.editor.redo();
        if moved || pending {
            self.save()?;
        }
        Ok(moved.then(|| self.editor.text().to_string()))
    }

    pub fn connect_profile(&mut self, email: &str) -> Result<()> {
        let email = email.trim();
        if !email.contains('@') {
            anyhow::bail!("'{email}' is not an email address");
        }
        self.session.connect(email);
        self.save()
    }

    pub fn logout(&mut self) -> Result<()> {
        self.session.logout();
        self.save()
    }

    pub fn set_plan(&mut self, plan: PlanTier) -> Result<()> {
        let previous = self.session.plan;
        self.session.set_plan(plan, now_ms());
        self.events.emit(
            PLAN_CHANGED,
            payload(json!({ "from": previous.as_str(), "to": plan.as_str() })),
        )?;
        self.save()
    }

    pub fn days_left(&self) -> Option<i64> {
        self.session.days_left(now_ms())
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
