use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Idle time after the last keystroke before an edit becomes an undo step.
pub const PROMPT_COMMIT_DEBOUNCE: Duration = Duration::from_millis(800);

/// Linear undo log over prompt text.
///
/// `cursor` always indexes the active entry when the log is non-empty.
/// Committing after an undo discards the redo branch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "StoredPromptHistory")]
pub struct PromptHistory {
    entries: Vec<String>,
    cursor: usize,
}

#[derive(Deserialize)]
struct StoredPromptHistory {
    #[serde(default)]
    entries: Vec<String>,
    #[serde(default)]
    cursor: usize,
}

impl From<StoredPromptHistory> for PromptHistory {
    fn from(stored: StoredPromptHistory) -> Self {
        let last = stored.entries.len().saturating_sub(1);
        Self {
            cursor: stored.cursor.min(last),
            entries: stored.entries,
        }
    }
}

impl PromptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(String::as_str)
    }

    /// Starts a new log holding only `text`.
    pub fn reset(&mut self, text: impl Into<String>) {
        self.entries = vec![text.into()];
        self.cursor = 0;
    }

    /// Appends `text` after the cursor. Returns `false` when it equals the
    /// active entry.
    pub fn commit(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if self.current() == Some(text.as_str()) {
            return false;
        }
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(text);
        self.cursor = self.entries.len() - 1;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn undo(&mut self) -> Option<&str> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.current()
    }

    pub fn redo(&mut self) -> Option<&str> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.current()
    }
}

/// Live prompt text backed by a [`PromptHistory`], committing bursts of edits
/// as one entry once typing has been idle for the debounce window.
#[derive(Debug, Clone)]
pub struct PromptEditor {
    history: PromptHistory,
    text: String,
    last_edit: Option<Instant>,
    debounce: Duration,
}

impl PromptEditor {
    pub fn new(history: PromptHistory) -> Self {
        let text = history.current().unwrap_or_default().to_string();
        Self {
            history,
            text,
            last_edit: None,
            debounce: PROMPT_COMMIT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn history(&self) -> &PromptHistory {
        &self.history
    }

    pub fn into_history(mut self) -> PromptHistory {
        self.flush();
        self.history
    }

    pub fn has_pending(&self) -> bool {
        self.last_edit.is_some()
    }

    /// Records a keystroke. The visible text changes immediately; the history
    /// only after [`PromptEditor::poll`] sees the window elapse.
    pub fn type_text(&mut self, text: impl Into<String>, now: Instant) {
        self.text = text.into();
        self.last_edit = Some(now);
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match self.last_edit {
            Some(at) if now.saturating_duration_since(at) >= self.debounce => self.flush(),
            _ => false,
        }
    }

    /// Commits any pending edit right away.
    pub fn flush(&mut self) -> bool {
        if self.last_edit.take().is_none() {
            return false;
        }
        self.history.commit(self.text.clone())
    }

    /// Replaces the log with a fresh enhancement result.
    pub fn reset(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.last_edit = None;
        self.history.reset(text.clone());
        self.text = text;
    }

    pub fn undo(&mut self) -> bool {
        self.flush();
        match self.history.undo() {
            Some(text) => {
                self.text = text.to_string();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        self.flush();
        match self.history.redo() {
            Some(text) => {
                self.text = text.to_string();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(items: &[&str]) -> PromptHistory {
        let mut history = PromptHistory::new();
        for item in items {
            history.commit(*item);
        }
        history
    }

    #[test]
    fn commit_appends_and_moves_cursor() {
        let history = history_of(&["a", "b", "c"]);
        assert_eq!(history.entries(), ["a", "b", "c"]);
        assert_eq!(history.cursor(), 2);
        assert_eq!(history.current(), Some("c"));
    }

    #[test]
    fn duplicate_commit_does_not_grow_log() {
        let mut history = history_of(&["a"]);
        assert!(!history.commit("a"));
        assert!(!history.commit("a"));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn commit_after_undo_truncates_redo_branch() {
        let mut history = history_of(&["a", "b", "c"]);
        history.undo();
        history.undo();
        assert!(history.commit("z"));
        assert_eq!(history.entries(), ["a", "z"]);
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_then_redo_restores_text() {
        let mut history = history_of(&["a", "b", "c"]);
        for _ in 0..2 {
            let before = history.current().map(str::to_string);
            history.undo();
            history.redo();
            assert_eq!(history.current().map(str::to_string), before);
            history.undo();
        }
    }

    #[test]
    fn undo_and_redo_are_noops_at_bounds() {
        let mut history = history_of(&["only"]);
        assert_eq!(history.undo(), None);
        assert_eq!(history.redo(), None);
        assert_eq!(history.cursor(), 0);

        let mut empty = PromptHistory::new();
        assert_eq!(empty.undo(), None);
        assert_eq!(empty.current(), None);
    }

    #[test]
    fn reset_replaces_log() {
        let mut history = history_of(&["a", "b"]);
        history.reset("fresh");
        assert_eq!(history.entries(), ["fresh"]);
        assert_eq!(history.cursor(), 0);
    }

    #[test]
    fn stored_cursor_is_clamped() {
        let history: PromptHistory =
            serde_json::from_str(r#"{"entries":["a","b"],"cursor":9}"#).unwrap();
        assert_eq!(history.cursor(), 1);
        let empty: PromptHistory = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn editor_coalesces_keystrokes_within_window() {
        let start = Instant::now();
        let mut editor = PromptEditor::new(history_of(&["base"]));
        editor.type_text("base r", start);
        editor.type_text("base re", start + Duration::from_millis(300));
        editor.type_text("base red", start + Duration::from_millis(600));

        assert!(!editor.poll(start + Duration::from_millis(1000)));
        assert_eq!(editor.text(), "base red");
        assert_eq!(editor.history().len(), 1);

        assert!(editor.poll(start + Duration::from_millis(1400)));
        assert_eq!(editor.history().entries(), ["base", "base red"]);
        assert!(!editor.has_pending());
    }

    #[test]
    fn editor_undo_flushes_pending_edit_first() {
        let start = Instant::now();
        let mut editor = PromptEditor::new(history_of(&["one"]));
        editor.type_text("two", start);

        assert!(editor.undo());
        assert_eq!(editor.text(), "one");
        assert!(editor.redo());
        assert_eq!(editor.text(), "two");
        assert!(!editor.redo());
    }

    #[test]
    fn editor_reset_drops_pending_edit() {
        let start = Instant::now();
        let mut editor = PromptEditor::new(PromptHistory::new());
        editor.type_text("draft", start);
        editor.reset("enhanced");
        assert!(!editor.poll(start + Duration::from_secs(5)));
        assert_eq!(editor.text(), "enhanced");
        assert_eq!(editor.into_history().entries(), ["enhanced"]);
    }
}
