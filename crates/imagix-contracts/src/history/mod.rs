mod generations;
mod prompt;

pub use generations::{GenerationHistory, HistoryItem, HistoryNavigator};
pub use prompt::{PromptEditor, PromptHistory, PROMPT_COMMIT_DEBOUNCE};
