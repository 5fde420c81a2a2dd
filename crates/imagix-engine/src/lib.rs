pub mod backend;
pub mod config;
pub mod files;
pub mod studio;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{build_backend, DryrunBackend, GeminiBackend, GenerationBackend};
pub use config::{BackendKind, EngineConfig};
pub use studio::{GenerateOptions, Studio, StudioState};
pub use synthesis::{GenerationResult, ImageSynthesisClient, PromptSynthesisClient};
