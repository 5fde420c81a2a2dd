use std::env;

use anyhow::{bail, Result};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gemini,
    Dryrun,
}

impl BackendKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "gemini" => Some(BackendKind::Gemini),
            "dryrun" | "dry-run" => Some(BackendKind::Dryrun),
            _ => None,
        }
    }
}

/// Backend settings read from the environment.
///
/// - `IMAGIX_BACKEND`: `gemini` (default) or `dryrun`
/// - `GEMINI_API_KEY`, falling back to `GOOGLE_API_KEY`
/// - `GEMINI_API_BASE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub backend: BackendKind,
    pub api_base: String,
    pub api_key: Option<String>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend_raw = lookup("IMAGIX_BACKEND").unwrap_or_default();
        let Some(backend) = BackendKind::parse(&backend_raw) else {
            bail!("IMAGIX_BACKEND must be 'gemini' or 'dryrun' (got '{backend_raw}')");
        };
        let api_base = lookup("GEMINI_API_BASE")
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string());
        let api_key = lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY"));
        Ok(Self {
            backend,
            api_base,
            api_key,
        })
    }

    pub fn dryrun() -> Self {
        Self {
            backend: BackendKind::Dryrun,
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            api_key: None,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_gemini_with_public_base() -> anyhow::Result<()> {
        let config = EngineConfig::from_lookup(lookup_from(&[]))?;
        assert_eq!(config.backend, BackendKind::Gemini);
        assert_eq!(config.api_base, DEFAULT_GEMINI_API_BASE);
        assert_eq!(config.api_key, None);
        Ok(())
    }

    #[test]
    fn google_key_is_used_when_gemini_key_missing() -> anyhow::Result<()> {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "g-key"),
            ("GEMINI_API_BASE", "http://localhost:9000/v1beta/"),
            ("IMAGIX_BACKEND", "DryRun"),
        ]))?;
        assert_eq!(config.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.api_base, "http://localhost:9000/v1beta");
        assert_eq!(config.backend, BackendKind::Dryrun);
        Ok(())
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[("IMAGIX_BACKEND", "openai")]))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("IMAGIX_BACKEND"));
    }
}
