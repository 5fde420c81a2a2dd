use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::GenerationError;
use crate::params::ImageResolution;

/// Lifetime generation allowance on the free plan.
pub const FREE_GENERATION_LIMIT: u64 = 10;
pub const SUBSCRIPTION_PERIOD_MS: i64 = 30 * DAY_MS;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Standard,
    Pro,
}

impl PlanTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Standard => "standard",
            PlanTier::Pro => "pro",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Some(PlanTier::Free),
            "standard" => Some(PlanTier::Standard),
            "pro" => Some(PlanTier::Pro),
            _ => None,
        }
    }

    pub fn is_highest(self) -> bool {
        self == PlanTier::Pro
    }

    /// Clamps a requested resolution to what the plan pays for.
    pub fn effective_resolution(self, requested: ImageResolution) -> ImageResolution {
        match self {
            PlanTier::Free => ImageResolution::OneK,
            PlanTier::Standard => requested.min(ImageResolution::TwoK),
            PlanTier::Pro => requested,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw).ok_or_else(|| format!("unknown plan '{raw}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserProfile {
    pub email: String,
    pub name: String,
    pub avatar: String,
}

impl UserProfile {
    /// Derives a display name and avatar from an email address.
    pub fn from_email(email: &str) -> Self {
        let first = email
            .split('@')
            .next()
            .and_then(|local| local.split('.').next())
            .and_then(|part| part.split('_').next())
            .unwrap_or_default();
        let mut chars = first.chars();
        let name = match chars.next() {
            Some(head) => head.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        Self {
            email: email.to_string(),
            name,
            avatar: format!(
                "https://api.dicebear.com/7.x/avataaars/svg?seed={email}&backgroundColor=b6e3f4,c0aede,d1d4f9"
            ),
        }
    }
}

/// Plan, usage and profile state, loaded once and flushed by an explicit
/// [`UserSession::save`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    #[serde(skip)]
    pub path: PathBuf,
    #[serde(default)]
    pub plan: PlanTier,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub purchase_date_ms: i64,
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default)]
    pub theme: Option<String>,
}

impl UserSession {
    pub fn new(path: impl Into<PathBuf>, now_ms: i64) -> Self {
        Self {
            path: path.into(),
            plan: PlanTier::Free,
            usage_count: 0,
            purchase_date_ms: now_ms,
            profile: UserProfile::default(),
            theme: None,
        }
    }

    /// Loads the session at `path`, starting fresh when the file is missing or
    /// unreadable.
    pub fn load(path: impl Into<PathBuf>, now_ms: i64) -> Self {
        let path = path.into();
        let parsed = read_json(&path)
            .ok()
            .and_then(|payload| serde_json::from_value::<UserSession>(payload).ok());
        match parsed {
            Some(mut session) => {
                session.path = path;
                session
            }
            None => Self::new(path, now_ms),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        write_json(&self.path, serde_json::to_value(self)?)
    }

    pub fn is_signed_in(&self) -> bool {
        !self.profile.name.is_empty()
    }

    pub fn connect(&mut self, email: &str) {
        self.profile = UserProfile::from_email(email);
    }

    pub fn logout(&mut self) {
        self.profile = UserProfile::default();
    }

    /// Variations of an existing result bypass the free allowance.
    pub fn check_generation_allowed(&self, is_variation: bool) -> Result<(), GenerationError> {
        if is_variation {
            return Ok(());
        }
        self.check_allowance()
    }

    pub fn check_edit_allowed(&self) -> Result<(), GenerationError> {
        self.check_allowance()
    }

    pub fn remaining_free(&self) -> Option<u64> {
        (self.plan == PlanTier::Free)
            .then(|| FREE_GENERATION_LIMIT.saturating_sub(self.usage_count))
    }

    pub fn record_generation(&mut self) {
        self.usage_count += 1;
    }

    pub fn effective_resolution(&self, requested: ImageResolution) -> ImageResolution {
        self.plan.effective_resolution(requested)
    }

    pub fn set_plan(&mut self, plan: PlanTier, now_ms: i64) {
        self.plan = plan;
        self.purchase_date_ms = now_ms;
    }

    /// Whole days left in the paid period, `None` on the free plan.
    pub fn days_left(&self, now_ms: i64) -> Option<i64> {
        if self.plan == PlanTier::Free {
            return None;
        }
        let remaining_ms = SUBSCRIPTION_PERIOD_MS - (now_ms - self.purchase_date_ms);
        if remaining_ms <= 0 {
            return Some(0);
        }
        Some((remaining_ms + DAY_MS - 1) / DAY_MS)
    }

    fn check_allowance(&self) -> Result<(), GenerationError> {
        if self.plan == PlanTier::Free && self.usage_count >= FREE_GENERATION_LIMIT {
            return Err(GenerationError::UsageLimitReached {
                limit: FREE_GENERATION_LIMIT,
            });
        }
        Ok(())
    }
}

pub(crate) fn read_json(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub(crate) fn write_json(path: &Path, payload: Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&payload)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000_000;

    #[test]
    fn session_roundtrip() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session.json");
        let mut session = UserSession::new(&path, NOW);
        session.connect("jane.doe@example.com");
        session.set_plan(PlanTier::Standard, NOW);
        session.record_generation();
        session.save()?;

        let loaded = UserSession::load(&path, NOW + 5);
        assert_eq!(loaded, session);
        assert_eq!(loaded.profile.name, "Jane");
        assert!(loaded.profile.avatar.contains("seed=jane.doe@example.com"));
        Ok(())
    }

    #[test]
    fn corrupt_session_file_starts_fresh() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("session.json");
        std::fs::write(&path, "{not json")?;
        let loaded = UserSession::load(&path, NOW);
        assert_eq!(loaded.plan, PlanTier::Free);
        assert_eq!(loaded.usage_count, 0);
        assert_eq!(loaded.purchase_date_ms, NOW);
        Ok(())
    }

    #[test]
    fn free_plan_blocks_after_limit_except_variations() {
        let mut session = UserSession::new("unused.json", NOW);
        for _ in 0..FREE_GENERATION_LIMIT {
            assert!(session.check_generation_allowed(false).is_ok());
            session.record_generation();
        }
        assert_eq!(
            session.check_generation_allowed(false),
            Err(GenerationError::UsageLimitReached { limit: 10 })
        );
        assert!(session.check_generation_allowed(true).is_ok());
        assert!(session.check_edit_allowed().is_err());
        assert_eq!(session.remaining_free(), Some(0));

        session.set_plan(PlanTier::Standard, NOW);
        assert!(session.check_edit_allowed().is_ok());
        assert_eq!(session.remaining_free(), None);
    }

    #[test]
    fn resolution_is_clamped_per_plan() {
        assert_eq!(
            PlanTier::Free.effective_resolution(ImageResolution::FourK),
            ImageResolution::OneK
        );
        assert_eq!(
            PlanTier::Standard.effective_resolution(ImageResolution::FourK),
            ImageResolution::TwoK
        );
        assert_eq!(
            PlanTier::Standard.effective_resolution(ImageResolution::OneK),
            ImageResolution::OneK
        );
        assert_eq!(
            PlanTier::Pro.effective_resolution(ImageResolution::FourK),
            ImageResolution::FourK
        );
    }

    #[test]
    fn days_left_counts_down_and_floors_at_zero() {
        let mut session = UserSession::new("unused.json", NOW);
        assert_eq!(session.days_left(NOW), None);

        session.set_plan(PlanTier::Pro, NOW);
        assert_eq!(session.days_left(NOW), Some(30));
        assert_eq!(session.days_left(NOW + DAY_MS / 2), Some(30));
        assert_eq!(session.days_left(NOW + DAY_MS), Some(29));
        assert_eq!(session.days_left(NOW + 40 * DAY_MS), Some(0));
    }

    #[test]
    fn logout_clears_profile() {
        let mut session = UserSession::new("unused.json", NOW);
        session.connect("sam_smith@example.com");
        assert_eq!(session.profile.name, "Sam");
        assert!(session.is_signed_in());
        session.logout();
        assert!(!session.is_signed_in());
    }
}
