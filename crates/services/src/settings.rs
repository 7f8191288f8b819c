use practice_core::model::XpRules;

use crate::error::SettingsError;

/// Upper bound for compare-and-swap retries on a single request.
pub const MAX_CONFLICT_RETRIES: u32 = 16;

/// Tuning for the session service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    max_conflict_retries: u32,
    xp_rules: XpRules,
    list_limit: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            xp_rules: XpRules::default(),
            list_limit: 50,
        }
    }
}

impl ServiceSettings {
    /// Creates validated service settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::ConflictRetries` when `max_conflict_retries` is
    /// zero or above [`MAX_CONFLICT_RETRIES`].
    pub fn new(max_conflict_retries: u32, xp_rules: XpRules) -> Result<Self, SettingsError> {
        if !(1..=MAX_CONFLICT_RETRIES).contains(&max_conflict_retries) {
            return Err(SettingsError::ConflictRetries {
                got: max_conflict_retries,
                max: MAX_CONFLICT_RETRIES,
            });
        }
        Ok(Self {
            max_conflict_retries,
            xp_rules,
            ..Self::default()
        })
    }

    /// Cap applied to session listings.
    #[must_use]
    pub fn with_list_limit(mut self, limit: u32) -> Self {
        self.list_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn max_conflict_retries(&self) -> u32 {
        self.max_conflict_retries
    }

    #[must_use]
    pub fn xp_rules(&self) -> &XpRules {
        &self.xp_rules
    }

    #[must_use]
    pub fn list_limit(&self) -> u32 {
        self.list_limit
    }
}
