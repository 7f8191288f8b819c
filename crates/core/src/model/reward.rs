use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::question::Difficulty;
use crate::model::session::InteractionMode;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum RewardError {
    #[error("base reward must be > 0")]
    InvalidBaseReward,

    #[error("mode multiplier must be finite and in (0, 4], got {0}")]
    InvalidMultiplier(f32),
}

//
// ─── RULES ─────────────────────────────────────────────────────────────────────
//

/// XP rules applied when questions are adapted into a session.
///
/// `reward = round(base[difficulty] × multiplier[mode])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpRules {
    base_easy: u32,
    base_medium: u32,
    base_hard: u32,
    learn_multiplier: f32,
    review_multiplier: f32,
    practice_multiplier: f32,
    completion_bonus: u32,
}

impl Default for XpRules {
    fn default() -> Self {
        Self {
            base_easy: 10,
            base_medium: 20,
            base_hard: 30,
            learn_multiplier: 0.5,
            review_multiplier: 0.75,
            practice_multiplier: 1.0,
            completion_bonus: 25,
        }
    }
}

impl XpRules {
    /// Creates custom XP rules.
    ///
    /// # Errors
    ///
    /// Returns `RewardError::InvalidBaseReward` if any base reward is zero and
    /// `RewardError::InvalidMultiplier` if a multiplier is not in (0, 4].
    pub fn new(
        base: [u32; 3],
        multipliers: [f32; 3],
        completion_bonus: u32,
    ) -> Result<Self, RewardError> {
        if base.contains(&0) {
            return Err(RewardError::InvalidBaseReward);
        }
        for m in multipliers {
            if !m.is_finite() || m <= 0.0 || m > 4.0 {
                return Err(RewardError::InvalidMultiplier(m));
            }
        }
        let [base_easy, base_medium, base_hard] = base;
        let [learn_multiplier, review_multiplier, practice_multiplier] = multipliers;
        Ok(Self {
            base_easy,
            base_medium,
            base_hard,
            learn_multiplier,
            review_multiplier,
            practice_multiplier,
            completion_bonus,
        })
    }

    #[must_use]
    pub fn base(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.base_easy,
            Difficulty::Medium => self.base_medium,
            Difficulty::Hard => self.base_hard,
        }
    }

    #[must_use]
    pub fn multiplier(&self, mode: InteractionMode) -> f32 {
        match mode {
            InteractionMode::Learn => self.learn_multiplier,
            InteractionMode::Review => self.review_multiplier,
            InteractionMode::Practice => self.practice_multiplier,
        }
    }

    /// Reward for revealing a question of `difficulty` in `mode`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn reward(&self, difficulty: Difficulty, mode: InteractionMode) -> u32 {
        let scaled = f64::from(self.base(difficulty)) * f64::from(self.multiplier(mode));
        if scaled >= f64::from(u32::MAX) {
            return u32::MAX;
        }
        scaled.round() as u32
    }

    #[must_use]
    pub fn completion_bonus(&self) -> u32 {
        self.completion_bonus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn practice_mode_pays_full_base() {
        let rules = XpRules::default();
        assert_eq!(
            rules.reward(Difficulty::Hard, InteractionMode::Practice),
            rules.base(Difficulty::Hard)
        );
    }

    #[test]
    fn learn_mode_pays_half_rounded() {
        let rules = XpRules::new([7, 15, 25], [0.5, 0.75, 1.0], 0).unwrap();
        // 25 * 0.5 = 12.5 rounds away from zero
        assert_eq!(rules.reward(Difficulty::Hard, InteractionMode::Learn), 13);
        assert_eq!(rules.reward(Difficulty::Easy, InteractionMode::Learn), 4);
        assert_eq!(rules.reward(Difficulty::Medium, InteractionMode::Review), 11);
    }

    #[test]
    fn rejects_zero_base_and_bad_multipliers() {
        assert_eq!(
            XpRules::new([0, 1, 1], [1.0, 1.0, 1.0], 0).unwrap_err(),
            RewardError::InvalidBaseReward
        );
        assert!(matches!(
            XpRules::new([1, 1, 1], [f32::NAN, 1.0, 1.0], 0),
            Err(RewardError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            XpRules::new([1, 1, 1], [1.0, 0.0, 1.0], 0),
            Err(RewardError::InvalidMultiplier(_))
        ));
    }
}
