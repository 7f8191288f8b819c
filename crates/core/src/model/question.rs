use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{QuestionId, SourceId};

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid difficulty: {0}")]
pub struct ParseDifficultyError(String);

/// Difficulty tier of a question. Drives the base reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ParseDifficultyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ParseDifficultyError(other.to_string())),
        }
    }
}

//
// ─── CONTENT ───────────────────────────────────────────────────────────────────
//

/// Question text with an optional translation for bilingual display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

impl LocalizedText {
    #[must_use]
    pub fn new(text: impl Into<String>, translation: Option<String>) -> Self {
        Self {
            text: text.into(),
            translation,
        }
    }

    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, None)
    }
}

//
// ─── SOLUTION ──────────────────────────────────────────────────────────────────
//

/// Worked solution for a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub answer: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Loading state of a question's solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolutionStatus {
    #[default]
    Pending,
    Loading,
    Loaded,
    Error,
}

//
// ─── HIERARCHY ─────────────────────────────────────────────────────────────────
//

/// Position of a question inside a parent/sub-question structure.
///
/// `ordinal` is assigned once when the session is created and is the
/// authoritative display order among siblings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionHierarchy {
    pub is_sub_question: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<QuestionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_context: Option<String>,
    #[serde(default)]
    pub ordinal: u32,
}

impl QuestionHierarchy {
    /// Hierarchy of a question that stands on its own.
    #[must_use]
    pub fn standalone() -> Self {
        Self::default()
    }

    /// Hierarchy of a sub-question attached to `parent_id`.
    #[must_use]
    pub fn sub_question(
        parent_id: QuestionId,
        sub_label: Option<String>,
        parent_context: Option<String>,
    ) -> Self {
        Self {
            is_sub_question: true,
            sub_label,
            parent_id: Some(parent_id),
            parent_context,
            ordinal: 0,
        }
    }
}

//
// ─── SESSION QUESTION ──────────────────────────────────────────────────────────
//

/// Source-agnostic question as it lives inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionQuestion {
    pub id: QuestionId,
    pub source_id: SourceId,
    pub content: LocalizedText,
    pub difficulty: Difficulty,
    pub xp_reward: u32,
    #[serde(default)]
    pub hierarchy: QuestionHierarchy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
    #[serde(default)]
    pub solution_status: SolutionStatus,
    #[serde(default)]
    pub is_viewed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewed_at: Option<DateTime<Utc>>,
}

impl SessionQuestion {
    #[must_use]
    pub fn parent_id(&self) -> Option<&QuestionId> {
        self.hierarchy.parent_id.as_ref()
    }

    #[must_use]
    pub fn is_sub_question(&self) -> bool {
        self.hierarchy.is_sub_question
    }

    /// Record a loaded solution.
    pub fn set_solution(&mut self, solution: Solution) {
        self.solution = Some(solution);
        self.solution_status = SolutionStatus::Loaded;
    }
}

/// A parent question with its ordered sub-questions.
///
/// Sub-question ids are stored in display order; a group with no
/// sub-questions is a standalone question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionGroup {
    pub parent_id: QuestionId,
    #[serde(default)]
    pub sub_question_ids: Vec<QuestionId>,
}

impl QuestionGroup {
    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.sub_question_ids.is_empty()
    }

    /// Number of questions in the group, parent included.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.sub_question_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!(" easy ".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert!("brutal".parse::<Difficulty>().is_err());
    }

    #[test]
    fn solution_status_defaults_to_pending_when_missing() {
        let json = r#"{
            "id": "q1",
            "source_id": "bank-1",
            "content": { "text": "2 + 2" },
            "difficulty": "easy",
            "xp_reward": 10
        }"#;
        let q: SessionQuestion = serde_json::from_str(json).unwrap();
        assert_eq!(q.solution_status, SolutionStatus::Pending);
        assert!(!q.is_viewed);
        assert!(!q.is_sub_question());
    }

    #[test]
    fn set_solution_marks_loaded() {
        let mut q = SessionQuestion {
            id: QuestionId::new("q1"),
            source_id: SourceId::new("bank-1"),
            content: LocalizedText::plain("2 + 2"),
            difficulty: Difficulty::Easy,
            xp_reward: 10,
            hierarchy: QuestionHierarchy::standalone(),
            solution: None,
            solution_status: SolutionStatus::Pending,
            is_viewed: false,
            viewed_at: None,
        };
        q.set_solution(Solution {
            answer: "4".into(),
            steps: vec![],
            tip: None,
            confidence: Some(0.9),
        });
        assert_eq!(q.solution_status, SolutionStatus::Loaded);
        assert_eq!(q.solution.unwrap().answer, "4");
    }
}
