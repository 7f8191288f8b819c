//! Upstream question shapes and their conversion into [`SessionQuestion`].

use serde::{Deserialize, Serialize};

use crate::model::ids::{QuestionId, SourceId};
use crate::model::question::{
    Difficulty, LocalizedText, QuestionHierarchy, SessionQuestion, Solution, SolutionStatus,
};
use crate::model::reward::XpRules;
use crate::model::session::InteractionMode;

/// Status reported by the AI solving collaborator for a homework item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    #[default]
    Pending,
    Generating,
    Completed,
    Failed,
}

impl From<ProviderStatus> for SolutionStatus {
    fn from(status: ProviderStatus) -> Self {
        match status {
            ProviderStatus::Pending => SolutionStatus::Pending,
            ProviderStatus::Generating => SolutionStatus::Loading,
            ProviderStatus::Completed => SolutionStatus::Loaded,
            ProviderStatus::Failed => SolutionStatus::Error,
        }
    }
}

/// Flat item from the exercise bank. Answers are authored, not generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseItem {
    pub id: QuestionId,
    pub text: LocalizedText,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
}

/// Item extracted from an uploaded homework by the AI pipeline.
///
/// Sub-questions point at their parent through `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeworkItem {
    pub id: QuestionId,
    pub text: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<QuestionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_label: Option<String>,
    /// Shared stem shown above sub-questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub solution_status: ProviderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
}

/// A question as delivered by one of the content collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum SourceQuestion {
    Exercise(ExerciseItem),
    Homework(HomeworkItem),
}

impl SourceQuestion {
    #[must_use]
    pub fn id(&self) -> &QuestionId {
        match self {
            SourceQuestion::Exercise(item) => &item.id,
            SourceQuestion::Homework(item) => &item.id,
        }
    }

    /// Homework items without an extracted difficulty count as medium.
    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        match self {
            SourceQuestion::Exercise(item) => item.difficulty,
            SourceQuestion::Homework(item) => item.difficulty.unwrap_or(Difficulty::Medium),
        }
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<&QuestionId> {
        match self {
            SourceQuestion::Exercise(_) => None,
            SourceQuestion::Homework(item) => item.parent_id.as_ref(),
        }
    }

    /// Convert into the session representation, pricing the reward for `mode`.
    #[must_use]
    pub fn to_session_question(
        &self,
        source_id: &SourceId,
        mode: InteractionMode,
        rules: &XpRules,
    ) -> SessionQuestion {
        let difficulty = self.difficulty();
        let xp_reward = rules.reward(difficulty, mode);

        let (content, hierarchy, solution, solution_status) = match self {
            SourceQuestion::Exercise(item) => {
                let solution = item.answer.as_ref().map(|answer| Solution {
                    answer: answer.clone(),
                    steps: item.steps.clone(),
                    tip: item.tip.clone(),
                    confidence: None,
                });
                let status = if solution.is_some() {
                    SolutionStatus::Loaded
                } else {
                    SolutionStatus::Pending
                };
                (
                    item.text.clone(),
                    QuestionHierarchy::standalone(),
                    solution,
                    status,
                )
            }
            SourceQuestion::Homework(item) => {
                let hierarchy = match &item.parent_id {
                    Some(parent) => QuestionHierarchy::sub_question(
                        parent.clone(),
                        item.sub_label.clone(),
                        item.context.clone(),
                    ),
                    None => QuestionHierarchy::standalone(),
                };
                // A completed status without a payload is not usable yet.
                let (solution, status) = match (&item.solution, item.solution_status) {
                    (Some(s), ProviderStatus::Completed) => {
                        (Some(s.clone()), SolutionStatus::Loaded)
                    }
                    (None, ProviderStatus::Completed) => (None, SolutionStatus::Pending),
                    (_, other) => (None, other.into()),
                };
                (item.text.clone(), hierarchy, solution, status)
            }
        };

        SessionQuestion {
            id: self.id().clone(),
            source_id: source_id.clone(),
            content,
            difficulty,
            xp_reward,
            hierarchy,
            solution,
            solution_status,
            is_viewed: false,
            viewed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(id: &str, difficulty: Difficulty, answer: Option<&str>) -> SourceQuestion {
        SourceQuestion::Exercise(ExerciseItem {
            id: QuestionId::new(id),
            text: LocalizedText::new("Solve x + 1 = 2", Some("Résoudre x + 1 = 2".into())),
            difficulty,
            answer: answer.map(str::to_string),
            steps: vec!["subtract 1".into()],
            tip: None,
        })
    }

    fn homework(id: &str, parent: Option<&str>, label: Option<&str>) -> SourceQuestion {
        SourceQuestion::Homework(HomeworkItem {
            id: QuestionId::new(id),
            text: LocalizedText::plain("part"),
            difficulty: None,
            parent_id: parent.map(QuestionId::new),
            sub_label: label.map(str::to_string),
            context: Some("Given a triangle ABC".into()),
            solution_status: ProviderStatus::Generating,
            solution: None,
        })
    }

    #[test]
    fn exercise_with_answer_is_preloaded() {
        let rules = XpRules::default();
        let q = exercise("e1", Difficulty::Hard, Some("x = 1")).to_session_question(
            &SourceId::new("bank"),
            InteractionMode::Practice,
            &rules,
        );
        assert_eq!(q.xp_reward, rules.base(Difficulty::Hard));
        assert_eq!(q.solution_status, SolutionStatus::Loaded);
        assert_eq!(q.solution.unwrap().steps, vec!["subtract 1".to_string()]);
        assert_eq!(q.content.translation.as_deref(), Some("Résoudre x + 1 = 2"));
    }

    #[test]
    fn exercise_without_answer_is_pending() {
        let q = exercise("e1", Difficulty::Easy, None).to_session_question(
            &SourceId::new("bank"),
            InteractionMode::Learn,
            &XpRules::default(),
        );
        assert_eq!(q.solution_status, SolutionStatus::Pending);
        assert_eq!(q.xp_reward, 5);
    }

    #[test]
    fn homework_sub_question_keeps_hierarchy() {
        let q = homework("h2", Some("h1"), Some("b")).to_session_question(
            &SourceId::new("hw"),
            InteractionMode::Practice,
            &XpRules::default(),
        );
        assert!(q.is_sub_question());
        assert_eq!(q.parent_id(), Some(&QuestionId::new("h1")));
        assert_eq!(q.hierarchy.sub_label.as_deref(), Some("b"));
        assert_eq!(q.difficulty, Difficulty::Medium);
        assert_eq!(q.solution_status, SolutionStatus::Loading);
    }

    #[test]
    fn homework_completed_without_payload_stays_pending() {
        let mut item = homework("h1", None, None);
        if let SourceQuestion::Homework(h) = &mut item {
            h.solution_status = ProviderStatus::Completed;
        }
        let q = item.to_session_question(
            &SourceId::new("hw"),
            InteractionMode::Practice,
            &XpRules::default(),
        );
        assert_eq!(q.solution_status, SolutionStatus::Pending);
        assert!(!q.is_sub_question());
    }
}
