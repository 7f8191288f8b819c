mod action;
mod ids;
mod question;
mod reward;
pub(crate) mod session;
pub mod source;

pub use ids::{ActionId, BatchId, ParseIdError, QuestionId, SessionId, SourceId, UserId};

pub use action::{ActionBatch, ActionKind, SyncAction};
pub use question::{
    Difficulty, LocalizedText, ParseDifficultyError, QuestionGroup, QuestionHierarchy,
    SessionQuestion, Solution, SolutionStatus,
};
pub use reward::{RewardError, XpRules};
pub use session::{
    AppliedBatch, Completion, CompletionOutcome, InteractionMode, NewSession, RevealOutcome,
    Session, SessionFilters, SessionStateError, SourceKind, MAX_TRACKED_BATCHES,
};
pub use source::{ExerciseItem, HomeworkItem, ProviderStatus, SourceQuestion};
