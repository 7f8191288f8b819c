//! Demo content for local development databases.

use practice_core::model::{
    Difficulty, ExerciseItem, HomeworkItem, LocalizedText, ProviderStatus, QuestionId, SourceId,
    SourceKind, SourceQuestion,
};

use crate::repository::{Storage, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedOptions {
    pub exercise_source: SourceId,
    pub homework_source: SourceId,
    pub exercises: u32,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            exercise_source: SourceId::new("demo-bank"),
            homework_source: SourceId::new("demo-homework"),
            exercises: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub exercises: usize,
    pub homework: usize,
}

const EXERCISES: [(&str, &str, Difficulty); 6] = [
    ("Solve 2x + 3 = 11", "x = 4", Difficulty::Easy),
    ("Factor x^2 - 9", "(x - 3)(x + 3)", Difficulty::Easy),
    ("Solve x^2 - 5x + 6 = 0", "x = 2 or x = 3", Difficulty::Medium),
    ("Differentiate 3x^3", "9x^2", Difficulty::Medium),
    ("Integrate 2x from 0 to 3", "9", Difficulty::Hard),
    ("Solve |2x - 1| < 5", "-2 < x < 3", Difficulty::Hard),
];

/// Exercise-bank items cycling through the sample list.
#[must_use]
pub fn exercise_items(count: u32) -> Vec<SourceQuestion> {
    (0..count)
        .map(|i| {
            let (text, answer, difficulty) = EXERCISES[(i as usize) % EXERCISES.len()];
            SourceQuestion::Exercise(ExerciseItem {
                id: QuestionId::new(format!("ex-{}", i + 1)),
                text: LocalizedText::plain(text),
                difficulty,
                answer: Some(answer.to_string()),
                steps: Vec::new(),
                tip: None,
            })
        })
        .collect()
}

/// A small extracted homework sheet: one multi-part problem with labelled
/// sub-questions and one standalone problem.
#[must_use]
pub fn homework_items() -> Vec<SourceQuestion> {
    let item = |id: &str, text: &str, parent: Option<&str>, label: Option<&str>| {
        SourceQuestion::Homework(HomeworkItem {
            id: QuestionId::new(id),
            text: LocalizedText::plain(text),
            difficulty: None,
            parent_id: parent.map(QuestionId::new),
            sub_label: label.map(str::to_string),
            context: parent.map(|_| "A train travels 120 km in 2 hours.".to_string()),
            solution_status: ProviderStatus::Pending,
            solution: None,
        })
    };
    vec![
        item("hw-1", "A train travels 120 km in 2 hours.", None, None),
        item("hw-1-10", "How far does it go in 10 hours?", Some("hw-1"), Some("10")),
        item("hw-1-2", "How far does it go in 5 hours?", Some("hw-1"), Some("2")),
        item("hw-1-1", "What is its average speed?", Some("hw-1"), Some("1")),
        item("hw-2", "Simplify 12/18.", None, None),
    ]
}

/// Upsert the demo exercise bank and homework sheet.
///
/// # Errors
///
/// Returns `StorageError` if any write fails.
pub async fn seed_demo(
    storage: &Storage,
    options: &SeedOptions,
) -> Result<SeedSummary, StorageError> {
    let exercises = exercise_items(options.exercises);
    for question in &exercises {
        storage
            .content
            .upsert_source_question(SourceKind::ExerciseBank, &options.exercise_source, question)
            .await?;
    }

    let homework = homework_items();
    for question in &homework {
        storage
            .content
            .upsert_source_question(SourceKind::Homework, &options.homework_source, question)
            .await?;
    }

    Ok(SeedSummary {
        exercises: exercises.len(),
        homework: homework.len(),
    })
}
