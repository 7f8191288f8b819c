use std::sync::Arc;

use chrono::Duration;
use practice_core::api::CreateSessionRequest;
use practice_core::model::{
    ActionBatch, Difficulty, ExerciseItem, InteractionMode, LocalizedText, QuestionId,
    SessionFilters, SourceId, SourceKind, SourceQuestion, SyncAction, UserId,
};
use practice_core::time::fixed_now;
use services::{AppServices, Clock, ServiceSettings, SessionError, SolutionService};
use services::solutions::HttpSolutionProvider;
use storage::repository::Storage;
use storage::seed::{SeedOptions, seed_demo};

const USER: UserId = UserId::new(42);

async fn sqlite_services(name: &str) -> AppServices {
    let storage = Storage::sqlite(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("storage");
    AppServices::from_storage(
        storage,
        Clock::fixed(fixed_now()),
        ServiceSettings::default(),
        Arc::new(HttpSolutionProvider::new(None)),
    )
}

#[tokio::test]
async fn create_filters_and_samples_from_the_bank() {
    let app = sqlite_services("memdb_flow_create").await;
    let source = SourceId::new("bank");
    for i in 0..10 {
        let difficulty = if i < 6 { Difficulty::Easy } else { Difficulty::Hard };
        app.storage()
            .content
            .upsert_source_question(
                SourceKind::ExerciseBank,
                &source,
                &SourceQuestion::Exercise(ExerciseItem {
                    id: QuestionId::new(format!("q{i}")),
                    text: LocalizedText::plain(format!("question {i}")),
                    difficulty,
                    answer: None,
                    steps: Vec::new(),
                    tip: None,
                }),
            )
            .await
            .unwrap();
    }

    let session = app
        .sessions()
        .create(
            USER,
            &CreateSessionRequest {
                source: SourceKind::ExerciseBank,
                source_id: source,
                mode: InteractionMode::Review,
                filters: SessionFilters {
                    difficulty: Some(Difficulty::Easy),
                    count: Some(4),
                },
            },
        )
        .await
        .unwrap();

    assert_eq!(session.total_questions(), 4);
    assert!(
        session
            .questions()
            .iter()
            .all(|q| q.difficulty == Difficulty::Easy && q.xp_reward == 8)
    );
    assert_eq!(session.current_index(), 0);
    assert_eq!(session.viewed_count(), 0);
    assert_eq!(session.xp_earned(), 0);
}

#[tokio::test]
async fn homework_sessions_keep_numeric_sub_question_order() {
    let app = sqlite_services("memdb_flow_homework").await;
    let options = SeedOptions::default();
    seed_demo(app.storage(), &options).await.unwrap();

    let session = app
        .sessions()
        .create(
            USER,
            &CreateSessionRequest {
                source: SourceKind::Homework,
                source_id: options.homework_source.clone(),
                mode: InteractionMode::Practice,
                filters: SessionFilters::default(),
            },
        )
        .await
        .unwrap();

    let ids: Vec<&str> = session.questions().iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, vec!["hw-1", "hw-1-1", "hw-1-2", "hw-1-10", "hw-2"]);
    assert_eq!(session.groups().len(), 2);
    assert_eq!(session.questions()[3].hierarchy.ordinal, 3);
}

#[tokio::test]
async fn out_of_order_batches_converge_on_the_server() {
    let app = sqlite_services("memdb_flow_order").await;
    let options = SeedOptions::default();
    seed_demo(app.storage(), &options).await.unwrap();
    let sessions = app.sessions();

    let request = CreateSessionRequest {
        source: SourceKind::ExerciseBank,
        source_id: options.exercise_source.clone(),
        mode: InteractionMode::Practice,
        filters: SessionFilters::default(),
    };
    let a = sessions.create(USER, &request).await.unwrap();
    let b = sessions.create(USER, &request).await.unwrap();

    let t = |s| fixed_now() + Duration::seconds(s);
    let reveal = SyncAction::reveal(QuestionId::new("ex-2"), t(1));
    let nav = SyncAction::navigate(3, t(2));

    sessions
        .batch_sync(a.id(), &ActionBatch::new(vec![reveal.clone(), nav.clone()]), USER)
        .await
        .unwrap();
    sessions
        .batch_sync(b.id(), &ActionBatch::new(vec![nav, reveal]), USER)
        .await
        .unwrap();

    let a = sessions.get_by_id(a.id(), USER).await.unwrap();
    let b = sessions.get_by_id(b.id(), USER).await.unwrap();
    assert_eq!(a.current_index(), 3);
    assert_eq!(b.current_index(), 3);
    assert_eq!(a.viewed_question_ids(), b.viewed_question_ids());
    assert_eq!(a.xp_earned(), b.xp_earned());
    assert_eq!(sessions.xp_balance(USER).await.unwrap(), 20);
}

#[tokio::test]
async fn deleted_sessions_cannot_be_synced() {
    let app = AppServices::in_memory(
        Clock::fixed(fixed_now()),
        Arc::new(HttpSolutionProvider::new(None)),
    );
    let options = SeedOptions::default();
    seed_demo(app.storage(), &options).await.unwrap();
    let sessions = app.sessions();
    let session = sessions
        .create(
            USER,
            &CreateSessionRequest {
                source: SourceKind::ExerciseBank,
                source_id: options.exercise_source.clone(),
                mode: InteractionMode::Learn,
                filters: SessionFilters::default(),
            },
        )
        .await
        .unwrap();

    sessions.delete(session.id(), USER).await.unwrap();
    let result = sessions
        .batch_sync(
            session.id(),
            &ActionBatch::new(vec![SyncAction::navigate(1, fixed_now())]),
            USER,
        )
        .await;
    assert!(matches!(result, Err(SessionError::NotFound)));

    let solutions: Arc<SolutionService> = app.solutions();
    assert!(
        solutions
            .load_solution(session.id(), &QuestionId::new("ex-1"), USER)
            .await
            .is_err()
    );
}
