use chrono::Duration;
use practice_core::model::{
    Difficulty, ExerciseItem, InteractionMode, LocalizedText, NewSession, QuestionId, Session,
    SessionFilters, SessionId, SourceId, SourceKind, SourceQuestion, UserId, XpRules,
};
use practice_core::time::fixed_now;
use storage::repository::{
    ContentRepository, LedgerCredit, SessionRepository, Storage, StorageError, XpLedger,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn exercise(id: &str, difficulty: Difficulty) -> SourceQuestion {
    SourceQuestion::Exercise(ExerciseItem {
        id: QuestionId::new(id),
        text: LocalizedText::plain(format!("question {id}")),
        difficulty,
        answer: Some("42".into()),
        steps: vec!["think".into()],
        tip: None,
    })
}

fn build_session(owner: u64) -> Session {
    let source_id = SourceId::new("bank");
    let rules = XpRules::default();
    let questions = [
        exercise("q1", Difficulty::Easy),
        exercise("q2", Difficulty::Hard),
    ]
    .iter()
    .map(|q| q.to_session_question(&source_id, InteractionMode::Practice, &rules))
    .collect();
    Session::new(NewSession {
        id: SessionId::generate(),
        owner: UserId::new(owner),
        source: SourceKind::ExerciseBank,
        source_id,
        mode: InteractionMode::Practice,
        questions,
        groups: Vec::new(),
        filters: SessionFilters::default(),
        started_at: fixed_now(),
    })
    .expect("session")
}

#[tokio::test]
async fn sqlite_session_roundtrip_keeps_progress() {
    let repo = connect("memdb_session_roundtrip").await;
    let mut session = build_session(1);
    repo.insert_session(&session).await.unwrap();

    session
        .reveal(&QuestionId::new("q2"), fixed_now() + Duration::seconds(3))
        .unwrap();
    session.navigate(1).unwrap();
    session.touch(fixed_now() + Duration::seconds(3));
    let version = repo.update_session(&session).await.unwrap();
    assert_eq!(version, 1);

    let fetched = repo.get_session(session.id()).await.unwrap().expect("stored");
    assert_eq!(fetched.version(), 1);
    assert_eq!(fetched.current_index(), 1);
    assert_eq!(fetched.xp_earned(), 30);
    assert!(fetched.is_viewed(&QuestionId::new("q2")));
    assert_eq!(fetched.last_activity_at(), fixed_now() + Duration::seconds(3));
}

#[tokio::test]
async fn sqlite_update_rejects_stale_version() {
    let repo = connect("memdb_session_cas").await;
    let session = build_session(1);
    repo.insert_session(&session).await.unwrap();

    let mut first = repo.get_session(session.id()).await.unwrap().unwrap();
    let mut stale = first.clone();

    first.navigate(1).unwrap();
    repo.update_session(&first).await.unwrap();

    stale
        .reveal(&QuestionId::new("q1"), fixed_now())
        .unwrap();
    assert!(matches!(
        repo.update_session(&stale).await,
        Err(StorageError::Conflict)
    ));

    repo.delete_session(session.id()).await.unwrap();
    assert!(matches!(
        repo.update_session(&first).await,
        Err(StorageError::NotFound)
    ));
    assert!(repo.get_session(session.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_lists_sessions_by_owner_most_recent_first() {
    let repo = connect("memdb_session_list").await;
    let older = build_session(7);
    let mut newer = build_session(7);
    newer.touch(fixed_now() + Duration::minutes(5));
    repo.insert_session(&older).await.unwrap();
    repo.insert_session(&newer).await.unwrap();
    repo.insert_session(&build_session(8)).await.unwrap();

    let listed = repo.list_sessions(UserId::new(7), 10).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id(), newer.id());
    assert_eq!(listed[1].id(), older.id());
}

#[tokio::test]
async fn sqlite_content_keeps_insertion_order() {
    let repo = connect("memdb_content").await;
    let source = SourceId::new("bank-a");
    for (id, difficulty) in [
        ("z", Difficulty::Easy),
        ("a", Difficulty::Medium),
        ("m", Difficulty::Hard),
    ] {
        repo.upsert_source_question(SourceKind::ExerciseBank, &source, &exercise(id, difficulty))
            .await
            .unwrap();
    }
    repo.upsert_source_question(
        SourceKind::ExerciseBank,
        &source,
        &exercise("z", Difficulty::Hard),
    )
    .await
    .unwrap();

    let items = repo
        .list_source_questions(SourceKind::ExerciseBank, &source)
        .await
        .unwrap();
    let ids: Vec<&str> = items.iter().map(|q| q.id().as_str()).collect();
    assert_eq!(ids, vec!["z", "a", "m"]);
    assert_eq!(items[0].difficulty(), Difficulty::Hard);
}

#[tokio::test]
async fn sqlite_ledger_ignores_repeated_keys() {
    let repo = connect("memdb_ledger").await;
    let user = UserId::new(3);
    let credit = LedgerCredit {
        user,
        amount: 20,
        key: "batch-1".into(),
        at: fixed_now(),
    };
    assert!(repo.credit(&credit).await.unwrap());
    assert!(!repo.credit(&credit).await.unwrap());
    assert!(
        repo.credit(&LedgerCredit {
            key: "batch-2".into(),
            amount: 5,
            ..credit.clone()
        })
        .await
        .unwrap()
    );
    assert_eq!(repo.balance(user).await.unwrap(), 25);
    assert_eq!(repo.balance(UserId::new(4)).await.unwrap(), 0);
}

#[tokio::test]
async fn storage_sqlite_wires_all_repositories() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage_wiring?mode=memory&cache=shared")
        .await
        .expect("storage");
    let session = build_session(1);
    storage.sessions.insert_session(&session).await.unwrap();
    assert!(
        storage
            .sessions
            .get_session(session.id())
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(storage.ledger.balance(UserId::new(1)).await.unwrap(), 0);
}
