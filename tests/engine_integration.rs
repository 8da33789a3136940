use questlog::{
    AuthOutcome, AuthStore, Database, Engine, NewTask, TaskCategory, TaskPriority, TaskStatus,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn new_task(title: &str, xp: i64) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: None,
        category: TaskCategory::Study,
        priority: TaskPriority::High,
        due_date: Utc::now().date_naive() + Duration::days(1),
        xp_reward: Some(xp),
        image_proof_path: None,
    }
}

#[test]
fn full_flow_register_complete_and_resume() {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("questlog.db");

    let user_uuid;
    {
        let db = Arc::new(Database::open(&path).expect("open"));
        let auth = AuthStore::new(Arc::clone(&db));
        let engine = Engine::new(Arc::clone(&db), None);

        let outcome = auth
            .register("Student", "student@example.com", "hunter22")
            .expect("register");
        let AuthOutcome::Granted(user) = outcome else {
            panic!("registration refused");
        };
        user_uuid = user.uuid.clone();

        let task = engine
            .create_task(user.id, &new_task("Finish lab report", 50))
            .expect("create task");
        let outcome = engine
            .complete_task(&task.uuid)
            .expect("complete task")
            .expect("status transition");
        assert_eq!(outcome.xp_awarded, 50);
        // 50 task XP plus the first-completion badge bonus.
        assert!(outcome
            .unlocked_badges
            .iter()
            .any(|badge| badge.key == "FIRST_TASK"));
        assert_eq!(outcome.current_streak, 1);

        let stats = engine.general_stats(user.id).expect("stats");
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.total_xp_earned, 100);
    }

    // A fresh handle over the same file sees everything, including the
    // remembered session path through the auth store.
    let db = Arc::new(Database::open(&path).expect("reopen"));
    let auth = AuthStore::new(Arc::clone(&db));
    let engine = Engine::new(Arc::clone(&db), None);

    let user = auth
        .current_user()
        .expect("resume")
        .expect("session survives reopen");
    assert_eq!(user.uuid, user_uuid);
    assert_eq!(user.tasks_completed, 1);
    assert_eq!(user.level, 2);

    let completed = engine
        .tasks_by_status(user.id, TaskStatus::Completed)
        .expect("completed tasks");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].title, "Finish lab report");
    assert!(completed[0].completed_at.is_some());
}

#[test]
fn deleting_a_user_cascades_to_their_rows() {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Arc::new(Database::open(&dir.path().join("cascade.db")).expect("open"));
    let engine = Engine::new(Arc::clone(&db), None);

    let user = db
        .ensure_default_user("Student", "student@example.com")
        .expect("user");
    let task = engine
        .create_task(user.id, &new_task("Short lived", 10))
        .expect("create");
    engine.complete_task(&task.uuid).expect("complete");

    // Foreign keys are ON; removing the user sweeps tasks, stats and the log.
    let conn = rusqlite::Connection::open(db.path()).expect("raw open");
    conn.execute_batch("PRAGMA foreign_keys = ON;").expect("fk");
    conn.execute("DELETE FROM users WHERE id = ?1", [user.id])
        .expect("delete user");
    let orphans: i64 = conn
        .query_row(
            "SELECT (SELECT COUNT(*) FROM tasks)
                  + (SELECT COUNT(*) FROM daily_stats)
                  + (SELECT COUNT(*) FROM activity_log)
                  + (SELECT COUNT(*) FROM user_badges)",
            [],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(orphans, 0);
}
