//! On-disk layout for one schema version: tables, indexes, triggers and seed
//! rows, defined as discrete statements executed one by one. The version is
//! recorded in `PRAGMA user_version`; deltas live in the migration steps in
//! `db::mod`.

/// Schema version the code expects. v2 added the authentication columns on
/// `users` (password_hash, remember_token, email_verified).
pub(crate) const SCHEMA_VERSION: i32 = 2;

/// RFC 3339 UTC timestamp expression used by column defaults and triggers so
/// trigger-written rows parse with the same code path as app-written rows.
const NOW: &str = "STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')";

pub(crate) fn statements() -> Vec<String> {
    let mut stmts: Vec<String> = Vec::new();

    stmts.push(format!(
        "CREATE TABLE IF NOT EXISTS users (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           uuid TEXT NOT NULL UNIQUE,
           name TEXT NOT NULL,
           email TEXT NOT NULL UNIQUE,
           password_hash TEXT NOT NULL DEFAULT '',
           current_xp INTEGER NOT NULL DEFAULT 0 CHECK(current_xp >= 0),
           level INTEGER NOT NULL DEFAULT 1 CHECK(level >= 1),
           current_streak INTEGER NOT NULL DEFAULT 0 CHECK(current_streak >= 0),
           longest_streak INTEGER NOT NULL DEFAULT 0 CHECK(longest_streak >= 0),
           tasks_completed INTEGER NOT NULL DEFAULT 0 CHECK(tasks_completed >= 0),
           total_xp_earned INTEGER NOT NULL DEFAULT 0 CHECK(total_xp_earned >= 0),
           is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
           email_verified INTEGER NOT NULL DEFAULT 0 CHECK(email_verified IN (0, 1)),
           remember_token TEXT,
           created_at TEXT NOT NULL DEFAULT ({NOW}),
           updated_at TEXT NOT NULL DEFAULT ({NOW}),
           last_login TEXT NOT NULL DEFAULT ({NOW})
         )"
    ));
    stmts.push("CREATE INDEX IF NOT EXISTS idx_users_uuid ON users(uuid)".into());
    stmts.push("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)".into());
    stmts.push("CREATE INDEX IF NOT EXISTS idx_users_remember_token ON users(remember_token)".into());

    stmts.push(format!(
        "CREATE TABLE IF NOT EXISTS tasks (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           uuid TEXT NOT NULL UNIQUE,
           user_id INTEGER NOT NULL,
           title TEXT NOT NULL,
           description TEXT,
           category TEXT NOT NULL CHECK(category IN (
             'STUDY', 'MATHEMATICS', 'HISTORY', 'SCIENCE',
             'EXERCISE', 'SOCIAL', 'WORK', 'PERSONAL'
           )),
           priority TEXT NOT NULL DEFAULT 'MEDIUM' CHECK(priority IN ('LOW', 'MEDIUM', 'HIGH')),
           status TEXT NOT NULL DEFAULT 'PENDING' CHECK(status IN (
             'PENDING', 'IN_PROGRESS', 'COMPLETED', 'OVERDUE'
           )),
           due_date TEXT NOT NULL,
           xp_reward INTEGER NOT NULL DEFAULT 10 CHECK(xp_reward >= 0),
           image_proof_path TEXT,
           calendar_event_id INTEGER,
           created_at TEXT NOT NULL DEFAULT ({NOW}),
           updated_at TEXT NOT NULL DEFAULT ({NOW}),
           completed_at TEXT,
           FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
         )"
    ));
    stmts.push("CREATE INDEX IF NOT EXISTS idx_tasks_uuid ON tasks(uuid)".into());
    stmts.push("CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id)".into());
    stmts.push("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)".into());
    stmts.push("CREATE INDEX IF NOT EXISTS idx_tasks_category ON tasks(category)".into());
    stmts.push("CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks(due_date)".into());

    stmts.push(
        "CREATE TABLE IF NOT EXISTS badges (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           badge_key TEXT NOT NULL UNIQUE,
           name TEXT NOT NULL,
           description TEXT NOT NULL,
           icon_name TEXT NOT NULL,
           requirement_type TEXT NOT NULL CHECK(requirement_type IN (
             'TASK_COUNT', 'STREAK', 'XP_MILESTONE', 'CATEGORY_MASTER', 'SPECIAL'
           )),
           requirement_value INTEGER NOT NULL,
           xp_bonus INTEGER NOT NULL DEFAULT 0 CHECK(xp_bonus >= 0),
           is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1))
         )"
        .into(),
    );

    stmts.push(
        "CREATE TABLE IF NOT EXISTS user_badges (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           user_id INTEGER NOT NULL,
           badge_id INTEGER NOT NULL,
           progress INTEGER NOT NULL DEFAULT 0,
           is_unlocked INTEGER NOT NULL DEFAULT 0 CHECK(is_unlocked IN (0, 1)),
           unlocked_at TEXT,
           FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
           FOREIGN KEY (badge_id) REFERENCES badges(id) ON DELETE CASCADE,
           UNIQUE(user_id, badge_id)
         )"
        .into(),
    );
    stmts.push("CREATE INDEX IF NOT EXISTS idx_user_badges_user ON user_badges(user_id)".into());

    stmts.push(format!(
        "CREATE TABLE IF NOT EXISTS study_sessions (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           uuid TEXT NOT NULL UNIQUE,
           user_id INTEGER NOT NULL,
           subject TEXT NOT NULL,
           description TEXT,
           scheduled_at TEXT NOT NULL,
           duration_minutes INTEGER NOT NULL CHECK(duration_minutes > 0),
           calendar_event_id INTEGER,
           status TEXT NOT NULL DEFAULT 'SCHEDULED' CHECK(status IN (
             'SCHEDULED', 'IN_PROGRESS', 'COMPLETED', 'CANCELLED', 'MISSED'
           )),
           xp_earned INTEGER NOT NULL DEFAULT 0 CHECK(xp_earned >= 0),
           created_at TEXT NOT NULL DEFAULT ({NOW}),
           completed_at TEXT,
           FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
         )"
    ));
    stmts.push("CREATE INDEX IF NOT EXISTS idx_sessions_uuid ON study_sessions(uuid)".into());
    stmts.push("CREATE INDEX IF NOT EXISTS idx_sessions_user ON study_sessions(user_id)".into());

    stmts.push(
        "CREATE TABLE IF NOT EXISTS daily_stats (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           user_id INTEGER NOT NULL,
           stat_date TEXT NOT NULL,
           tasks_completed INTEGER NOT NULL DEFAULT 0 CHECK(tasks_completed >= 0),
           xp_earned INTEGER NOT NULL DEFAULT 0 CHECK(xp_earned >= 0),
           study_minutes INTEGER NOT NULL DEFAULT 0 CHECK(study_minutes >= 0),
           streak_active INTEGER NOT NULL DEFAULT 0 CHECK(streak_active IN (0, 1)),
           FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
           UNIQUE(user_id, stat_date)
         )"
        .into(),
    );
    stmts.push("CREATE INDEX IF NOT EXISTS idx_daily_stats_user ON daily_stats(user_id)".into());

    stmts.push(format!(
        "CREATE TABLE IF NOT EXISTS activity_log (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           user_id INTEGER NOT NULL,
           activity_type TEXT NOT NULL CHECK(activity_type IN (
             'TASK_CREATED', 'TASK_COMPLETED', 'TASK_DELETED',
             'BADGE_UNLOCKED', 'LEVEL_UP', 'SESSION_COMPLETED',
             'STREAK_MILESTONE', 'XP_EARNED'
           )),
           entity_type TEXT,
           entity_id INTEGER,
           description TEXT NOT NULL,
           xp_change INTEGER NOT NULL DEFAULT 0,
           created_at TEXT NOT NULL DEFAULT ({NOW}),
           FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
         )"
    ));
    stmts.push("CREATE INDEX IF NOT EXISTS idx_activity_user ON activity_log(user_id)".into());

    stmts.push(format!(
        "CREATE TABLE IF NOT EXISTS settings (
           key TEXT PRIMARY KEY,
           value_json TEXT NOT NULL,
           updated_at TEXT NOT NULL DEFAULT ({NOW})
         )"
    ));

    stmts.push(format!(
        "CREATE TRIGGER IF NOT EXISTS touch_users_updated_at
         AFTER UPDATE ON users
         FOR EACH ROW
         BEGIN
           UPDATE users SET updated_at = {NOW} WHERE id = OLD.id;
         END"
    ));

    stmts.push(format!(
        "CREATE TRIGGER IF NOT EXISTS touch_tasks_updated_at
         AFTER UPDATE ON tasks
         FOR EACH ROW
         BEGIN
           UPDATE tasks SET updated_at = {NOW} WHERE id = OLD.id;
         END"
    ));

    // Completion bookkeeping runs inside the same transaction as the status
    // update. The WHEN guard requires a genuine transition into COMPLETED, so
    // re-writing an already-completed row never double-counts.
    stmts.push(
        "CREATE TRIGGER IF NOT EXISTS task_completed_stats
         AFTER UPDATE ON tasks
         FOR EACH ROW
         WHEN NEW.status = 'COMPLETED' AND OLD.status != 'COMPLETED'
         BEGIN
           UPDATE users
           SET
             tasks_completed = tasks_completed + 1,
             current_xp = current_xp + NEW.xp_reward,
             total_xp_earned = total_xp_earned + NEW.xp_reward
           WHERE id = NEW.user_id;

           UPDATE daily_stats
           SET
             tasks_completed = tasks_completed + 1,
             xp_earned = xp_earned + NEW.xp_reward,
             streak_active = 1
           WHERE user_id = NEW.user_id AND stat_date = DATE('now');

           INSERT INTO daily_stats (user_id, stat_date, tasks_completed, xp_earned, streak_active)
           SELECT NEW.user_id, DATE('now'), 1, NEW.xp_reward, 1
           WHERE NOT EXISTS (
             SELECT 1 FROM daily_stats
             WHERE user_id = NEW.user_id AND stat_date = DATE('now')
           );

           INSERT INTO activity_log (user_id, activity_type, entity_type, entity_id, description, xp_change)
           VALUES (
             NEW.user_id,
             'TASK_COMPLETED',
             'task',
             NEW.id,
             'Completed: ' || NEW.title,
             NEW.xp_reward
           );
         END"
        .into(),
    );

    stmts
}

/// Starter badge catalog, inserted with OR IGNORE so reopening an existing
/// database never duplicates rows.
pub(crate) fn seed_statements() -> Vec<String> {
    vec![
        "INSERT OR IGNORE INTO badges
           (badge_key, name, description, icon_name, requirement_type, requirement_value, xp_bonus)
         VALUES
           ('FIRST_TASK', 'First Step', 'Completed your first task', 'star', 'TASK_COUNT', 1, 50),
           ('TASK_10', 'Getting Productive', 'Completed 10 tasks', 'trophy', 'TASK_COUNT', 10, 100),
           ('TASK_50', 'Dedicated Student', 'Completed 50 tasks', 'medal', 'TASK_COUNT', 50, 250),
           ('STREAK_3', 'Consistency', '3 consecutive days with a completed task', 'fire', 'STREAK', 3, 75),
           ('STREAK_7', 'Perfect Week', '7 consecutive days of productivity', 'fire', 'STREAK', 7, 150),
           ('XP_1000', 'Apprentice', 'Reached 1,000 lifetime XP', 'star', 'XP_MILESTONE', 1000, 100),
           ('CATEGORY_20', 'Category Master', '20 completed tasks in a single category', 'crown', 'CATEGORY_MASTER', 20, 200)"
            .into(),
        "INSERT OR IGNORE INTO settings (key, value_json) VALUES ('default_task_xp', '10')".into(),
    ]
}
