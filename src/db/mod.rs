mod schema;

use crate::errors::{AppError, AppResult};
use crate::models::{
    ActivityEntry, ActivityType, BadgeRecord, BadgeRequirement, CategoryCounts, DailyStatRecord,
    GeneralStats, NewStudySession, NewTask, RewardOutcome, SessionStatus, StatusCounts,
    StudySessionRecord, TaskCategory, TaskPriority, TaskRecord, TaskStatus, TaskUpdate,
    UserBadgeRecord, UserRecord,
};
use crate::rewards;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Process-wide storage handle. Constructed explicitly by the process entry
/// point and passed to whoever needs it; there is no global instance. One
/// mutex-guarded connection carries every read and write, and stays open for
/// the life of the handle.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    /// Opens (creating if necessary) the database at `path` and brings the
    /// schema to the version this build expects. A fresh file gets the full
    /// current schema; an older file gets each migration step in order. A
    /// file recorded as newer than this build is refused.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let mut conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(AppError::from)?;

        let on_disk: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        match on_disk {
            0 => {
                apply_full_schema(&mut conn)?;
                tracing::info!(path = %path.display(), "created database schema");
            }
            v if v < schema::SCHEMA_VERSION => {
                run_migrations(&mut conn, v)?;
                tracing::info!(
                    path = %path.display(),
                    from = v,
                    to = schema::SCHEMA_VERSION,
                    "migrated database"
                );
            }
            v if v > schema::SCHEMA_VERSION => {
                return Err(AppError::Migration(format!(
                    "database version {} is newer than supported version {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            _ => {}
        }

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    // ── users ────────────────────────────────────────────────────────────

    /// Inserts a user row with zeroed progression counters. `password_hash`
    /// is empty for the implicit first-run user; auth-created users always
    /// carry a digest.
    pub fn insert_user(&self, name: &str, email: &str, password_hash: &str) -> AppResult<UserRecord> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("name must not be blank".to_string()));
        }
        if email.trim().is_empty() {
            return Err(AppError::Validation("email must not be blank".to_string()));
        }
        let uuid = Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (uuid, name, email, password_hash) VALUES (?1, ?2, ?3, ?4)",
            params![uuid, name, email, password_hash],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.user_by_id(id)?
            .ok_or_else(|| AppError::Internal("user row vanished after insert".to_string()))
    }

    /// Returns the main user, creating a default one on first run.
    pub fn ensure_default_user(&self, name: &str, email: &str) -> AppResult<UserRecord> {
        if let Some(user) = self.first_user()? {
            return Ok(user);
        }
        self.insert_user(name, email, "")
    }

    pub fn first_user(&self) -> AppResult<Option<UserRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{USER_COLUMNS} FROM users ORDER BY id ASC LIMIT 1"),
            [],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn user_by_id(&self, id: i64) -> AppResult<Option<UserRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn user_by_uuid(&self, uuid: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{USER_COLUMNS} FROM users WHERE uuid = ?1"),
            [uuid],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn user_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{USER_COLUMNS} FROM users WHERE email = ?1"),
            [email],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Active-user credential lookup for login. Returns None on any mismatch;
    /// the caller turns that into a typed "incorrect credentials" reason.
    pub fn user_by_credentials(&self, email: &str, password_hash: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{USER_COLUMNS} FROM users WHERE email = ?1 AND password_hash = ?2 AND is_active = 1"),
            params![email, password_hash],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn user_by_remember_token(&self, user_id: i64, token: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{USER_COLUMNS} FROM users WHERE id = ?1 AND remember_token = ?2 AND is_active = 1"),
            params![user_id, token],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn rename_user(&self, user_id: i64, name: &str) -> AppResult<usize> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("name must not be blank".to_string()));
        }
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE users SET name = ?1 WHERE id = ?2",
            params![name, user_id],
        )?)
    }

    pub fn touch_last_login(&self, user_id: i64) -> AppResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), user_id],
        )?)
    }

    pub fn set_password_hash(&self, user_id: i64, password_hash: &str) -> AppResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, user_id],
        )?)
    }

    pub fn set_remember_token(&self, user_id: i64, token: Option<&str>) -> AppResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE users SET remember_token = ?1 WHERE id = ?2",
            params![token, user_id],
        )?)
    }

    // ── tasks ────────────────────────────────────────────────────────────

    pub fn insert_task(&self, user_id: i64, new_task: &NewTask) -> AppResult<TaskRecord> {
        if new_task.title.trim().is_empty() {
            return Err(AppError::Validation("title must not be blank".to_string()));
        }
        let xp_reward = match new_task.xp_reward {
            Some(xp) if xp < 0 => {
                return Err(AppError::Validation("xp reward must not be negative".to_string()))
            }
            Some(xp) => xp,
            None => self
                .get_setting::<i64>(SETTING_DEFAULT_TASK_XP)?
                .unwrap_or(DEFAULT_TASK_XP),
        };

        let uuid = Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tasks (uuid, user_id, title, description, category, priority, status,
                                due_date, xp_reward, image_proof_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                uuid,
                user_id,
                new_task.title,
                new_task.description,
                new_task.category.as_str(),
                new_task.priority.as_str(),
                TaskStatus::Pending.as_str(),
                new_task.due_date.to_string(),
                xp_reward,
                new_task.image_proof_path,
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO activity_log (user_id, activity_type, entity_type, entity_id, description, xp_change)
             VALUES (?1, ?2, 'task', ?3, ?4, 0)",
            params![
                user_id,
                ActivityType::TaskCreated.as_str(),
                id,
                format!("Created: {}", new_task.title),
            ],
        )?;
        drop(conn);
        self.task_by_uuid(&uuid)?
            .ok_or_else(|| AppError::Internal("task row vanished after insert".to_string()))
    }

    /// Full-row update by external id. Returns the affected-row count; zero
    /// means not found. Completion is one-way: a COMPLETED task cannot leave
    /// that status here, and the transition into COMPLETED must go through
    /// `complete_task` so reward bookkeeping settles with it.
    pub fn update_task(&self, uuid: &str, update: &TaskUpdate) -> AppResult<usize> {
        if update.title.trim().is_empty() {
            return Err(AppError::Validation("title must not be blank".to_string()));
        }
        if update.xp_reward < 0 {
            return Err(AppError::Validation("xp reward must not be negative".to_string()));
        }
        let conn = self.lock()?;
        let current: Option<String> = conn
            .query_row("SELECT status FROM tasks WHERE uuid = ?1", [uuid], |row| row.get(0))
            .optional()?;
        let Some(current) = current else {
            return Ok(0);
        };
        let current = parse_status(&current)?;
        if current == TaskStatus::Completed && update.status != TaskStatus::Completed {
            return Err(AppError::Validation(
                "completed tasks cannot be reopened".to_string(),
            ));
        }
        if current != TaskStatus::Completed && update.status == TaskStatus::Completed {
            return Err(AppError::Validation(
                "use complete_task to complete a task".to_string(),
            ));
        }

        Ok(conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, category = ?3, priority = ?4,
                              status = ?5, due_date = ?6, xp_reward = ?7, image_proof_path = ?8
             WHERE uuid = ?9",
            params![
                update.title,
                update.description,
                update.category.as_str(),
                update.priority.as_str(),
                update.status.as_str(),
                update.due_date.to_string(),
                update.xp_reward,
                update.image_proof_path,
                uuid,
            ],
        )?)
    }

    /// Hard delete by external id; logs the deletion. Returns false when no
    /// row matched.
    pub fn delete_task(&self, uuid: &str) -> AppResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existing: Option<(i64, i64, String)> = tx
            .query_row(
                "SELECT id, user_id, title FROM tasks WHERE uuid = ?1",
                [uuid],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((task_id, user_id, title)) = existing else {
            return Ok(false);
        };
        tx.execute("DELETE FROM tasks WHERE id = ?1", [task_id])?;
        tx.execute(
            "INSERT INTO activity_log (user_id, activity_type, entity_type, entity_id, description, xp_change)
             VALUES (?1, ?2, 'task', ?3, ?4, 0)",
            params![
                user_id,
                ActivityType::TaskDeleted.as_str(),
                task_id,
                format!("Deleted: {}", title),
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn task_by_uuid(&self, uuid: &str) -> AppResult<Option<TaskRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{TASK_COLUMNS} FROM tasks WHERE uuid = ?1"),
            [uuid],
            parse_task_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn tasks_for_user(&self, user_id: i64) -> AppResult<Vec<TaskRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY due_date ASC, id ASC"
        ))?;
        let rows = stmt.query_map([user_id], parse_task_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn tasks_by_status(&self, user_id: i64, status: TaskStatus) -> AppResult<Vec<TaskRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{TASK_COLUMNS} FROM tasks WHERE user_id = ?1 AND status = ?2 ORDER BY due_date ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![user_id, status.as_str()], parse_task_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn tasks_by_category(&self, user_id: i64, category: TaskCategory) -> AppResult<Vec<TaskRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{TASK_COLUMNS} FROM tasks WHERE user_id = ?1 AND category = ?2 ORDER BY due_date ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![user_id, category.as_str()], parse_task_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    /// Completes a task and settles its rewards in one transaction: the
    /// status update fires the completion trigger (counters, daily stat,
    /// activity row), then level/streak/badges are recomputed on top of the
    /// new counters. Returns None when the task does not exist or is already
    /// COMPLETED; re-completing never double-counts.
    pub fn complete_task(&self, uuid: &str) -> AppResult<Option<RewardOutcome>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existing: Option<(i64, i64, String, i64)> = tx
            .query_row(
                "SELECT id, user_id, status, xp_reward FROM tasks WHERE uuid = ?1",
                [uuid],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((task_id, user_id, status, xp_reward)) = existing else {
            return Ok(None);
        };
        if parse_status(&status)? == TaskStatus::Completed {
            return Ok(None);
        }

        tx.execute(
            "UPDATE tasks SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![
                TaskStatus::Completed.as_str(),
                Utc::now().to_rfc3339(),
                task_id
            ],
        )?;
        let outcome = rewards::settle_completion(&tx, user_id, xp_reward, Utc::now().date_naive())?;
        tx.commit()?;
        Ok(Some(outcome))
    }

    /// Flags past-due open tasks as OVERDUE. Returns the number flagged.
    pub fn mark_overdue_tasks(&self, user_id: i64, today: NaiveDate) -> AppResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE tasks SET status = 'OVERDUE'
             WHERE user_id = ?1 AND status IN ('PENDING', 'IN_PROGRESS') AND due_date < ?2",
            params![user_id, today.to_string()],
        )?)
    }

    pub fn set_task_calendar_event(&self, uuid: &str, event_id: i64) -> AppResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE tasks SET calendar_event_id = ?1 WHERE uuid = ?2",
            params![event_id, uuid],
        )?)
    }

    // ── badges ───────────────────────────────────────────────────────────

    pub fn list_badges(&self) -> AppResult<Vec<BadgeRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{BADGE_COLUMNS} FROM badges WHERE is_active = 1 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], parse_badge_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn badge_by_key(&self, key: &str) -> AppResult<Option<BadgeRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{BADGE_COLUMNS} FROM badges WHERE badge_key = ?1"),
            [key],
            parse_badge_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn user_badges(&self, user_id: i64) -> AppResult<Vec<UserBadgeRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, badge_id, progress, is_unlocked, unlocked_at
             FROM user_badges WHERE user_id = ?1 ORDER BY badge_id ASC",
        )?;
        let rows = stmt.query_map([user_id], |row| {
            Ok(UserBadgeRecord {
                id: row.get(0)?,
                user_id: row.get(1)?,
                badge_id: row.get(2)?,
                progress: row.get(3)?,
                unlocked: row.get::<_, i64>(4)? != 0,
                unlocked_at: row
                    .get::<_, Option<String>>(5)?
                    .map(|raw| parse_time(&raw))
                    .transpose()?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    /// Unlocks a SPECIAL badge by explicit caller action. Idempotent: an
    /// already-unlocked badge returns None and grants nothing.
    pub fn grant_special_badge(&self, user_id: i64, badge_key: &str) -> AppResult<Option<BadgeRecord>> {
        let badge = self
            .badge_by_key(badge_key)?
            .ok_or_else(|| AppError::NotFound(format!("no badge with key {}", badge_key)))?;
        if badge.requirement != BadgeRequirement::Special {
            return Err(AppError::Validation(format!(
                "badge {} is not a SPECIAL badge",
                badge_key
            )));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO user_badges (user_id, badge_id, progress)
             VALUES (?1, ?2, 0)
             ON CONFLICT(user_id, badge_id) DO NOTHING",
            params![user_id, badge.id],
        )?;
        let transitioned = tx.execute(
            "UPDATE user_badges SET is_unlocked = 1, unlocked_at = ?1
             WHERE user_id = ?2 AND badge_id = ?3 AND is_unlocked = 0",
            params![Utc::now().to_rfc3339(), user_id, badge.id],
        )?;
        if transitioned == 0 {
            return Ok(None);
        }
        if badge.xp_bonus > 0 {
            tx.execute(
                "UPDATE users
                 SET current_xp = current_xp + ?1, total_xp_earned = total_xp_earned + ?1
                 WHERE id = ?2",
                params![badge.xp_bonus, user_id],
            )?;
            let total: i64 = tx.query_row(
                "SELECT total_xp_earned FROM users WHERE id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "UPDATE users SET level = ?1 WHERE id = ?2",
                params![rewards::level_for_xp(total), user_id],
            )?;
        }
        tx.execute(
            "INSERT INTO activity_log (user_id, activity_type, entity_type, entity_id, description, xp_change)
             VALUES (?1, ?2, 'badge', ?3, ?4, ?5)",
            params![
                user_id,
                ActivityType::BadgeUnlocked.as_str(),
                badge.id,
                format!("Unlocked badge: {}", badge.name),
                badge.xp_bonus,
            ],
        )?;
        tx.commit()?;
        Ok(Some(badge))
    }

    // ── study sessions ───────────────────────────────────────────────────

    pub fn insert_study_session(&self, user_id: i64, new_session: &NewStudySession) -> AppResult<StudySessionRecord> {
        if new_session.subject.trim().is_empty() {
            return Err(AppError::Validation("subject must not be blank".to_string()));
        }
        if new_session.duration_minutes <= 0 {
            return Err(AppError::Validation(
                "duration must be a positive number of minutes".to_string(),
            ));
        }
        let uuid = Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO study_sessions (uuid, user_id, subject, description, scheduled_at, duration_minutes, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid,
                user_id,
                new_session.subject,
                new_session.description,
                new_session.scheduled_at.to_rfc3339(),
                new_session.duration_minutes,
                SessionStatus::Scheduled.as_str(),
            ],
        )?;
        drop(conn);
        self.study_session_by_uuid(&uuid)?
            .ok_or_else(|| AppError::Internal("session row vanished after insert".to_string()))
    }

    pub fn study_session_by_uuid(&self, uuid: &str) -> AppResult<Option<StudySessionRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{SESSION_COLUMNS} FROM study_sessions WHERE uuid = ?1"),
            [uuid],
            parse_session_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn study_sessions_for_user(&self, user_id: i64) -> AppResult<Vec<StudySessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{SESSION_COLUMNS} FROM study_sessions WHERE user_id = ?1 ORDER BY scheduled_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([user_id], parse_session_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn set_session_status(&self, uuid: &str, status: SessionStatus) -> AppResult<usize> {
        if status == SessionStatus::Completed {
            return Err(AppError::Validation(
                "use complete_study_session to complete a session".to_string(),
            ));
        }
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE study_sessions SET status = ?1 WHERE uuid = ?2",
            params![status.as_str(), uuid],
        )?)
    }

    pub fn set_session_calendar_event(&self, uuid: &str, event_id: i64) -> AppResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "UPDATE study_sessions SET calendar_event_id = ?1 WHERE uuid = ?2",
            params![event_id, uuid],
        )?)
    }

    /// Completes a study session: records earned XP on the session and the
    /// user, folds the minutes into today's daily stat, and logs the event,
    /// all in one transaction. Returns None if the session is missing or
    /// already completed.
    pub fn complete_study_session(&self, uuid: &str, xp_earned: i64) -> AppResult<Option<StudySessionRecord>> {
        if xp_earned < 0 {
            return Err(AppError::Validation("xp earned must not be negative".to_string()));
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existing: Option<(i64, i64, String, i64, String)> = tx
            .query_row(
                "SELECT id, user_id, status, duration_minutes, subject
                 FROM study_sessions WHERE uuid = ?1",
                [uuid],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((session_id, user_id, status, duration_minutes, subject)) = existing else {
            return Ok(None);
        };
        if parse_session_status(&status)? == SessionStatus::Completed {
            return Ok(None);
        }

        tx.execute(
            "UPDATE study_sessions SET status = ?1, xp_earned = ?2, completed_at = ?3 WHERE id = ?4",
            params![
                SessionStatus::Completed.as_str(),
                xp_earned,
                Utc::now().to_rfc3339(),
                session_id
            ],
        )?;
        tx.execute(
            "UPDATE users
             SET current_xp = current_xp + ?1, total_xp_earned = total_xp_earned + ?1
             WHERE id = ?2",
            params![xp_earned, user_id],
        )?;
        let total: i64 = tx.query_row(
            "SELECT total_xp_earned FROM users WHERE id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE users SET level = ?1 WHERE id = ?2",
            params![rewards::level_for_xp(total), user_id],
        )?;

        let today = Utc::now().date_naive().to_string();
        tx.execute(
            "UPDATE daily_stats SET study_minutes = study_minutes + ?1, xp_earned = xp_earned + ?2
             WHERE user_id = ?3 AND stat_date = ?4",
            params![duration_minutes, xp_earned, user_id, today],
        )?;
        tx.execute(
            "INSERT INTO daily_stats (user_id, stat_date, study_minutes, xp_earned)
             SELECT ?1, ?2, ?3, ?4
             WHERE NOT EXISTS (SELECT 1 FROM daily_stats WHERE user_id = ?1 AND stat_date = ?2)",
            params![user_id, today, duration_minutes, xp_earned],
        )?;
        tx.execute(
            "INSERT INTO activity_log (user_id, activity_type, entity_type, entity_id, description, xp_change)
             VALUES (?1, ?2, 'study_session', ?3, ?4, ?5)",
            params![
                user_id,
                ActivityType::SessionCompleted.as_str(),
                session_id,
                format!("Finished session: {}", subject),
                xp_earned,
            ],
        )?;
        tx.commit()?;
        drop(conn);
        self.study_session_by_uuid(uuid)
    }

    // ── daily stats & activity ───────────────────────────────────────────

    pub fn daily_stat(&self, user_id: i64, date: NaiveDate) -> AppResult<Option<DailyStatRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT user_id, stat_date, tasks_completed, xp_earned, study_minutes, streak_active
             FROM daily_stats WHERE user_id = ?1 AND stat_date = ?2",
            params![user_id, date.to_string()],
            parse_daily_stat_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn recent_daily_stats(&self, user_id: i64, limit: u32) -> AppResult<Vec<DailyStatRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, stat_date, tasks_completed, xp_earned, study_minutes, streak_active
             FROM daily_stats WHERE user_id = ?1 ORDER BY stat_date DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], parse_daily_stat_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    pub fn recent_activity(&self, user_id: i64, limit: u32) -> AppResult<Vec<ActivityEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, activity_type, entity_type, entity_id, description, xp_change, created_at
             FROM activity_log WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok(ActivityEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                activity: parse_activity(&row.get::<_, String>(2)?)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                description: row.get(5)?,
                xp_change: row.get(6)?,
                created_at: parse_time(&row.get::<_, String>(7)?)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    // ── aggregates ───────────────────────────────────────────────────────

    pub fn task_counts_by_status(&self, user_id: i64) -> AppResult<StatusCounts> {
        let conn = self.lock()?;
        let mut counts = StatusCounts::new();
        for status in TaskStatus::ALL {
            counts.insert(status, 0);
        }
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM tasks WHERE user_id = ?1 GROUP BY status",
        )?;
        let mut rows = stmt.query([user_id])?;
        while let Some(row) = rows.next()? {
            let status = parse_status(&row.get::<_, String>(0)?)?;
            counts.insert(status, row.get(1)?);
        }
        Ok(counts)
    }

    pub fn task_counts_by_category(&self, user_id: i64) -> AppResult<CategoryCounts> {
        let conn = self.lock()?;
        let mut counts = CategoryCounts::new();
        for category in TaskCategory::ALL {
            counts.insert(category, 0);
        }
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM tasks WHERE user_id = ?1 GROUP BY category",
        )?;
        let mut rows = stmt.query([user_id])?;
        while let Some(row) = rows.next()? {
            let category = parse_category(&row.get::<_, String>(0)?)?;
            counts.insert(category, row.get(1)?);
        }
        Ok(counts)
    }

    pub fn general_stats(&self, user_id: i64) -> AppResult<GeneralStats> {
        let conn = self.lock()?;
        let (total_tasks, completed_tasks, pending_tasks): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'COMPLETED'), 0),
                    COALESCE(SUM(status = 'PENDING'), 0)
             FROM tasks WHERE user_id = ?1",
            [user_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let (total_xp_earned, current_streak): (i64, i64) = conn.query_row(
            "SELECT total_xp_earned, current_streak FROM users WHERE id = ?1",
            [user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(GeneralStats {
            total_tasks,
            completed_tasks,
            pending_tasks,
            total_xp_earned,
            current_streak,
        })
    }

    // ── settings ─────────────────────────────────────────────────────────

    pub fn get_setting<T: serde::de::DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row("SELECT value_json FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_setting<T: serde::Serialize>(&self, key: &str, value: &T) -> AppResult<()> {
        let raw = serde_json::to_string(value)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![key, raw, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM settings WHERE key = ?1", [key])? > 0)
    }

    // ── maintenance ──────────────────────────────────────────────────────

    /// Runs `PRAGMA integrity_check`; false means the file is damaged and the
    /// caller may offer the destructive `rebuild` recovery.
    pub fn integrity_ok(&self) -> AppResult<bool> {
        let conn = self.lock()?;
        let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(verdict == "ok")
    }

    /// Last-resort recovery: drops every table and recreates the current
    /// schema. All user data is lost.
    pub fn rebuild(&self) -> AppResult<()> {
        tracing::warn!(path = %self.db_path.display(), "rebuilding database; all data will be dropped");
        let mut conn = self.lock()?;
        conn.execute_batch(
            "DROP TABLE IF EXISTS activity_log;
             DROP TABLE IF EXISTS daily_stats;
             DROP TABLE IF EXISTS study_sessions;
             DROP TABLE IF EXISTS user_badges;
             DROP TABLE IF EXISTS badges;
             DROP TABLE IF EXISTS tasks;
             DROP TABLE IF EXISTS users;
             DROP TABLE IF EXISTS settings;",
        )?;
        apply_full_schema(&mut conn)
    }

    pub fn database_size(&self) -> u64 {
        fs::metadata(&self.db_path).map(|meta| meta.len()).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

const SETTING_DEFAULT_TASK_XP: &str = "default_task_xp";
const DEFAULT_TASK_XP: i64 = 10;

const USER_COLUMNS: &str = "SELECT id, uuid, name, email, current_xp, level, current_streak,
    longest_streak, tasks_completed, total_xp_earned, is_active, email_verified, remember_token,
    created_at, updated_at, last_login";

const TASK_COLUMNS: &str = "SELECT id, uuid, user_id, title, description, category, priority,
    status, due_date, xp_reward, image_proof_path, calendar_event_id, created_at, updated_at,
    completed_at";

const BADGE_COLUMNS: &str = "SELECT id, badge_key, name, description, icon_name,
    requirement_type, requirement_value, xp_bonus, is_active";

const SESSION_COLUMNS: &str = "SELECT id, uuid, user_id, subject, description, scheduled_at,
    duration_minutes, calendar_event_id, status, xp_earned, created_at, completed_at";

fn apply_full_schema(conn: &mut Connection) -> AppResult<()> {
    let tx = conn.transaction().map_err(AppError::from)?;
    for stmt in schema::statements() {
        tx.execute(&stmt, [])
            .map_err(|err| AppError::Migration(format!("schema statement failed: {}", err)))?;
    }
    for stmt in schema::seed_statements() {
        tx.execute(&stmt, [])
            .map_err(|err| AppError::Migration(format!("seed statement failed: {}", err)))?;
    }
    set_user_version(&tx, schema::SCHEMA_VERSION)?;
    tx.commit().map_err(AppError::from)
}

/// Applies each pending migration step in order. Steps are additive and never
/// skipped or reordered; any failure is fatal and leaves the file for the
/// caller to repair (see `Database::rebuild`).
fn run_migrations(conn: &mut Connection, from: i32) -> AppResult<()> {
    for version in from..schema::SCHEMA_VERSION {
        let tx = conn.transaction().map_err(AppError::from)?;
        match version {
            1 => migrate_v1_to_v2(&tx)?,
            other => {
                return Err(AppError::Migration(format!(
                    "no migration step registered for version {}",
                    other
                )))
            }
        }
        set_user_version(&tx, version + 1)?;
        tx.commit().map_err(AppError::from)?;
        tracing::info!(from = version, to = version + 1, "applied migration step");
    }
    Ok(())
}

/// v1 → v2: authentication columns on users, placeholder emails for legacy
/// rows, and the remember_token index. Column adds are guarded so re-running
/// the step against an already-migrated table is a no-op.
fn migrate_v1_to_v2(tx: &Transaction<'_>) -> AppResult<()> {
    if !column_exists(tx, "users", "password_hash")? {
        tx.execute(
            "ALTER TABLE users ADD COLUMN password_hash TEXT NOT NULL DEFAULT ''",
            [],
        )
        .map_err(migration_error)?;
    }
    if !column_exists(tx, "users", "remember_token")? {
        tx.execute("ALTER TABLE users ADD COLUMN remember_token TEXT", [])
            .map_err(migration_error)?;
    }
    if !column_exists(tx, "users", "email_verified")? {
        tx.execute(
            "ALTER TABLE users ADD COLUMN email_verified INTEGER NOT NULL DEFAULT 0 CHECK(email_verified IN (0, 1))",
            [],
        )
        .map_err(migration_error)?;
    }
    tx.execute(
        "UPDATE users SET email = 'user-' || id || '@placeholder.invalid' WHERE email IS NULL OR email = ''",
        [],
    )
    .map_err(migration_error)?;
    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_remember_token ON users(remember_token)",
        [],
    )
    .map_err(migration_error)?;
    Ok(())
}

fn migration_error(err: rusqlite::Error) -> AppError {
    AppError::Migration(err.to_string())
}

fn set_user_version(tx: &Transaction<'_>, version: i32) -> AppResult<()> {
    tx.pragma_update(None, "user_version", version)
        .map_err(AppError::from)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// ── row mapping ──────────────────────────────────────────────────────────
// Unknown enum strings are rejected here, at the row boundary, rather than
// surfacing as panics deeper in the call chain.

fn invalid_text(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn parse_status(raw: &str) -> rusqlite::Result<TaskStatus> {
    TaskStatus::parse(raw).ok_or_else(|| invalid_text(format!("unknown task status '{}'", raw)))
}

fn parse_category(raw: &str) -> rusqlite::Result<TaskCategory> {
    TaskCategory::parse(raw).ok_or_else(|| invalid_text(format!("unknown task category '{}'", raw)))
}

fn parse_priority(raw: &str) -> rusqlite::Result<TaskPriority> {
    TaskPriority::parse(raw).ok_or_else(|| invalid_text(format!("unknown task priority '{}'", raw)))
}

fn parse_session_status(raw: &str) -> rusqlite::Result<SessionStatus> {
    SessionStatus::parse(raw).ok_or_else(|| invalid_text(format!("unknown session status '{}'", raw)))
}

fn parse_requirement(raw: &str) -> rusqlite::Result<BadgeRequirement> {
    BadgeRequirement::parse(raw)
        .ok_or_else(|| invalid_text(format!("unknown badge requirement '{}'", raw)))
}

fn parse_activity(raw: &str) -> rusqlite::Result<ActivityType> {
    ActivityType::parse(raw).ok_or_else(|| invalid_text(format!("unknown activity type '{}'", raw)))
}

pub(crate) fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| invalid_text(format!("bad timestamp '{}': {}", raw, err)))
}

pub(crate) fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| invalid_text(format!("bad date '{}': {}", raw, err)))
}

fn parse_user_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        uuid: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        current_xp: row.get(4)?,
        level: row.get(5)?,
        current_streak: row.get(6)?,
        longest_streak: row.get(7)?,
        tasks_completed: row.get(8)?,
        total_xp_earned: row.get(9)?,
        is_active: row.get::<_, i64>(10)? != 0,
        email_verified: row.get::<_, i64>(11)? != 0,
        remember_token: row.get(12)?,
        created_at: parse_time(&row.get::<_, String>(13)?)?,
        updated_at: parse_time(&row.get::<_, String>(14)?)?,
        last_login: parse_time(&row.get::<_, String>(15)?)?,
    })
}

fn parse_task_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        uuid: row.get(1)?,
        user_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        category: parse_category(&row.get::<_, String>(5)?)?,
        priority: parse_priority(&row.get::<_, String>(6)?)?,
        status: parse_status(&row.get::<_, String>(7)?)?,
        due_date: parse_date(&row.get::<_, String>(8)?)?,
        xp_reward: row.get(9)?,
        image_proof_path: row.get(10)?,
        calendar_event_id: row.get(11)?,
        created_at: parse_time(&row.get::<_, String>(12)?)?,
        updated_at: parse_time(&row.get::<_, String>(13)?)?,
        completed_at: row
            .get::<_, Option<String>>(14)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
    })
}

pub(crate) fn parse_badge_row(row: &Row<'_>) -> rusqlite::Result<BadgeRecord> {
    Ok(BadgeRecord {
        id: row.get(0)?,
        key: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        icon: row.get(4)?,
        requirement: parse_requirement(&row.get::<_, String>(5)?)?,
        requirement_value: row.get(6)?,
        xp_bonus: row.get(7)?,
        is_active: row.get::<_, i64>(8)? != 0,
    })
}

fn parse_session_row(row: &Row<'_>) -> rusqlite::Result<StudySessionRecord> {
    Ok(StudySessionRecord {
        id: row.get(0)?,
        uuid: row.get(1)?,
        user_id: row.get(2)?,
        subject: row.get(3)?,
        description: row.get(4)?,
        scheduled_at: parse_time(&row.get::<_, String>(5)?)?,
        duration_minutes: row.get(6)?,
        calendar_event_id: row.get(7)?,
        status: parse_session_status(&row.get::<_, String>(8)?)?,
        xp_earned: row.get(9)?,
        created_at: parse_time(&row.get::<_, String>(10)?)?,
        completed_at: row
            .get::<_, Option<String>>(11)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
    })
}

fn parse_daily_stat_row(row: &Row<'_>) -> rusqlite::Result<DailyStatRecord> {
    Ok(DailyStatRecord {
        user_id: row.get(0)?,
        date: parse_date(&row.get::<_, String>(1)?)?,
        tasks_completed: row.get(2)?,
        xp_earned: row.get(3)?,
        study_minutes: row.get(4)?,
        streak_active: row.get::<_, i64>(5)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::{column_exists, migrate_v1_to_v2, Database};
    use crate::models::{
        ActivityType, NewStudySession, NewTask, TaskCategory, TaskPriority, TaskStatus, TaskUpdate,
    };
    use chrono::{Duration, Utc};
    use rusqlite::Connection;

    fn new_task(title: &str, xp: i64) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: Some("desc".to_string()),
            category: TaskCategory::Study,
            priority: TaskPriority::Medium,
            due_date: Utc::now().date_naive() + Duration::days(2),
            xp_reward: Some(xp),
            image_proof_path: None,
        }
    }

    fn open_db(dir: &tempfile::TempDir) -> Database {
        Database::open(&dir.path().join("test.db")).expect("db")
    }

    #[test]
    fn task_round_trips_through_insert_and_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");

        let inserted = db.insert_task(user.id, &new_task("Linear algebra", 50)).expect("insert");
        let loaded = db.task_by_uuid(&inserted.uuid).expect("read").expect("exists");

        assert_eq!(loaded.title, "Linear algebra");
        assert_eq!(loaded.description.as_deref(), Some("desc"));
        assert_eq!(loaded.category, TaskCategory::Study);
        assert_eq!(loaded.priority, TaskPriority::Medium);
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.due_date, inserted.due_date);
        assert_eq!(loaded.xp_reward, 50);
        assert!(loaded.completed_at.is_none());
    }

    #[test]
    fn blank_title_is_rejected_before_any_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");

        let result = db.insert_task(user.id, &new_task("   ", 10));
        assert!(matches!(result, Err(crate::errors::AppError::Validation(_))));
        assert!(db.tasks_for_user(user.id).expect("list").is_empty());
    }

    #[test]
    fn completing_a_task_settles_counters_stats_and_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");
        let task = db.insert_task(user.id, &new_task("Chemistry report", 50)).expect("insert");

        let outcome = db.complete_task(&task.uuid).expect("complete").expect("transition");
        assert_eq!(outcome.xp_awarded, 50);

        let user = db.user_by_id(user.id).expect("user").expect("exists");
        assert_eq!(user.tasks_completed, 1);
        // 50 task XP plus the FIRST_TASK badge bonus of 50.
        assert_eq!(user.total_xp_earned, 100);
        assert_eq!(user.level, 2);
        assert_eq!(user.current_streak, 1);
        assert_eq!(user.longest_streak, 1);

        let today = Utc::now().date_naive();
        let stat = db.daily_stat(user.id, today).expect("stat").expect("exists");
        assert_eq!(stat.tasks_completed, 1);
        assert_eq!(stat.xp_earned, 50);

        let log = db.recent_activity(user.id, 20).expect("log");
        let completion: Vec<_> = log
            .iter()
            .filter(|entry| entry.activity == ActivityType::TaskCompleted)
            .collect();
        assert_eq!(completion.len(), 1);
        assert_eq!(completion[0].xp_change, 50);
    }

    #[test]
    fn completing_twice_does_not_double_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");
        let task = db.insert_task(user.id, &new_task("One shot", 40)).expect("insert");

        assert!(db.complete_task(&task.uuid).expect("first").is_some());
        assert!(db.complete_task(&task.uuid).expect("second").is_none());

        let user = db.user_by_id(user.id).expect("user").expect("exists");
        assert_eq!(user.tasks_completed, 1);
    }

    #[test]
    fn broken_streak_keeps_the_longest_watermark() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");

        // A three-day run that ended over a week ago.
        {
            let conn = Connection::open(db.path()).expect("raw open");
            let start = Utc::now().date_naive() - Duration::days(10);
            for offset in 0..3 {
                conn.execute(
                    "INSERT INTO daily_stats (user_id, stat_date, tasks_completed, xp_earned, streak_active)
                     VALUES (?1, ?2, 1, 10, 1)",
                    rusqlite::params![user.id, (start + Duration::days(offset)).to_string()],
                )
                .expect("seed stat");
            }
            conn.execute(
                "UPDATE users SET current_streak = 3, longest_streak = 3 WHERE id = ?1",
                [user.id],
            )
            .expect("seed streaks");
        }

        let task = db.insert_task(user.id, &new_task("back at it", 10)).expect("insert");
        let outcome = db.complete_task(&task.uuid).expect("complete").expect("transition");
        assert_eq!(outcome.current_streak, 1);
        assert_eq!(outcome.longest_streak, 3);

        let user = db.user_by_id(user.id).expect("user").expect("exists");
        assert_eq!(user.current_streak, 1);
        assert_eq!(user.longest_streak, 3);
    }

    #[test]
    fn completed_tasks_cannot_be_reopened() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");
        let task = db.insert_task(user.id, &new_task("Done deal", 10)).expect("insert");
        db.complete_task(&task.uuid).expect("complete").expect("transition");

        let update = TaskUpdate {
            title: "Done deal".to_string(),
            description: None,
            category: TaskCategory::Study,
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
            due_date: task.due_date,
            xp_reward: 10,
            image_proof_path: None,
        };
        let result = db.update_task(&task.uuid, &update);
        assert!(matches!(result, Err(crate::errors::AppError::Validation(_))));
    }

    #[test]
    fn update_of_missing_task_reports_zero_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        db.ensure_default_user("Student", "student@example.com").expect("user");

        let update = TaskUpdate {
            title: "Ghost".to_string(),
            description: None,
            category: TaskCategory::Work,
            priority: TaskPriority::Low,
            status: TaskStatus::Pending,
            due_date: Utc::now().date_naive(),
            xp_reward: 5,
            image_proof_path: None,
        };
        assert_eq!(db.update_task("no-such-uuid", &update).expect("update"), 0);
        assert!(!db.delete_task("no-such-uuid").expect("delete"));
    }

    #[test]
    fn task_count_badge_unlocks_exactly_once_at_threshold() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");
        let badge = db.badge_by_key("TASK_10").expect("badge").expect("seeded");

        for i in 0..10 {
            let task = db
                .insert_task(user.id, &new_task(&format!("task {}", i), 10))
                .expect("insert");
            db.complete_task(&task.uuid).expect("complete").expect("transition");
        }

        let user_badges = db.user_badges(user.id).expect("user badges");
        let entry = user_badges
            .iter()
            .find(|ub| ub.badge_id == badge.id)
            .expect("progress row");
        assert!(entry.unlocked);
        assert_eq!(entry.progress, 10);

        let unlock_events: Vec<_> = db
            .recent_activity(user.id, 100)
            .expect("log")
            .into_iter()
            .filter(|e| e.activity == ActivityType::BadgeUnlocked && e.entity_id == Some(badge.id))
            .collect();
        assert_eq!(unlock_events.len(), 1);
        assert_eq!(unlock_events[0].xp_change, badge.xp_bonus);
    }

    #[test]
    fn counts_and_general_stats_reflect_task_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");

        db.insert_task(user.id, &new_task("a", 10)).expect("insert");
        let done = db.insert_task(user.id, &new_task("b", 10)).expect("insert");
        db.complete_task(&done.uuid).expect("complete");
        let mut science = new_task("c", 10);
        science.category = TaskCategory::Science;
        db.insert_task(user.id, &science).expect("insert");

        let by_status = db.task_counts_by_status(user.id).expect("status counts");
        assert_eq!(by_status[&TaskStatus::Pending], 2);
        assert_eq!(by_status[&TaskStatus::Completed], 1);

        let by_category = db.task_counts_by_category(user.id).expect("category counts");
        assert_eq!(by_category[&TaskCategory::Study], 2);
        assert_eq!(by_category[&TaskCategory::Science], 1);

        let stats = db.general_stats(user.id).expect("stats");
        assert_eq!(stats.total_tasks, 3);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.pending_tasks, 2);
    }

    #[test]
    fn overdue_open_tasks_are_flagged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");

        let mut stale = new_task("stale", 10);
        stale.due_date = Utc::now().date_naive() - Duration::days(3);
        let stale = db.insert_task(user.id, &stale).expect("insert");
        db.insert_task(user.id, &new_task("fresh", 10)).expect("insert");

        let flagged = db
            .mark_overdue_tasks(user.id, Utc::now().date_naive())
            .expect("mark overdue");
        assert_eq!(flagged, 1);
        let stale = db.task_by_uuid(&stale.uuid).expect("read").expect("exists");
        assert_eq!(stale.status, TaskStatus::Overdue);
    }

    #[test]
    fn study_session_completion_folds_minutes_into_daily_stats() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");

        let session = db
            .insert_study_session(
                user.id,
                &NewStudySession {
                    subject: "Algebra".to_string(),
                    description: None,
                    scheduled_at: Utc::now(),
                    duration_minutes: 45,
                },
            )
            .expect("insert session");

        let completed = db
            .complete_study_session(&session.uuid, 30)
            .expect("complete")
            .expect("transition");
        assert_eq!(completed.xp_earned, 30);
        assert!(completed.completed_at.is_some());

        // Second completion is a no-op.
        assert!(db.complete_study_session(&session.uuid, 30).expect("again").is_none());

        let stat = db
            .daily_stat(user.id, Utc::now().date_naive())
            .expect("stat")
            .expect("exists");
        assert_eq!(stat.study_minutes, 45);

        let user = db.user_by_id(user.id).expect("user").expect("exists");
        assert_eq!(user.total_xp_earned, 30);
    }

    #[test]
    fn settings_round_trip_json_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        db.set_setting("theme_mode", &"dark".to_string()).expect("set");
        let theme: Option<String> = db.get_setting("theme_mode").expect("get");
        assert_eq!(theme.as_deref(), Some("dark"));
        assert!(db.delete_setting("theme_mode").expect("delete"));
        let theme: Option<String> = db.get_setting("theme_mode").expect("get");
        assert!(theme.is_none());
    }

    #[test]
    fn integrity_check_passes_on_fresh_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        assert!(db.integrity_ok().expect("integrity"));
    }

    #[test]
    fn rebuild_recreates_an_empty_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let user = db.ensure_default_user("Student", "student@example.com").expect("user");
        db.insert_task(user.id, &new_task("gone soon", 10)).expect("insert");

        db.rebuild().expect("rebuild");
        assert!(db.first_user().expect("query").is_none());
        assert!(!db.list_badges().expect("badges").is_empty());
    }

    // ── migration fixtures ───────────────────────────────────────────────

    /// Minimal v1 layout: no auth columns, version recorded as 1.
    fn create_v1_fixture(path: &std::path::Path) {
        let conn = Connection::open(path).expect("open fixture");
        conn.execute_batch(
            "CREATE TABLE users (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               uuid TEXT NOT NULL UNIQUE,
               name TEXT NOT NULL,
               email TEXT,
               current_xp INTEGER NOT NULL DEFAULT 0,
               level INTEGER NOT NULL DEFAULT 1,
               current_streak INTEGER NOT NULL DEFAULT 0,
               longest_streak INTEGER NOT NULL DEFAULT 0,
               tasks_completed INTEGER NOT NULL DEFAULT 0,
               total_xp_earned INTEGER NOT NULL DEFAULT 0,
               is_active INTEGER NOT NULL DEFAULT 1,
               created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')),
               updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ','now')),
               last_login TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ','now'))
             );
             INSERT INTO users (uuid, name, email) VALUES ('legacy-uuid', 'Legacy', NULL);
             PRAGMA user_version = 1;",
        )
        .expect("fixture schema");
    }

    #[test]
    fn migration_v1_to_v2_backfills_email_and_adds_auth_columns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("legacy.db");
        create_v1_fixture(&path);

        let db = Database::open(&path).expect("migrated open");
        let user = db.user_by_uuid("legacy-uuid").expect("query").expect("exists");
        assert!(!user.email.is_empty());
        assert!(user.remember_token.is_none());
        assert!(!user.email_verified);

        let conn = Connection::open(&path).expect("reopen");
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .expect("version");
        assert_eq!(version, super::schema::SCHEMA_VERSION);
        let index_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_users_remember_token'",
                [],
                |row| row.get(0),
            )
            .expect("index lookup");
        assert_eq!(index_count, 1);
    }

    #[test]
    fn migration_step_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("legacy.db");
        create_v1_fixture(&path);

        let mut conn = Connection::open(&path).expect("open");
        for _ in 0..2 {
            let tx = conn.transaction().expect("tx");
            migrate_v1_to_v2(&tx).expect("migrate");
            tx.commit().expect("commit");
        }
        assert!(column_exists(&conn, "users", "password_hash").expect("probe"));
    }

    #[test]
    fn newer_database_versions_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("future.db");
        {
            let conn = Connection::open(&path).expect("open");
            conn.execute_batch("PRAGMA user_version = 99;").expect("version");
        }
        let result = Database::open(&path);
        assert!(matches!(result, Err(crate::errors::AppError::Migration(_))));
    }
}
