//! High-level facade over the store. Mutations go through here so that
//! side-channel work (calendar events) stays best-effort and never blocks
//! the write that triggered it.

use crate::calendar::CalendarScheduler;
use crate::db::Database;
use crate::errors::AppResult;
use crate::models::{
    ActivityEntry, BadgeRecord, CategoryCounts, DailyStatRecord, GeneralStats, NewStudySession,
    NewTask, RewardOutcome, StatusCounts, StudySessionRecord, TaskCategory, TaskRecord,
    TaskStatus, TaskUpdate, UserBadgeRecord, UserRecord,
};
use chrono::Utc;
use std::sync::Arc;

pub struct Engine {
    db: Arc<Database>,
    calendar: Option<CalendarScheduler>,
}

impl Engine {
    pub fn new(db: Arc<Database>, calendar: Option<CalendarScheduler>) -> Self {
        Self { db, calendar }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    // ── tasks ────────────────────────────────────────────────────────────

    /// Creates a task and, when a scheduler is wired and granted, attaches a
    /// deadline event. The task is saved either way; a calendar failure only
    /// leaves `calendar_event_id` empty.
    pub fn create_task(&self, user_id: i64, new_task: &NewTask) -> AppResult<TaskRecord> {
        let task = self.db.insert_task(user_id, new_task)?;
        let Some(scheduler) = &self.calendar else {
            return Ok(task);
        };
        let Some(event_id) = scheduler.schedule_task_deadline(&task) else {
            return Ok(task);
        };
        self.db.set_task_calendar_event(&task.uuid, event_id)?;
        Ok(TaskRecord {
            calendar_event_id: Some(event_id),
            ..task
        })
    }

    pub fn update_task(&self, uuid: &str, update: &TaskUpdate) -> AppResult<Option<TaskRecord>> {
        if self.db.update_task(uuid, update)? == 0 {
            return Ok(None);
        }
        self.db.task_by_uuid(uuid)
    }

    /// Completes a task; its deadline event, if any, is cancelled
    /// best-effort afterwards.
    pub fn complete_task(&self, uuid: &str) -> AppResult<Option<RewardOutcome>> {
        let event_id = self
            .db
            .task_by_uuid(uuid)?
            .and_then(|task| task.calendar_event_id);
        let outcome = self.db.complete_task(uuid)?;
        if outcome.is_some() {
            self.cancel_event(event_id);
        }
        Ok(outcome)
    }

    pub fn delete_task(&self, uuid: &str) -> AppResult<bool> {
        let event_id = self
            .db
            .task_by_uuid(uuid)?
            .and_then(|task| task.calendar_event_id);
        let deleted = self.db.delete_task(uuid)?;
        if deleted {
            self.cancel_event(event_id);
        }
        Ok(deleted)
    }

    pub fn task(&self, uuid: &str) -> AppResult<Option<TaskRecord>> {
        self.db.task_by_uuid(uuid)
    }

    pub fn tasks(&self, user_id: i64) -> AppResult<Vec<TaskRecord>> {
        self.db.tasks_for_user(user_id)
    }

    pub fn tasks_by_status(&self, user_id: i64, status: TaskStatus) -> AppResult<Vec<TaskRecord>> {
        self.db.tasks_by_status(user_id, status)
    }

    pub fn tasks_by_category(
        &self,
        user_id: i64,
        category: TaskCategory,
    ) -> AppResult<Vec<TaskRecord>> {
        self.db.tasks_by_category(user_id, category)
    }

    /// Sweeps past-due open tasks into OVERDUE. Intended to run once at
    /// startup and once per day change.
    pub fn sweep_overdue(&self, user_id: i64) -> AppResult<usize> {
        self.db.mark_overdue_tasks(user_id, Utc::now().date_naive())
    }

    // ── study sessions ───────────────────────────────────────────────────

    pub fn schedule_study_session(
        &self,
        user_id: i64,
        new_session: &NewStudySession,
    ) -> AppResult<StudySessionRecord> {
        let session = self.db.insert_study_session(user_id, new_session)?;
        let Some(scheduler) = &self.calendar else {
            return Ok(session);
        };
        let Some(event_id) = scheduler.schedule_study_session(&session) else {
            return Ok(session);
        };
        self.db.set_session_calendar_event(&session.uuid, event_id)?;
        Ok(StudySessionRecord {
            calendar_event_id: Some(event_id),
            ..session
        })
    }

    pub fn complete_study_session(
        &self,
        uuid: &str,
        xp_earned: i64,
    ) -> AppResult<Option<StudySessionRecord>> {
        self.db.complete_study_session(uuid, xp_earned)
    }

    pub fn study_sessions(&self, user_id: i64) -> AppResult<Vec<StudySessionRecord>> {
        self.db.study_sessions_for_user(user_id)
    }

    // ── profile & stats ──────────────────────────────────────────────────

    pub fn profile(&self, user_id: i64) -> AppResult<Option<UserRecord>> {
        self.db.user_by_id(user_id)
    }

    pub fn rename_user(&self, user_id: i64, name: &str) -> AppResult<Option<UserRecord>> {
        if self.db.rename_user(user_id, name)? == 0 {
            return Ok(None);
        }
        self.db.user_by_id(user_id)
    }

    pub fn badges(&self) -> AppResult<Vec<BadgeRecord>> {
        self.db.list_badges()
    }

    pub fn user_badges(&self, user_id: i64) -> AppResult<Vec<UserBadgeRecord>> {
        self.db.user_badges(user_id)
    }

    pub fn general_stats(&self, user_id: i64) -> AppResult<GeneralStats> {
        self.db.general_stats(user_id)
    }

    pub fn task_counts_by_status(&self, user_id: i64) -> AppResult<StatusCounts> {
        self.db.task_counts_by_status(user_id)
    }

    pub fn task_counts_by_category(&self, user_id: i64) -> AppResult<CategoryCounts> {
        self.db.task_counts_by_category(user_id)
    }

    pub fn recent_activity(&self, user_id: i64, limit: u32) -> AppResult<Vec<ActivityEntry>> {
        self.db.recent_activity(user_id, limit)
    }

    pub fn recent_daily_stats(&self, user_id: i64, limit: u32) -> AppResult<Vec<DailyStatRecord>> {
        self.db.recent_daily_stats(user_id, limit)
    }

    fn cancel_event(&self, event_id: Option<i64>) {
        if let (Some(scheduler), Some(event_id)) = (&self.calendar, event_id) {
            scheduler.cancel_event(event_id);
        }
    }
}
