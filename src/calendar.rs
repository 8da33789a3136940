//! Calendar integration seam. The host environment supplies the permission
//! gate and the event provider; everything here is fail-soft, because a task
//! must never fail to save over a missing calendar grant.

use crate::errors::AppResult;
use crate::models::{StudySessionRecord, TaskRecord};
use chrono::{DateTime, NaiveTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Runtime grants the host can hold. Only `Calendar` gates behavior in this
/// crate; the rest exist so callers can route every permission question
/// through one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    Calendar,
    Storage,
    Camera,
    Contacts,
    Notifications,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Calendar => "calendar",
            Capability::Storage => "storage",
            Capability::Camera => "camera",
            Capability::Contacts => "contacts",
            Capability::Notifications => "notifications",
        }
    }
}

pub trait PermissionGate: Send + Sync {
    fn is_granted(&self, capability: Capability) -> bool;
}

/// Fixed grant set, handy for hosts without a dynamic permission model.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    granted: BTreeSet<Capability>,
}

impl StaticPermissions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn granting(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            granted: capabilities.into_iter().collect(),
        }
    }
}

impl PermissionGate for StaticPermissions {
    fn is_granted(&self, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub title: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
    /// Reminder offsets, minutes before the event start.
    pub reminders: Vec<i64>,
}

pub trait CalendarProvider: Send + Sync {
    fn insert_event(&self, event: &CalendarEvent) -> AppResult<i64>;
    fn delete_event(&self, event_id: i64) -> AppResult<()>;
}

const DEADLINE_HOUR: u32 = 9;
const DEADLINE_DURATION_MINUTES: i64 = 30;
const DEADLINE_REMINDERS: [i64; 2] = [24 * 60, 2 * 60];
const SESSION_REMINDERS: [i64; 1] = [15];

/// Schedules deadline and study-session events when the calendar grant is
/// present. Every path degrades to `None`/`false` instead of erroring: a
/// missing grant or a provider failure is logged and swallowed.
pub struct CalendarScheduler {
    permissions: Arc<dyn PermissionGate>,
    provider: Arc<dyn CalendarProvider>,
}

impl CalendarScheduler {
    pub fn new(permissions: Arc<dyn PermissionGate>, provider: Arc<dyn CalendarProvider>) -> Self {
        Self { permissions, provider }
    }

    /// Places a deadline marker on the task's due date: a 30-minute event at
    /// 09:00 with day-before and two-hour reminders.
    pub fn schedule_task_deadline(&self, task: &TaskRecord) -> Option<i64> {
        if !self.permissions.is_granted(Capability::Calendar) {
            tracing::warn!(task = %task.uuid, "calendar permission missing; skipping deadline event");
            return None;
        }
        let starts_at = task
            .due_date
            .and_time(NaiveTime::from_hms_opt(DEADLINE_HOUR, 0, 0)?)
            .and_utc();
        let event = CalendarEvent {
            title: format!("Due: {}", task.title),
            description: task.description.clone().unwrap_or_default(),
            starts_at,
            duration_minutes: DEADLINE_DURATION_MINUTES,
            reminders: DEADLINE_REMINDERS.to_vec(),
        };
        self.insert(&event)
    }

    pub fn schedule_study_session(&self, session: &StudySessionRecord) -> Option<i64> {
        if !self.permissions.is_granted(Capability::Calendar) {
            tracing::warn!(session = %session.uuid, "calendar permission missing; skipping session event");
            return None;
        }
        let event = CalendarEvent {
            title: format!("Study: {}", session.subject),
            description: session.description.clone().unwrap_or_default(),
            starts_at: session.scheduled_at,
            duration_minutes: session.duration_minutes,
            reminders: SESSION_REMINDERS.to_vec(),
        };
        self.insert(&event)
    }

    pub fn cancel_event(&self, event_id: i64) -> bool {
        if !self.permissions.is_granted(Capability::Calendar) {
            return false;
        }
        match self.provider.delete_event(event_id) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(event_id, error = %err, "failed to delete calendar event");
                false
            }
        }
    }

    fn insert(&self, event: &CalendarEvent) -> Option<i64> {
        match self.provider.insert_event(event) {
            Ok(event_id) => Some(event_id),
            Err(err) => {
                tracing::warn!(title = %event.title, error = %err, "failed to insert calendar event");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CalendarEvent, CalendarProvider, CalendarScheduler, Capability, StaticPermissions,
    };
    use crate::errors::{AppError, AppResult};
    use crate::models::{TaskCategory, TaskPriority, TaskRecord, TaskStatus};
    use chrono::{NaiveDate, Utc};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingProvider {
        events: Mutex<Vec<CalendarEvent>>,
        deleted: Mutex<Vec<i64>>,
    }

    impl CalendarProvider for RecordingProvider {
        fn insert_event(&self, event: &CalendarEvent) -> AppResult<i64> {
            let mut events = self.events.lock().unwrap();
            events.push(event.clone());
            Ok(events.len() as i64)
        }

        fn delete_event(&self, event_id: i64) -> AppResult<()> {
            self.deleted.lock().unwrap().push(event_id);
            Ok(())
        }
    }

    struct FailingProvider;

    impl CalendarProvider for FailingProvider {
        fn insert_event(&self, _event: &CalendarEvent) -> AppResult<i64> {
            Err(AppError::Io("calendar backend offline".to_string()))
        }

        fn delete_event(&self, _event_id: i64) -> AppResult<()> {
            Err(AppError::Io("calendar backend offline".to_string()))
        }
    }

    fn sample_task() -> TaskRecord {
        TaskRecord {
            id: 1,
            uuid: "t-1".to_string(),
            user_id: 1,
            title: "Final essay".to_string(),
            description: Some("1500 words".to_string()),
            category: TaskCategory::Study,
            priority: TaskPriority::High,
            status: TaskStatus::Pending,
            due_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            xp_reward: 50,
            image_proof_path: None,
            calendar_event_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn deadline_event_lands_at_nine_with_both_reminders() {
        let provider = Arc::new(RecordingProvider::default());
        let scheduler = CalendarScheduler::new(
            Arc::new(StaticPermissions::granting([Capability::Calendar])),
            Arc::clone(&provider) as Arc<dyn CalendarProvider>,
        );

        let event_id = scheduler.schedule_task_deadline(&sample_task());
        assert_eq!(event_id, Some(1));

        let events = provider.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Due: Final essay");
        assert_eq!(events[0].starts_at.to_rfc3339(), "2026-09-01T09:00:00+00:00");
        assert_eq!(events[0].duration_minutes, 30);
        assert_eq!(events[0].reminders, vec![1440, 120]);
    }

    #[test]
    fn missing_grant_degrades_to_none_without_touching_the_provider() {
        let provider = Arc::new(RecordingProvider::default());
        let scheduler = CalendarScheduler::new(
            Arc::new(StaticPermissions::none()),
            Arc::clone(&provider) as Arc<dyn CalendarProvider>,
        );

        assert_eq!(scheduler.schedule_task_deadline(&sample_task()), None);
        assert!(!scheduler.cancel_event(7));
        assert!(provider.events.lock().unwrap().is_empty());
        assert!(provider.deleted.lock().unwrap().is_empty());
    }

    #[test]
    fn provider_failure_is_swallowed() {
        let scheduler = CalendarScheduler::new(
            Arc::new(StaticPermissions::granting([Capability::Calendar])),
            Arc::new(FailingProvider),
        );
        assert_eq!(scheduler.schedule_task_deadline(&sample_task()), None);
        assert!(!scheduler.cancel_event(7));
    }

    #[test]
    fn cancel_reaches_the_provider_when_granted() {
        let provider = Arc::new(RecordingProvider::default());
        let scheduler = CalendarScheduler::new(
            Arc::new(StaticPermissions::granting([Capability::Calendar])),
            Arc::clone(&provider) as Arc<dyn CalendarProvider>,
        );
        assert!(scheduler.cancel_event(42));
        assert_eq!(*provider.deleted.lock().unwrap(), vec![42]);
    }
}
