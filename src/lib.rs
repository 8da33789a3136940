//! Gamified personal task tracker core: a SQLite-backed store with versioned
//! migrations, an XP/level/streak/badge reward engine that settles inside the
//! completion transaction, local account handling, and a fail-soft calendar
//! seam for host environments that have one.

pub mod auth;
pub mod calendar;
pub mod db;
pub mod errors;
pub mod models;
pub mod rewards;
pub mod service;

pub use auth::{AuthDenied, AuthOutcome, AuthStore};
pub use calendar::{
    CalendarEvent, CalendarProvider, CalendarScheduler, Capability, PermissionGate,
    StaticPermissions,
};
pub use db::Database;
pub use errors::{AppError, AppResult};
pub use models::{
    ActivityEntry, ActivityType, BadgeRecord, BadgeRequirement, CategoryCounts, DailyStatRecord,
    GeneralStats, NewStudySession, NewTask, RewardOutcome, SessionStatus, StatusCounts,
    StudySessionRecord, TaskCategory, TaskPriority, TaskRecord, TaskStatus, TaskUpdate,
    UserBadgeRecord, UserRecord,
};
pub use service::Engine;
