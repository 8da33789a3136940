use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskCategory {
    Study,
    Mathematics,
    History,
    Science,
    Exercise,
    Social,
    Work,
    Personal,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 8] = [
        Self::Study,
        Self::Mathematics,
        Self::History,
        Self::Science,
        Self::Exercise,
        Self::Social,
        Self::Work,
        Self::Personal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Study => "STUDY",
            Self::Mathematics => "MATHEMATICS",
            Self::History => "HISTORY",
            Self::Science => "SCIENCE",
            Self::Exercise => "EXERCISE",
            Self::Social => "SOCIAL",
            Self::Work => "WORK",
            Self::Personal => "PERSONAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "STUDY" => Some(Self::Study),
            "MATHEMATICS" => Some(Self::Mathematics),
            "HISTORY" => Some(Self::History),
            "SCIENCE" => Some(Self::Science),
            "EXERCISE" => Some(Self::Exercise),
            "SOCIAL" => Some(Self::Social),
            "WORK" => Some(Self::Work),
            "PERSONAL" => Some(Self::Personal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Overdue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Overdue => "OVERDUE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(Self::Pending),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "OVERDUE" => Some(Self::Overdue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Missed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Missed => "MISSED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SCHEDULED" => Some(Self::Scheduled),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            "MISSED" => Some(Self::Missed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BadgeRequirement {
    TaskCount,
    Streak,
    XpMilestone,
    CategoryMaster,
    Special,
}

impl BadgeRequirement {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCount => "TASK_COUNT",
            Self::Streak => "STREAK",
            Self::XpMilestone => "XP_MILESTONE",
            Self::CategoryMaster => "CATEGORY_MASTER",
            Self::Special => "SPECIAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TASK_COUNT" => Some(Self::TaskCount),
            "STREAK" => Some(Self::Streak),
            "XP_MILESTONE" => Some(Self::XpMilestone),
            "CATEGORY_MASTER" => Some(Self::CategoryMaster),
            "SPECIAL" => Some(Self::Special),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityType {
    TaskCreated,
    TaskCompleted,
    TaskDeleted,
    BadgeUnlocked,
    LevelUp,
    SessionCompleted,
    StreakMilestone,
    XpEarned,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreated => "TASK_CREATED",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::TaskDeleted => "TASK_DELETED",
            Self::BadgeUnlocked => "BADGE_UNLOCKED",
            Self::LevelUp => "LEVEL_UP",
            Self::SessionCompleted => "SESSION_COMPLETED",
            Self::StreakMilestone => "STREAK_MILESTONE",
            Self::XpEarned => "XP_EARNED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TASK_CREATED" => Some(Self::TaskCreated),
            "TASK_COMPLETED" => Some(Self::TaskCompleted),
            "TASK_DELETED" => Some(Self::TaskDeleted),
            "BADGE_UNLOCKED" => Some(Self::BadgeUnlocked),
            "LEVEL_UP" => Some(Self::LevelUp),
            "SESSION_COMPLETED" => Some(Self::SessionCompleted),
            "STREAK_MILESTONE" => Some(Self::StreakMilestone),
            "XP_EARNED" => Some(Self::XpEarned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub email: String,
    pub current_xp: i64,
    pub level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub tasks_completed: i64,
    pub total_xp_earned: i64,
    pub is_active: bool,
    pub email_verified: bool,
    pub remember_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: NaiveDate,
    pub xp_reward: i64,
    pub image_proof_path: Option<String>,
    pub calendar_event_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub due_date: NaiveDate,
    pub xp_reward: Option<i64>,
    pub image_proof_path: Option<String>,
}

/// Full-row update keyed by the task's external id. Status may move forward
/// (PENDING/IN_PROGRESS/OVERDUE transitions) but never away from COMPLETED;
/// completion itself goes through `complete_task` so reward bookkeeping runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: NaiveDate,
    pub xp_reward: i64,
    pub image_proof_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeRecord {
    pub id: i64,
    pub key: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub requirement: BadgeRequirement,
    pub requirement_value: i64,
    pub xp_bonus: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBadgeRecord {
    pub id: i64,
    pub user_id: i64,
    pub badge_id: i64,
    pub progress: i64,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySessionRecord {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub subject: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub calendar_event_id: Option<i64>,
    pub status: SessionStatus,
    pub xp_earned: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudySession {
    pub subject: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatRecord {
    pub user_id: i64,
    pub date: NaiveDate,
    pub tasks_completed: i64,
    pub xp_earned: i64,
    pub study_minutes: i64,
    pub streak_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: i64,
    pub activity: ActivityType,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub description: String,
    pub xp_change: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralStats {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub pending_tasks: i64,
    pub total_xp_earned: i64,
    pub current_streak: i64,
}

/// Outcome of settling one task completion: level/streak after recomputation
/// plus any badges that crossed their threshold during this event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardOutcome {
    pub xp_awarded: i64,
    pub level: i64,
    pub leveled_up: bool,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub unlocked_badges: Vec<BadgeRecord>,
}

pub type StatusCounts = BTreeMap<TaskStatus, i64>;
pub type CategoryCounts = BTreeMap<TaskCategory, i64>;
