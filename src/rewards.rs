//! Reward settlement for task completion. The `task_completed_stats` trigger
//! owns the raw counter increments; everything derived from those counters
//! (level, streak, badge unlocks) is recomputed here inside the same
//! transaction so the two can never drift apart.

use crate::errors::AppResult;
use crate::models::{ActivityType, BadgeRecord, BadgeRequirement, RewardOutcome};
use chrono::{Days, NaiveDate, Utc};
use rusqlite::{params, Transaction};

/// XP required per level. Level is a pure function of lifetime XP and is
/// always recomputed from scratch, never incremented.
pub const XP_PER_LEVEL: i64 = 100;

pub fn level_for_xp(total_xp_earned: i64) -> i64 {
    1 + total_xp_earned.max(0) / XP_PER_LEVEL
}

/// Current streak given the set of active days (days with at least one
/// completed task), newest first. The run is anchored at `today`, or at
/// yesterday when today has no activity yet.
pub fn compute_streak(active_days: &[NaiveDate], today: NaiveDate) -> i64 {
    let mut expected = if active_days.first() == Some(&today) {
        today
    } else {
        match today.checked_sub_days(Days::new(1)) {
            Some(yesterday) => yesterday,
            None => return 0,
        }
    };

    let mut streak = 0;
    for day in active_days {
        if *day > expected {
            continue;
        }
        if *day != expected {
            break;
        }
        streak += 1;
        expected = match expected.checked_sub_days(Days::new(1)) {
            Some(prev) => prev,
            None => break,
        };
    }
    streak
}

/// Applies the derived-state half of a completion inside the caller's
/// transaction: streak recomputation, badge progress/unlocks (with their XP
/// bonuses), and a final level recomputation covering both the task reward
/// and any bonuses granted along the way.
pub(crate) fn settle_completion(
    tx: &Transaction<'_>,
    user_id: i64,
    xp_awarded: i64,
    today: NaiveDate,
) -> AppResult<RewardOutcome> {
    let (level_before, longest_before): (i64, i64) = tx.query_row(
        "SELECT level, longest_streak FROM users WHERE id = ?1",
        [user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let current_streak = recompute_streak(tx, user_id, today)?;
    let longest_streak = longest_before.max(current_streak);
    tx.execute(
        "UPDATE users SET current_streak = ?1, longest_streak = ?2 WHERE id = ?3",
        params![current_streak, longest_streak, user_id],
    )?;

    let unlocked_badges = check_badges(tx, user_id, current_streak)?;

    let total_xp_earned: i64 = tx.query_row(
        "SELECT total_xp_earned FROM users WHERE id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    let level = level_for_xp(total_xp_earned);
    let leveled_up = level > level_before;
    if level != level_before {
        tx.execute(
            "UPDATE users SET level = ?1 WHERE id = ?2",
            params![level, user_id],
        )?;
    }
    if leveled_up {
        tx.execute(
            "INSERT INTO activity_log (user_id, activity_type, entity_type, entity_id, description, xp_change)
             VALUES (?1, 'LEVEL_UP', 'user', ?1, ?2, 0)",
            params![user_id, format!("Reached level {}", level)],
        )?;
    }

    Ok(RewardOutcome {
        xp_awarded,
        level,
        leveled_up,
        current_streak,
        longest_streak,
        unlocked_badges,
    })
}

fn recompute_streak(tx: &Transaction<'_>, user_id: i64, today: NaiveDate) -> AppResult<i64> {
    let mut stmt = tx.prepare(
        "SELECT stat_date FROM daily_stats
         WHERE user_id = ?1 AND tasks_completed > 0
         ORDER BY stat_date DESC
         LIMIT 366",
    )?;
    let days = stmt
        .query_map([user_id], |row| row.get::<_, NaiveDate>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(compute_streak(&days, today))
}

/// Refreshes badge progress and unlocks any badge whose threshold is now met.
/// The unlock UPDATE is guarded on `is_unlocked = 0`, so re-running the check
/// for the same event is a no-op and each bonus is granted exactly once.
fn check_badges(
    tx: &Transaction<'_>,
    user_id: i64,
    current_streak: i64,
) -> AppResult<Vec<BadgeRecord>> {
    let badges = {
        let mut stmt = tx.prepare(
            "SELECT id, badge_key, name, description, icon_name,
                    requirement_type, requirement_value, xp_bonus, is_active
             FROM badges WHERE is_active = 1",
        )?;
        let rows = stmt.query_map([], crate::db::parse_badge_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let (tasks_completed, total_xp_earned): (i64, i64) = tx.query_row(
        "SELECT tasks_completed, total_xp_earned FROM users WHERE id = ?1",
        [user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut unlocked = Vec::new();
    for badge in badges {
        let progress = match badge.requirement {
            BadgeRequirement::TaskCount => tasks_completed,
            BadgeRequirement::Streak => current_streak,
            BadgeRequirement::XpMilestone => total_xp_earned,
            BadgeRequirement::CategoryMaster => best_category_count(tx, user_id)?,
            // SPECIAL badges are unlocked by explicit caller action only.
            BadgeRequirement::Special => continue,
        };

        tx.execute(
            "INSERT INTO user_badges (user_id, badge_id, progress)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, badge_id) DO UPDATE SET progress = excluded.progress",
            params![user_id, badge.id, progress],
        )?;

        if progress < badge.requirement_value {
            continue;
        }
        let now = Utc::now().to_rfc3339();
        let transitioned = tx.execute(
            "UPDATE user_badges SET is_unlocked = 1, unlocked_at = ?1
             WHERE user_id = ?2 AND badge_id = ?3 AND is_unlocked = 0",
            params![now, user_id, badge.id],
        )?;
        if transitioned == 0 {
            continue;
        }

        if badge.xp_bonus > 0 {
            tx.execute(
                "UPDATE users
                 SET current_xp = current_xp + ?1, total_xp_earned = total_xp_earned + ?1
                 WHERE id = ?2",
                params![badge.xp_bonus, user_id],
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
        tracing::info!(user_id, badge_key = %badge.key, "badge unlocked");
        unlocked.push(badge);
    }

    Ok(unlocked)
}

/// Category mastery counts the user's best single category: the highest
/// number of completed tasks accumulated in any one category.
fn best_category_count(tx: &Transaction<'_>, user_id: i64) -> AppResult<i64> {
    let best: Option<i64> = tx.query_row(
        "SELECT MAX(n) FROM (
           SELECT COUNT(*) AS n FROM tasks
           WHERE user_id = ?1 AND status = 'COMPLETED'
           GROUP BY category
         )",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(best.unwrap_or(0))
}
