//! Gamification ledger: cumulative points on `users`, an append-only
//! `points_history`, and the tier label derived from the running total.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use super::now;
use crate::error::{AppError, AppResult};

pub const OBSERVATION_REPORTED: i64 = 10;
pub const VERIFICATION_APPROVED: i64 = 5;
pub const PERMIT_ISSUED: i64 = 5;
pub const PERMIT_CLOSED: i64 = 5;
pub const TOOLBOX_TALK_RECORDED: i64 = 10;

text_enum! {
    Level {
        Bronze => "Bronze",
        Silver => "Silver",
        Gold => "Gold",
        Platinum => "Platinum",
    }
}

impl Level {
    pub const fn from_points(points: i64) -> Self {
        if points >= 500 {
            Self::Platinum
        } else if points >= 200 {
            Self::Gold
        } else if points >= 50 {
            Self::Silver
        } else {
            Self::Bronze
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PointsAward {
    pub user_id: i64,
    pub points: i64,
    pub level: Level,
}
#[derive(Debug, Clone, Serialize)]
pub struct PointsHistory {
    pub id: i64,
    pub user_id: i64,
    pub delta: i64,
    pub reason: String,
    pub created_at: String,
}
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: i64,
    pub name: String,
    pub employee_id: String,
    pub points: i64,
    pub level: Level,
}

/// Adds `delta` to the user's total, records it, and recomputes the level.
///
/// Not idempotent: each call appends another history row. Run it on the
/// caller's transaction so the grant commits or rolls back with the event
/// that earned it.
pub fn award_points(
    conn: &Connection,
    user_id: i64,
    delta: i64,
    reason: &str,
) -> AppResult<PointsAward> {
    let changed = conn.execute(
        "UPDATE users SET points = points + ?1 WHERE id = ?2",
        params![delta, user_id],
    )?;
    if changed == 0 {
        return Err(AppError::not_found("User not found"));
    }

    conn.execute(
        "INSERT INTO points_history (user_id, delta, reason, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, delta, reason, now()],
    )?;

    let points: i64 = conn.query_row(
        "SELECT points FROM users WHERE id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    let level = Level::from_points(points);
    conn.execute(
        "UPDATE users SET level = ?1 WHERE id = ?2",
        params![level, user_id],
    )?;

    info!(user_id, delta, points, %level, reason, "points awarded");
    Ok(PointsAward {
        user_id,
        points,
        level,
    })
}

pub fn find_history(conn: &Connection, user_id: i64) -> AppResult<Vec<PointsHistory>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, delta, reason, created_at FROM points_history
         WHERE user_id = ?1
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(PointsHistory {
                id: row.get("id")?,
                user_id: row.get("user_id")?,
                delta: row.get("delta")?,
                reason: row.get("reason")?,
                created_at: row.get("created_at")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn leaderboard(conn: &Connection, limit: i64) -> AppResult<Vec<LeaderboardEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, employee_id, points, level FROM users
         WHERE approved = 1
         ORDER BY points DESC, name ASC, id ASC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok(LeaderboardEntry {
                rank: 0,
                user_id: row.get("id")?,
                name: row.get("name")?,
                employee_id: row.get("employee_id")?,
                points: row.get("points")?,
                level: row.get("level")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .zip(1..)
        .map(|(entry, rank)| LeaderboardEntry { rank, ..entry })
        .collect())
}

/// Position of an approved user on the leaderboard, using the same
/// ordering as [`leaderboard`]: points, then name, then id.
pub fn rank_of(conn: &Connection, user_id: i64) -> AppResult<Option<i64>> {
    let rank = conn
        .query_row(
            "SELECT 1 + (
                SELECT COUNT(*) FROM users other
                WHERE other.approved = 1
                  AND (other.points > u.points
                       OR (other.points = u.points AND other.name < u.name)
                       OR (other.points = u.points AND other.name = u.name AND other.id < u.id))
             )
             FROM users u
             WHERE u.id = ?1 AND u.approved = 1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(rank)
}
