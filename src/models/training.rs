use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    now, parse_date, require_text,
    user::{Role, User, UserAuthenticationData},
};
use crate::error::{AppError, AppResult};

/// Roles allowed to record completed training.
pub const TRAINING_RECORDER_ROLES: [Role; 4] =
    [Role::Admin, Role::SafetyOfficer, Role::Hse, Role::Supervisor];

/// Days before expiry at which a certificate is flagged.
pub const EXPIRING_WINDOW_DAYS: i64 = 30;

text_enum! {
    TrainingStatus {
        Valid => "Valid",
        Expiring => "Expiring",
        Expired => "Expired",
    }
}

impl TrainingStatus {
    pub fn on(expiry_date: Option<NaiveDate>, today: NaiveDate) -> Self {
        match expiry_date {
            Some(expiry) if expiry < today => Self::Expired,
            Some(expiry) if expiry <= today + Duration::days(EXPIRING_WINDOW_DAYS) => {
                Self::Expiring
            }
            _ => Self::Valid,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: i64,
    pub course: String,
    pub completed_date: String,
    pub expiry_date: Option<String>,
    pub recorded_by: i64,
    pub created_at: String,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct TrainingRecordRequest {
    pub user_id: i64,
    pub course: String,
    pub completed_date: String,
    pub expiry_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingCell {
    pub completed_date: String,
    pub expiry_date: Option<String>,
    pub status: TrainingStatus,
}
#[derive(Debug, Serialize)]
pub struct TrainingMatrixRow {
    pub user_id: i64,
    pub name: String,
    pub employee_id: String,
    /// Keyed by course; courses the user never took are absent.
    pub courses: BTreeMap<String, TrainingCell>,
}
#[derive(Debug, Serialize)]
pub struct TrainingMatrix {
    pub courses: Vec<String>,
    pub rows: Vec<TrainingMatrixRow>,
}

impl TrainingRecord {
    const COLUMNS: &'static str =
        "id, user_id, course, completed_date, expiry_date, recorded_by, created_at";

    pub fn from_request(request: TrainingRecordRequest, recorder: &UserAuthenticationData) -> Self {
        Self {
            id: None,
            user_id: request.user_id,
            course: request.course.trim().to_string(),
            completed_date: request.completed_date,
            expiry_date: request.expiry_date,
            recorded_by: recorder.id,
            created_at: now(),
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            user_id: row.get("user_id")?,
            course: row.get("course")?,
            completed_date: row.get("completed_date")?,
            expiry_date: row.get("expiry_date")?,
            recorded_by: row.get("recorded_by")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn save(&mut self, conn: &Connection) -> AppResult<i64> {
        require_text("Course", &self.course)?;
        let completed = parse_date("Completed date", &self.completed_date)?;
        if let Some(expiry) = &self.expiry_date {
            if parse_date("Expiry date", expiry)? < completed {
                return Err(AppError::validation(
                    "Expiry date must not precede completed date",
                ));
            }
        }
        if User::find_by_id(conn, self.user_id)?.is_none() {
            return Err(AppError::not_found("User not found"));
        }

        conn.execute(
            "INSERT INTO training_records (user_id, course, completed_date, expiry_date,
                                           recorded_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.user_id,
                self.course,
                self.completed_date,
                self.expiry_date,
                self.recorded_by,
                self.created_at
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        info!(record_id = id, user_id = self.user_id, course = %self.course, "training recorded");
        Ok(id)
    }

    pub fn find_by_user(conn: &Connection, user_id: i64) -> AppResult<Vec<TrainingRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM training_records WHERE user_id = ?1
             ORDER BY course ASC, completed_date DESC, id DESC",
            Self::COLUMNS
        ))?;
        let records = stmt
            .query_map(params![user_id], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Latest completion per approved user and course, graded against `today`.
    pub fn matrix(conn: &Connection, today: NaiveDate) -> AppResult<TrainingMatrix> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM training_records ORDER BY completed_date ASC, id ASC",
            Self::COLUMNS
        ))?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut courses = BTreeSet::new();
        let mut latest: BTreeMap<i64, BTreeMap<String, TrainingCell>> = BTreeMap::new();
        for record in records {
            let expiry = match &record.expiry_date {
                Some(raw) => Some(parse_date("Expiry date", raw)?),
                None => None,
            };
            courses.insert(record.course.clone());
            // Later completions overwrite earlier ones.
            latest.entry(record.user_id).or_default().insert(
                record.course,
                TrainingCell {
                    completed_date: record.completed_date,
                    expiry_date: record.expiry_date,
                    status: TrainingStatus::on(expiry, today),
                },
            );
        }

        let rows = User::find_many(conn)?
            .into_iter()
            .filter(|user| user.approved)
            .filter_map(|user| {
                let user_id = user.id?;
                Some(TrainingMatrixRow {
                    user_id,
                    name: user.name,
                    employee_id: user.employee_id,
                    courses: latest.remove(&user_id).unwrap_or_default(),
                })
            })
            .collect();

        Ok(TrainingMatrix {
            courses: courses.into_iter().collect(),
            rows,
        })
    }

    pub fn delete_by_id(conn: &Connection, id: i64) -> AppResult<()> {
        let deleted = conn.execute("DELETE FROM training_records WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(AppError::not_found("Training record not found"));
        }
        Ok(())
    }
}
