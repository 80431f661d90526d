//! Closing the loop on corrective actions.
//!
//! A verifier either approves a completed corrective action, which closes the
//! observation and credits the reporter, or rejects it, which sends the work
//! back to In Progress. Each decision appends one immutable `verifications`
//! row plus a `status_log` entry. Callers run these functions on a single
//! transaction so the audit rows and the observation change commit together.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    now,
    observation::{CorrectiveActionStatus, Observation, ObservationStatus},
    points::{award_points, VERIFICATION_APPROVED},
    status_log::{EntityType, StatusLog},
    today,
    user::{User, UserAuthenticationData},
};
use crate::error::{AppError, AppResult};

text_enum! {
    VerificationDecision {
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub id: i64,
    pub observation_id: i64,
    pub verifier_id: i64,
    pub verifier_name: Option<String>,
    pub remarks: String,
    pub decision: VerificationDecision,
    pub created_at: String,
}
#[derive(Debug, Clone, Serialize)]
pub struct PendingVerification {
    #[serde(flatten)]
    pub observation: Observation,
    pub reporter_name: Option<String>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct VerificationRequest {
    #[serde(default)]
    pub remarks: String,
}
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub verification_id: i64,
    pub decision: VerificationDecision,
    pub points_awarded: bool,
}

impl Verification {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            observation_id: row.get("observation_id")?,
            verifier_id: row.get("verifier_id")?,
            verifier_name: row.get("verifier_name")?,
            remarks: row.get("remarks")?,
            decision: row.get("decision")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Observations whose corrective action is done but not yet signed off.
    pub fn find_pending(conn: &Connection) -> AppResult<Vec<PendingVerification>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, u.name AS reporter_name
             FROM observations o
             LEFT JOIN users u ON u.employee_id = o.reported_by_id
             WHERE o.corrective_action_status = ?1 AND o.status != ?2
             ORDER BY o.id ASC",
            Observation::COLUMNS
        ))?;
        let pending = stmt
            .query_map(
                params![CorrectiveActionStatus::Completed, ObservationStatus::Closed],
                |row| {
                    Ok(PendingVerification {
                        observation: Observation::from_row(row)?,
                        reporter_name: row.get("reporter_name")?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pending)
    }

    pub fn count_pending(conn: &Connection) -> AppResult<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM observations
             WHERE corrective_action_status = ?1 AND status != ?2",
            params![CorrectiveActionStatus::Completed, ObservationStatus::Closed],
            |row| row.get(0),
        )?)
    }

    /// Decisions on one observation, newest first.
    pub fn find_history(conn: &Connection, observation_id: i64) -> AppResult<Vec<Verification>> {
        let mut stmt = conn.prepare(
            "SELECT v.id, v.observation_id, v.verifier_id, u.name AS verifier_name,
                    v.remarks, v.decision, v.created_at
             FROM verifications v
             LEFT JOIN users u ON u.id = v.verifier_id
             WHERE v.observation_id = ?1
             ORDER BY v.created_at DESC, v.id DESC",
        )?;
        let history = stmt
            .query_map(params![observation_id], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(history)
    }

    /// Shared guards for both decisions. Order matters: bad input is reported
    /// before the observation is even looked up.
    fn load_for_decision(
        conn: &Connection,
        observation_id: i64,
        verifier: &UserAuthenticationData,
        remarks: &str,
    ) -> AppResult<Observation> {
        if remarks.trim().is_empty() {
            return Err(AppError::validation("Remarks are required"));
        }
        let observation = Observation::find_by_id(conn, observation_id)?
            .ok_or_else(|| AppError::not_found("Observation not found"))?;
        if observation.reported_by_id == verifier.employee_id {
            return Err(AppError::forbidden("You cannot verify your own observation"));
        }
        if !observation.is_pending_verification() {
            return Err(AppError::conflict(
                "Observation is not awaiting verification",
            ));
        }
        Ok(observation)
    }

    fn insert(
        conn: &Connection,
        observation_id: i64,
        verifier_id: i64,
        remarks: &str,
        decision: VerificationDecision,
    ) -> AppResult<i64> {
        conn.execute(
            "INSERT INTO verifications (observation_id, verifier_id, remarks, decision, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![observation_id, verifier_id, remarks, decision, now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn approve(
        conn: &Connection,
        observation_id: i64,
        verifier: &UserAuthenticationData,
        remarks: &str,
    ) -> AppResult<VerificationOutcome> {
        let observation = Self::load_for_decision(conn, observation_id, verifier, remarks)?;
        let remarks = remarks.trim();

        let verification_id = Self::insert(
            conn,
            observation_id,
            verifier.id,
            remarks,
            VerificationDecision::Approved,
        )?;
        conn.execute(
            "UPDATE observations
             SET status = ?1, closed_by = ?2, closed_date = ?3, closed_notes = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                ObservationStatus::Closed,
                verifier.name,
                today(),
                remarks,
                now(),
                observation_id
            ],
        )?;
        StatusLog::record(
            conn,
            EntityType::Observation,
            observation_id,
            Some(observation.status.as_str()),
            ObservationStatus::Closed.as_str(),
            verifier.id,
            remarks,
        )?;

        let points_awarded = match User::find_by_employee_id(conn, &observation.reported_by_id)? {
            Some(User { id: Some(reporter_id), .. }) => {
                award_points(
                    conn,
                    reporter_id,
                    VERIFICATION_APPROVED,
                    &format!("Observation #{observation_id} verified and closed"),
                )?;
                true
            }
            _ => {
                warn!(
                    observation_id,
                    reported_by_id = %observation.reported_by_id,
                    "no user matches the reporter; approval points not granted"
                );
                false
            }
        };

        info!(observation_id, verifier_id = verifier.id, "corrective action approved");
        Ok(VerificationOutcome {
            verification_id,
            decision: VerificationDecision::Approved,
            points_awarded,
        })
    }

    pub fn reject(
        conn: &Connection,
        observation_id: i64,
        verifier: &UserAuthenticationData,
        remarks: &str,
    ) -> AppResult<VerificationOutcome> {
        let observation = Self::load_for_decision(conn, observation_id, verifier, remarks)?;
        let remarks = remarks.trim();

        let verification_id = Self::insert(
            conn,
            observation_id,
            verifier.id,
            remarks,
            VerificationDecision::Rejected,
        )?;
        conn.execute(
            "UPDATE observations
             SET status = ?1, corrective_action_status = ?2, updated_at = ?3
             WHERE id = ?4",
            params![
                ObservationStatus::Open,
                CorrectiveActionStatus::InProgress,
                now(),
                observation_id
            ],
        )?;
        StatusLog::record(
            conn,
            EntityType::Observation,
            observation_id,
            Some(observation.corrective_action_status.as_str()),
            CorrectiveActionStatus::InProgress.as_str(),
            verifier.id,
            remarks,
        )?;

        info!(observation_id, verifier_id = verifier.id, "corrective action rejected");
        Ok(VerificationOutcome {
            verification_id,
            decision: VerificationDecision::Rejected,
            points_awarded: false,
        })
    }
}
