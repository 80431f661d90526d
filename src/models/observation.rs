use rusqlite::{params, params_from_iter, types::ToSql, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    json_list, now, parse_date, parse_time,
    points::{award_points, OBSERVATION_REPORTED},
    require_text,
    status_log::{EntityType, StatusLog},
    user::UserAuthenticationData,
};
use crate::error::{AppError, AppResult};

text_enum! {
    RiskLevel {
        Low => "Low",
        Medium => "Medium",
        High => "High",
    }
}
text_enum! {
    ObservationStatus {
        Open => "Open",
        Closed => "Closed",
    }
}
text_enum! {
    ObservationClass {
        Positive => "positive",
        Negative => "negative",
    }
}
text_enum! {
    CorrectiveActionStatus {
        NotStarted => "Not Started",
        InProgress => "In Progress",
        Completed => "Completed",
    }
}

impl CorrectiveActionStatus {
    /// Transition table for assignee updates. Re-opening a completed action
    /// for rework is allowed; sliding back to Not Started is not.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, _)
                | (Self::InProgress, Self::InProgress | Self::Completed)
                | (Self::Completed, Self::Completed | Self::InProgress)
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Observation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub date: String,
    pub time: Option<String>,
    pub area: String,
    pub observation_type: String,
    pub observation_class: ObservationClass,
    pub activity_type: String,
    pub description: String,
    pub direct_cause: Option<String>,
    pub root_cause: Option<String>,
    pub immediate_action: Option<String>,
    pub corrective_action: Option<String>,
    pub corrective_action_assigned_to: Option<String>,
    pub corrective_action_due_date: Option<String>,
    pub corrective_action_status: CorrectiveActionStatus,
    pub risk_level: RiskLevel,
    pub status: ObservationStatus,
    pub reported_by: String,
    pub reported_by_id: String,
    pub evidence: Vec<String>,
    pub closed_by: Option<String>,
    pub closed_date: Option<String>,
    pub closed_notes: Option<String>,
    pub close_evidence: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ObservationRequest {
    pub date: String,
    pub time: Option<String>,
    pub area: String,
    pub observation_type: String,
    pub observation_class: ObservationClass,
    #[serde(default)]
    pub activity_type: String,
    pub description: String,
    pub direct_cause: Option<String>,
    pub root_cause: Option<String>,
    pub immediate_action: Option<String>,
    pub corrective_action: Option<String>,
    pub corrective_action_assigned_to: Option<String>,
    pub corrective_action_due_date: Option<String>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub evidence: Vec<String>,
}
#[derive(Debug, Default, Deserialize)]
pub struct ObservationQuery {
    pub status: Option<ObservationStatus>,
    pub risk_level: Option<RiskLevel>,
    pub area: Option<String>,
    pub limit: Option<i64>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct CorrectiveActionRequest {
    pub status: CorrectiveActionStatus,
    pub due_date: Option<String>,
    pub assigned_to: Option<String>,
}

impl Observation {
    pub(crate) const COLUMNS: &'static str = "o.id, o.date, o.time, o.area, o.observation_type, \
        o.observation_class, o.activity_type, o.description, o.direct_cause, o.root_cause, \
        o.immediate_action, o.corrective_action, o.corrective_action_assigned_to, \
        o.corrective_action_due_date, o.corrective_action_status, o.risk_level, o.status, \
        o.reported_by, o.reported_by_id, o.evidence, o.closed_by, o.closed_date, o.closed_notes, \
        o.close_evidence, o.created_at, o.updated_at";

    /// Builds a new Open observation reported by `reporter`.
    pub fn from_request(request: ObservationRequest, reporter: &UserAuthenticationData) -> Self {
        let timestamp = now();
        Self {
            id: None,
            date: request.date,
            time: request.time,
            area: request.area.trim().to_string(),
            observation_type: request.observation_type,
            observation_class: request.observation_class,
            activity_type: request.activity_type,
            description: request.description,
            direct_cause: request.direct_cause,
            root_cause: request.root_cause,
            immediate_action: request.immediate_action,
            corrective_action: request.corrective_action,
            corrective_action_assigned_to: request.corrective_action_assigned_to,
            corrective_action_due_date: request.corrective_action_due_date,
            corrective_action_status: CorrectiveActionStatus::NotStarted,
            risk_level: request.risk_level,
            status: ObservationStatus::Open,
            reported_by: reporter.name.clone(),
            reported_by_id: reporter.employee_id.clone(),
            evidence: request.evidence,
            closed_by: None,
            closed_date: None,
            closed_notes: None,
            close_evidence: Vec::new(),
            created_at: timestamp.clone(),
            updated_at: timestamp,
        }
    }

    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let evidence: String = row.get("evidence")?;
        let close_evidence: String = row.get("close_evidence")?;
        Ok(Self {
            id: Some(row.get("id")?),
            date: row.get("date")?,
            time: row.get("time")?,
            area: row.get("area")?,
            observation_type: row.get("observation_type")?,
            observation_class: row.get("observation_class")?,
            activity_type: row.get("activity_type")?,
            description: row.get("description")?,
            direct_cause: row.get("direct_cause")?,
            root_cause: row.get("root_cause")?,
            immediate_action: row.get("immediate_action")?,
            corrective_action: row.get("corrective_action")?,
            corrective_action_assigned_to: row.get("corrective_action_assigned_to")?,
            corrective_action_due_date: row.get("corrective_action_due_date")?,
            corrective_action_status: row.get("corrective_action_status")?,
            risk_level: row.get("risk_level")?,
            status: row.get("status")?,
            reported_by: row.get("reported_by")?,
            reported_by_id: row.get("reported_by_id")?,
            evidence: json_list(&evidence)?,
            closed_by: row.get("closed_by")?,
            closed_date: row.get("closed_date")?,
            closed_notes: row.get("closed_notes")?,
            close_evidence: json_list(&close_evidence)?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn validate(&self) -> AppResult<()> {
        parse_date("Date", &self.date)?;
        if let Some(time) = &self.time {
            parse_time("Time", time)?;
        }
        require_text("Area", &self.area)?;
        require_text("Observation type", &self.observation_type)?;
        require_text("Description", &self.description)?;
        if let Some(due_date) = &self.corrective_action_due_date {
            parse_date("Due date", due_date)?;
        }
        Ok(())
    }

    pub fn is_pending_verification(&self) -> bool {
        self.corrective_action_status == CorrectiveActionStatus::Completed
            && self.status != ObservationStatus::Closed
    }

    pub fn save(&mut self, conn: &Connection) -> AppResult<i64> {
        self.validate()?;

        conn.execute(
            "INSERT INTO observations (
                date, time, area, observation_type, observation_class, activity_type,
                description, direct_cause, root_cause, immediate_action, corrective_action,
                corrective_action_assigned_to, corrective_action_due_date,
                corrective_action_status, risk_level, status, reported_by, reported_by_id,
                evidence, close_evidence, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                       ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                self.date,
                self.time,
                self.area,
                self.observation_type,
                self.observation_class,
                self.activity_type,
                self.description,
                self.direct_cause,
                self.root_cause,
                self.immediate_action,
                self.corrective_action,
                self.corrective_action_assigned_to,
                self.corrective_action_due_date,
                self.corrective_action_status,
                self.risk_level,
                self.status,
                self.reported_by,
                self.reported_by_id,
                serde_json::to_string(&self.evidence)?,
                serde_json::to_string(&self.close_evidence)?,
                self.created_at,
                self.updated_at
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Saves the observation and credits the reporter.
    pub fn report(&mut self, conn: &Connection, reporter_id: i64) -> AppResult<i64> {
        let id = self.save(conn)?;
        award_points(
            conn,
            reporter_id,
            OBSERVATION_REPORTED,
            &format!("Reported observation #{id}"),
        )?;
        info!(observation_id = id, risk_level = %self.risk_level, area = %self.area, "observation reported");
        Ok(id)
    }

    pub fn find_many(conn: &Connection, query: &ObservationQuery) -> AppResult<Vec<Observation>> {
        let mut sql = format!("SELECT {} FROM observations o WHERE 1 = 1", Self::COLUMNS);
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = query.status {
            values.push(Box::new(status));
            sql.push_str(&format!(" AND o.status = ?{}", values.len()));
        }
        if let Some(risk_level) = query.risk_level {
            values.push(Box::new(risk_level));
            sql.push_str(&format!(" AND o.risk_level = ?{}", values.len()));
        }
        if let Some(area) = &query.area {
            values.push(Box::new(area.clone()));
            sql.push_str(&format!(" AND o.area = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY o.date DESC, o.id DESC");
        if let Some(limit) = query.limit {
            values.push(Box::new(limit.max(0)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let mut stmt = conn.prepare(&sql)?;
        let observations = stmt
            .query_map(params_from_iter(values.iter().map(|v| v.as_ref())), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(observations)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Option<Observation>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM observations o WHERE o.id = ?1", Self::COLUMNS),
                params![id],
                Self::from_row,
            )
            .optional()?)
    }

    /// Applies an assignee/status/due-date update under the transition table.
    /// Omitted due date or assignee keep their stored values.
    pub fn update_corrective_action(
        conn: &Connection,
        id: i64,
        request: &CorrectiveActionRequest,
        actor: &UserAuthenticationData,
    ) -> AppResult<Observation> {
        let observation =
            Self::find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("Observation not found"))?;

        if observation.status == ObservationStatus::Closed {
            return Err(AppError::conflict(
                "Observation is closed; corrective action can no longer change",
            ));
        }
        let previous = observation.corrective_action_status;
        if !previous.can_transition_to(request.status) {
            return Err(AppError::conflict(format!(
                "Corrective action cannot move from {previous} to {}",
                request.status
            )));
        }
        if let Some(due_date) = &request.due_date {
            parse_date("Due date", due_date)?;
        }

        conn.execute(
            "UPDATE observations
             SET corrective_action_status = ?1,
                 corrective_action_due_date = COALESCE(?2, corrective_action_due_date),
                 corrective_action_assigned_to = COALESCE(?3, corrective_action_assigned_to),
                 updated_at = ?4
             WHERE id = ?5",
            params![
                request.status,
                request.due_date,
                request.assigned_to,
                now(),
                id
            ],
        )?;
        StatusLog::record(
            conn,
            EntityType::Observation,
            id,
            Some(previous.as_str()),
            request.status.as_str(),
            actor.id,
            "Corrective action updated",
        )?;
        info!(observation_id = id, from = %previous, to = %request.status, "corrective action updated");

        Self::find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("Observation not found"))
    }

    /// Removes the observation, its verifications (by cascade) and its
    /// status-log rows.
    pub fn delete_by_id(conn: &Connection, id: i64) -> AppResult<()> {
        StatusLog::delete_by_entity(conn, EntityType::Observation, id)?;
        let deleted = conn.execute("DELETE FROM observations WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(AppError::not_found("Observation not found"));
        }
        Ok(())
    }
}
