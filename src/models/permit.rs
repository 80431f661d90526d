use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    now, parse_date,
    points::{award_points, PERMIT_CLOSED, PERMIT_ISSUED},
    require_text,
    status_log::{EntityType, StatusLog},
    today,
    user::UserAuthenticationData,
};
use crate::error::{AppError, AppResult};

text_enum! {
    PermitStatus {
        Open => "Open",
        Closed => "Closed",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Permit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub permit_number: String,
    pub permit_type: String,
    pub area: String,
    pub description: String,
    pub valid_from: String,
    pub valid_to: String,
    pub issued_by: i64,
    pub issued_by_name: String,
    pub status: PermitStatus,
    pub closed_by: Option<String>,
    pub closed_date: Option<String>,
    pub closed_notes: Option<String>,
    pub created_at: String,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct PermitRequest {
    pub permit_number: String,
    pub permit_type: String,
    pub area: String,
    pub description: String,
    pub valid_from: String,
    pub valid_to: String,
}
#[derive(Debug, Default, Deserialize)]
pub struct PermitQuery {
    pub status: Option<PermitStatus>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct PermitCloseRequest {
    #[serde(default)]
    pub remarks: String,
}

impl Permit {
    const COLUMNS: &'static str = "id, permit_number, permit_type, area, description, valid_from, \
        valid_to, issued_by, issued_by_name, status, closed_by, closed_date, closed_notes, created_at";

    pub fn from_request(request: PermitRequest, issuer: &UserAuthenticationData) -> Self {
        Self {
            id: None,
            permit_number: request.permit_number.trim().to_string(),
            permit_type: request.permit_type,
            area: request.area,
            description: request.description,
            valid_from: request.valid_from,
            valid_to: request.valid_to,
            issued_by: issuer.id,
            issued_by_name: issuer.name.clone(),
            status: PermitStatus::Open,
            closed_by: None,
            closed_date: None,
            closed_notes: None,
            created_at: now(),
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            permit_number: row.get("permit_number")?,
            permit_type: row.get("permit_type")?,
            area: row.get("area")?,
            description: row.get("description")?,
            valid_from: row.get("valid_from")?,
            valid_to: row.get("valid_to")?,
            issued_by: row.get("issued_by")?,
            issued_by_name: row.get("issued_by_name")?,
            status: row.get("status")?,
            closed_by: row.get("closed_by")?,
            closed_date: row.get("closed_date")?,
            closed_notes: row.get("closed_notes")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Inserts the permit and credits the issuer.
    pub fn save(&mut self, conn: &Connection) -> AppResult<i64> {
        require_text("Permit number", &self.permit_number)?;
        require_text("Permit type", &self.permit_type)?;
        require_text("Area", &self.area)?;
        require_text("Description", &self.description)?;
        let valid_from = parse_date("Valid from", &self.valid_from)?;
        let valid_to = parse_date("Valid to", &self.valid_to)?;
        if valid_to < valid_from {
            return Err(AppError::validation("Valid to must not precede valid from"));
        }
        let duplicate: Option<i64> = conn
            .query_row(
                "SELECT id FROM permits WHERE permit_number = ?1",
                params![self.permit_number],
                |row| row.get(0),
            )
            .optional()?;
        if duplicate.is_some() {
            return Err(AppError::conflict("Permit number already exists"));
        }

        conn.execute(
            "INSERT INTO permits (permit_number, permit_type, area, description, valid_from,
                                  valid_to, issued_by, issued_by_name, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                self.permit_number,
                self.permit_type,
                self.area,
                self.description,
                self.valid_from,
                self.valid_to,
                self.issued_by,
                self.issued_by_name,
                self.status,
                self.created_at
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);

        award_points(
            conn,
            self.issued_by,
            PERMIT_ISSUED,
            &format!("Issued permit {}", self.permit_number),
        )?;
        info!(permit_id = id, permit_number = %self.permit_number, "permit issued");
        Ok(id)
    }

    pub fn find_many(conn: &Connection, query: &PermitQuery) -> AppResult<Vec<Permit>> {
        let permits = match query.status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM permits WHERE status = ?1 ORDER BY id DESC",
                    Self::COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status], Self::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM permits ORDER BY id DESC",
                    Self::COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], Self::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(permits)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Option<Permit>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM permits WHERE id = ?1", Self::COLUMNS),
                params![id],
                Self::from_row,
            )
            .optional()?)
    }

    pub fn close(
        conn: &Connection,
        id: i64,
        closer: &UserAuthenticationData,
        remarks: &str,
    ) -> AppResult<Permit> {
        let permit =
            Self::find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("Permit not found"))?;
        if permit.status == PermitStatus::Closed {
            return Err(AppError::conflict("Permit is already closed"));
        }

        conn.execute(
            "UPDATE permits SET status = ?1, closed_by = ?2, closed_date = ?3, closed_notes = ?4
             WHERE id = ?5",
            params![PermitStatus::Closed, closer.name, today(), remarks.trim(), id],
        )?;
        StatusLog::record(
            conn,
            EntityType::Permit,
            id,
            Some(permit.status.as_str()),
            PermitStatus::Closed.as_str(),
            closer.id,
            remarks.trim(),
        )?;
        award_points(
            conn,
            closer.id,
            PERMIT_CLOSED,
            &format!("Closed permit {}", permit.permit_number),
        )?;
        info!(permit_id = id, "permit closed");

        Self::find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("Permit not found"))
    }

    pub fn delete_by_id(conn: &Connection, id: i64) -> AppResult<()> {
        StatusLog::delete_by_entity(conn, EntityType::Permit, id)?;
        let deleted = conn.execute("DELETE FROM permits WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(AppError::not_found("Permit not found"));
        }
        Ok(())
    }
}
