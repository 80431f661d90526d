use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::now;
use crate::error::AppResult;

text_enum! {
    EntityType {
        Observation => "observation",
        Permit => "permit",
        Equipment => "equipment",
    }
}

/// One row of the append-only status audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct StatusLog {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub previous_status: Option<String>,
    pub new_status: String,
    pub changed_by: i64,
    pub remarks: String,
    pub created_at: String,
}
#[derive(Debug, Deserialize)]
pub struct StatusLogPath {
    pub entity_type: EntityType,
    pub entity_id: i64,
}

impl StatusLog {
    pub fn record(
        conn: &Connection,
        entity_type: EntityType,
        entity_id: i64,
        previous_status: Option<&str>,
        new_status: &str,
        changed_by: i64,
        remarks: &str,
    ) -> AppResult<i64> {
        conn.execute(
            "INSERT INTO status_log
                (entity_type, entity_id, previous_status, new_status, changed_by, remarks, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entity_type,
                entity_id,
                previous_status,
                new_status,
                changed_by,
                remarks,
                now()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_entity(
        conn: &Connection,
        entity_type: EntityType,
        entity_id: i64,
    ) -> AppResult<Vec<StatusLog>> {
        let mut stmt = conn.prepare(
            "SELECT id, entity_type, entity_id, previous_status, new_status, changed_by,
                    remarks, created_at
             FROM status_log
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![entity_type, entity_id], |row| {
                Ok(StatusLog {
                    id: row.get("id")?,
                    entity_type: row.get("entity_type")?,
                    entity_id: row.get("entity_id")?,
                    previous_status: row.get("previous_status")?,
                    new_status: row.get("new_status")?,
                    changed_by: row.get("changed_by")?,
                    remarks: row.get("remarks")?,
                    created_at: row.get("created_at")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_by_entity(
        conn: &Connection,
        entity_type: EntityType,
        entity_id: i64,
    ) -> AppResult<usize> {
        Ok(conn.execute(
            "DELETE FROM status_log WHERE entity_type = ?1 AND entity_id = ?2",
            params![entity_type, entity_id],
        )?)
    }
}
