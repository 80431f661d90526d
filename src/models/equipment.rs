use rusqlite::{params, params_from_iter, types::ToSql, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    now, parse_date, require_text,
    status_log::{EntityType, StatusLog},
    user::UserAuthenticationData,
};
use crate::error::{AppError, AppResult};

text_enum! {
    EquipmentStatus {
        InService => "In Service",
        UnderMaintenance => "Under Maintenance",
        OutOfService => "Out of Service",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Equipment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub tag_number: String,
    pub name: String,
    pub equipment_type: String,
    pub area: String,
    pub status: EquipmentStatus,
    pub last_inspection_date: Option<String>,
    pub next_inspection_date: Option<String>,
    pub notes: Option<String>,
    pub registered_by: i64,
    pub created_at: String,
    pub updated_at: String,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct EquipmentRequest {
    pub tag_number: String,
    pub name: String,
    pub equipment_type: String,
    pub area: String,
    pub next_inspection_date: Option<String>,
    pub notes: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
pub struct EquipmentQuery {
    pub status: Option<EquipmentStatus>,
    pub area: Option<String>,
}
#[derive(Debug, Default, Deserialize)]
pub struct InspectionsDueQuery {
    pub before: Option<String>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct EquipmentStatusRequest {
    pub status: EquipmentStatus,
    #[serde(default)]
    pub remarks: String,
    pub inspection_date: Option<String>,
    pub next_inspection_date: Option<String>,
}

impl Equipment {
    const COLUMNS: &'static str = "id, tag_number, name, equipment_type, area, status, \
        last_inspection_date, next_inspection_date, notes, registered_by, created_at, updated_at";

    pub fn from_request(request: EquipmentRequest, registrar: &UserAuthenticationData) -> Self {
        let timestamp = now();
        Self {
            id: None,
            tag_number: request.tag_number.trim().to_string(),
            name: request.name,
            equipment_type: request.equipment_type.trim().to_string(),
            area: request.area.trim().to_string(),
            status: EquipmentStatus::InService,
            last_inspection_date: None,
            next_inspection_date: request.next_inspection_date,
            notes: request.notes,
            registered_by: registrar.id,
            created_at: timestamp.clone(),
            updated_at: timestamp,
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            tag_number: row.get("tag_number")?,
            name: row.get("name")?,
            equipment_type: row.get("equipment_type")?,
            area: row.get("area")?,
            status: row.get("status")?,
            last_inspection_date: row.get("last_inspection_date")?,
            next_inspection_date: row.get("next_inspection_date")?,
            notes: row.get("notes")?,
            registered_by: row.get("registered_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn save(&mut self, conn: &Connection) -> AppResult<i64> {
        require_text("Tag number", &self.tag_number)?;
        require_text("Name", &self.name)?;
        require_text("Equipment type", &self.equipment_type)?;
        require_text("Area", &self.area)?;
        if let Some(next) = &self.next_inspection_date {
            parse_date("Next inspection date", next)?;
        }
        let duplicate: Option<i64> = conn
            .query_row(
                "SELECT id FROM equipment WHERE tag_number = ?1",
                params![self.tag_number],
                |row| row.get(0),
            )
            .optional()?;
        if duplicate.is_some() {
            return Err(AppError::conflict("Tag number already registered"));
        }

        conn.execute(
            "INSERT INTO equipment (tag_number, name, equipment_type, area, status,
                                    next_inspection_date, notes, registered_by, created_at,
                                    updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                self.tag_number,
                self.name,
                self.equipment_type,
                self.area,
                self.status,
                self.next_inspection_date,
                self.notes,
                self.registered_by,
                self.created_at,
                self.updated_at
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        info!(equipment_id = id, tag_number = %self.tag_number, "equipment registered");
        Ok(id)
    }

    pub fn find_many(conn: &Connection, query: &EquipmentQuery) -> AppResult<Vec<Equipment>> {
        let mut sql = format!("SELECT {} FROM equipment WHERE 1 = 1", Self::COLUMNS);
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = query.status {
            values.push(Box::new(status));
            sql.push_str(&format!(" AND status = ?{}", values.len()));
        }
        if let Some(area) = &query.area {
            values.push(Box::new(area.clone()));
            sql.push_str(&format!(" AND area = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY tag_number ASC");

        let mut stmt = conn.prepare(&sql)?;
        let equipment = stmt
            .query_map(params_from_iter(values.iter().map(|v| v.as_ref())), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(equipment)
    }

    /// Equipment still in use whose next inspection falls on or before `date`.
    pub fn find_inspections_due(conn: &Connection, date: &str) -> AppResult<Vec<Equipment>> {
        parse_date("Date", date)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM equipment
             WHERE next_inspection_date IS NOT NULL
               AND next_inspection_date <= ?1
               AND status != ?2
             ORDER BY next_inspection_date ASC, tag_number ASC",
            Self::COLUMNS
        ))?;
        let equipment = stmt
            .query_map(params![date, EquipmentStatus::OutOfService], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(equipment)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Option<Equipment>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM equipment WHERE id = ?1", Self::COLUMNS),
                params![id],
                Self::from_row,
            )
            .optional()?)
    }

    /// Moves the equipment to a new status and appends the change to the
    /// status log. An inspection date, when given, becomes the last
    /// inspection; the next inspection date is replaced only when supplied.
    pub fn update_status(
        conn: &Connection,
        id: i64,
        request: &EquipmentStatusRequest,
        actor: &UserAuthenticationData,
    ) -> AppResult<Equipment> {
        let equipment =
            Self::find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("Equipment not found"))?;
        if equipment.status == request.status && request.inspection_date.is_none() {
            return Err(AppError::conflict(format!(
                "Equipment is already {}",
                request.status
            )));
        }
        if let Some(inspected) = &request.inspection_date {
            parse_date("Inspection date", inspected)?;
        }
        if let Some(next) = &request.next_inspection_date {
            parse_date("Next inspection date", next)?;
        }

        conn.execute(
            "UPDATE equipment
             SET status = ?1,
                 last_inspection_date = COALESCE(?2, last_inspection_date),
                 next_inspection_date = COALESCE(?3, next_inspection_date),
                 updated_at = ?4
             WHERE id = ?5",
            params![
                request.status,
                request.inspection_date,
                request.next_inspection_date,
                now(),
                id
            ],
        )?;
        StatusLog::record(
            conn,
            EntityType::Equipment,
            id,
            Some(equipment.status.as_str()),
            request.status.as_str(),
            actor.id,
            request.remarks.trim(),
        )?;
        info!(equipment_id = id, from = %equipment.status, to = %request.status, "equipment status changed");

        Self::find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("Equipment not found"))
    }

    pub fn delete_by_id(conn: &Connection, id: i64) -> AppResult<()> {
        StatusLog::delete_by_entity(conn, EntityType::Equipment, id)?;
        let deleted = conn.execute("DELETE FROM equipment WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(AppError::not_found("Equipment not found"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::models::user::Role;
    use crate::test_support::seed_user;

    fn request(tag: &str, next_inspection: Option<&str>) -> EquipmentRequest {
        EquipmentRequest {
            tag_number: tag.into(),
            name: "Mobile crane".into(),
            equipment_type: "Lifting".into(),
            area: "Yard".into(),
            next_inspection_date: next_inspection.map(String::from),
            notes: None,
        }
    }

    #[test]
    fn status_changes_are_logged() {
        let db = Database::open_in_memory().expect("db");
        let ana = seed_user(&db, "Ana", "EMP-1", Role::Supervisor);
        let principal = ana.principal();
        let id = db
            .transaction(|tx| Equipment::from_request(request("CR-01", None), &principal).save(tx))
            .expect("register");

        let update = EquipmentStatusRequest {
            status: EquipmentStatus::UnderMaintenance,
            remarks: "hydraulic leak".into(),
            inspection_date: Some("2024-05-06".into()),
            next_inspection_date: Some("2024-06-06".into()),
        };
        let updated = db
            .transaction(|tx| Equipment::update_status(tx, id, &update, &principal))
            .expect("update");
        assert_eq!(updated.status, EquipmentStatus::UnderMaintenance);
        assert_eq!(updated.last_inspection_date.as_deref(), Some("2024-05-06"));
        assert_eq!(updated.next_inspection_date.as_deref(), Some("2024-06-06"));

        let log = db
            .with_conn(|conn| StatusLog::find_by_entity(conn, EntityType::Equipment, id))
            .expect("log");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].previous_status.as_deref(), Some("In Service"));
        assert_eq!(log[0].new_status, "Under Maintenance");
        assert_eq!(log[0].remarks, "hydraulic leak");
    }

    #[test]
    fn repeating_the_current_status_conflicts() {
        let db = Database::open_in_memory().expect("db");
        let ana = seed_user(&db, "Ana", "EMP-1", Role::User);
        let principal = ana.principal();
        let id = db
            .transaction(|tx| Equipment::from_request(request("CR-02", None), &principal).save(tx))
            .expect("register");

        let update = EquipmentStatusRequest {
            status: EquipmentStatus::InService,
            remarks: String::new(),
            inspection_date: None,
            next_inspection_date: None,
        };
        let result = db.transaction(|tx| Equipment::update_status(tx, id, &update, &principal));
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn duplicate_tags_conflict() {
        let db = Database::open_in_memory().expect("db");
        let ana = seed_user(&db, "Ana", "EMP-1", Role::User);
        let principal = ana.principal();
        db.transaction(|tx| Equipment::from_request(request("CR-03", None), &principal).save(tx))
            .expect("register");
        let again = db
            .transaction(|tx| Equipment::from_request(request("CR-03", None), &principal).save(tx));
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[test]
    fn inspections_due_skip_retired_equipment() {
        let db = Database::open_in_memory().expect("db");
        let ana = seed_user(&db, "Ana", "EMP-1", Role::User);
        let principal = ana.principal();
        let retired = db
            .transaction(|tx| {
                Equipment::from_request(request("CR-10", Some("2024-05-01")), &principal).save(tx)?;
                Equipment::from_request(request("CR-11", Some("2024-09-01")), &principal).save(tx)?;
                Equipment::from_request(request("CR-12", Some("2024-04-01")), &principal).save(tx)
            })
            .expect("register");
        let retire = EquipmentStatusRequest {
            status: EquipmentStatus::OutOfService,
            remarks: "scrapped".into(),
            inspection_date: None,
            next_inspection_date: None,
        };
        db.transaction(|tx| Equipment::update_status(tx, retired, &retire, &principal))
            .expect("retire");

        let due = db
            .with_conn(|conn| Equipment::find_inspections_due(conn, "2024-06-01"))
            .expect("due");
        let tags: Vec<_> = due.iter().map(|item| item.tag_number.as_str()).collect();
        assert_eq!(tags, ["CR-10"]);
    }

    #[test]
    fn deleting_removes_the_status_trail() {
        let db = Database::open_in_memory().expect("db");
        let ana = seed_user(&db, "Ana", "EMP-1", Role::User);
        let principal = ana.principal();
        let id = db
            .transaction(|tx| Equipment::from_request(request("CR-20", None), &principal).save(tx))
            .expect("register");
        let update = EquipmentStatusRequest {
            status: EquipmentStatus::OutOfService,
            remarks: String::new(),
            inspection_date: None,
            next_inspection_date: None,
        };
        db.transaction(|tx| Equipment::update_status(tx, id, &update, &principal))
            .expect("update");

        db.transaction(|tx| Equipment::delete_by_id(tx, id))
            .expect("delete");
        let log = db
            .with_conn(|conn| StatusLog::find_by_entity(conn, EntityType::Equipment, id))
            .expect("log");
        assert!(log.is_empty());
    }
}
