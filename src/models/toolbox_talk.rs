use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    json_list, now, parse_date,
    points::{award_points, TOOLBOX_TALK_RECORDED},
    require_text,
    user::UserAuthenticationData,
};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
pub struct ToolboxTalk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub topic: String,
    pub date: String,
    pub area: String,
    pub conducted_by: i64,
    pub conducted_by_name: String,
    pub attendees: Vec<String>,
    pub notes: Option<String>,
    pub created_at: String,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ToolboxTalkRequest {
    pub topic: String,
    pub date: String,
    pub area: String,
    #[serde(default)]
    pub attendees: Vec<String>,
    pub notes: Option<String>,
}

impl ToolboxTalk {
    pub fn from_request(request: ToolboxTalkRequest, presenter: &UserAuthenticationData) -> Self {
        Self {
            id: None,
            topic: request.topic,
            date: request.date,
            area: request.area,
            conducted_by: presenter.id,
            conducted_by_name: presenter.name.clone(),
            attendees: request
                .attendees
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            notes: request.notes,
            created_at: now(),
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let attendees: String = row.get("attendees")?;
        Ok(Self {
            id: Some(row.get("id")?),
            topic: row.get("topic")?,
            date: row.get("date")?,
            area: row.get("area")?,
            conducted_by: row.get("conducted_by")?,
            conducted_by_name: row.get("conducted_by_name")?,
            attendees: json_list(&attendees)?,
            notes: row.get("notes")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Records the talk and credits the presenter.
    pub fn save(&mut self, conn: &Connection) -> AppResult<i64> {
        require_text("Topic", &self.topic)?;
        require_text("Area", &self.area)?;
        parse_date("Date", &self.date)?;

        conn.execute(
            "INSERT INTO toolbox_talks (topic, date, area, conducted_by, conducted_by_name,
                                        attendees, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                self.topic,
                self.date,
                self.area,
                self.conducted_by,
                self.conducted_by_name,
                serde_json::to_string(&self.attendees)?,
                self.notes,
                self.created_at
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);

        award_points(
            conn,
            self.conducted_by,
            TOOLBOX_TALK_RECORDED,
            &format!("Toolbox talk: {}", self.topic),
        )?;
        info!(toolbox_talk_id = id, attendees = self.attendees.len(), "toolbox talk recorded");
        Ok(id)
    }

    pub fn find_many(conn: &Connection) -> AppResult<Vec<ToolboxTalk>> {
        let mut stmt = conn.prepare(
            "SELECT id, topic, date, area, conducted_by, conducted_by_name, attendees, notes,
                    created_at
             FROM toolbox_talks
             ORDER BY date DESC, id DESC",
        )?;
        let talks = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(talks)
    }

    pub fn delete_by_id(conn: &Connection, id: i64) -> AppResult<()> {
        let deleted = conn.execute("DELETE FROM toolbox_talks WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(AppError::not_found("Toolbox talk not found"));
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

    #[test]
    fn recorded_talks_keep_their_attendees() {
        let db = Database::open_in_memory().expect("db");
        let presenter = seed_user(&db, "Ana", "EMP-1", Role::Supervisor);
        let principal = presenter.principal();
        let request = ToolboxTalkRequest {
            topic: "Working at height".into(),
            date: "2024-05-06".into(),
            area: "Scaffold Bay".into(),
            attendees: vec!["Ben".into(), "  ".into(), "Cid ".into()],
            notes: None,
        };

        db.transaction(|tx| ToolboxTalk::from_request(request, &principal).save(tx))
            .expect("record");
        let talks = db
            .with_conn(|conn| ToolboxTalk::find_many(conn))
            .expect("list");
        assert_eq!(talks.len(), 1);
        assert_eq!(talks[0].attendees, ["Ben", "Cid"]);
    }

    #[test]
    fn deleting_a_missing_talk_is_not_found() {
        let db = Database::open_in_memory().expect("db");
        let result = db.transaction(|tx| ToolboxTalk::delete_by_id(tx, 1));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
