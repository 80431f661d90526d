use rusqlite::{params, params_from_iter, types::ToSql, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    now, parse_date, require_text,
    user::{Role, UserAuthenticationData},
};
use crate::error::{AppError, AppResult};

text_enum! {
    CalendarEventType {
        Audit => "audit",
        Drill => "drill",
        Inspection => "inspection",
        Training => "training",
        Meeting => "meeting",
        Other => "other",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    pub event_type: CalendarEventType,
    pub start_date: String,
    pub end_date: String,
    pub area: Option<String>,
    pub description: Option<String>,
    pub created_by: i64,
    pub created_by_name: String,
    pub created_at: String,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct CalendarEventRequest {
    pub title: String,
    pub event_type: CalendarEventType,
    pub start_date: String,
    pub end_date: Option<String>,
    pub area: Option<String>,
    pub description: Option<String>,
}
/// Date window; an event matches when it overlaps `[from, to]`.
#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl CalendarEvent {
    const COLUMNS: &'static str = "id, title, event_type, start_date, end_date, area, \
        description, created_by, created_by_name, created_at";

    pub fn from_request(request: CalendarEventRequest, creator: &UserAuthenticationData) -> Self {
        let end_date = request
            .end_date
            .unwrap_or_else(|| request.start_date.clone());
        Self {
            id: None,
            title: request.title,
            event_type: request.event_type,
            start_date: request.start_date,
            end_date,
            area: request.area,
            description: request.description,
            created_by: creator.id,
            created_by_name: creator.name.clone(),
            created_at: now(),
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            title: row.get("title")?,
            event_type: row.get("event_type")?,
            start_date: row.get("start_date")?,
            end_date: row.get("end_date")?,
            area: row.get("area")?,
            description: row.get("description")?,
            created_by: row.get("created_by")?,
            created_by_name: row.get("created_by_name")?,
            created_at: row.get("created_at")?,
        })
    }

    fn validate(&self) -> AppResult<()> {
        require_text("Title", &self.title)?;
        let start = parse_date("Start date", &self.start_date)?;
        let end = parse_date("End date", &self.end_date)?;
        if end < start {
            return Err(AppError::validation("End date must not precede start date"));
        }
        Ok(())
    }

    pub fn save(&mut self, conn: &Connection) -> AppResult<i64> {
        self.validate()?;
        conn.execute(
            "INSERT INTO calendar_events (title, event_type, start_date, end_date, area,
                                          description, created_by, created_by_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                self.title,
                self.event_type,
                self.start_date,
                self.end_date,
                self.area,
                self.description,
                self.created_by,
                self.created_by_name,
                self.created_at
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        info!(event_id = id, event_type = %self.event_type, "calendar event scheduled");
        Ok(id)
    }

    pub fn find_many(conn: &Connection, query: &CalendarQuery) -> AppResult<Vec<CalendarEvent>> {
        let mut sql = format!("SELECT {} FROM calendar_events WHERE 1 = 1", Self::COLUMNS);
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(from) = &query.from {
            parse_date("From", from)?;
            values.push(Box::new(from.clone()));
            sql.push_str(&format!(" AND end_date >= ?{}", values.len()));
        }
        if let Some(to) = &query.to {
            parse_date("To", to)?;
            values.push(Box::new(to.clone()));
            sql.push_str(&format!(" AND start_date <= ?{}", values.len()));
        }
        sql.push_str(" ORDER BY start_date ASC, id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(values.iter().map(|v| v.as_ref())), Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Option<CalendarEvent>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM calendar_events WHERE id = ?1", Self::COLUMNS),
                params![id],
                Self::from_row,
            )
            .optional()?)
    }

    fn find_owned(
        conn: &Connection,
        id: i64,
        actor: &UserAuthenticationData,
    ) -> AppResult<CalendarEvent> {
        let event = Self::find_by_id(conn, id)?
            .ok_or_else(|| AppError::not_found("Calendar event not found"))?;
        if event.created_by != actor.id && actor.role != Role::Admin {
            return Err(AppError::forbidden(
                "Only the organiser or an admin may change this event",
            ));
        }
        Ok(event)
    }

    /// Replaces the editable fields. Creator and creation time are kept.
    pub fn update(
        conn: &Connection,
        id: i64,
        request: CalendarEventRequest,
        actor: &UserAuthenticationData,
    ) -> AppResult<CalendarEvent> {
        let current = Self::find_owned(conn, id, actor)?;
        let mut event = Self::from_request(request, actor);
        event.id = current.id;
        event.created_by = current.created_by;
        event.created_by_name = current.created_by_name;
        event.created_at = current.created_at;
        event.validate()?;

        conn.execute(
            "UPDATE calendar_events
             SET title = ?1, event_type = ?2, start_date = ?3, end_date = ?4, area = ?5,
                 description = ?6
             WHERE id = ?7",
            params![
                event.title,
                event.event_type,
                event.start_date,
                event.end_date,
                event.area,
                event.description,
                id
            ],
        )?;
        Ok(event)
    }

    pub fn delete_by_id(conn: &Connection, id: i64, actor: &UserAuthenticationData) -> AppResult<()> {
        Self::find_owned(conn, id, actor)?;
        conn.execute("DELETE FROM calendar_events WHERE id = ?1", params![id])?;
        Ok(())
    }
}
