use crate::error::{AppError, AppResult};
use actix_web::web;
use rusqlite::{Connection, Transaction};
use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    employee_id  TEXT NOT NULL UNIQUE,
    role         TEXT NOT NULL DEFAULT 'user',
    points       INTEGER NOT NULL DEFAULT 0,
    level        TEXT NOT NULL DEFAULT 'Bronze',
    approved     INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS points_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    delta       INTEGER NOT NULL,
    reason      TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_points_history_user ON points_history(user_id);

CREATE TABLE IF NOT EXISTS observations (
    id                             INTEGER PRIMARY KEY AUTOINCREMENT,
    date                           TEXT NOT NULL,
    time                           TEXT,
    area                           TEXT NOT NULL,
    observation_type               TEXT NOT NULL,
    observation_class              TEXT NOT NULL CHECK(observation_class IN ('positive','negative')),
    activity_type                  TEXT NOT NULL DEFAULT '',
    description                    TEXT NOT NULL,
    direct_cause                   TEXT,
    root_cause                     TEXT,
    immediate_action               TEXT,
    corrective_action              TEXT,
    corrective_action_assigned_to  TEXT,
    corrective_action_due_date     TEXT,
    corrective_action_status       TEXT NOT NULL DEFAULT 'Not Started'
        CHECK(corrective_action_status IN ('Not Started','In Progress','Completed')),
    risk_level                     TEXT NOT NULL CHECK(risk_level IN ('Low','Medium','High')),
    status                         TEXT NOT NULL DEFAULT 'Open' CHECK(status IN ('Open','Closed')),
    reported_by                    TEXT NOT NULL,
    reported_by_id                 TEXT NOT NULL,
    evidence                       TEXT NOT NULL DEFAULT '[]',
    closed_by                      TEXT,
    closed_date                    TEXT,
    closed_notes                   TEXT,
    close_evidence                 TEXT NOT NULL DEFAULT '[]',
    created_at                     TEXT NOT NULL,
    updated_at                     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_observations_pending
    ON observations(corrective_action_status, status);

CREATE TABLE IF NOT EXISTS verifications (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    observation_id  INTEGER NOT NULL REFERENCES observations(id) ON DELETE CASCADE,
    verifier_id     INTEGER NOT NULL REFERENCES users(id),
    remarks         TEXT NOT NULL CHECK(length(trim(remarks)) > 0),
    decision        TEXT NOT NULL CHECK(decision IN ('APPROVED','REJECTED')),
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_verifications_observation ON verifications(observation_id);

CREATE TABLE IF NOT EXISTS status_log (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type      TEXT NOT NULL,
    entity_id        INTEGER NOT NULL,
    previous_status  TEXT,
    new_status       TEXT NOT NULL,
    changed_by       INTEGER NOT NULL,
    remarks          TEXT NOT NULL DEFAULT '',
    created_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_status_log_entity ON status_log(entity_type, entity_id);

CREATE TABLE IF NOT EXISTS permits (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    permit_number   TEXT NOT NULL UNIQUE,
    permit_type     TEXT NOT NULL,
    area            TEXT NOT NULL,
    description     TEXT NOT NULL,
    valid_from      TEXT NOT NULL,
    valid_to        TEXT NOT NULL,
    issued_by       INTEGER NOT NULL REFERENCES users(id),
    issued_by_name  TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'Open' CHECK(status IN ('Open','Closed')),
    closed_by       TEXT,
    closed_date     TEXT,
    closed_notes    TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS toolbox_talks (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    topic              TEXT NOT NULL,
    date               TEXT NOT NULL,
    area               TEXT NOT NULL,
    conducted_by       INTEGER NOT NULL REFERENCES users(id),
    conducted_by_name  TEXT NOT NULL,
    attendees          TEXT NOT NULL DEFAULT '[]',
    notes              TEXT,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS equipment (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_number            TEXT NOT NULL UNIQUE,
    name                  TEXT NOT NULL,
    equipment_type        TEXT NOT NULL,
    area                  TEXT NOT NULL,
    status                TEXT NOT NULL DEFAULT 'In Service'
        CHECK(status IN ('In Service','Under Maintenance','Out of Service')),
    last_inspection_date  TEXT,
    next_inspection_date  TEXT,
    notes                 TEXT,
    registered_by         INTEGER NOT NULL REFERENCES users(id),
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_equipment_next_inspection ON equipment(next_inspection_date);

CREATE TABLE IF NOT EXISTS calendar_events (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    title            TEXT NOT NULL,
    event_type       TEXT NOT NULL,
    start_date       TEXT NOT NULL,
    end_date         TEXT NOT NULL,
    area             TEXT,
    description      TEXT,
    created_by       INTEGER NOT NULL REFERENCES users(id),
    created_by_name  TEXT NOT NULL,
    created_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_calendar_events_dates ON calendar_events(start_date, end_date);

CREATE TABLE IF NOT EXISTS training_records (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    course          TEXT NOT NULL,
    completed_date  TEXT NOT NULL,
    expiry_date     TEXT,
    recorded_by     INTEGER NOT NULL REFERENCES users(id),
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_training_records_user ON training_records(user_id, course);

CREATE TABLE IF NOT EXISTS quiz_questions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    question        TEXT NOT NULL,
    options         TEXT NOT NULL,
    correct_option  INTEGER NOT NULL,
    points          INTEGER NOT NULL CHECK(points > 0),
    active          INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS quiz_answers (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    question_id    INTEGER NOT NULL REFERENCES quiz_questions(id) ON DELETE CASCADE,
    user_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    chosen_option  INTEGER NOT NULL,
    correct        INTEGER NOT NULL,
    created_at     TEXT NOT NULL,
    UNIQUE(question_id, user_id)
);

CREATE TABLE IF NOT EXISTS dropdown_options (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    category  TEXT NOT NULL,
    value     TEXT NOT NULL,
    UNIQUE(category, value)
);
"#;

/// Shared handle to the SQLite store.
///
/// Cloning is cheap; every clone talks to the same connection. Handlers reach
/// it through `web::Data<Database>` and hand `&Connection` down to models.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> AppResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> AppResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::internal("database lock poisoned"))
    }

    /// Runs `func` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, func: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> AppResult<T>,
    {
        let mut guard = self.lock()?;
        func(&mut guard)
    }

    /// Runs `func` inside a transaction. Commits on `Ok`, rolls back otherwise.
    pub fn transaction<F, T>(&self, func: F) -> AppResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> AppResult<T>,
    {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let value = func(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// [`Database::with_conn`] moved onto the blocking thread pool.
    pub async fn run<F, T>(&self, func: F) -> AppResult<T>
    where
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        web::block(move || db.with_conn(func))
            .await
            .map_err(|_| AppError::internal("blocking task failed"))?
    }

    /// [`Database::transaction`] moved onto the blocking thread pool.
    pub async fn run_in_transaction<F, T>(&self, func: F) -> AppResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        web::block(move || db.transaction(func))
            .await
            .map_err(|_| AppError::internal("blocking task failed"))?
    }
}

fn migrate(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn table_names(db: &Database) -> Vec<String> {
        db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .expect("table names")
    }

    #[test]
    fn migration_creates_every_table() {
        let db = Database::open_in_memory().expect("open");
        let names = table_names(&db);
        for table in [
            "calendar_events",
            "dropdown_options",
            "equipment",
            "observations",
            "permits",
            "points_history",
            "quiz_answers",
            "quiz_questions",
            "status_log",
            "toolbox_talks",
            "training_records",
            "users",
            "verifications",
        ] {
            assert!(names.iter().any(|name| name == table), "missing {table}");
        }
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("safetrack.sqlite");
        {
            let db = Database::open(&path).expect("open");
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO dropdown_options (category, value) VALUES (?1, ?2)",
                    params!["area", "Yard"],
                )?;
                Ok(())
            })
            .expect("insert");
        }
        let db = Database::open(&path).expect("reopen");
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM dropdown_options", [], |row| {
                    row.get(0)
                })?)
            })
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = Database::open_in_memory().expect("open");
        let result: AppResult<()> = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO dropdown_options (category, value) VALUES ('area', 'Yard')",
                [],
            )?;
            Err(AppError::validation("abort"))
        });
        assert!(result.is_err());
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM dropdown_options", [], |row| {
                    row.get(0)
                })?)
            })
            .expect("count");
        assert_eq!(count, 0);
    }
}
