use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::AppResult;

/// Lookup categories backfilled from historical records, with the column
/// each one is read from.
const RECONCILED_SOURCES: [(&str, &str, &str); 5] = [
    ("area", "observations", "area"),
    ("observation_type", "observations", "observation_type"),
    ("activity_type", "observations", "activity_type"),
    ("permit_type", "permits", "permit_type"),
    ("equipment_type", "equipment", "equipment_type"),
];

#[derive(Debug, Clone, Serialize)]
pub struct DropdownOption {
    pub id: i64,
    pub category: String,
    pub value: String,
}

impl DropdownOption {
    pub fn find_by_category(conn: &Connection, category: &str) -> AppResult<Vec<DropdownOption>> {
        let mut stmt = conn.prepare(
            "SELECT id, category, value FROM dropdown_options
             WHERE category = ?1
             ORDER BY value COLLATE NOCASE ASC",
        )?;
        let options = stmt
            .query_map(params![category], |row| {
                Ok(DropdownOption {
                    id: row.get("id")?,
                    category: row.get("category")?,
                    value: row.get("value")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(options)
    }

    /// Copies distinct historical values into the lookup table. Returns the
    /// number of options added; existing options are left alone.
    pub fn reconcile(conn: &Connection) -> AppResult<usize> {
        let mut inserted = 0;
        for (category, table, column) in RECONCILED_SOURCES {
            inserted += conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO dropdown_options (category, value)
                     SELECT DISTINCT ?1, TRIM({column}) FROM {table}
                     WHERE TRIM(COALESCE({column}, '')) != ''"
                ),
                params![category],
            )?;
        }
        Ok(inserted)
    }
}
