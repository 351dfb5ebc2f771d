use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use crate::error::{Result, TrackerError};

/// company, title, url, location: the physical column order of a sheet.
pub type SheetRow = [String; 4];

/// Spreadsheet-like persisted ledger. Rows are 1-indexed.
pub trait LedgerStore: Send {
    fn get_all_rows(&self, sheet: &str) -> Result<Vec<SheetRow>>;
    fn write_row(&mut self, sheet: &str, row_id: usize, values: SheetRow) -> Result<()>;
}

/// A sheet store kept in a local SQLite file, one table row per cell row.
pub struct SqliteSheetStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteSheetStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrackerError::Config(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let store = Self {
            conn: Connection::open(path)?,
            path: Some(path.to_path_buf()),
        };
        store.init()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sheet_rows (
                sheet TEXT NOT NULL,
                row_number INTEGER NOT NULL CHECK (row_number >= 1),
                c1 TEXT NOT NULL DEFAULT '',
                c2 TEXT NOT NULL DEFAULT '',
                c3 TEXT NOT NULL DEFAULT '',
                c4 TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (sheet, row_number)
            );
            "#,
        )?;
        Ok(())
    }

    fn row_to_cells(row: &rusqlite::Row) -> rusqlite::Result<(usize, SheetRow)> {
        let row_number: i64 = row.get(0)?;
        Ok((
            row_number as usize,
            [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?],
        ))
    }
}

impl LedgerStore for SqliteSheetStore {
    fn get_all_rows(&self, sheet: &str) -> Result<Vec<SheetRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT row_number, c1, c2, c3, c4 FROM sheet_rows WHERE sheet = ?1 ORDER BY row_number",
        )?;
        let stored = stmt.query_map([sheet], Self::row_to_cells)?;

        // Row numbers never written come back as blank rows, so a row's
        // position in the result is always its row number minus one.
        let mut rows: Vec<SheetRow> = Vec::new();
        for entry in stored {
            let (row_number, cells) = entry?;
            rows.resize(row_number - 1, SheetRow::default());
            rows.push(cells);
        }
        Ok(rows)
    }

    fn write_row(&mut self, sheet: &str, row_id: usize, values: SheetRow) -> Result<()> {
        let [c1, c2, c3, c4] = values;
        self.conn.execute(
            "INSERT INTO sheet_rows (sheet, row_number, c1, c2, c3, c4)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(sheet, row_number) DO UPDATE SET
                c1 = excluded.c1, c2 = excluded.c2, c3 = excluded.c3, c4 = excluded.c4",
            params![sheet, row_id as i64, c1, c2, c3, c4],
        )?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: [&str; 4]) -> SheetRow {
        values.map(str::to_string)
    }

    #[test]
    fn test_rows_come_back_in_row_order() {
        let mut store = SqliteSheetStore::in_memory().unwrap();
        store.write_row("Applications", 2, row(["B", "t", "u", "l"])).unwrap();
        store.write_row("Applications", 1, row(["A", "t", "u", "l"])).unwrap();
        store.write_row("Ignore", 1, row(["C", "t", "u", "l"])).unwrap();

        let rows = store.get_all_rows("Applications").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "A");
        assert_eq!(rows[1][0], "B");
        assert_eq!(store.get_all_rows("Ignore").unwrap().len(), 1);
        assert!(store.get_all_rows("Missing").unwrap().is_empty());
    }

    #[test]
    fn test_write_row_overwrites_range() {
        let mut store = SqliteSheetStore::in_memory().unwrap();
        store.write_row("Applications", 1, row(["A", "t", "u", "l"])).unwrap();
        store.write_row("Applications", 1, row(["Z", "t2", "u2", "l2"])).unwrap();

        let rows = store.get_all_rows("Applications").unwrap();
        assert_eq!(rows, vec![row(["Z", "t2", "u2", "l2"])]);
    }

    #[test]
    fn test_unwritten_rows_come_back_blank() {
        let mut store = SqliteSheetStore::in_memory().unwrap();
        store.write_row("Applications", 1, row(["A", "t", "u", "l"])).unwrap();
        store.write_row("Applications", 2, row(["B", "t", "u", "l"])).unwrap();
        store.write_row("Applications", 4, row(["D", "t", "u", "l"])).unwrap();

        let rows = store.get_all_rows("Applications").unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], SheetRow::default());
        assert_eq!(rows[3][0], "D");
    }

    #[test]
    fn test_row_zero_is_rejected() {
        let mut store = SqliteSheetStore::in_memory().unwrap();
        assert!(store.write_row("Applications", 0, row(["A", "t", "u", "l"])).is_err());
    }
}
