use rusqlite::params;

use super::DbManager;
use crate::protocol::Table;

impl DbManager {
    /// Adds a watched directory. Adding a known path is a no-op.
    pub fn add_custom_directory(&self, path: &str) -> Result<bool, rusqlite::Error> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO CustomDirectory (path) VALUES (?1)",
            params![path],
        )?;
        if inserted > 0 {
            self.notify(&[Table::CustomDirectory]);
        }
        Ok(inserted > 0)
    }

    pub fn get_custom_directories(&self) -> Result<Vec<String>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM CustomDirectory ORDER BY path")?;
        let paths = stmt.query_map([], |row| row.get(0))?;
        paths.collect()
    }

    pub fn custom_directory_exists(&self, path: &str) -> Result<bool, rusqlite::Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM CustomDirectory WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn delete_custom_directory(&self, path: &str) -> Result<bool, rusqlite::Error> {
        let removed = self
            .conn
            .execute("DELETE FROM CustomDirectory WHERE path = ?1", params![path])?;
        if removed > 0 {
            self.notify(&[Table::CustomDirectory]);
        }
        Ok(removed > 0)
    }
}
