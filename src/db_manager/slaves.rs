use rusqlite::params;

use super::DbManager;
use crate::models::{Slave, SlaveType};
use crate::protocol::Table;

impl DbManager {
    pub fn insert_slave(&self, slave: &Slave) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO SLAVES_table (slave_media_mrl, slave_type, slave_priority, slave_uri)
             VALUES (?1, ?2, ?3, ?4)",
            params![slave.media_path, slave.slave_type as i64, slave.priority, slave.uri],
        )?;
        self.notify(&[Table::Slave]);
        Ok(())
    }

    /// Slaves for one media, highest priority first.
    pub fn get_slaves(&self, media_path: &str) -> Result<Vec<Slave>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT slave_media_mrl, slave_type, slave_priority, slave_uri FROM SLAVES_table
             WHERE slave_media_mrl = ?1 ORDER BY slave_priority DESC, slave_uri",
        )?;
        let slaves = stmt.query_map(params![media_path], |row| {
            let raw_type: i64 = row.get(1)?;
            Ok(Slave {
                media_path: row.get(0)?,
                slave_type: SlaveType::from_i64(raw_type).unwrap_or(SlaveType::Subtitle),
                priority: row.get(2)?,
                uri: row.get(3)?,
            })
        })?;
        slaves.collect()
    }

    pub fn delete_slaves_for_media(&self, media_path: &str) -> Result<usize, rusqlite::Error> {
        let removed = self.conn.execute(
            "DELETE FROM SLAVES_table WHERE slave_media_mrl = ?1",
            params![media_path],
        )?;
        if removed > 0 {
            self.notify(&[Table::Slave]);
        }
        Ok(removed)
    }
}
