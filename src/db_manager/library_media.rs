use std::collections::HashSet;

use rusqlite::{params, Row};

use super::DbManager;
use crate::models::{IndexState, LibraryMedia};
use crate::protocol::Table;

const LIBRARY_MEDIA_COLUMNS: &str = "id, uri, title, index_state, index_failure, indexed_at";

/// Result of reconciling the library table with a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LibraryScanSummary {
    pub discovered: usize,
    pub added: usize,
    pub removed: usize,
}

fn library_media_from_row(row: &Row<'_>) -> rusqlite::Result<LibraryMedia> {
    let raw_state: i64 = row.get(3)?;
    Ok(LibraryMedia {
        id: row.get(0)?,
        uri: row.get(1)?,
        title: row.get(2)?,
        index_state: IndexState::from_i64(raw_state).unwrap_or(IndexState::Unindexed),
        index_failure: row.get(4)?,
        indexed_at: row.get(5)?,
    })
}

impl DbManager {
    /// Inserts a library media or refreshes its title. Returns its id.
    pub fn upsert_library_media(&self, uri: &str, title: &str) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO library_media (uri, title) VALUES (?1, ?2)
             ON CONFLICT(uri) DO UPDATE SET title = excluded.title",
            params![uri, title],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM library_media WHERE uri = ?1",
            params![uri],
            |row| row.get(0),
        )?;
        self.notify(&[Table::LibraryMedia]);
        Ok(id)
    }

    /// Makes the library table match `discovered` (uri, title) pairs in one
    /// transaction. Metadata of removed media is unlinked, not deleted.
    pub fn sync_library_media(
        &self,
        discovered: &[(String, String)],
    ) -> Result<LibraryScanSummary, rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        let mut summary = LibraryScanSummary {
            discovered: discovered.len(),
            ..LibraryScanSummary::default()
        };
        {
            let mut insert = tx.prepare(
                "INSERT INTO library_media (uri, title) VALUES (?1, ?2)
                 ON CONFLICT(uri) DO UPDATE SET title = excluded.title",
            )?;
            let mut exists = tx.prepare("SELECT COUNT(*) FROM library_media WHERE uri = ?1")?;
            for (uri, title) in discovered {
                let known: i64 = exists.query_row(params![uri], |row| row.get(0))?;
                insert.execute(params![uri, title])?;
                if known == 0 {
                    summary.added += 1;
                }
            }

            let keep: HashSet<&str> = discovered.iter().map(|(uri, _)| uri.as_str()).collect();
            let mut all = tx.prepare("SELECT id, uri FROM library_media")?;
            let stale: Vec<i64> = all
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
                .filter_map(|row| match row {
                    Ok((id, uri)) if !keep.contains(uri.as_str()) => Some(Ok(id)),
                    Ok(_) => None,
                    Err(err) => Some(Err(err)),
                })
                .collect::<Result<_, _>>()?;
            let mut delete = tx.prepare("DELETE FROM library_media WHERE id = ?1")?;
            let mut unlink = tx.prepare("UPDATE media_metadata SET ml_id = NULL WHERE ml_id = ?1")?;
            for id in stale {
                delete.execute(params![id])?;
                unlink.execute(params![id])?;
                summary.removed += 1;
            }
        }
        tx.commit()?;
        self.notify(&[Table::LibraryMedia, Table::MediaMetadata]);
        Ok(summary)
    }

    pub fn get_library_media(&self, id: i64) -> Result<Option<LibraryMedia>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LIBRARY_MEDIA_COLUMNS} FROM library_media WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], library_media_from_row)?;
        rows.next().transpose()
    }

    pub fn get_all_library_media(&self) -> Result<Vec<LibraryMedia>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LIBRARY_MEDIA_COLUMNS} FROM library_media ORDER BY title COLLATE NOCASE, id"
        ))?;
        let rows = stmt.query_map([], library_media_from_row)?;
        rows.collect()
    }

    /// Media still waiting for a metadata lookup, oldest first.
    pub fn get_unindexed_library_media(
        &self,
        limit: usize,
    ) -> Result<Vec<LibraryMedia>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LIBRARY_MEDIA_COLUMNS} FROM library_media WHERE index_state = ?1
             ORDER BY id LIMIT ?2"
        ))?;
        let rows = stmt.query_map(
            params![IndexState::Unindexed as i64, limit as i64],
            library_media_from_row,
        )?;
        rows.collect()
    }

    pub fn set_index_state(
        &self,
        id: i64,
        state: IndexState,
        failure: Option<&str>,
    ) -> Result<(), rusqlite::Error> {
        let indexed_at = match state {
            IndexState::Unindexed => None,
            IndexState::Indexed | IndexState::Failed => Some(Self::now_unix_ms()),
        };
        self.conn.execute(
            "UPDATE library_media SET index_state = ?1, index_failure = ?2, indexed_at = ?3 WHERE id = ?4",
            params![state as i64, failure, indexed_at, id],
        )?;
        self.notify(&[Table::LibraryMedia]);
        Ok(())
    }

    /// Marks a whole identification batch as indexed in one transaction.
    pub fn mark_indexed(&self, ids: &[i64]) -> Result<(), rusqlite::Error> {
        if ids.is_empty() {
            return Ok(());
        }
        let indexed_at = Self::now_unix_ms();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE library_media SET index_state = ?1, index_failure = NULL, indexed_at = ?2
                 WHERE id = ?3",
            )?;
            for id in ids {
                stmt.execute(params![IndexState::Indexed as i64, indexed_at, id])?;
            }
        }
        tx.commit()?;
        self.notify(&[Table::LibraryMedia]);
        Ok(())
    }

    /// Moves every `Failed` item back to `Unindexed`. Used by full rescans.
    pub fn reset_failed_index_states(&self) -> Result<usize, rusqlite::Error> {
        let reset = self.conn.execute(
            "UPDATE library_media SET index_state = ?1, index_failure = NULL, indexed_at = NULL
             WHERE index_state = ?2",
            params![IndexState::Unindexed as i64, IndexState::Failed as i64],
        )?;
        if reset > 0 {
            self.notify(&[Table::LibraryMedia]);
        }
        Ok(reset)
    }
}
