use rusqlite::params;

use super::DbManager;
use crate::models::ExternalSub;
use crate::protocol::Table;

impl DbManager {
    pub fn insert_external_sub(&self, sub: &ExternalSub) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO external_subtitles_table
                (idSubtitle, subtitlePath, mediaPath, subLanguageID, movieReleaseName)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sub.id_subtitle,
                sub.subtitle_path,
                sub.media_path,
                sub.sub_language_id,
                sub.movie_release_name
            ],
        )?;
        self.notify(&[Table::ExternalSub]);
        Ok(())
    }

    pub fn get_external_subs(&self, media_path: &str) -> Result<Vec<ExternalSub>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT idSubtitle, subtitlePath, mediaPath, subLanguageID, movieReleaseName
             FROM external_subtitles_table WHERE mediaPath = ?1 ORDER BY subLanguageID, idSubtitle",
        )?;
        let subs = stmt.query_map(params![media_path], |row| {
            Ok(ExternalSub {
                id_subtitle: row.get(0)?,
                subtitle_path: row.get(1)?,
                media_path: row.get(2)?,
                sub_language_id: row.get(3)?,
                movie_release_name: row.get(4)?,
            })
        })?;
        subs.collect()
    }

    pub fn delete_external_sub(
        &self,
        media_path: &str,
        id_subtitle: &str,
    ) -> Result<bool, rusqlite::Error> {
        let removed = self.conn.execute(
            "DELETE FROM external_subtitles_table WHERE mediaPath = ?1 AND idSubtitle = ?2",
            params![media_path, id_subtitle],
        )?;
        if removed > 0 {
            self.notify(&[Table::ExternalSub]);
        }
        Ok(removed > 0)
    }
}
