use rusqlite::{params, Row};

use super::DbManager;
use crate::models::{
    MediaImage, MediaImageType, MediaMetadata, MediaMetadataType, MediaMetadataWithImages,
};
use crate::protocol::Table;

const METADATA_COLUMNS: &str = "moviepedia_id, ml_id, type, title, summary, genres, release_date, \
     countries, season, episode, current_poster, current_backdrop, show_id, has_cast, insertion_date";

fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<MediaMetadata> {
    let raw_type: i64 = row.get(2)?;
    Ok(MediaMetadata {
        moviepedia_id: row.get(0)?,
        ml_id: row.get(1)?,
        media_type: MediaMetadataType::from_i64(raw_type).unwrap_or(MediaMetadataType::Movie),
        title: row.get(3)?,
        summary: row.get(4)?,
        genres: row.get(5)?,
        release_date: row.get(6)?,
        countries: row.get(7)?,
        season: row.get(8)?,
        episode: row.get(9)?,
        current_poster: row.get(10)?,
        current_backdrop: row.get(11)?,
        show_id: row.get(12)?,
        has_cast: row.get(13)?,
        insertion_date: row.get(14)?,
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<MediaImage> {
    let raw_type: i64 = row.get(2)?;
    Ok(MediaImage {
        url: row.get(0)?,
        media_id: row.get(1)?,
        image_type: MediaImageType::from_i64(raw_type).unwrap_or(MediaImageType::Poster),
        language: row.get(3)?,
    })
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

impl DbManager {
    /// Inserts or updates a metadata row in place.
    ///
    /// An update never deletes the row, so episodes referencing a show survive
    /// the show being re-written. A missing `ml_id` keeps the stored one, and
    /// the first insertion date is kept.
    pub fn upsert_metadata(&self, metadata: &MediaMetadata) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            &format!(
                "INSERT INTO media_metadata ({METADATA_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(moviepedia_id) DO UPDATE SET
                    ml_id = COALESCE(excluded.ml_id, media_metadata.ml_id),
                    type = excluded.type,
                    title = excluded.title,
                    summary = excluded.summary,
                    genres = excluded.genres,
                    release_date = excluded.release_date,
                    countries = excluded.countries,
                    season = excluded.season,
                    episode = excluded.episode,
                    current_poster = excluded.current_poster,
                    current_backdrop = excluded.current_backdrop,
                    show_id = excluded.show_id,
                    has_cast = excluded.has_cast"
            ),
            params![
                metadata.moviepedia_id,
                metadata.ml_id,
                metadata.media_type as i64,
                metadata.title,
                metadata.summary,
                metadata.genres,
                metadata.release_date,
                metadata.countries,
                metadata.season,
                metadata.episode,
                metadata.current_poster,
                metadata.current_backdrop,
                metadata.show_id,
                metadata.has_cast,
                metadata.insertion_date,
            ],
        )?;
        self.notify(&[Table::MediaMetadata]);
        Ok(())
    }

    pub fn get_metadata(&self, moviepedia_id: &str) -> Result<Option<MediaMetadata>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM media_metadata WHERE moviepedia_id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![moviepedia_id], metadata_from_row)?;
        rows.next().transpose()
    }

    /// Metadata linked to a library media, with its images.
    pub fn get_metadata_for_media(
        &self,
        ml_id: i64,
    ) -> Result<Option<MediaMetadataWithImages>, rusqlite::Error> {
        let metadata = {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {METADATA_COLUMNS} FROM media_metadata WHERE ml_id = ?1
                 ORDER BY insertion_date DESC LIMIT 1"
            ))?;
            let mut rows = stmt.query_map(params![ml_id], metadata_from_row)?;
            rows.next().transpose()?
        };
        let Some(metadata) = metadata else {
            return Ok(None);
        };
        let images = self.get_images(&metadata.moviepedia_id)?;
        Ok(Some(MediaMetadataWithImages { metadata, images }))
    }

    pub fn get_tvshow(&self, show_id: &str) -> Result<Option<MediaMetadata>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM media_metadata WHERE moviepedia_id = ?1 AND type = ?2"
        ))?;
        let mut rows = stmt.query_map(
            params![show_id, MediaMetadataType::TvShow as i64],
            metadata_from_row,
        )?;
        rows.next().transpose()
    }

    pub fn get_episodes(&self, show_id: &str) -> Result<Vec<MediaMetadata>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM media_metadata WHERE show_id = ?1
             ORDER BY season, episode, title"
        ))?;
        let episodes = stmt.query_map(params![show_id], metadata_from_row)?;
        episodes.collect()
    }

    pub fn get_all_metadata_by_type(
        &self,
        media_type: MediaMetadataType,
    ) -> Result<Vec<MediaMetadata>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM media_metadata WHERE type = ?1 ORDER BY title COLLATE NOCASE"
        ))?;
        let rows = stmt.query_map(params![media_type as i64], metadata_from_row)?;
        rows.collect()
    }

    /// Case-insensitive title substring search.
    pub fn search_metadata(&self, query: &str) -> Result<Vec<MediaMetadata>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM media_metadata WHERE title LIKE ?1 ESCAPE '\\'
             ORDER BY title COLLATE NOCASE"
        ))?;
        let rows = stmt.query_map(params![like_pattern(query)], metadata_from_row)?;
        rows.collect()
    }

    pub fn get_recently_added(&self, limit: usize) -> Result<Vec<MediaMetadata>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM media_metadata WHERE ml_id IS NOT NULL
             ORDER BY insertion_date DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], metadata_from_row)?;
        rows.collect()
    }

    /// Deletes a record; its images, cast joins and episodes cascade.
    pub fn delete_metadata(&self, moviepedia_id: &str) -> Result<bool, rusqlite::Error> {
        let removed = self.conn.execute(
            "DELETE FROM media_metadata WHERE moviepedia_id = ?1",
            params![moviepedia_id],
        )?;
        if removed > 0 {
            self.notify(&[
                Table::MediaMetadata,
                Table::MediaImage,
                Table::MediaPersonJoin,
            ]);
        }
        Ok(removed > 0)
    }

    pub fn insert_images(&self, images: &[MediaImage]) -> Result<(), rusqlite::Error> {
        if images.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO media_image (url, media_id, image_type, language)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for image in images {
                stmt.execute(params![
                    image.url,
                    image.media_id,
                    image.image_type as i64,
                    image.language
                ])?;
            }
        }
        tx.commit()?;
        self.notify(&[Table::MediaImage]);
        Ok(())
    }

    pub fn get_images(&self, media_id: &str) -> Result<Vec<MediaImage>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT url, media_id, image_type, language FROM media_image WHERE media_id = ?1
             ORDER BY image_type, url",
        )?;
        let images = stmt.query_map(params![media_id], image_from_row)?;
        images.collect()
    }

    pub fn delete_images(&self, images: &[MediaImage]) -> Result<usize, rusqlite::Error> {
        let mut removed = 0;
        for image in images {
            removed += self.conn.execute(
                "DELETE FROM media_image WHERE url = ?1 AND media_id = ?2",
                params![image.url, image.media_id],
            )?;
        }
        if removed > 0 {
            self.notify(&[Table::MediaImage]);
        }
        Ok(removed)
    }

    /// Clears `ml_id` on every record linked to `ml_id` except `keep`.
    pub fn unlink_other_metadata(&self, ml_id: i64, keep: &str) -> Result<usize, rusqlite::Error> {
        let unlinked = self.conn.execute(
            "UPDATE media_metadata SET ml_id = NULL WHERE ml_id = ?1 AND moviepedia_id != ?2",
            params![ml_id, keep],
        )?;
        if unlinked > 0 {
            self.notify(&[Table::MediaMetadata]);
        }
        Ok(unlinked)
    }
}
