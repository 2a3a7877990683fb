use rusqlite::{params, Row};

use super::DbManager;
use crate::models::{MediaPersonJoin, Person, PersonType};
use crate::protocol::Table;

fn person_from_row(row: &Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        moviepedia_id: row.get(0)?,
        name: row.get(1)?,
        image: row.get(2)?,
    })
}

impl DbManager {
    /// Inserts or updates a person without touching its existing joins.
    pub fn insert_person(&self, person: &Person) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO person (moviepedia_id, name, image) VALUES (?1, ?2, ?3)
             ON CONFLICT(moviepedia_id) DO UPDATE SET name = excluded.name, image = excluded.image",
            params![person.moviepedia_id, person.name, person.image],
        )?;
        self.notify(&[Table::Person]);
        Ok(())
    }

    pub fn get_person(&self, moviepedia_id: &str) -> Result<Option<Person>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT moviepedia_id, name, image FROM person WHERE moviepedia_id = ?1")?;
        let mut rows = stmt.query_map(params![moviepedia_id], person_from_row)?;
        rows.next().transpose()
    }

    pub fn get_all_persons(&self) -> Result<Vec<Person>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT moviepedia_id, name, image FROM person ORDER BY name COLLATE NOCASE")?;
        let persons = stmt.query_map([], person_from_row)?;
        persons.collect()
    }

    /// Cast of a media record, grouped by role.
    pub fn get_persons_for_media(
        &self,
        media_id: &str,
    ) -> Result<Vec<(Person, PersonType)>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT p.moviepedia_id, p.name, p.image, j.type
             FROM media_person_join j JOIN person p ON p.moviepedia_id = j.person_id
             WHERE j.media_id = ?1 ORDER BY j.type, p.name COLLATE NOCASE",
        )?;
        let rows = stmt.query_map(params![media_id], |row| {
            let raw_type: i64 = row.get(3)?;
            Ok((
                person_from_row(row)?,
                PersonType::from_i64(raw_type).unwrap_or(PersonType::Actor),
            ))
        })?;
        rows.collect()
    }

    pub fn delete_persons(&self, ids: &[String]) -> Result<usize, rusqlite::Error> {
        let mut removed = 0;
        for id in ids {
            removed += self
                .conn
                .execute("DELETE FROM person WHERE moviepedia_id = ?1", params![id])?;
        }
        if removed > 0 {
            self.notify(&[Table::Person, Table::MediaPersonJoin]);
        }
        Ok(removed)
    }

    /// Deletes every person left without a cast join. Returns the number removed.
    pub fn delete_orphan_persons(&self) -> Result<usize, rusqlite::Error> {
        let removed = self.conn.execute(
            "DELETE FROM person WHERE moviepedia_id NOT IN (SELECT person_id FROM media_person_join)",
            [],
        )?;
        if removed > 0 {
            self.notify(&[Table::Person]);
        }
        Ok(removed)
    }

    pub fn insert_person_joins(&self, joins: &[MediaPersonJoin]) -> Result<(), rusqlite::Error> {
        if joins.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO media_person_join (media_id, person_id, type) VALUES (?1, ?2, ?3)",
            )?;
            for join in joins {
                stmt.execute(params![join.media_id, join.person_id, join.person_type as i64])?;
            }
        }
        tx.commit()?;
        self.notify(&[Table::MediaPersonJoin]);
        Ok(())
    }

    pub fn get_all_person_joins(&self) -> Result<Vec<MediaPersonJoin>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT media_id, person_id, type FROM media_person_join ORDER BY media_id, type, person_id",
        )?;
        let joins = stmt.query_map([], |row| {
            let raw_type: i64 = row.get(2)?;
            Ok(MediaPersonJoin {
                media_id: row.get(0)?,
                person_id: row.get(1)?,
                person_type: PersonType::from_i64(raw_type).unwrap_or(PersonType::Actor),
            })
        })?;
        joins.collect()
    }

    pub fn remove_person_joins_for(&self, media_id: &str) -> Result<usize, rusqlite::Error> {
        let removed = self.conn.execute(
            "DELETE FROM media_person_join WHERE media_id = ?1",
            params![media_id],
        )?;
        if removed > 0 {
            self.notify(&[Table::MediaPersonJoin]);
        }
        Ok(removed)
    }
}
