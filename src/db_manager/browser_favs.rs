use rusqlite::{params, Row};

use super::DbManager;
use crate::models::{BrowserFav, FavType};
use crate::protocol::Table;

fn fav_from_row(row: &Row<'_>) -> rusqlite::Result<BrowserFav> {
    let raw_type: i64 = row.get(1)?;
    Ok(BrowserFav {
        uri: row.get(0)?,
        fav_type: FavType::from_i64(raw_type).unwrap_or(FavType::Network),
        title: row.get(2)?,
        icon_url: row.get(3)?,
    })
}

impl DbManager {
    /// Inserts or replaces the favorite keyed by its uri.
    pub fn insert_browser_fav(&self, fav: &BrowserFav) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO fav_table (uri, type, title, icon_url) VALUES (?1, ?2, ?3, ?4)",
            params![fav.uri, fav.fav_type as i64, fav.title, fav.icon_url],
        )?;
        self.notify(&[Table::BrowserFav]);
        Ok(())
    }

    pub fn get_all_browser_favs(&self) -> Result<Vec<BrowserFav>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT uri, type, title, icon_url FROM fav_table ORDER BY title COLLATE NOCASE")?;
        let favs = stmt.query_map([], fav_from_row)?;
        favs.collect()
    }

    pub fn get_browser_favs_by_type(
        &self,
        fav_type: FavType,
    ) -> Result<Vec<BrowserFav>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT uri, type, title, icon_url FROM fav_table WHERE type = ?1 ORDER BY title COLLATE NOCASE",
        )?;
        let favs = stmt.query_map(params![fav_type as i64], fav_from_row)?;
        favs.collect()
    }

    pub fn get_browser_fav(&self, uri: &str) -> Result<Option<BrowserFav>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT uri, type, title, icon_url FROM fav_table WHERE uri = ?1")?;
        let mut rows = stmt.query_map(params![uri], fav_from_row)?;
        rows.next().transpose()
    }

    pub fn browser_fav_exists(&self, uri: &str) -> Result<bool, rusqlite::Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM fav_table WHERE uri = ?1",
            params![uri],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Returns the number of rows removed (0 or 1).
    pub fn delete_browser_fav(&self, uri: &str) -> Result<usize, rusqlite::Error> {
        let removed = self
            .conn
            .execute("DELETE FROM fav_table WHERE uri = ?1", params![uri])?;
        if removed > 0 {
            self.notify(&[Table::BrowserFav]);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::db_manager::DbManager;
    use crate::models::{BrowserFav, FavType};

    fn sample_favs() -> Vec<BrowserFav> {
        vec![
            BrowserFav::local("file:///storage/local0", "local0"),
            BrowserFav::local("file:///storage/local1", "local1"),
            BrowserFav::network("smb://192.168.1.2/share0", "network0", None),
            BrowserFav::network(
                "ftp://192.168.1.3/share1",
                "network1",
                Some("http://icons/ftp.png".to_string()),
            ),
        ]
    }

    #[test]
    fn test_two_local_and_two_network_favs_get_all_returns_four() {
        let db = DbManager::new_in_memory().expect("failed to create in-memory db");
        for fav in sample_favs() {
            db.insert_browser_fav(&fav).unwrap();
        }
        let all = db.get_all_browser_favs().unwrap();
        assert_eq!(all.len(), 4);
        for fav in sample_favs() {
            assert!(all.contains(&fav));
        }
    }

    #[test]
    fn test_query_by_type_returns_exactly_inserted_rows_of_that_type() {
        let db = DbManager::new_in_memory().unwrap();
        for fav in sample_favs() {
            db.insert_browser_fav(&fav).unwrap();
        }
        let local = db.get_browser_favs_by_type(FavType::Local).unwrap();
        assert_eq!(local, sample_favs()[..2].to_vec());
        let network = db.get_browser_favs_by_type(FavType::Network).unwrap();
        assert_eq!(network.len(), 2);
        assert!(network.iter().all(|fav| fav.fav_type == FavType::Network));
    }

    #[test]
    fn test_delete_by_uri_removes_exactly_one_row() {
        let db = DbManager::new_in_memory().unwrap();
        for fav in sample_favs() {
            db.insert_browser_fav(&fav).unwrap();
        }
        assert_eq!(db.delete_browser_fav("smb://192.168.1.2/share0").unwrap(), 1);
        assert_eq!(db.delete_browser_fav("smb://192.168.1.2/share0").unwrap(), 0);
        assert_eq!(db.get_all_browser_favs().unwrap().len(), 3);
        assert!(!db.browser_fav_exists("smb://192.168.1.2/share0").unwrap());
    }

    #[test]
    fn test_reinserting_same_uri_replaces_title() {
        let db = DbManager::new_in_memory().unwrap();
        db.insert_browser_fav(&BrowserFav::local("file:///m", "old")).unwrap();
        db.insert_browser_fav(&BrowserFav::local("file:///m", "new")).unwrap();
        let fav = db.get_browser_fav("file:///m").unwrap().unwrap();
        assert_eq!(fav.title, "new");
        assert_eq!(db.get_all_browser_favs().unwrap().len(), 1);
    }
}
