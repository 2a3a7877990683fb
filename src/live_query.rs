//! Observable query results.
//!
//! A [`LiveQuery`] owns its own bus subscription and re-runs its query when a
//! committed write touches one of the tables it reads. Each consumer holds an
//! independent receiver, so a notification is never swallowed by another
//! consumer.

use log::{debug, warn};
use tokio::sync::broadcast::{error::TryRecvError, Receiver};

use crate::db_manager::DbManager;
use crate::protocol::{Message, StoreMessage, Table};

type QueryFn<T> = Box<dyn Fn(&DbManager) -> Result<T, rusqlite::Error> + Send>;

pub struct LiveQuery<T> {
    bus_consumer: Receiver<Message>,
    tables: Vec<Table>,
    query: QueryFn<T>,
    value: T,
}

impl<T> LiveQuery<T> {
    /// Runs `query` once and starts watching `tables`.
    pub fn new<F>(
        db_manager: &DbManager,
        bus_consumer: Receiver<Message>,
        tables: &[Table],
        query: F,
    ) -> Result<Self, rusqlite::Error>
    where
        F: Fn(&DbManager) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let value = query(db_manager)?;
        Ok(Self {
            bus_consumer,
            tables: tables.to_vec(),
            query: Box::new(query),
            value,
        })
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Drains pending notifications and recomputes once if any of them
    /// touched a watched table. Returns whether the value was recomputed.
    pub fn refresh(&mut self, db_manager: &DbManager) -> Result<bool, rusqlite::Error> {
        let mut stale = false;
        loop {
            match self.bus_consumer.try_recv() {
                Ok(Message::Store(StoreMessage::TablesChanged(tables))) => {
                    if tables.iter().any(|table| self.tables.contains(table)) {
                        stale = true;
                    }
                }
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("LiveQuery lagged by {} messages, recomputing", skipped);
                    stale = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if stale {
            debug!("LiveQuery recomputing for {:?}", self.tables);
            self.value = (self.query)(db_manager)?;
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast;

    use super::LiveQuery;
    use crate::db_manager::DbManager;
    use crate::models::{BrowserFav, FavType};
    use crate::protocol::Table;

    #[test]
    fn test_live_query_recomputes_after_write_to_watched_table() {
        let (sender, _) = broadcast::channel(64);
        let mut db = DbManager::new_in_memory().unwrap();
        db.set_bus_producer(sender.clone());

        let mut local_favs = LiveQuery::new(&db, sender.subscribe(), &[Table::BrowserFav], |db| {
            db.get_browser_favs_by_type(FavType::Local)
        })
        .unwrap();
        assert!(local_favs.value().is_empty());

        db.insert_browser_fav(&BrowserFav::local("file:///m", "Movies"))
            .unwrap();
        assert!(local_favs.refresh(&db).unwrap());
        assert_eq!(local_favs.value().len(), 1);

        assert!(!local_favs.refresh(&db).unwrap());
    }

    #[test]
    fn test_live_query_ignores_unrelated_tables() {
        let (sender, _) = broadcast::channel(64);
        let mut db = DbManager::new_in_memory().unwrap();
        db.set_bus_producer(sender.clone());

        let mut dirs = LiveQuery::new(&db, sender.subscribe(), &[Table::CustomDirectory], |db| {
            db.get_custom_directories()
        })
        .unwrap();
        db.insert_browser_fav(&BrowserFav::local("file:///m", "Movies"))
            .unwrap();
        assert!(!dirs.refresh(&db).unwrap());
    }

    #[test]
    fn test_two_consumers_each_observe_the_same_write() {
        let (sender, _) = broadcast::channel(64);
        let mut db = DbManager::new_in_memory().unwrap();
        db.set_bus_producer(sender.clone());

        let mut first = LiveQuery::new(&db, sender.subscribe(), &[Table::CustomDirectory], |db| {
            db.get_custom_directories()
        })
        .unwrap();
        let mut second = LiveQuery::new(&db, sender.subscribe(), &[Table::CustomDirectory], |db| {
            db.get_custom_directories()
        })
        .unwrap();

        db.add_custom_directory("/srv/films").unwrap();
        assert!(first.refresh(&db).unwrap());
        assert!(second.refresh(&db).unwrap());
        assert_eq!(first.value(), second.value());
    }
}
