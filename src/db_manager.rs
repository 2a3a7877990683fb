//! SQLite-backed store for favorites, side-car tracks, custom directories,
//! library media and catalog metadata.
//!
//! Per-entity queries live in the child modules; this file owns the
//! connection, schema bring-up and change notification.

mod browser_favs;
mod custom_directories;
mod external_subs;
mod library_media;
mod media_metadata;
pub mod migrations;
mod persons;
mod slaves;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use rusqlite::Connection;
use tokio::sync::broadcast::Sender;

use crate::protocol::{Message, StoreMessage, Table};
use migrations::{MigrationContext, MigrationError, MigrationOutcome};

pub use library_media::LibraryScanSummary;

pub struct DbManager {
    conn: Connection,
    bus_producer: Option<Sender<Message>>,
}

impl DbManager {
    /// Opens (or creates) the store at `db_path` and brings it to the current
    /// schema version.
    pub fn new(db_path: &Path, context: &MigrationContext) -> Result<Self, MigrationError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(MigrationError::Io)?;
            }
        }
        debug!("Opening database {}", db_path.display());
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn, context)
    }

    /// Fresh in-memory store at the current schema version.
    pub fn new_in_memory() -> Result<Self, MigrationError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, &MigrationContext::default())
    }

    fn from_connection(
        mut conn: Connection,
        context: &MigrationContext,
    ) -> Result<Self, MigrationError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let outcome = migrations::migrate(&mut conn, context)?;
        let db_manager = Self {
            conn,
            bus_producer: None,
        };
        match outcome {
            MigrationOutcome::Created { version } => {
                info!("Created database at schema version {}", version);
            }
            MigrationOutcome::UpToDate { version } => {
                debug!("Database already at schema version {}", version);
            }
            MigrationOutcome::Upgraded { from, to } => {
                info!("Migrated database from version {} to {}", from, to);
            }
        }
        Ok(db_manager)
    }

    /// Publishes change notifications for every committed write on `sender`.
    pub fn set_bus_producer(&mut self, sender: Sender<Message>) {
        self.bus_producer = Some(sender);
    }

    pub fn schema_version(&self) -> Result<u32, rusqlite::Error> {
        migrations::read_user_version(&self.conn)
    }

    pub(crate) fn notify(&self, tables: &[Table]) {
        if let Some(sender) = &self.bus_producer {
            // No subscribers is not an error.
            let _ = sender.send(Message::Store(StoreMessage::TablesChanged(tables.to_vec())));
        }
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn now_unix_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as i64)
            .unwrap_or(0)
    }
}
