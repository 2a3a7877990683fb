//! Versioned, one-way schema migrations.
//!
//! The schema version is the SQLite `user_version` pragma. A store older than
//! [`CURRENT_SCHEMA_VERSION`] is upgraded one step at a time inside a single
//! transaction; a failing step rolls the whole upgrade back.

use log::{debug, info};
use rusqlite::{params, Connection, Transaction};
use thiserror::Error;

use crate::models::{BrowserFav, DEFAULT_SLAVE_PRIORITY};

pub const CURRENT_SCHEMA_VERSION: u32 = 37;

const DIR_TABLE_NAME: &str = "directories_table";
const MEDIA_TABLE_NAME: &str = "media_table";
const PLAYLIST_TABLE_NAME: &str = "playlist_table";
const PLAYLIST_MEDIA_TABLE_NAME: &str = "playlist_media_table";
const SEARCHHISTORY_TABLE_NAME: &str = "searchhistory_table";
const MRL_TABLE_NAME: &str = "mrl_table";
const HISTORY_TABLE_NAME: &str = "history_table";

const LEGACY_TABLES: [&str; 7] = [
    DIR_TABLE_NAME,
    MEDIA_TABLE_NAME,
    PLAYLIST_MEDIA_TABLE_NAME,
    PLAYLIST_TABLE_NAME,
    SEARCHHISTORY_TABLE_NAME,
    MRL_TABLE_NAME,
    HISTORY_TABLE_NAME,
];

const CREATE_FAV_TABLE: &str = "CREATE TABLE IF NOT EXISTS fav_table (
    uri TEXT PRIMARY KEY NOT NULL,
    type INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL,
    icon_url TEXT
)";

const CREATE_EXTERNAL_SUBTITLES_TABLE: &str = "CREATE TABLE IF NOT EXISTS external_subtitles_table (
    idSubtitle TEXT NOT NULL,
    subtitlePath TEXT NOT NULL,
    mediaPath TEXT NOT NULL,
    subLanguageID TEXT NOT NULL,
    movieReleaseName TEXT NOT NULL,
    PRIMARY KEY(mediaPath, idSubtitle)
)";

const CREATE_SLAVES_TABLE: &str = "CREATE TABLE IF NOT EXISTS SLAVES_table (
    slave_media_mrl TEXT NOT NULL,
    slave_type INTEGER NOT NULL,
    slave_priority INTEGER NOT NULL,
    slave_uri TEXT NOT NULL,
    PRIMARY KEY (slave_media_mrl, slave_uri)
)";

const CREATE_CUSTOM_DIRECTORY_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS CustomDirectory (path TEXT PRIMARY KEY NOT NULL)";

const CREATE_WIDGET_TABLE: &str = "CREATE TABLE IF NOT EXISTS widget_table (
    id INTEGER PRIMARY KEY NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    theme INTEGER NOT NULL,
    light_theme INTEGER NOT NULL,
    background_color INTEGER NOT NULL,
    foreground_color INTEGER NOT NULL,
    forward_delay INTEGER NOT NULL,
    rewind_delay INTEGER NOT NULL,
    opacity INTEGER NOT NULL,
    show_configure INTEGER NOT NULL
)";

const CREATE_MOVIEPEDIA_TABLES: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS media_metadata (
        moviepedia_id TEXT PRIMARY KEY NOT NULL,
        ml_id INTEGER,
        type INTEGER NOT NULL,
        title TEXT NOT NULL,
        summary TEXT NOT NULL,
        genres TEXT NOT NULL,
        release_date INTEGER,
        countries TEXT NOT NULL,
        season INTEGER,
        episode INTEGER,
        current_poster TEXT NOT NULL,
        current_backdrop TEXT NOT NULL,
        show_id TEXT REFERENCES media_metadata(moviepedia_id) ON DELETE CASCADE,
        has_cast INTEGER NOT NULL DEFAULT 0,
        insertion_date INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS index_media_metadata_ml_id ON media_metadata(ml_id)",
    "CREATE TABLE IF NOT EXISTS person (
        moviepedia_id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        image TEXT
    )",
    "CREATE TABLE IF NOT EXISTS media_person_join (
        media_id TEXT NOT NULL REFERENCES media_metadata(moviepedia_id) ON DELETE CASCADE,
        person_id TEXT NOT NULL REFERENCES person(moviepedia_id) ON DELETE CASCADE,
        type INTEGER NOT NULL,
        PRIMARY KEY(media_id, person_id, type)
    )",
    "CREATE INDEX IF NOT EXISTS index_media_person_join_person_id ON media_person_join(person_id)",
    "CREATE TABLE IF NOT EXISTS media_image (
        url TEXT NOT NULL,
        media_id TEXT NOT NULL REFERENCES media_metadata(moviepedia_id) ON DELETE CASCADE,
        image_type INTEGER NOT NULL,
        language TEXT NOT NULL,
        PRIMARY KEY(url, media_id)
    )",
];

const CREATE_LIBRARY_MEDIA_TABLE: &str = "CREATE TABLE IF NOT EXISTS library_media (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uri TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    index_state INTEGER NOT NULL DEFAULT 0,
    index_failure TEXT,
    indexed_at INTEGER
)";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("failed to prepare database directory: {0}")]
    Io(std::io::Error),
    #[error("database schema version {found} is newer than supported version {supported}")]
    Downgrade { found: u32, supported: u32 },
    #[error("no migration registered from schema version {from}")]
    MissingStep { from: u32 },
    #[error("database has {tables} tables but no schema version")]
    UnversionedSchema { tables: usize },
}

/// Inputs that earlier releases kept outside the database.
#[derive(Debug, Clone, Default)]
pub struct MigrationContext {
    /// Colon-separated custom directory list from the legacy preferences.
    pub legacy_custom_paths: Option<String>,
    /// Local favorites written on creation and by the 29 -> 30 step.
    pub seed_favorites: Vec<BrowserFav>,
}

impl MigrationContext {
    fn legacy_custom_path_list(&self) -> Vec<&str> {
        self.legacy_custom_paths
            .as_deref()
            .map(|paths| {
                paths
                    .split(':')
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Created { version: u32 },
    UpToDate { version: u32 },
    Upgraded { from: u32, to: u32 },
}

type StepFn = fn(&Transaction<'_>, &MigrationContext) -> rusqlite::Result<()>;

/// One version increment: `from` -> `from + 1`.
struct Migration {
    from: u32,
    apply: StepFn,
}

fn noop(_tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    Ok(())
}

fn migrations() -> Vec<Migration> {
    let mut steps: Vec<Migration> = (1..23).map(|from| Migration { from, apply: noop }).collect();
    let tail: [(u32, StepFn); 14] = [
        (23, migrate_23_24),
        (24, migrate_24_25),
        (25, migrate_25_26),
        (26, migrate_26_27),
        (27, migrate_27_28),
        (28, migrate_28_29),
        (29, migrate_29_30),
        (30, migrate_30_31),
        (31, migrate_31_32),
        (32, migrate_32_33),
        (33, migrate_33_34),
        (34, migrate_34_35),
        (35, migrate_35_36),
        (36, migrate_36_37),
    ];
    steps.extend(tail.into_iter().map(|(from, apply)| Migration { from, apply }));
    steps
}

fn migrate_23_24(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch(
        "DROP TABLE IF EXISTS fav_table;
         CREATE TABLE IF NOT EXISTS fav_table (uri TEXT PRIMARY KEY NOT NULL, title TEXT NOT NULL, icon_url TEXT);",
    )
}

fn migrate_24_25(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS external_subtitles_table (uri TEXT PRIMARY KEY NOT NULL, media_name TEXT NOT NULL);",
    )
}

fn migrate_25_26(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS SLAVES_table (slave_media_mrl TEXT PRIMARY KEY NOT NULL, slave_type INTEGER NOT NULL, slave_priority INTEGER, slave_uri TEXT NOT NULL);",
    )
}

fn migrate_26_27(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    for table in LEGACY_TABLES {
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
    }

    tx.execute(
        "UPDATE SLAVES_table SET slave_priority = ?1 WHERE slave_priority IS NULL",
        params![DEFAULT_SLAVE_PRIORITY],
    )?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS SLAVES_table_TEMP (slave_media_mrl TEXT PRIMARY KEY NOT NULL, slave_type INTEGER NOT NULL, slave_priority INTEGER NOT NULL, slave_uri TEXT NOT NULL);
         INSERT INTO SLAVES_table_TEMP(slave_media_mrl, slave_type, slave_priority, slave_uri)
             SELECT slave_media_mrl, slave_type, slave_priority, slave_uri FROM SLAVES_table;
         DROP TABLE SLAVES_table;
         ALTER TABLE SLAVES_table_TEMP RENAME TO SLAVES_table;",
    )?;

    // Favorites stored before this version were all network favorites.
    tx.execute_batch("ALTER TABLE fav_table ADD COLUMN type INTEGER NOT NULL DEFAULT 0;")
}

fn migrate_27_28(tx: &Transaction<'_>, context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch(CREATE_CUSTOM_DIRECTORY_TABLE)?;
    let paths = context.legacy_custom_path_list();
    if !paths.is_empty() {
        info!("Importing {} custom directories from legacy preferences", paths.len());
    }
    let mut stmt = tx.prepare("INSERT OR IGNORE INTO CustomDirectory(path) VALUES (?1)")?;
    for path in paths {
        stmt.execute(params![path])?;
    }
    Ok(())
}

fn migrate_28_29(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch("DROP TABLE IF EXISTS external_subtitles_table;")?;
    tx.execute_batch(CREATE_EXTERNAL_SUBTITLES_TABLE)
}

fn migrate_29_30(tx: &Transaction<'_>, context: &MigrationContext) -> rusqlite::Result<()> {
    insert_seed_favorites(tx, &context.seed_favorites)
}

fn migrate_30_31(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch(CREATE_WIDGET_TABLE)
}

fn migrate_31_32(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch("ALTER TABLE widget_table ADD COLUMN show_seek INTEGER NOT NULL DEFAULT 0;")
}

fn migrate_32_33(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch("ALTER TABLE widget_table ADD COLUMN show_cover INTEGER NOT NULL DEFAULT 0;")
}

fn migrate_33_34(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch("ALTER TABLE widget_table ADD COLUMN type INTEGER NOT NULL DEFAULT 0;")
}

fn migrate_34_35(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS SLAVES_table_TEMP (
             slave_media_mrl TEXT NOT NULL,
             slave_type INTEGER NOT NULL,
             slave_priority INTEGER NOT NULL,
             slave_uri TEXT NOT NULL,
             PRIMARY KEY (slave_media_mrl, slave_uri));
         INSERT INTO SLAVES_table_TEMP(slave_media_mrl, slave_type, slave_priority, slave_uri)
             SELECT slave_media_mrl, slave_type, slave_priority, slave_uri FROM SLAVES_table;
         DROP TABLE SLAVES_table;
         ALTER TABLE SLAVES_table_TEMP RENAME TO SLAVES_table;",
    )
}

fn migrate_35_36(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    for statement in CREATE_MOVIEPEDIA_TABLES {
        tx.execute_batch(statement)?;
    }
    Ok(())
}

fn migrate_36_37(tx: &Transaction<'_>, _context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch(CREATE_LIBRARY_MEDIA_TABLE)
}

fn insert_seed_favorites(tx: &Transaction<'_>, favorites: &[BrowserFav]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(
        "INSERT OR IGNORE INTO fav_table(uri, type, title, icon_url) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for fav in favorites {
        stmt.execute(params![fav.uri, fav.fav_type as i64, fav.title, fav.icon_url])?;
    }
    Ok(())
}

fn create_current_schema(tx: &Transaction<'_>, context: &MigrationContext) -> rusqlite::Result<()> {
    tx.execute_batch(CREATE_FAV_TABLE)?;
    tx.execute_batch(CREATE_EXTERNAL_SUBTITLES_TABLE)?;
    tx.execute_batch(CREATE_SLAVES_TABLE)?;
    tx.execute_batch(CREATE_CUSTOM_DIRECTORY_TABLE)?;
    tx.execute_batch(CREATE_WIDGET_TABLE)?;
    tx.execute_batch(
        "ALTER TABLE widget_table ADD COLUMN show_seek INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE widget_table ADD COLUMN show_cover INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE widget_table ADD COLUMN type INTEGER NOT NULL DEFAULT 0;",
    )?;
    for statement in CREATE_MOVIEPEDIA_TABLES {
        tx.execute_batch(statement)?;
    }
    tx.execute_batch(CREATE_LIBRARY_MEDIA_TABLE)?;
    insert_seed_favorites(tx, &context.seed_favorites)
}

fn count_user_tables(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count.max(0) as usize)
}

pub(crate) fn read_user_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .map(|version| version.max(0) as u32)
}

/// Brings `conn` to [`CURRENT_SCHEMA_VERSION`].
pub fn migrate(
    conn: &mut Connection,
    context: &MigrationContext,
) -> Result<MigrationOutcome, MigrationError> {
    let found = read_user_version(conn)?;
    if found > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::Downgrade {
            found,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if found == CURRENT_SCHEMA_VERSION {
        return Ok(MigrationOutcome::UpToDate { version: found });
    }
    if found == 0 {
        let tables = count_user_tables(conn)?;
        if tables > 0 {
            return Err(MigrationError::UnversionedSchema { tables });
        }
    }

    let tx = conn.transaction()?;
    if found == 0 {
        create_current_schema(&tx, context)?;
        tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
        tx.commit()?;
        return Ok(MigrationOutcome::Created {
            version: CURRENT_SCHEMA_VERSION,
        });
    }

    let steps = migrations();
    let mut version = found;
    while version < CURRENT_SCHEMA_VERSION {
        let step = steps
            .iter()
            .find(|step| step.from == version)
            .ok_or(MigrationError::MissingStep { from: version })?;
        debug!("Applying migration {} -> {}", version, version + 1);
        (step.apply)(&tx, context)?;
        version += 1;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;

    Ok(MigrationOutcome::Upgraded {
        from: found,
        to: CURRENT_SCHEMA_VERSION,
    })
}
