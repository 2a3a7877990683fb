//! Persistent application configuration model and defaults.

use std::path::PathBuf;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Database location.
    pub database: DatabaseConfig,
    #[serde(default)]
    /// Remote metadata catalog endpoint and preferences.
    pub catalog: CatalogConfig,
    #[serde(default)]
    /// Scanned folders.
    pub library: LibraryConfig,
    #[serde(default)]
    /// Metadata indexing behavior.
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DatabaseConfig {
    /// Overrides the default `<data dir>/moviepedia/vlc_media.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,
    /// Preferred image languages, most preferred first.
    #[serde(default = "default_image_languages")]
    pub image_languages: Vec<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LibraryConfig {
    /// Folders scanned for video files in addition to custom directories.
    #[serde(default)]
    pub folders: Vec<String>,
    /// Seed the browser favorites with the platform's video folders on first run.
    #[serde(default = "default_true")]
    pub seed_default_favorites: bool,
    /// Legacy colon-separated custom paths, only read once by the schema migration.
    #[serde(rename = "custom_paths", default, skip_serializing)]
    pub legacy_custom_paths: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct IndexerConfig {
    /// Maximum number of media sent in one identification request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fetch cast and crew for every identified media.
    #[serde(default)]
    pub retrieve_cast: bool,
    /// Run an indexing pass right after `scan`.
    #[serde(default = "default_true")]
    pub index_after_scan: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            image_languages: default_image_languages(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            seed_default_favorites: true,
            legacy_custom_paths: None,
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            retrieve_cast: false,
            index_after_scan: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Database path from the config, or the platform default.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database.path {
            Some(path) => Some(PathBuf::from(path)),
            None => default_database_path(),
        }
    }

    /// Legacy custom paths split on `:`, empty segments dropped.
    pub fn legacy_custom_path_list(&self) -> Vec<String> {
        self.library
            .legacy_custom_paths
            .as_deref()
            .map(|paths| {
                paths
                    .split(':')
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join("moviepedia").join("config.toml"))
}

pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|path| path.join("moviepedia").join("vlc_media.db"))
}

fn default_true() -> bool {
    true
}

fn default_catalog_base_url() -> String {
    "https://moviepedia.videolabs.io/".to_string()
}

fn default_image_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    15
}

fn default_batch_size() -> usize {
    1_000
}
