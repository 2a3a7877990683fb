//! Persistence, schema migration and catalog indexing for a local video library.

pub mod catalog;
pub mod config;
pub mod config_persistence;
pub mod db_manager;
pub mod library_scanner;
pub mod live_query;
pub mod media_file_discovery;
pub mod metadata_indexer;
pub mod models;
pub mod protocol;
