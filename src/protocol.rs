//! Event-bus protocol shared by the store, the scanner and the indexer.
//!
//! Writers publish on a `tokio::sync::broadcast` channel; every subscriber
//! receives its own copy, so there is no shared "pending" flag to race on.

use crate::models::IndexState;

/// Tables that can be observed for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    BrowserFav,
    CustomDirectory,
    ExternalSub,
    Slave,
    MediaMetadata,
    MediaImage,
    Person,
    MediaPersonJoin,
    LibraryMedia,
}

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Store(StoreMessage),
    Library(LibraryMessage),
    Indexer(IndexerMessage),
}

/// Store notifications.
#[derive(Debug, Clone)]
pub enum StoreMessage {
    /// A committed write touched these tables.
    TablesChanged(Vec<Table>),
}

/// Library scan notifications.
#[derive(Debug, Clone)]
pub enum LibraryMessage {
    ScanStarted { folders: usize },
    ScanFinished { discovered: usize, removed: usize },
}

/// Indexer progress notifications.
#[derive(Debug, Clone)]
pub enum IndexerMessage {
    PassStarted { items: usize },
    ItemFinished { media_id: i64, state: IndexState },
    PassAborted { reason: String },
    PassFinished {
        indexed: usize,
        failed: usize,
        deferred: usize,
        orphans_removed: usize,
    },
}
