//! Reconciles the library table with the video files found on disk.

use std::collections::BTreeSet;
use std::path::PathBuf;

use log::{info, warn};
use tokio::sync::broadcast::Sender;

use crate::db_manager::{DbManager, LibraryScanSummary};
use crate::media_file_discovery::{collect_video_files_from_roots, path_to_uri, title_from_path};
use crate::protocol::{LibraryMessage, Message};

pub struct LibraryScanner<'a> {
    db_manager: &'a DbManager,
    bus_producer: Option<Sender<Message>>,
}

impl<'a> LibraryScanner<'a> {
    pub fn new(db_manager: &'a DbManager, bus_producer: Option<Sender<Message>>) -> Self {
        Self {
            db_manager,
            bus_producer,
        }
    }

    fn publish(&self, message: LibraryMessage) {
        if let Some(sender) = &self.bus_producer {
            let _ = sender.send(Message::Library(message));
        }
    }

    /// Configured folders plus the stored custom directories, deduplicated.
    pub fn scan_roots(&self, configured_folders: &[String]) -> Result<Vec<String>, rusqlite::Error> {
        let mut roots: BTreeSet<String> = configured_folders
            .iter()
            .map(|folder| folder.trim().to_string())
            .filter(|folder| !folder.is_empty())
            .collect();
        roots.extend(self.db_manager.get_custom_directories()?);
        Ok(roots.into_iter().collect())
    }

    /// Walks every root and syncs the library table. A `full` scan also
    /// gives failed media another indexing attempt.
    pub fn scan(
        &self,
        configured_folders: &[String],
        full: bool,
    ) -> Result<LibraryScanSummary, rusqlite::Error> {
        let roots = self.scan_roots(configured_folders)?;
        self.publish(LibraryMessage::ScanStarted {
            folders: roots.len(),
        });

        let (present, missing): (Vec<PathBuf>, Vec<PathBuf>) = roots
            .iter()
            .map(PathBuf::from)
            .partition(|root| root.exists());

        let mut discovered: Vec<(String, String)> = collect_video_files_from_roots(&present)
            .into_iter()
            .map(|path| (path_to_uri(&path), title_from_path(&path)))
            .collect();

        // Media under an unreachable root is kept as-is.
        if !missing.is_empty() {
            let missing_prefixes: Vec<String> = missing
                .iter()
                .map(|root| {
                    warn!("Library folder {} is unreachable, keeping its media", root.display());
                    let uri = path_to_uri(root);
                    format!("{}/", uri.trim_end_matches('/'))
                })
                .collect();
            let mut known: BTreeSet<String> =
                discovered.iter().map(|(uri, _)| uri.clone()).collect();
            for media in self.db_manager.get_all_library_media()? {
                let unreachable = missing_prefixes
                    .iter()
                    .any(|prefix| media.uri.starts_with(prefix.as_str()));
                if unreachable && known.insert(media.uri.clone()) {
                    discovered.push((media.uri, media.title));
                }
            }
        }

        if full {
            let reset = self.db_manager.reset_failed_index_states()?;
            if reset > 0 {
                info!("Full scan: {} previously failed media will be indexed again", reset);
            }
        }

        let summary = self.db_manager.sync_library_media(&discovered)?;
        info!(
            "Library scan finished: {} media ({} new, {} removed)",
            summary.discovered, summary.added, summary.removed
        );
        self.publish(LibraryMessage::ScanFinished {
            discovered: summary.discovered,
            removed: summary.removed,
        });
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast;

    use super::LibraryScanner;
    use crate::db_manager::DbManager;
    use crate::media_file_discovery::path_to_uri;
    use crate::models::IndexState;
    use crate::protocol::{LibraryMessage, Message};

    #[test]
    fn test_scan_includes_custom_directories_and_removes_deleted_files() {
        let configured = tempfile::tempdir().unwrap();
        let custom = tempfile::tempdir().unwrap();
        std::fs::write(configured.path().join("a.mkv"), b"").unwrap();
        std::fs::write(custom.path().join("b.mp4"), b"").unwrap();

        let db = DbManager::new_in_memory().unwrap();
        db.add_custom_directory(&custom.path().to_string_lossy())
            .unwrap();
        let folders = vec![configured.path().to_string_lossy().to_string()];
        let scanner = LibraryScanner::new(&db, None);

        let first = scanner.scan(&folders, false).unwrap();
        assert_eq!(first.added, 2);

        std::fs::remove_file(custom.path().join("b.mp4")).unwrap();
        let second = scanner.scan(&folders, false).unwrap();
        assert_eq!(second.removed, 1);
        let media = db.get_all_library_media().unwrap();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].title, "a");
    }

    #[test]
    fn test_unreachable_root_keeps_its_media() {
        let db = DbManager::new_in_memory().unwrap();
        let gone = "/nonexistent/moviepedia-test-volume";
        let uri = path_to_uri(&std::path::Path::new(gone).join("film.mkv"));
        db.upsert_library_media(&uri, "film").unwrap();

        let summary = LibraryScanner::new(&db, None)
            .scan(&[gone.to_string()], false)
            .unwrap();
        assert_eq!(summary.removed, 0);
        assert_eq!(db.get_all_library_media().unwrap().len(), 1);
    }

    #[test]
    fn test_full_scan_resets_failed_media() {
        let folder = tempfile::tempdir().unwrap();
        std::fs::write(folder.path().join("a.mkv"), b"").unwrap();
        let folders = vec![folder.path().to_string_lossy().to_string()];
        let db = DbManager::new_in_memory().unwrap();
        let scanner = LibraryScanner::new(&db, None);
        scanner.scan(&folders, false).unwrap();
        let id = db.get_all_library_media().unwrap()[0].id;
        db.set_index_state(id, IndexState::Failed, Some("boom"))
            .unwrap();

        scanner.scan(&folders, false).unwrap();
        assert_eq!(
            db.get_library_media(id).unwrap().unwrap().index_state,
            IndexState::Failed
        );

        scanner.scan(&folders, true).unwrap();
        assert_eq!(
            db.get_library_media(id).unwrap().unwrap().index_state,
            IndexState::Unindexed
        );
    }

    #[test]
    fn test_scan_publishes_start_and_finish() {
        let (sender, mut receiver) = broadcast::channel(16);
        let db = DbManager::new_in_memory().unwrap();
        LibraryScanner::new(&db, Some(sender)).scan(&[], false).unwrap();

        assert!(matches!(
            receiver.try_recv(),
            Ok(Message::Library(LibraryMessage::ScanStarted { folders: 0 }))
        ));
        assert!(matches!(
            receiver.try_recv(),
            Ok(Message::Library(LibraryMessage::ScanFinished { discovered: 0, removed: 0 }))
        ));
    }
}
