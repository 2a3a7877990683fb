use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use log::debug;

pub const SUPPORTED_VIDEO_EXTENSIONS: [&str; 16] = [
    "3gp", "avi", "divx", "flv", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "mts", "ogv",
    "ts", "webm", "wmv",
];

/// Marker file that excludes a directory and everything below it.
const NO_MEDIA_MARKER: &str = ".nomedia";

pub fn is_supported_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_VIDEO_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

pub fn collect_video_files_from_folder(folder_path: &Path) -> Vec<PathBuf> {
    let mut pending_directories = vec![folder_path.to_path_buf()];
    let mut videos = Vec::new();

    while let Some(directory) = pending_directories.pop() {
        if directory.join(NO_MEDIA_MARKER).exists() {
            debug!("Skipping {} (contains {})", directory.display(), NO_MEDIA_MARKER);
            continue;
        }
        let entries = match std::fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Failed to read directory {}: {}", directory.display(), err);
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(
                        "Failed to read a directory entry in {}: {}",
                        directory.display(),
                        err
                    );
                    continue;
                }
            };

            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    debug!("Failed to inspect {}: {}", path.display(), err);
                    continue;
                }
            };

            if file_type.is_dir() {
                pending_directories.push(path);
                continue;
            }

            if file_type.is_file() && is_supported_video_file(&path) {
                videos.push(path);
            }
        }
    }

    videos.sort_unstable();
    videos
}

/// Collects videos below every root, each file once.
pub fn collect_video_files_from_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut videos = BTreeSet::new();
    for root in roots {
        if root.is_file() {
            if is_supported_video_file(root) {
                videos.insert(root.clone());
            }
            continue;
        }
        if root.is_dir() {
            videos.extend(collect_video_files_from_folder(root));
        }
    }
    videos.into_iter().collect()
}

pub fn path_to_uri(path: &Path) -> String {
    format!("file://{}", path.to_string_lossy())
}

pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    uri.strip_prefix("file://").map(PathBuf::from)
}

/// Display title derived from the file name, extension dropped.
pub fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{
        collect_video_files_from_folder, collect_video_files_from_roots, is_supported_video_file,
        path_to_uri, title_from_path, uri_to_path,
    };

    #[test]
    fn test_video_extensions_are_matched_case_insensitively() {
        assert!(is_supported_video_file(Path::new("/v/Alien.MKV")));
        assert!(is_supported_video_file(Path::new("/v/clip.mp4")));
        assert!(!is_supported_video_file(Path::new("/v/song.flac")));
        assert!(!is_supported_video_file(Path::new("/v/README")));
    }

    #[test]
    fn test_folder_walk_skips_hidden_and_nomedia_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("Series/S01")).unwrap();
        std::fs::create_dir_all(root.join(".thumbs")).unwrap();
        std::fs::create_dir_all(root.join("Private")).unwrap();
        std::fs::write(root.join("movie.mkv"), b"").unwrap();
        std::fs::write(root.join("notes.txt"), b"").unwrap();
        std::fs::write(root.join("Series/S01/e01.mp4"), b"").unwrap();
        std::fs::write(root.join(".thumbs/t.mp4"), b"").unwrap();
        std::fs::write(root.join("Private/.nomedia"), b"").unwrap();
        std::fs::write(root.join("Private/home.avi"), b"").unwrap();

        let videos = collect_video_files_from_folder(root);
        assert_eq!(
            videos,
            vec![root.join("Series/S01/e01.mp4"), root.join("movie.mkv")]
        );
    }

    #[test]
    fn test_overlapping_roots_yield_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::write(root.join("a/x.mkv"), b"").unwrap();

        let videos = collect_video_files_from_roots(&[root.clone(), root.join("a")]);
        assert_eq!(videos, vec![root.join("a/x.mkv")]);
    }

    #[test]
    fn test_uri_and_title_helpers() {
        let path = Path::new("/srv/films/The Thing (1982).mkv");
        let uri = path_to_uri(path);
        assert_eq!(uri, "file:///srv/films/The Thing (1982).mkv");
        assert_eq!(uri_to_path(&uri).as_deref(), Some(path));
        assert_eq!(uri_to_path("smb://nas/films"), None);
        assert_eq!(title_from_path(path), "The Thing (1982)");
    }
}
