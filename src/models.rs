//! Row types persisted by the store.
//!
//! Enum discriminants are the integers written to SQLite, so they are part of
//! the on-disk format and must never be renumbered.

use std::fmt;

/// Favorite location kind stored in `fav_table.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FavType {
    Network = 0,
    Local = 1,
}

impl FavType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Network),
            1 => Some(Self::Local),
            _ => None,
        }
    }
}

/// User-bookmarked browse location, local or network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserFav {
    pub uri: String,
    pub fav_type: FavType,
    pub title: String,
    pub icon_url: Option<String>,
}

impl BrowserFav {
    pub fn local(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            fav_type: FavType::Local,
            title: title.into(),
            icon_url: None,
        }
    }

    pub fn network(
        uri: impl Into<String>,
        title: impl Into<String>,
        icon_url: Option<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            fav_type: FavType::Network,
            title: title.into(),
            icon_url,
        }
    }
}

/// Subtitle file downloaded for a media file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSub {
    pub id_subtitle: String,
    pub subtitle_path: String,
    pub media_path: String,
    pub sub_language_id: String,
    pub movie_release_name: String,
}

/// Kind of auxiliary track attached to a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveType {
    Subtitle = 0,
    Audio = 1,
}

impl SlaveType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Subtitle),
            1 => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Priority written when a slave was recorded without one.
pub const DEFAULT_SLAVE_PRIORITY: i64 = 2;

/// Auxiliary subtitle or audio track bound to a media path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slave {
    pub media_path: String,
    pub slave_type: SlaveType,
    pub priority: i64,
    pub uri: String,
}

/// Kind of catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaMetadataType {
    Movie = 0,
    TvShow = 1,
    TvEpisode = 2,
}

impl MediaMetadataType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Movie),
            1 => Some(Self::TvShow),
            2 => Some(Self::TvEpisode),
            _ => None,
        }
    }
}

impl fmt::Display for MediaMetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Movie => "movie",
            Self::TvShow => "show",
            Self::TvEpisode => "episode",
        };
        f.write_str(label)
    }
}

/// Enriched catalog metadata for one movie, show or episode.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMetadata {
    pub moviepedia_id: String,
    /// Library media this record describes. Shows fetched only as episode
    /// parents have none.
    pub ml_id: Option<i64>,
    pub media_type: MediaMetadataType,
    pub title: String,
    pub summary: String,
    pub genres: String,
    /// Release date in unix milliseconds.
    pub release_date: Option<i64>,
    pub countries: String,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub current_poster: String,
    pub current_backdrop: String,
    pub show_id: Option<String>,
    pub has_cast: bool,
    pub insertion_date: i64,
}

/// Image kind stored in `media_image.image_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaImageType {
    Poster = 0,
    Backdrop = 1,
}

impl MediaImageType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Poster),
            1 => Some(Self::Backdrop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaImage {
    pub url: String,
    pub media_id: String,
    pub image_type: MediaImageType,
    pub language: String,
}

/// Metadata row joined with its images.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMetadataWithImages {
    pub metadata: MediaMetadata,
    pub images: Vec<MediaImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub moviepedia_id: String,
    pub name: String,
    pub image: Option<String>,
}

/// Role a person holds on a media record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PersonType {
    Actor = 0,
    Director = 1,
    Musician = 2,
    Producer = 3,
    Writer = 4,
}

impl PersonType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Actor),
            1 => Some(Self::Director),
            2 => Some(Self::Musician),
            3 => Some(Self::Producer),
            4 => Some(Self::Writer),
            _ => None,
        }
    }
}

impl fmt::Display for PersonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Actor => "actor",
            Self::Director => "director",
            Self::Musician => "musician",
            Self::Producer => "producer",
            Self::Writer => "writer",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaPersonJoin {
    pub media_id: String,
    pub person_id: String,
    pub person_type: PersonType,
}

/// Per-item indexing state of a library media row.
///
/// `Failed` is terminal for incremental passes; only a full rescan moves it
/// back to `Unindexed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexState {
    Unindexed = 0,
    Indexed = 1,
    Failed = 2,
}

impl IndexState {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Unindexed),
            1 => Some(Self::Indexed),
            2 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Video file known to the local library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryMedia {
    pub id: i64,
    pub uri: String,
    pub title: String,
    pub index_state: IndexState,
    pub index_failure: Option<String>,
    pub indexed_at: Option<i64>,
}

impl LibraryMedia {
    /// File name used as the identification hint for the remote catalog.
    pub fn file_name(&self) -> &str {
        self.uri
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::{IndexState, LibraryMedia, PersonType};

    #[test]
    fn test_person_type_discriminants_round_trip_through_storage_values() {
        for person_type in [
            PersonType::Actor,
            PersonType::Director,
            PersonType::Musician,
            PersonType::Producer,
            PersonType::Writer,
        ] {
            assert_eq!(PersonType::from_i64(person_type as i64), Some(person_type));
        }
        assert_eq!(PersonType::from_i64(9), None);
    }

    #[test]
    fn test_library_media_file_name_uses_last_path_segment() {
        let media = LibraryMedia {
            id: 1,
            uri: "file:///videos/Show/Show.S01E02.mkv".to_string(),
            title: "Show.S01E02".to_string(),
            index_state: IndexState::Unindexed,
            index_failure: None,
            indexed_at: None,
        };
        assert_eq!(media.file_name(), "Show.S01E02.mkv");
    }
}
