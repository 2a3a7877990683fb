//! Remote metadata catalog abstractions and the Moviepedia client.

pub mod moviepedia;

use serde::{Deserialize, Serialize};

use crate::models::{MediaImageType, MediaMetadataType, PersonType};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(String),
    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("catalog response could not be decoded: {0}")]
    Decode(String),
}

impl CatalogError {
    /// Network failures and server-side hiccups. The same request may
    /// succeed later; anything else will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// Kind of record as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CatalogMediaType {
    #[serde(rename = "movie")]
    Movie,
    #[serde(rename = "tvEpisode", alias = "episode")]
    TvEpisode,
    #[serde(rename = "tvSeries", alias = "tvShow", alias = "show")]
    TvShow,
    #[serde(other)]
    Other,
}

impl CatalogMediaType {
    /// Anything that is neither a movie nor an episode is stored as a show.
    pub fn to_metadata_type(self) -> MediaMetadataType {
        match self {
            CatalogMediaType::Movie => MediaMetadataType::Movie,
            CatalogMediaType::TvEpisode => MediaMetadataType::TvEpisode,
            CatalogMediaType::TvShow | CatalogMediaType::Other => MediaMetadataType::TvShow,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRef {
    pub path: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CatalogImages {
    #[serde(default)]
    pub posters: Vec<ImageRef>,
    #[serde(default)]
    pub backdrops: Vec<ImageRef>,
    #[serde(default)]
    pub profiles: Vec<ImageRef>,
}

/// One catalog record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverMedia {
    pub media_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub media_type: CatalogMediaType,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
    /// `YYYY-MM-DD` or RFC 3339.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub country: Vec<String>,
    #[serde(default)]
    pub season: Option<i32>,
    #[serde(default)]
    pub episode: Option<i32>,
    #[serde(default)]
    pub show_id: Option<String>,
    #[serde(default)]
    pub images: Option<CatalogImages>,
    #[serde(default)]
    pub image_endpoint: Option<String>,
}

impl ResolverMedia {
    /// Release date as Unix milliseconds, if the catalog sent a parseable one.
    pub fn release_date_ms(&self) -> Option<i64> {
        let raw = self.date.as_deref()?.trim();
        if let Ok(date_time) = chrono::DateTime::parse_from_rfc3339(raw) {
            return Some(date_time.timestamp_millis());
        }
        let day = raw.get(..10).unwrap_or(raw);
        chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|date_time| date_time.and_utc().timestamp_millis())
    }

    /// Full image URLs for `image_type`, best language match first.
    pub fn image_urls(
        &self,
        image_type: MediaImageType,
        languages: &[String],
    ) -> Vec<(String, String)> {
        let (Some(images), Some(endpoint)) = (&self.images, &self.image_endpoint) else {
            return Vec::new();
        };
        let refs = match image_type {
            MediaImageType::Poster => &images.posters,
            MediaImageType::Backdrop => &images.backdrops,
        };
        select_images(refs, languages)
            .into_iter()
            .map(|image| {
                (
                    image_url(endpoint, &image.path),
                    image.language.clone().unwrap_or_default(),
                )
            })
            .collect()
    }
}

/// Joins an image endpoint and a relative image path.
pub fn image_url(endpoint: &str, path: &str) -> String {
    format!(
        "{}/img/{}",
        endpoint.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Orders images by the position of their language in `languages`, with
/// language-neutral images last. Images in an unlisted language are dropped
/// unless nothing else is left.
pub fn select_images<'a>(images: &'a [ImageRef], languages: &[String]) -> Vec<&'a ImageRef> {
    let rank = |image: &ImageRef| -> Option<usize> {
        match image.language.as_deref().filter(|lang| !lang.is_empty()) {
            None => Some(languages.len()),
            Some(lang) => languages
                .iter()
                .position(|preferred| preferred.eq_ignore_ascii_case(lang)),
        }
    };
    let mut ranked: Vec<(usize, &ImageRef)> = images
        .iter()
        .filter_map(|image| rank(image).map(|rank| (rank, image)))
        .collect();
    if ranked.is_empty() {
        return images.iter().collect();
    }
    ranked.sort_by_key(|(rank, _)| *rank);
    ranked.into_iter().map(|(_, image)| image).collect()
}

/// Identification request for one local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifyRequest {
    pub id: String,
    pub filename: String,
    pub path: String,
}

/// Identification answer; `lucky` is the best match, if any.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdentifyResult {
    pub id: String,
    #[serde(default)]
    pub lucky: Option<ResolverMedia>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPerson {
    pub person_id: String,
    pub name: String,
    #[serde(default)]
    pub images: Option<CatalogImages>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CastEntry {
    pub person: CatalogPerson,
}

/// Cast and crew of one catalog record, by role.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaCast {
    #[serde(default)]
    pub actor: Vec<CastEntry>,
    #[serde(default)]
    pub director: Vec<CastEntry>,
    #[serde(default)]
    pub writer: Vec<CastEntry>,
    #[serde(default)]
    pub musician: Vec<CastEntry>,
    #[serde(default)]
    pub producer: Vec<CastEntry>,
    #[serde(default)]
    pub image_endpoint: Option<String>,
}

impl MediaCast {
    pub fn by_role(&self) -> [(PersonType, &[CastEntry]); 5] {
        [
            (PersonType::Actor, self.actor.as_slice()),
            (PersonType::Director, self.director.as_slice()),
            (PersonType::Writer, self.writer.as_slice()),
            (PersonType::Musician, self.musician.as_slice()),
            (PersonType::Producer, self.producer.as_slice()),
        ]
    }

    pub fn profile_image(&self, person: &CatalogPerson) -> Option<String> {
        let endpoint = self.image_endpoint.as_deref()?;
        let profile = person.images.as_ref()?.profiles.first()?;
        Some(image_url(endpoint, &profile.path))
    }
}

/// Interface implemented by remote metadata catalogs.
pub trait MediaResolverApi: Send + Sync {
    /// Free-text search.
    fn search(&self, query: &str) -> Result<Vec<ResolverMedia>, CatalogError>;
    /// Identifies a batch of local files in one request.
    fn search_media_batch(
        &self,
        requests: &[IdentifyRequest],
    ) -> Result<Vec<IdentifyResult>, CatalogError>;
    fn get_media(&self, media_id: &str) -> Result<ResolverMedia, CatalogError>;
    fn get_media_cast(&self, media_id: &str) -> Result<MediaCast, CatalogError>;
}
