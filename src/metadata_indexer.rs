//! Matches library media against the remote catalog and stores the results.
//!
//! A pass sends one identification batch. If the request itself fails the
//! pass is aborted and every item stays `Unindexed` for the next pass. Once
//! the batch succeeds every item is `Indexed`, matched or not, except items
//! whose match could not be stored. Those become `Failed` and are skipped
//! until a full rescan, unless the cause was a network or server error on a
//! follow-up request: such items go back to `Unindexed`.

use std::collections::HashMap;

use log::{debug, info, warn};
use tokio::sync::broadcast::Sender;

use crate::catalog::{CatalogError, IdentifyRequest, MediaResolverApi, ResolverMedia};
use crate::config::IndexerConfig;
use crate::db_manager::DbManager;
use crate::models::{
    IndexState, LibraryMedia, MediaImage, MediaImageType, MediaMetadata, MediaMetadataType,
    MediaPersonJoin, Person,
};
use crate::protocol::{IndexerMessage, Message};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("invalid catalog record {media_id}: {reason}")]
    InvalidRecord { media_id: String, reason: String },
    #[error("no library media with id {0}")]
    UnknownMedia(i64),
}

impl IndexError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Catalog(err) if err.is_retryable())
    }
}

/// What happened to one library media during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Indexed { moviepedia_id: String },
    /// The catalog had no match. The item is still marked indexed.
    Unmatched,
    /// The match could not be stored. Not retried before a full rescan.
    Failed { reason: String },
    /// A follow-up catalog request failed transiently. Left unindexed.
    Deferred { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPassReport {
    pub requested: usize,
    pub outcomes: Vec<(i64, ItemOutcome)>,
    pub orphans_removed: usize,
}

impl IndexPassReport {
    pub fn indexed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Indexed { .. }))
    }

    pub fn unmatched(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Unmatched))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Failed { .. }))
    }

    pub fn deferred(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Deferred { .. }))
    }

    fn count(&self, predicate: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .count()
    }

    fn absorb(&mut self, other: IndexPassReport) {
        self.requested += other.requested;
        self.outcomes.extend(other.outcomes);
        self.orphans_removed += other.orphans_removed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPassOutcome {
    Completed(IndexPassReport),
    /// The identification request failed; `pending` items stay unindexed.
    Aborted {
        reason: String,
        pending: usize,
        completed: IndexPassReport,
    },
}

pub struct MetadataIndexer<'a> {
    db_manager: &'a DbManager,
    api: &'a dyn MediaResolverApi,
    batch_size: usize,
    retrieve_cast: bool,
    image_languages: Vec<String>,
    bus_producer: Option<Sender<Message>>,
}

impl<'a> MetadataIndexer<'a> {
    pub fn new(
        db_manager: &'a DbManager,
        api: &'a dyn MediaResolverApi,
        config: &IndexerConfig,
        image_languages: &[String],
    ) -> Self {
        Self {
            db_manager,
            api,
            batch_size: config.batch_size.max(1),
            retrieve_cast: config.retrieve_cast,
            image_languages: image_languages.to_vec(),
            bus_producer: None,
        }
    }

    pub fn with_bus_producer(mut self, sender: Sender<Message>) -> Self {
        self.bus_producer = Some(sender);
        self
    }

    fn publish(&self, message: IndexerMessage) {
        if let Some(sender) = &self.bus_producer {
            let _ = sender.send(Message::Indexer(message));
        }
    }

    /// Runs passes until nothing is left to identify or a pass aborts.
    /// Deferred items also end the run, so they are not requested again
    /// while the catalog is struggling.
    pub fn index_library(&self) -> Result<IndexPassOutcome, IndexError> {
        let mut total = IndexPassReport::default();
        loop {
            match self.index_pass()? {
                IndexPassOutcome::Completed(report) => {
                    let done = report.requested < self.batch_size || report.deferred() > 0;
                    total.absorb(report);
                    if done {
                        return Ok(IndexPassOutcome::Completed(total));
                    }
                }
                IndexPassOutcome::Aborted {
                    reason, pending, ..
                } => {
                    return Ok(IndexPassOutcome::Aborted {
                        reason,
                        pending,
                        completed: total,
                    });
                }
            }
        }
    }

    /// Identifies one batch of unindexed media.
    pub fn index_pass(&self) -> Result<IndexPassOutcome, IndexError> {
        let pending = self
            .db_manager
            .get_unindexed_library_media(self.batch_size)?;
        let mut report = IndexPassReport {
            requested: pending.len(),
            ..IndexPassReport::default()
        };
        if pending.is_empty() {
            report.orphans_removed = self.db_manager.delete_orphan_persons()?;
            return Ok(IndexPassOutcome::Completed(report));
        }
        self.publish(IndexerMessage::PassStarted {
            items: pending.len(),
        });

        let requests: Vec<IdentifyRequest> = pending
            .iter()
            .map(|media| IdentifyRequest {
                id: media.id.to_string(),
                filename: media.file_name().to_string(),
                path: media.uri.clone(),
            })
            .collect();
        let results = match self.api.search_media_batch(&requests) {
            Ok(results) => results,
            Err(err) => {
                warn!(
                    "Identification of {} media failed, will retry next pass: {}",
                    pending.len(),
                    err
                );
                let reason = err.to_string();
                self.publish(IndexerMessage::PassAborted {
                    reason: reason.clone(),
                });
                return Ok(IndexPassOutcome::Aborted {
                    reason,
                    pending: pending.len(),
                    completed: IndexPassReport::default(),
                });
            }
        };

        let ids: Vec<i64> = pending.iter().map(|media| media.id).collect();
        self.db_manager.mark_indexed(&ids)?;

        let mut matches: HashMap<i64, ResolverMedia> = HashMap::new();
        for result in results {
            let Ok(id) = result.id.parse::<i64>() else {
                debug!("Ignoring identification result with unknown id {}", result.id);
                continue;
            };
            if let Some(lucky) = result.lucky {
                matches.insert(id, lucky);
            }
        }

        for media in &pending {
            let outcome = match matches.get(&media.id) {
                None => ItemOutcome::Unmatched,
                Some(lucky) => self.index_item(media, lucky)?,
            };
            let state = match outcome {
                ItemOutcome::Failed { .. } => IndexState::Failed,
                ItemOutcome::Deferred { .. } => IndexState::Unindexed,
                ItemOutcome::Indexed { .. } | ItemOutcome::Unmatched => IndexState::Indexed,
            };
            self.publish(IndexerMessage::ItemFinished {
                media_id: media.id,
                state,
            });
            report.outcomes.push((media.id, outcome));
        }

        report.orphans_removed = self.db_manager.delete_orphan_persons()?;
        info!(
            "Indexing pass finished: {} indexed, {} unmatched, {} failed, {} deferred, {} orphan persons removed",
            report.indexed(),
            report.unmatched(),
            report.failed(),
            report.deferred(),
            report.orphans_removed
        );
        self.publish(IndexerMessage::PassFinished {
            indexed: report.indexed(),
            failed: report.failed(),
            deferred: report.deferred(),
            orphans_removed: report.orphans_removed,
        });
        Ok(IndexPassOutcome::Completed(report))
    }

    fn index_item(
        &self,
        media: &LibraryMedia,
        lucky: &ResolverMedia,
    ) -> Result<ItemOutcome, rusqlite::Error> {
        match self.save_media_metadata(Some(media), lucky) {
            Ok(metadata) => Ok(ItemOutcome::Indexed {
                moviepedia_id: metadata.moviepedia_id,
            }),
            Err(err) if err.is_retryable() => {
                warn!("Deferred {} to the next pass: {}", media.uri, err);
                self.db_manager
                    .set_index_state(media.id, IndexState::Unindexed, None)?;
                Ok(ItemOutcome::Deferred {
                    reason: err.to_string(),
                })
            }
            Err(err) => {
                warn!("Failed to index {}: {}", media.uri, err);
                let reason = err.to_string();
                self.db_manager
                    .set_index_state(media.id, IndexState::Failed, Some(&reason))?;
                Ok(ItemOutcome::Failed { reason })
            }
        }
    }

    /// Links `media_id` to catalog record `catalog_id`, replacing any earlier
    /// match. Cast is always fetched for manual identification.
    pub fn identify_media(
        &self,
        media_id: i64,
        catalog_id: &str,
    ) -> Result<MediaMetadata, IndexError> {
        let media = self
            .db_manager
            .get_library_media(media_id)?
            .ok_or(IndexError::UnknownMedia(media_id))?;
        let item = self.api.get_media(catalog_id)?;
        if item.media_id != catalog_id {
            return Err(IndexError::InvalidRecord {
                media_id: catalog_id.to_string(),
                reason: format!("catalog returned record {}", item.media_id),
            });
        }
        let mut metadata = self.save_media_metadata(Some(&media), &item)?;
        if !self.retrieve_cast {
            match self.retrieve_casting(&metadata) {
                Ok(_) => metadata.has_cast = true,
                Err(err) => warn!("Failed to retrieve cast of {}: {}", metadata.moviepedia_id, err),
            }
        }
        self.db_manager
            .set_index_state(media.id, IndexState::Indexed, None)?;
        self.db_manager.delete_orphan_persons()?;
        self.publish(IndexerMessage::ItemFinished {
            media_id: media.id,
            state: IndexState::Indexed,
        });
        Ok(metadata)
    }

    /// Stores one catalog record, fetching the parent show of an episode first
    /// when it is not stored yet.
    pub fn save_media_metadata(
        &self,
        media: Option<&LibraryMedia>,
        item: &ResolverMedia,
    ) -> Result<MediaMetadata, IndexError> {
        let media_type = item.media_type.to_metadata_type();
        let show_id = match media_type {
            MediaMetadataType::TvEpisode => {
                let show_id = item
                    .show_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| IndexError::InvalidRecord {
                        media_id: item.media_id.clone(),
                        reason: "episode without show id".to_string(),
                    })?;
                if show_id == item.media_id {
                    return Err(IndexError::InvalidRecord {
                        media_id: item.media_id.clone(),
                        reason: "episode is its own show".to_string(),
                    });
                }
                self.ensure_show(show_id)?;
                Some(show_id.to_string())
            }
            MediaMetadataType::Movie | MediaMetadataType::TvShow => None,
        };

        let previous = self.db_manager.get_metadata(&item.media_id)?;
        let posters = item.image_urls(MediaImageType::Poster, &self.image_languages);
        let backdrops = item.image_urls(MediaImageType::Backdrop, &self.image_languages);
        let metadata = MediaMetadata {
            moviepedia_id: item.media_id.clone(),
            ml_id: media.map(|media| media.id),
            media_type,
            title: item.title.clone(),
            summary: item.summary.clone().unwrap_or_default(),
            genres: item.genre.join(", "),
            release_date: item.release_date_ms(),
            countries: item.country.join(", "),
            season: item.season,
            episode: item.episode,
            current_poster: posters.first().map(|(url, _)| url.clone()).unwrap_or_default(),
            current_backdrop: backdrops
                .first()
                .map(|(url, _)| url.clone())
                .unwrap_or_default(),
            show_id,
            has_cast: previous.as_ref().is_some_and(|previous| previous.has_cast),
            insertion_date: DbManager::now_unix_ms(),
        };
        self.db_manager.upsert_metadata(&metadata)?;
        if let Some(media) = media {
            self.db_manager
                .unlink_other_metadata(media.id, &metadata.moviepedia_id)?;
        }

        let images: Vec<MediaImage> = posters
            .into_iter()
            .map(|image| (MediaImageType::Poster, image))
            .chain(
                backdrops
                    .into_iter()
                    .map(|image| (MediaImageType::Backdrop, image)),
            )
            .map(|(image_type, (url, language))| MediaImage {
                url,
                media_id: metadata.moviepedia_id.clone(),
                image_type,
                language,
            })
            .collect();
        let stale: Vec<MediaImage> = self
            .db_manager
            .get_images(&metadata.moviepedia_id)?
            .into_iter()
            .filter(|old| !images.iter().any(|image| image.url == old.url))
            .collect();
        self.db_manager.delete_images(&stale)?;
        self.db_manager.insert_images(&images)?;

        if self.retrieve_cast {
            match self.retrieve_casting(&metadata) {
                Ok(count) => debug!("Stored {} cast entries for {}", count, metadata.moviepedia_id),
                Err(err) => warn!("Failed to retrieve cast of {}: {}", metadata.moviepedia_id, err),
            }
        }
        Ok(self
            .db_manager
            .get_metadata(&metadata.moviepedia_id)?
            .unwrap_or(metadata))
    }

    fn ensure_show(&self, show_id: &str) -> Result<(), IndexError> {
        if self.db_manager.get_tvshow(show_id)?.is_some() {
            return Ok(());
        }
        debug!("Fetching show {} before its episode", show_id);
        let show = self.api.get_media(show_id)?;
        if show.media_id != show_id
            || show.media_type.to_metadata_type() != MediaMetadataType::TvShow
        {
            return Err(IndexError::InvalidRecord {
                media_id: show_id.to_string(),
                reason: "catalog did not return a show".to_string(),
            });
        }
        self.save_media_metadata(None, &show)?;
        Ok(())
    }

    /// Replaces the cast of `metadata` with the catalog's. Persons left
    /// without a role are removed by the next orphan sweep.
    pub fn retrieve_casting(&self, metadata: &MediaMetadata) -> Result<usize, IndexError> {
        let cast = self.api.get_media_cast(&metadata.moviepedia_id)?;
        let mut joins = Vec::new();
        for (person_type, entries) in cast.by_role() {
            for entry in entries {
                self.db_manager.insert_person(&Person {
                    moviepedia_id: entry.person.person_id.clone(),
                    name: entry.person.name.clone(),
                    image: cast.profile_image(&entry.person),
                })?;
                joins.push(MediaPersonJoin {
                    media_id: metadata.moviepedia_id.clone(),
                    person_id: entry.person.person_id.clone(),
                    person_type,
                });
            }
        }
        self.db_manager
            .remove_person_joins_for(&metadata.moviepedia_id)?;
        self.db_manager.insert_person_joins(&joins)?;
        if !metadata.has_cast {
            let mut updated = metadata.clone();
            updated.has_cast = true;
            self.db_manager.upsert_metadata(&updated)?;
        }
        Ok(joins.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use tokio::sync::broadcast;

    use super::{IndexError, IndexPassOutcome, ItemOutcome, MetadataIndexer};
    use crate::catalog::{
        CastEntry, CatalogError, CatalogImages, CatalogMediaType, CatalogPerson, IdentifyRequest,
        IdentifyResult, ImageRef, MediaCast, MediaResolverApi, ResolverMedia,
    };
    use crate::config::IndexerConfig;
    use crate::db_manager::DbManager;
    use crate::models::{IndexState, MediaImageType, MediaMetadataType};
    use crate::protocol::{IndexerMessage, Message};

    #[derive(Default)]
    struct FakeResolver {
        catalog: Mutex<HashMap<String, ResolverMedia>>,
        /// file name -> catalog id
        matches: HashMap<String, String>,
        casts: Mutex<HashMap<String, MediaCast>>,
        offline: bool,
        /// Fails `get_media` with a transport error while set.
        media_unreachable: AtomicBool,
        identify_calls: Mutex<Vec<Vec<String>>>,
        get_media_calls: Mutex<Vec<String>>,
    }

    impl FakeResolver {
        fn with(records: Vec<ResolverMedia>, matches: &[(&str, &str)]) -> Self {
            Self {
                catalog: Mutex::new(
                    records
                        .into_iter()
                        .map(|record| (record.media_id.clone(), record))
                        .collect(),
                ),
                matches: matches
                    .iter()
                    .map(|(file, id)| (file.to_string(), id.to_string()))
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl MediaResolverApi for FakeResolver {
        fn search(&self, query: &str) -> Result<Vec<ResolverMedia>, CatalogError> {
            Ok(self
                .catalog
                .lock()
                .unwrap()
                .values()
                .filter(|record| record.title.contains(query))
                .cloned()
                .collect())
        }

        fn search_media_batch(
            &self,
            requests: &[IdentifyRequest],
        ) -> Result<Vec<IdentifyResult>, CatalogError> {
            if self.offline {
                return Err(CatalogError::Transport("offline".to_string()));
            }
            self.identify_calls
                .lock()
                .unwrap()
                .push(requests.iter().map(|request| request.id.clone()).collect());
            let catalog = self.catalog.lock().unwrap();
            Ok(requests
                .iter()
                .map(|request| IdentifyResult {
                    id: request.id.clone(),
                    lucky: self
                        .matches
                        .get(&request.filename)
                        .and_then(|id| catalog.get(id))
                        .cloned(),
                })
                .collect())
        }

        fn get_media(&self, media_id: &str) -> Result<ResolverMedia, CatalogError> {
            self.get_media_calls
                .lock()
                .unwrap()
                .push(media_id.to_string());
            if self.media_unreachable.load(Ordering::SeqCst) {
                return Err(CatalogError::Transport("connection reset".to_string()));
            }
            self.catalog
                .lock()
                .unwrap()
                .get(media_id)
                .cloned()
                .ok_or(CatalogError::Status {
                    status: 404,
                    body: String::new(),
                })
        }

        fn get_media_cast(&self, media_id: &str) -> Result<MediaCast, CatalogError> {
            Ok(self
                .casts
                .lock()
                .unwrap()
                .get(media_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn record(id: &str, media_type: CatalogMediaType) -> ResolverMedia {
        ResolverMedia {
            media_id: id.to_string(),
            title: format!("Title {id}"),
            media_type,
            summary: Some("summary".to_string()),
            genre: vec!["Drama".to_string(), "Horror".to_string()],
            date: Some("1982-06-25".to_string()),
            country: vec!["US".to_string()],
            season: None,
            episode: None,
            show_id: None,
            images: None,
            image_endpoint: None,
        }
    }

    fn episode(id: &str, show_id: Option<&str>, number: i32) -> ResolverMedia {
        ResolverMedia {
            season: Some(1),
            episode: Some(number),
            show_id: show_id.map(str::to_string),
            ..record(id, CatalogMediaType::TvEpisode)
        }
    }

    fn with_posters(mut item: ResolverMedia, paths: &[&str]) -> ResolverMedia {
        item.image_endpoint = Some("https://img.example/".to_string());
        item.images = Some(CatalogImages {
            posters: paths
                .iter()
                .map(|path| ImageRef {
                    path: path.to_string(),
                    language: Some("en".to_string()),
                })
                .collect(),
            ..CatalogImages::default()
        });
        item
    }

    fn cast_of(actors: &[(&str, &str)]) -> MediaCast {
        MediaCast {
            actor: actors
                .iter()
                .map(|(id, name)| CastEntry {
                    person: CatalogPerson {
                        person_id: id.to_string(),
                        name: name.to_string(),
                        images: None,
                    },
                })
                .collect(),
            ..MediaCast::default()
        }
    }

    fn config(batch_size: usize, retrieve_cast: bool) -> IndexerConfig {
        IndexerConfig {
            batch_size,
            retrieve_cast,
            ..IndexerConfig::default()
        }
    }

    fn add_files(db: &DbManager, names: &[&str]) -> Vec<i64> {
        names
            .iter()
            .map(|name| {
                db.upsert_library_media(&format!("file:///v/{name}"), name)
                    .unwrap()
            })
            .collect()
    }

    fn completed(outcome: IndexPassOutcome) -> super::IndexPassReport {
        match outcome {
            IndexPassOutcome::Completed(report) => report,
            other => panic!("pass did not complete: {other:?}"),
        }
    }

    #[test]
    fn test_pass_marks_matched_and_unmatched_media_indexed() {
        let db = DbManager::new_in_memory().unwrap();
        let ids = add_files(&db, &["the.thing.mkv", "holiday.mp4"]);
        let api = FakeResolver::with(
            vec![record("m1", CatalogMediaType::Movie)],
            &[("the.thing.mkv", "m1")],
        );
        let (sender, mut receiver) = broadcast::channel(64);
        let indexer = MetadataIndexer::new(&db, &api, &config(100, false), &["en".to_string()])
            .with_bus_producer(sender);

        let report = completed(indexer.index_pass().unwrap());

        assert_eq!(report.indexed(), 1);
        assert_eq!(report.unmatched(), 1);
        for id in &ids {
            assert_eq!(
                db.get_library_media(*id).unwrap().unwrap().index_state,
                IndexState::Indexed
            );
        }
        let linked = db.get_metadata_for_media(ids[0]).unwrap().unwrap();
        assert_eq!(linked.metadata.moviepedia_id, "m1");
        assert_eq!(linked.metadata.genres, "Drama, Horror");
        assert_eq!(linked.metadata.release_date, Some(393_811_200_000));
        assert!(db.get_metadata_for_media(ids[1]).unwrap().is_none());

        let mut finished = None;
        while let Ok(message) = receiver.try_recv() {
            if let Message::Indexer(IndexerMessage::PassFinished { indexed, failed, .. }) = message
            {
                finished = Some((indexed, failed));
            }
        }
        assert_eq!(finished, Some((1, 0)));
    }

    #[test]
    fn test_episodes_fetch_their_show_once() {
        let db = DbManager::new_in_memory().unwrap();
        add_files(&db, &["s01e01.mkv", "s01e02.mkv"]);
        let api = FakeResolver::with(
            vec![
                record("show1", CatalogMediaType::TvShow),
                episode("ep1", Some("show1"), 1),
                episode("ep2", Some("show1"), 2),
            ],
            &[("s01e01.mkv", "ep1"), ("s01e02.mkv", "ep2")],
        );
        let indexer = MetadataIndexer::new(&db, &api, &config(100, false), &[]);

        let report = completed(indexer.index_pass().unwrap());

        assert_eq!(report.indexed(), 2);
        assert_eq!(*api.get_media_calls.lock().unwrap(), vec!["show1".to_string()]);
        let show = db.get_tvshow("show1").unwrap().unwrap();
        assert_eq!(show.ml_id, None);
        let episodes = db.get_episodes("show1").unwrap();
        assert_eq!(
            episodes.iter().map(|e| e.episode).collect::<Vec<_>>(),
            vec![Some(1), Some(2)]
        );
    }

    #[test]
    fn test_failed_identification_leaves_items_unindexed() {
        let db = DbManager::new_in_memory().unwrap();
        add_files(&db, &["a.mkv", "b.mkv"]);
        let api = FakeResolver {
            offline: true,
            ..FakeResolver::default()
        };
        let indexer = MetadataIndexer::new(&db, &api, &config(100, false), &[]);

        match indexer.index_library().unwrap() {
            IndexPassOutcome::Aborted { pending, .. } => assert_eq!(pending, 2),
            other => panic!("expected an aborted pass: {other:?}"),
        }
        assert_eq!(db.get_unindexed_library_media(100).unwrap().len(), 2);
    }

    #[test]
    fn test_unstorable_match_fails_item_until_full_rescan() {
        let db = DbManager::new_in_memory().unwrap();
        let ids = add_files(&db, &["orphan.mkv", "missing_show.mkv", "fine.mkv"]);
        let api = FakeResolver::with(
            vec![
                episode("ep1", None, 1),
                episode("ep2", Some("gone"), 2),
                record("m1", CatalogMediaType::Movie),
            ],
            &[("orphan.mkv", "ep1"), ("missing_show.mkv", "ep2"), ("fine.mkv", "m1")],
        );
        let indexer = MetadataIndexer::new(&db, &api, &config(100, false), &[]);

        let report = completed(indexer.index_pass().unwrap());
        assert_eq!(report.failed(), 2);
        assert_eq!(report.indexed(), 1);
        assert!(matches!(
            report.outcomes[0],
            (_, ItemOutcome::Failed { ref reason }) if reason.contains("without show id")
        ));
        let failed = db.get_library_media(ids[1]).unwrap().unwrap();
        assert_eq!(failed.index_state, IndexState::Failed);
        assert!(failed.index_failure.is_some());
        assert!(db.get_metadata("ep2").unwrap().is_none());

        completed(indexer.index_pass().unwrap());
        assert_eq!(api.identify_calls.lock().unwrap().len(), 1);

        assert_eq!(db.reset_failed_index_states().unwrap(), 2);
        completed(indexer.index_pass().unwrap());
        assert_eq!(
            api.identify_calls.lock().unwrap()[1],
            vec![ids[0].to_string(), ids[1].to_string()]
        );
    }

    #[test]
    fn test_index_library_runs_batches_until_done() {
        let db = DbManager::new_in_memory().unwrap();
        add_files(&db, &["a.mkv", "b.mkv", "c.mkv"]);
        let api = FakeResolver::default();
        let indexer = MetadataIndexer::new(&db, &api, &config(2, false), &[]);

        let report = completed(indexer.index_library().unwrap());

        assert_eq!(report.requested, 3);
        assert_eq!(report.unmatched(), 3);
        let batches: Vec<usize> = api
            .identify_calls
            .lock()
            .unwrap()
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(batches, vec![2, 1]);
        assert!(db.get_unindexed_library_media(10).unwrap().is_empty());
    }

    #[test]
    fn test_resaving_replaces_stale_images() {
        let db = DbManager::new_in_memory().unwrap();
        let api = FakeResolver::default();
        let indexer = MetadataIndexer::new(&db, &api, &config(100, false), &["en".to_string()]);

        let first = with_posters(record("m1", CatalogMediaType::Movie), &["/a.jpg", "/b.jpg"]);
        indexer.save_media_metadata(None, &first).unwrap();
        let second = with_posters(record("m1", CatalogMediaType::Movie), &["/b.jpg", "/c.jpg"]);
        let saved = indexer.save_media_metadata(None, &second).unwrap();

        let urls: Vec<String> = db
            .get_images("m1")
            .unwrap()
            .into_iter()
            .map(|image| image.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://img.example/img/b.jpg".to_string(),
                "https://img.example/img/c.jpg".to_string()
            ]
        );
        assert_eq!(saved.current_poster, "https://img.example/img/b.jpg");
        assert!(db
            .get_images("m1")
            .unwrap()
            .iter()
            .all(|image| image.image_type == MediaImageType::Poster));
    }

    #[test]
    fn test_cast_is_stored_and_dropped_persons_are_swept() {
        let db = DbManager::new_in_memory().unwrap();
        let ids = add_files(&db, &["alien.mkv"]);
        let api = FakeResolver::with(
            vec![record("m1", CatalogMediaType::Movie)],
            &[("alien.mkv", "m1")],
        );
        api.casts
            .lock()
            .unwrap()
            .insert("m1".to_string(), cast_of(&[("p1", "Sigourney"), ("p2", "Tom")]));
        let indexer = MetadataIndexer::new(&db, &api, &config(100, true), &[]);

        completed(indexer.index_pass().unwrap());
        assert_eq!(db.get_persons_for_media("m1").unwrap().len(), 2);
        assert!(db.get_metadata("m1").unwrap().unwrap().has_cast);

        api.casts
            .lock()
            .unwrap()
            .insert("m1".to_string(), cast_of(&[("p1", "Sigourney")]));
        let metadata = indexer.identify_media(ids[0], "m1").unwrap();

        assert!(metadata.has_cast);
        let persons = db.get_all_persons().unwrap();
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0].moviepedia_id, "p1");
    }

    #[test]
    fn test_manual_identification_moves_the_link() {
        let db = DbManager::new_in_memory().unwrap();
        let ids = add_files(&db, &["film.mkv"]);
        let api = FakeResolver::with(
            vec![
                record("wrong", CatalogMediaType::Movie),
                record("right", CatalogMediaType::Movie),
            ],
            &[("film.mkv", "wrong")],
        );
        let indexer = MetadataIndexer::new(&db, &api, &config(100, false), &[]);
        completed(indexer.index_pass().unwrap());

        let metadata = indexer.identify_media(ids[0], "right").unwrap();

        assert_eq!(metadata.ml_id, Some(ids[0]));
        assert_eq!(db.get_metadata("wrong").unwrap().unwrap().ml_id, None);
        let linked = db.get_metadata_for_media(ids[0]).unwrap().unwrap();
        assert_eq!(linked.metadata.moviepedia_id, "right");
        assert_eq!(linked.metadata.media_type, MediaMetadataType::Movie);
        assert!(indexer.identify_media(9_999, "right").is_err());
    }

    #[test]
    fn test_episode_whose_show_id_is_not_a_show_fails() {
        let db = DbManager::new_in_memory().unwrap();
        let ids = add_files(&db, &["e1.mkv", "e2.mkv"]);
        let api = FakeResolver::with(
            vec![
                record("show1", CatalogMediaType::Movie),
                episode("ep1", Some("show1"), 1),
                episode("ep2", Some("show1"), 2),
            ],
            &[("e1.mkv", "ep1"), ("e2.mkv", "ep2")],
        );
        let indexer = MetadataIndexer::new(&db, &api, &config(100, false), &[]);

        let report = completed(indexer.index_pass().unwrap());

        assert_eq!(report.failed(), 2);
        assert!(db.get_metadata("show1").unwrap().is_none());
        assert!(db.get_metadata("ep1").unwrap().is_none());
        for id in ids {
            assert_eq!(
                db.get_library_media(id).unwrap().unwrap().index_state,
                IndexState::Failed
            );
        }
    }

    #[test]
    fn test_unreachable_show_fetch_defers_episode_to_next_run() {
        let db = DbManager::new_in_memory().unwrap();
        let ids = add_files(&db, &["e1.mkv", "e2.mkv"]);
        let api = FakeResolver::with(
            vec![
                record("show1", CatalogMediaType::TvShow),
                episode("ep1", Some("show1"), 1),
                episode("ep2", Some("show1"), 2),
            ],
            &[("e1.mkv", "ep1"), ("e2.mkv", "ep2")],
        );
        api.media_unreachable.store(true, Ordering::SeqCst);
        let indexer = MetadataIndexer::new(&db, &api, &config(1, false), &[]);

        let report = completed(indexer.index_library().unwrap());

        assert_eq!(report.deferred(), 1);
        assert_eq!(report.failed(), 0);
        assert_eq!(api.identify_calls.lock().unwrap().len(), 1);
        let deferred = db.get_library_media(ids[0]).unwrap().unwrap();
        assert_eq!(deferred.index_state, IndexState::Unindexed);
        assert!(deferred.index_failure.is_none());
        assert_eq!(db.get_unindexed_library_media(10).unwrap().len(), 2);

        api.media_unreachable.store(false, Ordering::SeqCst);
        let report = completed(indexer.index_library().unwrap());
        assert_eq!(report.indexed(), 2);
        assert!(db.get_unindexed_library_media(10).unwrap().is_empty());
        assert!(db.get_tvshow("show1").unwrap().is_some());
    }

    #[test]
    fn test_manual_identification_checks_record_id_and_publishes() {
        let db = DbManager::new_in_memory().unwrap();
        let ids = add_files(&db, &["film.mkv"]);
        let api = FakeResolver::with(vec![record("m1", CatalogMediaType::Movie)], &[]);
        api.catalog
            .lock()
            .unwrap()
            .insert("alias".to_string(), record("other", CatalogMediaType::Movie));
        let (sender, mut receiver) = broadcast::channel(64);
        let indexer = MetadataIndexer::new(&db, &api, &config(100, false), &[])
            .with_bus_producer(sender);

        assert!(matches!(
            indexer.identify_media(ids[0], "alias"),
            Err(IndexError::InvalidRecord { .. })
        ));
        assert!(db.get_metadata("other").unwrap().is_none());

        indexer.identify_media(ids[0], "m1").unwrap();
        let mut finished = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            if let Message::Indexer(IndexerMessage::ItemFinished { media_id, state }) = message {
                finished.push((media_id, state));
            }
        }
        assert_eq!(finished, vec![(ids[0], IndexState::Indexed)]);
    }
}
