use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info, warn};
use tokio::sync::broadcast;

use moviepedia::catalog::moviepedia::MoviepediaClient;
use moviepedia::catalog::MediaResolverApi;
use moviepedia::config::{default_config_path, Config};
use moviepedia::config_persistence::{
    load_config_file, persist_config_file, remove_legacy_custom_paths,
};
use moviepedia::db_manager::migrations::MigrationContext;
use moviepedia::db_manager::DbManager;
use moviepedia::library_scanner::LibraryScanner;
use moviepedia::media_file_discovery::uri_to_path;
use moviepedia::metadata_indexer::{IndexPassOutcome, MetadataIndexer};
use moviepedia::models::{
    BrowserFav, ExternalSub, FavType, MediaMetadata, MediaMetadataType, Slave, SlaveType,
    DEFAULT_SLAVE_PRIORITY,
};
use moviepedia::protocol::Message;

#[derive(Debug, Parser)]
#[command(
    name = "moviepedia",
    version,
    about = "Video library store with remote catalog indexing"
)]
struct Cli {
    /// Config file, defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database file, overrides `database.path`.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Raise the log level (`-v` debug, `-vv` trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open the database and bring it to the current schema version.
    Migrate,
    /// Scan library folders and custom directories for video files.
    Scan {
        /// Also retry media whose indexing previously failed.
        #[arg(long)]
        full: bool,
        /// Skip the indexing pass that normally follows a scan.
        #[arg(long)]
        no_index: bool,
    },
    /// Identify unindexed library media against the catalog.
    Index {
        /// Also fetch cast and crew.
        #[arg(long)]
        cast: bool,
    },
    /// List library media with their indexing state.
    Library,
    /// List stored catalog records of one kind.
    List {
        #[arg(value_enum)]
        kind: RecordKind,
    },
    /// Search stored catalog records by title.
    Search { query: String },
    /// Search the remote catalog.
    Lookup { query: String },
    /// Link a library media to a catalog record.
    Identify { media_id: i64, catalog_id: String },
    /// Show one stored catalog record with its images, cast and episodes.
    Show { catalog_id: String },
    /// Delete a stored catalog record.
    Forget { catalog_id: String },
    /// Most recently identified records.
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Browser favorites.
    Fav {
        #[command(subcommand)]
        command: FavCommand,
    },
    /// Custom library directories.
    Dir {
        #[command(subcommand)]
        command: DirCommand,
    },
    /// Downloaded external subtitles.
    Subs {
        #[command(subcommand)]
        command: SubsCommand,
    },
    /// Subtitle and audio tracks attached to media.
    Slaves {
        #[command(subcommand)]
        command: SlavesCommand,
    },
    /// Inspect or write the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RecordKind {
    Movies,
    Shows,
    Episodes,
}

#[derive(Debug, Subcommand)]
enum FavCommand {
    List {
        #[arg(long, conflicts_with = "network")]
        local: bool,
        #[arg(long)]
        network: bool,
    },
    Add {
        uri: String,
        title: String,
        #[arg(long)]
        network: bool,
        #[arg(long, requires = "network")]
        icon: Option<String>,
    },
    Remove { uri: String },
}

#[derive(Debug, Subcommand)]
enum DirCommand {
    List,
    Add { path: String },
    Remove { path: String },
}

#[derive(Debug, Subcommand)]
enum SubsCommand {
    List {
        media_path: String,
    },
    Add {
        media_path: String,
        subtitle_path: String,
        #[arg(long)]
        id: String,
        #[arg(long, default_value = "")]
        language: String,
        #[arg(long, default_value = "")]
        release_name: String,
    },
    Remove {
        media_path: String,
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum SlavesCommand {
    List {
        media_path: String,
    },
    Add {
        media_path: String,
        uri: String,
        #[arg(long)]
        audio: bool,
        #[arg(long, default_value_t = DEFAULT_SLAVE_PRIORITY)]
        priority: i64,
    },
    Clear {
        media_path: String,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the config file location.
    Path,
    /// Print the effective config.
    Show,
    /// Write the effective config, keeping existing comments.
    Save,
}

fn default_favorites() -> Vec<BrowserFav> {
    [
        (dirs::video_dir(), "Videos"),
        (dirs::download_dir(), "Downloads"),
    ]
    .into_iter()
    .filter_map(|(dir, title)| {
        let dir = dir?;
        dir.is_dir()
            .then(|| BrowserFav::local(format!("file://{}", dir.to_string_lossy()), title))
    })
    .collect()
}

/// Moves legacy `library.custom_paths` entries into the store, then drops the key.
fn import_legacy_custom_paths(
    db_manager: &DbManager,
    config: &Config,
    config_path: &Path,
) -> Result<(), rusqlite::Error> {
    let legacy_paths = config.legacy_custom_path_list();
    if legacy_paths.is_empty() {
        return Ok(());
    }
    for path in &legacy_paths {
        db_manager.add_custom_directory(path)?;
    }
    info!(
        "Imported {} legacy custom directories from {}",
        legacy_paths.len(),
        config_path.display()
    );
    remove_legacy_custom_paths(config_path);
    Ok(())
}

fn format_metadata_line(metadata: &MediaMetadata) -> String {
    let mut line = format!("{} [{}] {}", metadata.moviepedia_id, metadata.media_type, metadata.title);
    if let (Some(season), Some(episode)) = (metadata.season, metadata.episode) {
        line.push_str(&format!(" S{season:02}E{episode:02}"));
    }
    if let Some(ml_id) = metadata.ml_id {
        line.push_str(&format!(" (library #{ml_id})"));
    }
    line
}

fn print_index_outcome(outcome: &IndexPassOutcome) {
    match outcome {
        IndexPassOutcome::Completed(report) => println!(
            "Indexed {} media: {} matched, {} unmatched, {} failed, {} deferred, {} orphan persons removed",
            report.requested,
            report.indexed(),
            report.unmatched(),
            report.failed(),
            report.deferred(),
            report.orphans_removed
        ),
        IndexPassOutcome::Aborted {
            reason,
            pending,
            completed,
        } => println!(
            "Indexing stopped after {} media, {} left for the next run: {}",
            completed.requested, pending, reason
        ),
    }
}

fn run_index(
    db_manager: &DbManager,
    config: &Config,
    retrieve_cast: bool,
    bus_producer: &broadcast::Sender<Message>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = MoviepediaClient::new(&config.catalog);
    let mut indexer_config = config.indexer.clone();
    indexer_config.retrieve_cast |= retrieve_cast;
    let indexer = MetadataIndexer::new(
        db_manager,
        &client,
        &indexer_config,
        &config.catalog.image_languages,
    )
    .with_bus_producer(bus_producer.clone());
    let outcome = indexer.index_library()?;
    print_index_outcome(&outcome);
    Ok(())
}

fn run_config_command(
    command: &ConfigCommand,
    config: &Config,
    config_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        ConfigCommand::Path => println!("{}", config_path.display()),
        ConfigCommand::Show => print!("{}", toml::to_string_pretty(config)?),
        ConfigCommand::Save => {
            persist_config_file(config, config_path);
            println!("Wrote {}", config_path.display());
        }
    }
    Ok(())
}

fn run_command(
    command: Command,
    config: &Config,
    config_path: &Path,
    db_manager: &DbManager,
    bus_producer: &broadcast::Sender<Message>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Migrate => {
            println!("Schema version {}", db_manager.schema_version()?);
        }
        Command::Scan { full, no_index } => {
            let scanner = LibraryScanner::new(db_manager, Some(bus_producer.clone()));
            let summary = scanner.scan(&config.library.folders, full)?;
            println!(
                "Found {} media: {} new, {} removed",
                summary.discovered, summary.added, summary.removed
            );
            if config.indexer.index_after_scan && !no_index {
                run_index(db_manager, config, false, bus_producer)?;
            }
        }
        Command::Index { cast } => run_index(db_manager, config, cast, bus_producer)?,
        Command::Library => {
            for media in db_manager.get_all_library_media()? {
                let linked = db_manager
                    .get_metadata_for_media(media.id)?
                    .map(|linked| format!(" -> {}", linked.metadata.title))
                    .unwrap_or_default();
                let failure = media
                    .index_failure
                    .as_deref()
                    .map(|reason| format!(" ({reason})"))
                    .unwrap_or_default();
                let missing = match uri_to_path(&media.uri) {
                    Some(path) if !path.exists() => " [missing]",
                    _ => "",
                };
                println!(
                    "#{} {:?} {}{}{}{}",
                    media.id, media.index_state, media.uri, missing, linked, failure
                );
            }
        }
        Command::List { kind } => {
            let media_type = match kind {
                RecordKind::Movies => MediaMetadataType::Movie,
                RecordKind::Shows => MediaMetadataType::TvShow,
                RecordKind::Episodes => MediaMetadataType::TvEpisode,
            };
            for metadata in db_manager.get_all_metadata_by_type(media_type)? {
                println!("{}", format_metadata_line(&metadata));
            }
        }
        Command::Search { query } => {
            for metadata in db_manager.search_metadata(&query)? {
                println!("{}", format_metadata_line(&metadata));
            }
        }
        Command::Lookup { query } => {
            let client = MoviepediaClient::new(&config.catalog);
            for media in client.search(&query)? {
                println!(
                    "{} [{}] {}",
                    media.media_id,
                    media.media_type.to_metadata_type(),
                    media.title
                );
            }
        }
        Command::Identify {
            media_id,
            catalog_id,
        } => {
            let client = MoviepediaClient::new(&config.catalog);
            let indexer = MetadataIndexer::new(
                db_manager,
                &client,
                &config.indexer,
                &config.catalog.image_languages,
            )
            .with_bus_producer(bus_producer.clone());
            let metadata = indexer.identify_media(media_id, &catalog_id)?;
            println!("{}", format_metadata_line(&metadata));
        }
        Command::Show { catalog_id } => {
            let Some(metadata) = db_manager.get_metadata(&catalog_id)? else {
                return Err(format!("no stored record {catalog_id}").into());
            };
            println!("{}", format_metadata_line(&metadata));
            if !metadata.summary.is_empty() {
                println!("  {}", metadata.summary);
            }
            if !metadata.genres.is_empty() {
                println!("  genres: {}", metadata.genres);
            }
            if !metadata.countries.is_empty() {
                println!("  countries: {}", metadata.countries);
            }
            for image in db_manager.get_images(&metadata.moviepedia_id)? {
                println!("  image {:?} {} {}", image.image_type, image.language, image.url);
            }
            for (person, role) in db_manager.get_persons_for_media(&metadata.moviepedia_id)? {
                println!("  {role}: {}", person.name);
            }
            if metadata.media_type == MediaMetadataType::TvShow {
                for episode in db_manager.get_episodes(&metadata.moviepedia_id)? {
                    println!("  {}", format_metadata_line(&episode));
                }
            }
        }
        Command::Forget { catalog_id } => {
            if db_manager.delete_metadata(&catalog_id)? {
                db_manager.delete_orphan_persons()?;
                println!("Removed {catalog_id}");
            } else {
                println!("No stored record {catalog_id}");
            }
        }
        Command::Recent { limit } => {
            for metadata in db_manager.get_recently_added(limit)? {
                println!("{}", format_metadata_line(&metadata));
            }
        }
        Command::Fav { command } => match command {
            FavCommand::List { local, network } => {
                let favs = if local {
                    db_manager.get_browser_favs_by_type(FavType::Local)?
                } else if network {
                    db_manager.get_browser_favs_by_type(FavType::Network)?
                } else {
                    db_manager.get_all_browser_favs()?
                };
                for fav in favs {
                    println!("{:?} {} {}", fav.fav_type, fav.title, fav.uri);
                }
            }
            FavCommand::Add {
                uri,
                title,
                network,
                icon,
            } => {
                let existed = db_manager.browser_fav_exists(&uri)?;
                let fav = if network {
                    BrowserFav::network(uri, title, icon)
                } else {
                    BrowserFav::local(uri, title)
                };
                db_manager.insert_browser_fav(&fav)?;
                println!("{} {}", if existed { "Updated" } else { "Added" }, fav.uri);
            }
            FavCommand::Remove { uri } => {
                let removed = db_manager.delete_browser_fav(&uri)?;
                println!("Removed {removed} favorite(s)");
            }
        },
        Command::Dir { command } => match command {
            DirCommand::List => {
                for path in db_manager.get_custom_directories()? {
                    println!("{path}");
                }
            }
            DirCommand::Add { path } => {
                if db_manager.add_custom_directory(&path)? {
                    println!("Added {path}");
                } else {
                    println!("{path} is already a custom directory");
                }
            }
            DirCommand::Remove { path } => {
                if db_manager.delete_custom_directory(&path)? {
                    println!("Removed {path}");
                } else {
                    println!("{path} is not a custom directory");
                }
            }
        },
        Command::Subs { command } => match command {
            SubsCommand::List { media_path } => {
                for sub in db_manager.get_external_subs(&media_path)? {
                    println!(
                        "{} [{}] {} {}",
                        sub.id_subtitle, sub.sub_language_id, sub.subtitle_path, sub.movie_release_name
                    );
                }
            }
            SubsCommand::Add {
                media_path,
                subtitle_path,
                id,
                language,
                release_name,
            } => {
                db_manager.insert_external_sub(&ExternalSub {
                    id_subtitle: id,
                    subtitle_path,
                    media_path,
                    sub_language_id: language,
                    movie_release_name: release_name,
                })?;
            }
            SubsCommand::Remove { media_path, id } => {
                if !db_manager.delete_external_sub(&media_path, &id)? {
                    warn!("No subtitle {} for {}", id, media_path);
                }
            }
        },
        Command::Slaves { command } => match command {
            SlavesCommand::List { media_path } => {
                for slave in db_manager.get_slaves(&media_path)? {
                    println!("{:?} priority={} {}", slave.slave_type, slave.priority, slave.uri);
                }
            }
            SlavesCommand::Add {
                media_path,
                uri,
                audio,
                priority,
            } => {
                db_manager.insert_slave(&Slave {
                    media_path,
                    slave_type: if audio {
                        SlaveType::Audio
                    } else {
                        SlaveType::Subtitle
                    },
                    priority,
                    uri,
                })?;
            }
            SlavesCommand::Clear { media_path } => {
                let removed = db_manager.delete_slaves_for_media(&media_path)?;
                println!("Removed {removed} track(s)");
            }
        },
        Command::Config { command } => run_config_command(&command, config, config_path)?,
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli
        .config
        .clone()
        .or_else(default_config_path)
        .ok_or("could not determine the config directory")?;
    let config = load_config_file(&config_path);
    let level = match cli.verbose {
        0 => config.logging.level.to_level_filter(),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    log::set_max_level(level);
    debug!("Using config {}", config_path.display());

    if let Command::Config { command } = &cli.command {
        return run_config_command(command, &config, &config_path);
    }

    let db_path = cli
        .database
        .clone()
        .or_else(|| config.database_path())
        .ok_or("could not determine the data directory")?;
    let context = MigrationContext {
        legacy_custom_paths: config.library.legacy_custom_paths.clone(),
        seed_favorites: if config.library.seed_default_favorites {
            default_favorites()
        } else {
            Vec::new()
        },
    };
    let (bus_producer, _) = broadcast::channel::<Message>(1024);
    let mut db_manager = DbManager::new(&db_path, &context)?;
    db_manager.set_bus_producer(bus_producer.clone());
    import_legacy_custom_paths(&db_manager, &config, &config_path)?;

    run_command(cli.command, &config, &config_path, &db_manager, &bus_producer)
}

fn main() {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Trace);
    clog.init();
    log::set_max_level(log::LevelFilter::Info);

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    if let Err(err) = run(Cli::parse()) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
