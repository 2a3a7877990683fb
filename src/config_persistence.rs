use std::path::Path;

use log::warn;
use toml_edit::{DocumentMut, Item, Table, Value};

use crate::config::Config;

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn bare_value_text(value: &Value) -> String {
    let mut value = value.clone();
    value.decor_mut().clear();
    value.to_string()
}

fn merge_table_with_targeted_updates(destination: &mut Table, source: &Table) {
    for (key, source_item) in source.iter() {
        match source_item {
            Item::Table(source_table) => {
                if !destination.get(key).is_some_and(Item::is_table) {
                    destination.insert(key, Item::Table(Table::new()));
                }
                if let Some(destination_table) =
                    destination.get_mut(key).and_then(Item::as_table_mut)
                {
                    merge_table_with_targeted_updates(destination_table, source_table);
                }
            }
            _ => {
                let unchanged = destination
                    .get(key)
                    .and_then(Item::as_value)
                    .zip(source_item.as_value())
                    .is_some_and(|(current, next)| bare_value_text(current) == bare_value_text(next));
                if !unchanged {
                    set_table_value_preserving_decor(destination, key, source_item.clone());
                }
            }
        }
    }
}

/// Rewrites `existing_text` with the values of `config`, keeping comments,
/// key order and keys the model does not serialize.
pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, String> {
    let next_config_text = toml::to_string(config)
        .map_err(|err| format!("failed to serialize config to TOML: {}", err))?;
    let next_document = next_config_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse serialized config TOML document: {}", err))?;
    let mut existing_document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse existing config as TOML document: {}", err))?;

    merge_table_with_targeted_updates(existing_document.as_table_mut(), next_document.as_table());
    Ok(existing_document.to_string())
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let existing_text = std::fs::read_to_string(path).ok();
    let config_text = if let Some(existing_text) = existing_text {
        match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => Some(updated_text),
            Err(err) => {
                warn!(
                    "Failed to preserve config comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                toml::to_string(config).ok()
            }
        }
    } else {
        toml::to_string(config).ok()
    };

    let Some(config_text) = config_text else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };

    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            log::error!("Failed to create config directory {}: {}", parent.display(), err);
            return;
        }
    }
    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

pub fn load_config_file(path: &Path) -> Config {
    let config_content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Config::default();
        }
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&config_content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

/// Drops the legacy `library.custom_paths` key once its directories have been
/// imported into the store.
pub fn remove_legacy_custom_paths(path: &Path) {
    let Ok(existing_text) = std::fs::read_to_string(path) else {
        return;
    };
    let mut document = match existing_text.parse::<DocumentMut>() {
        Ok(document) => document,
        Err(err) => {
            warn!("Failed to parse config {} as TOML: {}", path.display(), err);
            return;
        }
    };
    let removed = document
        .get_mut("library")
        .and_then(Item::as_table_mut)
        .and_then(|library| library.remove("custom_paths"))
        .is_some();
    if removed {
        if let Err(err) = std::fs::write(path, document.to_string()) {
            log::error!("Failed to persist config to {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        load_config_file, persist_config_file, remove_legacy_custom_paths,
        serialize_config_with_preserved_comments,
    };
    use crate::config::{Config, LogLevel};

    #[test]
    fn test_serialize_preserves_comments_and_updates_changed_values() {
        let existing = r#"# local overrides
[catalog]
# staging catalog
base_url = "https://staging.example/" # keep me

[logging]
level = "info"
"#;
        let mut config: Config = toml::from_str(existing).unwrap();
        config.logging.level = LogLevel::Debug;

        let updated = serialize_config_with_preserved_comments(existing, &config).unwrap();
        assert!(updated.contains("# local overrides"));
        assert!(updated.contains("# staging catalog"));
        assert!(updated.contains("# keep me"));
        assert!(updated.contains("level = \"debug\""));

        let reparsed: Config = toml::from_str(&updated).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_persist_then_load_returns_same_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.library.folders = vec!["/srv/videos".to_string()];
        config.indexer.retrieve_cast = true;

        persist_config_file(&config, &path);
        assert_eq!(load_config_file(&path), config);
    }

    #[test]
    fn test_load_missing_or_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert_eq!(load_config_file(&missing), Config::default());

        let invalid = dir.path().join("invalid.toml");
        std::fs::write(&invalid, "[indexer\nbatch_size = ").unwrap();
        assert_eq!(load_config_file(&invalid), Config::default());
    }

    #[test]
    fn test_legacy_custom_paths_key_is_removed_with_comments_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[library]\n# scanned\nfolders = [\"/a\"]\ncustom_paths = \"/b:/c\"\n",
        )
        .unwrap();

        remove_legacy_custom_paths(&path);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# scanned"));
        assert!(!text.contains("custom_paths"));
        assert!(load_config_file(&path)
            .library
            .legacy_custom_paths
            .is_none());
    }
}
