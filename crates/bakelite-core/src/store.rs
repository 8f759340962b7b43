use crate::catalog::Catalog;
use crate::settings::Settings;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Duration cache persisted between runs.  `None` marks a known live /
/// unbounded source and is as final as any finite value: it is never
/// re-queried and never evicted.
pub type DurationCache = HashMap<String, Option<f64>>;

/// Flat JSON persistence for the catalog, settings, and duration cache.
/// Loads are tolerant: a missing or corrupt file yields the default so the
/// daemon always comes up.
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog.json")
    }

    fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    fn durations_path(&self) -> PathBuf {
        self.data_dir.join("durations.json")
    }

    pub fn load_catalog(&self) -> Catalog {
        let mut catalog: Catalog = load_or_default(&self.catalog_path());
        catalog.validate_active_pack();
        catalog
    }

    pub fn save_catalog(&self, catalog: &Catalog) -> Result<()> {
        save_json(&self.catalog_path(), catalog)
    }

    pub fn load_settings(&self) -> Settings {
        let mut settings: Settings = load_or_default(&self.settings_path());
        settings.sanitize();
        settings
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        save_json(&self.settings_path(), settings)
    }

    pub fn load_durations(&self) -> DurationCache {
        let cache: DurationCache = load_or_default(&self.durations_path());
        if !cache.is_empty() {
            info!("Loaded {} cached durations", cache.len());
        }
        cache
    }

    pub fn save_durations(&self, cache: &DurationCache) -> Result<()> {
        save_json(&self.durations_path(), cache)
    }
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => {
            debug!("File not found, using defaults: {}", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            error!("Invalid JSON in {}: {}", path.display(), e);
            T::default()
        }
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    debug!("Saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Pack, Station};

    fn temp_store(tag: &str) -> Store {
        let dir = std::env::temp_dir().join(format!(
            "bakelite-store-test-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        Store::new(dir)
    }

    #[test]
    fn missing_files_yield_defaults() {
        let store = temp_store("missing");
        assert!(store.load_catalog().packs.is_empty());
        assert_eq!(store.load_settings().default_volume, 40);
        assert!(store.load_durations().is_empty());
    }

    #[test]
    fn catalog_round_trip() {
        let store = temp_store("catalog");
        let catalog = Catalog {
            packs: vec![Pack {
                id: "p".into(),
                name: "Diamond City".into(),
                stations: vec![Station {
                    id: "s".into(),
                    name: "Classical".into(),
                    url: "https://example.com/a".into(),
                }],
            }],
            active_pack_id: Some("p".into()),
        };
        store.save_catalog(&catalog).unwrap();
        let loaded = store.load_catalog();
        assert_eq!(loaded.packs.len(), 1);
        assert_eq!(loaded.active_pack_id.as_deref(), Some("p"));
        assert_eq!(loaded.packs[0].stations[0].name, "Classical");
        let _ = std::fs::remove_dir_all(store.data_dir());
    }

    #[test]
    fn duration_cache_keeps_negative_entries() {
        let store = temp_store("durations");
        let mut cache = DurationCache::new();
        cache.insert("https://example.com/live".into(), None);
        cache.insert("https://example.com/vod".into(), Some(300.0));
        store.save_durations(&cache).unwrap();
        let loaded = store.load_durations();
        assert_eq!(loaded.get("https://example.com/live"), Some(&None));
        assert_eq!(loaded.get("https://example.com/vod"), Some(&Some(300.0)));
        let _ = std::fs::remove_dir_all(store.data_dir());
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let store = temp_store("corrupt");
        std::fs::create_dir_all(store.data_dir()).unwrap();
        std::fs::write(store.data_dir().join("settings.json"), "{not json").unwrap();
        assert_eq!(store.load_settings().max_volume, 100);
        let _ = std::fs::remove_dir_all(store.data_dir());
    }
}
