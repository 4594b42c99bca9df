//! Read-through cache of `mapvalues` lookup tables.
//!
//! A map file is a flat JSON object from key to replacement string or
//! `null`. Each file is read at most once per run, keyed by its canonical
//! path, and never invalidated.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{PipelineError, PipelineResult};

/// Key to replacement; `None` means drop.
pub type MapTable = HashMap<String, Option<String>>;

#[derive(Debug, Default)]
pub struct MapFileCache {
    tables: HashMap<PathBuf, Rc<MapTable>>,
    loads: usize,
}

impl MapFileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached table for `path`, reading it on first use.
    pub fn get_or_load(&mut self, path: &Path) -> PipelineResult<Rc<MapTable>> {
        let key = normalize(path);
        if let Some(table) = self.tables.get(&key) {
            return Ok(Rc::clone(table));
        }

        let table = Rc::new(load_map_file(path)?);
        self.loads += 1;
        self.tables.insert(key, Rc::clone(&table));
        Ok(table)
    }

    /// Number of files read from disk so far.
    pub fn load_count(&self) -> usize {
        self.loads
    }
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn load_map_file(path: &Path) -> PipelineResult<MapTable> {
    let map_error = |message: String| PipelineError::MapFile {
        path: path.to_path_buf(),
        message,
    };

    let content = fs::read_to_string(path).map_err(|e| map_error(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| map_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_loaded_once_per_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tags.json");
        fs::write(&path, r#"{"a": "1", "b": null}"#).unwrap();

        let mut cache = MapFileCache::new();
        let first = cache.get_or_load(&path).unwrap();
        assert_eq!(first.get("a"), Some(&Some("1".to_string())));
        assert_eq!(first.get("b"), Some(&None));

        // A later change on disk is not picked up
        fs::write(&path, r#"{"a": "2"}"#).unwrap();
        let second = cache.get_or_load(&path).unwrap();
        assert_eq!(second.get("a"), Some(&Some("1".to_string())));

        // Same file through a different spelling of the path
        let dotted = dir.path().join(".").join("tags.json");
        cache.get_or_load(&dotted).unwrap();

        assert_eq!(cache.load_count(), 1);
    }

    #[test]
    fn test_missing_file_is_map_file_error() {
        let err = MapFileCache::new()
            .get_or_load(Path::new("/nonexistent/map.json"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MapFile { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_non_string_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"a": 1}"#).unwrap();

        let err = MapFileCache::new().get_or_load(&path).unwrap_err();
        assert!(matches!(err, PipelineError::MapFile { .. }));
    }
}
