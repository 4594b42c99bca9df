//! Mutable state of one pipeline run.

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use super::fetch::{Fetcher, HttpFetcher};
use super::mapfile::{MapFileCache, MapTable};
use super::output::Outputs;
use crate::error::{PipelineResult, RecordError, RecordResult};
use crate::record::Record;

/// The current record plus everything that outlives it: output
/// accumulators, the map-file cache, compiled patterns and the fetcher.
///
/// Owned by the executor and passed by `&mut` to every handler.
pub struct RecordStore {
    pub current: Record,
    outputs: Outputs,
    map_files: MapFileCache,
    patterns: HashMap<String, Regex>,
    fetcher: Box<dyn Fetcher>,
}

impl RecordStore {
    /// Store with a live HTTP fetcher.
    pub fn new() -> Self {
        Self::with_fetcher(Box::new(HttpFetcher::new()))
    }

    pub fn with_fetcher(fetcher: Box<dyn Fetcher>) -> Self {
        Self {
            current: Record::new(),
            outputs: Outputs::new(),
            map_files: MapFileCache::new(),
            patterns: HashMap::new(),
            fetcher,
        }
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut Outputs {
        &mut self.outputs
    }

    pub fn into_outputs(self) -> Outputs {
        self.outputs
    }

    pub fn map_file(&mut self, path: &Path) -> PipelineResult<Rc<MapTable>> {
        self.map_files.get_or_load(path)
    }

    pub fn map_file_loads(&self) -> usize {
        self.map_files.load_count()
    }

    /// Compiled pattern, cached by source text.
    pub fn pattern(&mut self, source: &str) -> RecordResult<Regex> {
        if let Some(re) = self.patterns.get(source) {
            return Ok(re.clone());
        }

        let re = Regex::new(source).map_err(|e| RecordError::InvalidPattern {
            pattern: source.to_string(),
            message: e.to_string(),
        })?;
        self.patterns.insert(source.to_string(), re.clone());
        Ok(re)
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_cache() {
        let mut store = RecordStore::new();
        let first = store.pattern(r"^\d+$").unwrap();
        let second = store.pattern(r"^\d+$").unwrap();
        assert_eq!(first.as_str(), second.as_str());
        assert_eq!(store.patterns.len(), 1);

        let err = store.pattern("(").unwrap_err();
        assert!(matches!(err, RecordError::InvalidPattern { .. }));
    }
}
