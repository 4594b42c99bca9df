//! Output accumulators and the finalizer.
//!
//! Outputs are buffered in memory for the whole run and written once by
//! [`Outputs::flush`]. A file is either a list of records (`write`) or an
//! extraction map (`extractmap`), never both.

use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{OutputError, OutputResult};
use crate::record::Record;

/// Kind of an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Records,
    Extraction,
}

impl OutputKind {
    /// Command that produces this kind.
    pub fn command(&self) -> &'static str {
        match self {
            OutputKind::Records => "write",
            OutputKind::Extraction => "extractmap",
        }
    }
}

/// Buffered content of one output file.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Records(Vec<Record>),
    /// Extracted key to resolved value, `null` until filled in
    Extraction(Map<String, Value>),
}

impl Accumulator {
    pub fn kind(&self) -> OutputKind {
        match self {
            Accumulator::Records(_) => OutputKind::Records,
            Accumulator::Extraction(_) => OutputKind::Extraction,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Accumulator::Records(records) => {
                Value::Array(records.iter().map(Record::to_json).collect())
            }
            Accumulator::Extraction(map) => Value::Object(map.clone()),
        }
    }
}

/// Key identifying an output file however its path is spelled.
///
/// The file itself may not exist yet, so only its directory is
/// canonicalized. `x.json`, `./x.json` and `/abs/cwd/x.json` share a key.
pub fn output_key(file: &str) -> PathBuf {
    let path = Path::new(file);
    let Some(name) = path.file_name() else {
        return path.to_path_buf();
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    match fs::canonicalize(dir) {
        Ok(dir) => dir.join(name),
        Err(_) => path
            .components()
            .filter(|c| *c != Component::CurDir)
            .collect(),
    }
}

#[derive(Debug)]
struct Slot {
    /// Path as first named on the command line
    path: PathBuf,
    buffer: Accumulator,
}

/// All output accumulators of a run, keyed by [`output_key`].
#[derive(Debug, Default)]
pub struct Outputs {
    buffers: BTreeMap<PathBuf, Slot>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to a `write` output.
    pub fn append_record(&mut self, file: &str, record: Record) -> OutputResult<()> {
        let slot = self.buffers.entry(output_key(file)).or_insert_with(|| Slot {
            path: PathBuf::from(file),
            buffer: Accumulator::Records(Vec::new()),
        });

        match &mut slot.buffer {
            Accumulator::Records(records) => {
                records.push(record);
                Ok(())
            }
            other => Err(conflict(file, other.kind(), OutputKind::Records)),
        }
    }

    /// Add a key to an extraction map. Existing keys, including ones loaded
    /// from a previous run's file, keep their value. Returns true if the key
    /// is new.
    pub fn extract_key(&mut self, file: &str, key: &str) -> OutputResult<bool> {
        let slot = match self.buffers.entry(output_key(file)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let seed = load_extraction(Path::new(file))?;
                entry.insert(Slot {
                    path: PathBuf::from(file),
                    buffer: Accumulator::Extraction(seed),
                })
            }
        };

        match &mut slot.buffer {
            Accumulator::Extraction(map) => {
                if map.contains_key(key) {
                    return Ok(false);
                }
                map.insert(key.to_string(), Value::Null);
                Ok(true)
            }
            other => Err(conflict(file, other.kind(), OutputKind::Extraction)),
        }
    }

    pub fn get(&self, file: &str) -> Option<&Accumulator> {
        self.buffers.get(&output_key(file)).map(|slot| &slot.buffer)
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.buffers.values().map(|slot| slot.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Write every accumulator as pretty JSON, overwriting existing files.
    /// Returns the paths written.
    pub fn flush(&self) -> OutputResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.buffers.len());

        for Slot { path, buffer } in self.buffers.values() {
            let mut json = serde_json::to_string_pretty(&buffer.to_json()).map_err(|source| {
                OutputError::Json {
                    path: path.clone(),
                    source,
                }
            })?;
            json.push('\n');

            fs::write(&path, json).map_err(|source| OutputError::Io {
                path: path.clone(),
                source,
            })?;
            written.push(path.clone());
        }

        Ok(written)
    }
}

fn conflict(file: &str, existing: OutputKind, requested: OutputKind) -> OutputError {
    OutputError::KindConflict {
        file: file.to_string(),
        existing: existing.command(),
        requested: requested.command(),
    }
}

/// Existing extraction file contents, or an empty map.
fn load_extraction(path: &Path) -> OutputResult<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }

    let content = fs::read_to_string(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| OutputError::Json {
        path: path.to_path_buf(),
        source,
    })
}
