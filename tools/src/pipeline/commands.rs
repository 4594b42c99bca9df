//! Built-in command handlers, record sources and argument validators.
//!
//! Every handler edits `store.current` or the output accumulators. A field
//! that is absent or `null` is left alone by every mutator except `setstr`
//! and `rm`; values of the wrong shape are per-record errors.

use chrono::format::{self, Item, ParseErrorKind, Parsed, StrftimeItems};
use chrono::NaiveDate;
use regex::Regex;
use std::path::Path;

use super::command::Command;
use super::fetch;
use super::store::RecordStore;
use crate::error::{PipelineError, PipelineResult, RecordError, RecordResult};
use crate::logs::log_warning;
use crate::parser;
use crate::record::{FieldValue, Record};

/// Canonical output format of `parsedate`
const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";

/// Capture group names understood by `parseduration`, in microseconds.
const DURATION_UNITS: &[(&str, i128)] = &[
    ("weeks", 7 * 24 * 3600 * 1_000_000),
    ("days", 24 * 3600 * 1_000_000),
    ("hours", 3600 * 1_000_000),
    ("minutes", 60 * 1_000_000),
    ("seconds", 1_000_000),
    ("milliseconds", 1_000),
    ("microseconds", 1),
];

const STRING_OR_LIST: &str = "a string or list of strings";

// ============================================================================
// Record sources
// ============================================================================

pub fn read_csv(path: &Path) -> PipelineResult<Vec<Record>> {
    let parsed = parser::read_csv_file(path).map_err(|e| PipelineError::Source {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(parsed.records)
}

pub fn read_json(path: &Path) -> PipelineResult<Vec<Record>> {
    parser::read_json_file(path).map_err(|message| PipelineError::Source {
        path: path.to_path_buf(),
        message,
    })
}

// ============================================================================
// Outputs
// ============================================================================

/// `write <file>`: append a snapshot of the current record.
pub fn write(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    let record = store.current.clone();
    store.outputs_mut().append_record(cmd.arg(0), record)?;
    Ok(())
}

/// `extractmap <field> <outfile>`: collect the field's value(s) as keys.
pub fn extract_map(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    let field = cmd.arg(0);
    let keys = match store.current.get(field) {
        None | Some(FieldValue::Null) => return Ok(()),
        Some(FieldValue::Text(s)) => vec![s.clone()],
        Some(FieldValue::List(items)) => items.clone(),
        Some(other) => return Err(mismatch(field, STRING_OR_LIST, other).into()),
    };

    for key in &keys {
        store.outputs_mut().extract_key(cmd.arg(1), key)?;
    }
    Ok(())
}

// ============================================================================
// Field mutators
// ============================================================================

pub fn rm(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    store.current.remove(cmd.arg(0));
    Ok(())
}

pub fn mv(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    store.current.rename(cmd.arg(0), cmd.arg(1));
    Ok(())
}

pub fn keep(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    let fields = split_field_list(cmd.arg(0));
    store.current.retain_fields(&fields);
    Ok(())
}

pub fn set_str(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    store.current.set(cmd.arg(0), cmd.arg(1));
    Ok(())
}

/// `replace <field> <regex> <replacement>`, every match, per list element.
pub fn replace(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    let re = store.pattern(cmd.arg(1))?;
    let replacement =
        translate_replacement(cmd.arg(2)).map_err(|message| RecordError::InvalidPattern {
            pattern: cmd.arg(2).to_string(),
            message,
        })?;

    transform_strings(&mut store.current, cmd.arg(0), |value| {
        Ok(re.replace_all(value, replacement.as_str()).into_owned())
    })?;
    Ok(())
}

/// `tolist <field> <separator>`: split a string into trimmed, non-empty parts.
pub fn to_list(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    let field = cmd.arg(0);
    let separator = cmd.arg(1);

    let parts: Vec<String> = match store.current.get(field) {
        None | Some(FieldValue::Null) | Some(FieldValue::List(_)) => return Ok(()),
        Some(FieldValue::Text(s)) => s
            .split(separator)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect(),
        Some(other) => return Err(mismatch(field, "a string", other).into()),
    };

    store.current.set(field, parts);
    Ok(())
}

pub fn parse_date(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    let field = cmd.arg(0);
    let format = cmd.arg(1);

    transform_strings(&mut store.current, field, |value| {
        parse_partial_date(value, format)
            .map(|date| date.format(DATE_OUTPUT_FORMAT).to_string())
            .ok_or_else(|| RecordError::InvalidDate {
                field: field.to_string(),
                value: value.to_string(),
                format: format.to_string(),
            })
    })?;
    Ok(())
}

/// Parse a date whose format may leave out the day or the month, which
/// then default to 1 (`%Y` on `2020` is 2020-01-01).
fn parse_partial_date(value: &str, fmt: &str) -> Option<NaiveDate> {
    let mut parsed = Parsed::new();
    format::parse(&mut parsed, value, StrftimeItems::new(fmt)).ok()?;

    match parsed.to_naive_date() {
        Ok(date) => Some(date),
        Err(e) if e.kind() == ParseErrorKind::NotEnough => {
            // Setters fail on fields the input already fixed; those keep their value.
            let _ = parsed.set_month(1);
            let _ = parsed.set_day(1);
            parsed.to_naive_date().ok()
        }
        Err(_) => None,
    }
}

pub fn parse_duration(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    let field = cmd.arg(0);
    let re = store.pattern(&anchored(cmd.arg(1)))?;

    let seconds = match store.current.get(field) {
        None | Some(FieldValue::Null) => return Ok(()),
        Some(FieldValue::Text(value)) => {
            duration_seconds(&re, value).map_err(|message| RecordError::InvalidDuration {
                field: field.to_string(),
                value: value.clone(),
                message,
            })?
        }
        Some(other) => return Err(mismatch(field, "a string", other).into()),
    };

    store.current.set(field, FieldValue::Integer(seconds));
    Ok(())
}

/// `mapvalues <field> <mapfile>`.
///
/// A key mapped to a string is replaced; a key mapped to `null` or missing
/// from the map is dropped. A scalar field is removed when its key is
/// dropped, a list keeps its surviving entries.
pub fn map_values(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    let field = cmd.arg(0);
    let map_path = cmd.arg(1);

    match store.current.get(field) {
        None | Some(FieldValue::Null) => return Ok(()),
        Some(FieldValue::Text(_)) | Some(FieldValue::List(_)) => {}
        Some(other) => return Err(mismatch(field, STRING_OR_LIST, other).into()),
    }

    let table = store.map_file(Path::new(map_path))?;
    let lookup = |key: &str| table.get(key).cloned().flatten();

    let mapped = match store.current.get(field) {
        Some(FieldValue::Text(key)) => {
            if !table.contains_key(key.as_str()) {
                log_warning(format!(
                    "mapvalues: no entry for '{}' in {}, removing '{}'",
                    key, map_path, field
                ));
            }
            lookup(key.as_str()).map(FieldValue::Text)
        }
        Some(FieldValue::List(items)) => Some(FieldValue::List(
            items.iter().filter_map(|key| lookup(key.as_str())).collect(),
        )),
        _ => return Ok(()),
    };

    match mapped {
        Some(value) => store.current.set(field, value),
        None => {
            store.current.remove(field);
        }
    }
    Ok(())
}

/// `wget <field> <dir> <suffix>`: replace remote references with local
/// copies. A failed download keeps the reference and logs a warning.
pub fn wget(store: &mut RecordStore, cmd: &Command) -> PipelineResult<()> {
    let field = cmd.arg(0);
    let dir = Path::new(cmd.arg(1));
    let suffix = cmd.arg(2);

    let fetched = match store.current.get(field) {
        None | Some(FieldValue::Null) => return Ok(()),
        Some(FieldValue::Text(reference)) => {
            FieldValue::Text(fetch_or_keep(store, reference, dir, suffix))
        }
        Some(FieldValue::List(references)) => FieldValue::List(
            references
                .iter()
                .map(|reference| fetch_or_keep(store, reference, dir, suffix))
                .collect(),
        ),
        Some(other) => return Err(mismatch(field, STRING_OR_LIST, other).into()),
    };

    store.current.set(field, fetched);
    Ok(())
}

fn fetch_or_keep(store: &RecordStore, reference: &str, dir: &Path, suffix: &str) -> String {
    match fetch::download(store.fetcher(), reference, dir, suffix) {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(e) => {
            log_warning(format!("wget: cannot fetch '{}': {}", reference, e));
            reference.to_string()
        }
    }
}

// ============================================================================
// Build-time argument validators
// ============================================================================

pub fn validate_keep(args: &[String]) -> Result<(), String> {
    if split_field_list(&args[0]).is_empty() {
        return Err("field list is empty".to_string());
    }
    Ok(())
}

pub fn validate_replace(args: &[String]) -> Result<(), String> {
    Regex::new(&args[1]).map_err(|e| format!("invalid regex '{}': {}", args[1], e))?;
    translate_replacement(&args[2])?;
    Ok(())
}

pub fn validate_parse_date(args: &[String]) -> Result<(), String> {
    if StrftimeItems::new(&args[1]).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid date format '{}'", args[1]));
    }
    Ok(())
}

pub fn validate_parse_duration(args: &[String]) -> Result<(), String> {
    let re = Regex::new(&anchored(&args[1]))
        .map_err(|e| format!("invalid regex '{}': {}", args[1], e))?;

    if let Some(name) = re.capture_names().flatten().find(|n| unit_micros(n).is_none()) {
        return Err(format!(
            "unknown duration group '{}', expected one of: {}",
            name,
            DURATION_UNITS
                .iter()
                .map(|(unit, _)| *unit)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    Ok(())
}

pub fn validate_to_list(args: &[String]) -> Result<(), String> {
    if args[1].is_empty() {
        return Err("separator is empty".to_string());
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn mismatch(field: &str, expected: &'static str, found: &FieldValue) -> RecordError {
    RecordError::TypeMismatch {
        field: field.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Apply `f` to a string field or to every element of a list field.
/// Absent and `null` fields are left alone.
fn transform_strings<F>(record: &mut Record, field: &str, mut f: F) -> RecordResult<()>
where
    F: FnMut(&str) -> RecordResult<String>,
{
    match record.get_mut(field) {
        None | Some(FieldValue::Null) => Ok(()),
        Some(FieldValue::Text(value)) => {
            *value = f(value)?;
            Ok(())
        }
        Some(FieldValue::List(items)) => {
            let mapped = items
                .iter()
                .map(|item| f(item))
                .collect::<RecordResult<Vec<_>>>()?;
            *items = mapped;
            Ok(())
        }
        Some(other) => Err(mismatch(field, STRING_OR_LIST, other)),
    }
}

fn split_field_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect()
}

/// Match only at the start of the value.
fn anchored(pattern: &str) -> String {
    format!("^(?:{})", pattern)
}

fn unit_micros(name: &str) -> Option<i128> {
    DURATION_UNITS
        .iter()
        .find(|(unit, _)| *unit == name)
        .map(|(_, micros)| *micros)
}

/// Sum the named groups of an anchored match into whole seconds.
/// Groups that did not participate count as zero.
fn duration_seconds(re: &Regex, value: &str) -> Result<i64, String> {
    let caps = re
        .captures(value)
        .ok_or_else(|| "pattern does not match".to_string())?;

    let mut micros: i128 = 0;
    for name in re.capture_names().flatten() {
        let Some(m) = caps.name(name) else { continue };
        if m.as_str().is_empty() {
            continue;
        }

        let count: i128 = m
            .as_str()
            .parse()
            .map_err(|_| format!("'{}' is not a whole number", m.as_str()))?;
        let unit = unit_micros(name).ok_or_else(|| format!("unknown unit '{}'", name))?;

        micros = count
            .checked_mul(unit)
            .and_then(|part| micros.checked_add(part))
            .ok_or_else(|| "duration out of range".to_string())?;
    }

    i64::try_from(micros / 1_000_000).map_err(|_| "duration out of range".to_string())
}

/// Convert `\1`, `\g<1>` and `\g<name>` group references to `${..}` form
/// and escape literal `$`.
fn translate_replacement(replacement: &str) -> Result<String, String> {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.next() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = d.to_string();
                    while let Some(&next) = chars.peek() {
                        if !next.is_ascii_digit() || group.len() == 2 {
                            break;
                        }
                        group.push(next);
                        chars.next();
                    }
                    out.push_str(&format!("${{{}}}", group));
                }
                Some('g') => {
                    if chars.next() != Some('<') {
                        return Err("expected '<' after \\g".to_string());
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('>') => break,
                            Some(ch) => name.push(ch),
                            None => return Err("unterminated group name".to_string()),
                        }
                    }
                    if name.is_empty() {
                        return Err("empty group name".to_string());
                    }
                    out.push_str(&format!("${{{}}}", name));
                }
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err("trailing backslash".to_string()),
            },
            other => out.push(other),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::pipeline::fetch::Fetcher;
    use crate::pipeline::output::Accumulator;
    use crate::pipeline::registry::{Action, CommandRegistry};
    use serde_json::{json, Value};
    use std::cell::Cell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::tempdir;

    struct CountingFetcher {
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl Fetcher for CountingFetcher {
        fn fetch(&self, reference: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(FetchError::Status {
                    url: reference.to_string(),
                    status: 404,
                });
            }
            Ok(reference.as_bytes().to_vec())
        }
    }

    fn store_with(record: Value) -> RecordStore {
        let mut store = RecordStore::with_fetcher(Box::new(CountingFetcher {
            calls: Rc::new(Cell::new(0)),
            fail: true,
        }));
        store.current = Record::from_json(record).unwrap();
        store
    }

    fn command(name: &str, args: &[&str]) -> Command {
        let registry = CommandRegistry::standard();
        let spec = *registry.lookup(name).unwrap();
        Command::new(spec, args.iter().map(|a| a.to_string()).collect())
    }

    fn run(store: &mut RecordStore, name: &str, args: &[&str]) -> PipelineResult<()> {
        let cmd = command(name, args);
        match cmd.action() {
            Action::Mutate(handler) => handler(store, &cmd),
            Action::Source(_) => panic!("{} is a source", name),
        }
    }

    fn fields(store: &RecordStore) -> Vec<&str> {
        store.current.field_names().collect()
    }

    #[test]
    fn test_keep_preserves_record_order() {
        let mut store = store_with(json!({"a": "1", "b": "2", "c": "3", "d": "4"}));
        run(&mut store, "keep", &["b,a"]).unwrap();
        assert_eq!(fields(&store), vec!["a", "b"]);

        let mut store = store_with(json!({"a": "1", "b": "2"}));
        run(&mut store, "keep", &[" a , "]).unwrap();
        assert_eq!(fields(&store), vec!["a"]);
    }

    #[test]
    fn test_keep_rejects_empty_list() {
        assert!(validate_keep(&[",".to_string()]).is_err());
        assert!(validate_keep(&["a".to_string()]).is_ok());
    }

    #[test]
    fn test_rm_and_mv() {
        let mut store = store_with(json!({"x": "1", "y": "2", "z": null}));

        run(&mut store, "mv", &["missing", "w"]).unwrap();
        assert_eq!(fields(&store), vec!["x", "y", "z"]);

        run(&mut store, "mv", &["x", "renamed"]).unwrap();
        assert_eq!(fields(&store), vec!["y", "z", "renamed"]);

        run(&mut store, "rm", &["z"]).unwrap();
        run(&mut store, "rm", &["missing"]).unwrap();
        assert_eq!(fields(&store), vec!["y", "renamed"]);
    }

    #[test]
    fn test_setstr_creates_or_overwrites() {
        let mut store = store_with(json!({"a": null}));
        run(&mut store, "setstr", &["a", "x"]).unwrap();
        run(&mut store, "setstr", &["b", "y"]).unwrap();
        assert_eq!(store.current.to_json(), json!({"a": "x", "b": "y"}));
    }

    #[test]
    fn test_replace_with_group_references() {
        let mut store = store_with(json!({
            "title": "Scene 12 - Part 3",
            "tags": ["a-b", "c-d"],
            "price": "5"
        }));

        run(&mut store, "replace", &["title", r"(\d+)", r"#\1"]).unwrap();
        run(&mut store, "replace", &["tags", r"(?P<l>\w)-(?P<r>\w)", r"\g<r>\g<l>"]).unwrap();
        run(&mut store, "replace", &["price", r"^", "$"]).unwrap();
        run(&mut store, "replace", &["missing", "a", "b"]).unwrap();

        assert_eq!(
            store.current.to_json(),
            json!({"title": "Scene #12 - Part #3", "tags": ["ba", "dc"], "price": "$5"})
        );
    }

    #[test]
    fn test_replace_on_integer_is_record_error() {
        let mut store = store_with(json!({"n": 3}));
        let err = run(&mut store, "replace", &["n", "3", "4"]).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_replace_validation() {
        let args = |re: &str, rep: &str| vec!["f".to_string(), re.to_string(), rep.to_string()];
        assert!(validate_replace(&args("(", "x")).is_err());
        assert!(validate_replace(&args("a", r"\g<x")).is_err());
        assert!(validate_replace(&args("a", r"\1")).is_ok());
    }

    #[test]
    fn test_tolist_trims_and_drops_empty() {
        let mut store = store_with(json!({"tags": "a, b,, c ", "other": ["x"]}));
        run(&mut store, "tolist", &["tags", ","]).unwrap();
        run(&mut store, "tolist", &["other", ","]).unwrap();
        run(&mut store, "tolist", &["missing", ","]).unwrap();
        assert_eq!(
            store.current.to_json(),
            json!({"tags": ["a", "b", "c"], "other": ["x"]})
        );
    }

    #[test]
    fn test_parsedate() {
        let mut store = store_with(json!({"release_date": "01/02/2020"}));
        run(&mut store, "parsedate", &["release_date", "%m/%d/%Y"]).unwrap();
        assert_eq!(
            store.current.get("release_date"),
            Some(&FieldValue::from("2020-01-02"))
        );

        let mut store = store_with(json!({"d": "2020-03-04 10:11:12"}));
        run(&mut store, "parsedate", &["d", "%Y-%m-%d %H:%M:%S"]).unwrap();
        assert_eq!(store.current.get("d"), Some(&FieldValue::from("2020-03-04")));
    }

    #[test]
    fn test_parsedate_defaults_missing_month_and_day() {
        let mut store = store_with(json!({"d": "2020", "m": "January 2020", "y": "03/2021"}));
        run(&mut store, "parsedate", &["d", "%Y"]).unwrap();
        run(&mut store, "parsedate", &["m", "%B %Y"]).unwrap();
        run(&mut store, "parsedate", &["y", "%m/%Y"]).unwrap();

        assert_eq!(
            store.current.to_json(),
            json!({"d": "2020-01-01", "m": "2020-01-01", "y": "2021-03-01"})
        );
    }

    #[test]
    fn test_parsedate_failure_is_record_error() {
        let mut store = store_with(json!({"d": "yesterday"}));
        let err = run(&mut store, "parsedate", &["d", "%m/%d/%Y"]).unwrap_err();
        assert!(matches!(err, PipelineError::Record(RecordError::InvalidDate { .. })));
        assert_eq!(store.current.get("d"), Some(&FieldValue::from("yesterday")));
    }

    #[test]
    fn test_parsedate_validation() {
        assert!(validate_parse_date(&["d".to_string(), "%Y-%m-%d".to_string()]).is_ok());
        assert!(validate_parse_date(&["d".to_string(), "%Y-%m-%".to_string()]).is_err());
    }

    const HMS: &str = r"(?:(?:(?P<hours>\d+):)?(?:(?P<minutes>\d+):))?(?P<seconds>\d+)";

    #[test]
    fn test_parseduration() {
        let mut store = store_with(json!({"a": "1:02:03", "b": "45", "c": "2:30"}));
        run(&mut store, "parseduration", &["a", HMS]).unwrap();
        run(&mut store, "parseduration", &["b", HMS]).unwrap();
        run(&mut store, "parseduration", &["c", HMS]).unwrap();

        assert_eq!(store.current.to_json(), json!({"a": 3723, "b": 45, "c": 150}));
    }

    #[test]
    fn test_parseduration_is_anchored() {
        let mut store = store_with(json!({"d": "approx 45"}));
        let err = run(&mut store, "parseduration", &["d", HMS]).unwrap_err();
        assert!(matches!(err, PipelineError::Record(RecordError::InvalidDuration { .. })));
    }

    #[test]
    fn test_parseduration_rejects_lists_and_unknown_units() {
        let mut store = store_with(json!({"d": ["1"]}));
        assert!(run(&mut store, "parseduration", &["d", HMS]).is_err());

        let args = ["d".to_string(), r"(?P<years>\d+)".to_string()];
        assert!(validate_parse_duration(&args).is_err());
        let args = ["d".to_string(), HMS.to_string()];
        assert!(validate_parse_duration(&args).is_ok());
    }

    #[test]
    fn test_extractmap_deduplicates() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("tags.json");
        let out = out.to_str().unwrap();
        let mut store = store_with(json!({}));

        for tags in [json!(["a", "b"]), json!(["b"]), json!(["c"])] {
            store.current = Record::from_json(json!({ "tags": tags })).unwrap();
            run(&mut store, "extractmap", &["tags", out]).unwrap();
        }

        match store.outputs().get(out).unwrap() {
            Accumulator::Extraction(map) => {
                assert_eq!(Value::Object(map.clone()), json!({"a": null, "b": null, "c": null}));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_mapvalues() {
        let dir = tempdir().unwrap();
        let map = dir.path().join("tagmap.json");
        fs::write(&map, r#"{"a": "1", "b": null}"#).unwrap();
        let map = map.to_str().unwrap();

        let mut store = store_with(json!({"tag": "a"}));
        run(&mut store, "mapvalues", &["tag", map]).unwrap();
        assert_eq!(store.current.to_json(), json!({"tag": "1"}));

        store.current = Record::from_json(json!({"tag": "b", "x": "y"})).unwrap();
        run(&mut store, "mapvalues", &["tag", map]).unwrap();
        assert_eq!(store.current.to_json(), json!({"x": "y"}));

        store.current = Record::from_json(json!({"tag": "zzz"})).unwrap();
        run(&mut store, "mapvalues", &["tag", map]).unwrap();
        assert!(store.current.is_empty());

        store.current = Record::from_json(json!({"tag": ["a", "b", "c"]})).unwrap();
        run(&mut store, "mapvalues", &["tag", map]).unwrap();
        assert_eq!(store.current.to_json(), json!({"tag": ["1"]}));

        assert_eq!(store.map_file_loads(), 1);
    }

    #[test]
    fn test_mapvalues_missing_map_is_fatal_only_when_needed() {
        let mut store = store_with(json!({"other": "a"}));
        run(&mut store, "mapvalues", &["tag", "/nonexistent.json"]).unwrap();

        store.current = Record::from_json(json!({"tag": "a"})).unwrap();
        let err = run(&mut store, "mapvalues", &["tag", "/nonexistent.json"]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_wget_fetches_once() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("images");
        let target = target.to_str().unwrap();
        let calls = Rc::new(Cell::new(0));

        let mut store = RecordStore::with_fetcher(Box::new(CountingFetcher {
            calls: Rc::clone(&calls),
            fail: false,
        }));

        for _ in 0..2 {
            store.current = Record::from_json(json!({"image": "http://x/a.jpg"})).unwrap();
            run(&mut store, "wget", &["image", target, ".jpg"]).unwrap();
        }

        assert_eq!(calls.get(), 1);
        let local = store.current.get("image").unwrap().as_text().unwrap();
        assert!(local.starts_with(target));
        assert!(local.ends_with(".jpg"));
        assert_eq!(fs::read(local).unwrap(), b"http://x/a.jpg");
    }

    #[test]
    fn test_wget_failure_keeps_reference() {
        let dir = tempdir().unwrap();
        let target = dir.path().to_str().unwrap();
        let mut store = store_with(json!({"image": "http://x/missing.jpg"}));

        run(&mut store, "wget", &["image", target, ".jpg"]).unwrap();
        assert_eq!(
            store.current.get("image"),
            Some(&FieldValue::from("http://x/missing.jpg"))
        );
    }

    #[test]
    fn test_write_snapshots_current_record() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.json");
        let out = out.to_str().unwrap();
        let mut store = store_with(json!({"a": "1"}));

        run(&mut store, "write", &[out]).unwrap();
        run(&mut store, "setstr", &["a", "2"]).unwrap();
        run(&mut store, "write", &[out]).unwrap();

        match store.outputs().get(out).unwrap() {
            Accumulator::Records(records) => {
                assert_eq!(records[0].to_json(), json!({"a": "1"}));
                assert_eq!(records[1].to_json(), json!({"a": "2"}));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sources_report_path() {
        let err = read_json(Path::new("/nonexistent/in.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Source { .. }));
        assert!(err.is_fatal());

        let dir = tempdir().unwrap();
        let csv = dir.path().join("in.csv");
        fs::write(&csv, "title,url\nA,http://a\n").unwrap();
        let records = read_csv(&csv).unwrap();
        assert_eq!(records[0].to_json(), json!({"title": "A", "url": "http://a"}));
    }

    #[test]
    fn test_readcsv_keeps_utf8_names() {
        let dir = tempdir().unwrap();
        for name in ["Élodie", "Åsa"] {
            let csv = dir.path().join("names.csv");
            fs::write(&csv, format!("t\n{}\n", name)).unwrap();
            let records = read_csv(&csv).unwrap();
            assert_eq!(records[0].to_json(), json!({"t": name}));
        }
    }
}
