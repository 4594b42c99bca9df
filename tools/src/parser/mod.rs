//! Readers for record sources.
//!
//! CSV files are decoded with encoding and delimiter auto-detection and read
//! with a header row; JSON files hold an array of flat objects.

use serde_json::Value;
use std::path::Path;

use crate::record::{FieldValue, Record};

/// Input parsing error with context
#[derive(Debug, Clone)]
pub struct CsvError {
    pub line: usize,
    pub column: Option<String>,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(col) => write!(f, "Line {}, column '{}': {}", self.line, col, self.message),
            None => write!(f, "Line {}: {}", self.line, self.message),
        }
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub records: Vec<Record>,
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the header line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text with a header row.
///
/// Rows shorter than the header get `Null` for the missing columns; extra
/// trailing values are ignored. Blank lines are skipped.
pub fn parse_csv_str(content: &str, delimiter: char) -> Result<Vec<Record>, CsvError> {
    parse_csv_with_headers(content, delimiter).map(|(_, records)| records)
}

fn parse_csv_with_headers(
    content: &str,
    delimiter: char,
) -> Result<(Vec<String>, Vec<Record>), CsvError> {
    if content.trim().is_empty() {
        return Err(CsvError::new(1, "Empty CSV file"));
    }

    let delimiter = u8::try_from(delimiter)
        .map_err(|_| CsvError::new(1, format!("Unsupported delimiter '{}'", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvError::new(1, format!("Cannot read header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::new(1, "No headers found"));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| {
            let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
            CsvError::new(line, e.to_string())
        })?;

        let mut record = Record::new();
        for (i, header) in headers.iter().enumerate() {
            match row.get(i) {
                Some(value) => record.set(header.clone(), value),
                None => record.set(header.clone(), FieldValue::Null),
            }
        }
        records.push(record);
    }

    Ok((headers, records))
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
///
/// Valid UTF-8 is always read as UTF-8; chardet is only asked about other
/// input, since it mislabels short UTF-8 text as Latin-1.
pub fn parse_bytes_auto(bytes: &[u8]) -> Result<ParseResult, CsvError> {
    let encoding = match std::str::from_utf8(bytes) {
        Ok(_) => "utf-8".to_string(),
        Err(_) => detect_encoding(bytes),
    };
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    let (headers, records) = parse_csv_with_headers(&content, delimiter)?;

    Ok(ParseResult {
        records,
        encoding,
        delimiter,
        headers,
    })
}

/// Read a CSV file with auto-detection of encoding and delimiter.
pub fn read_csv_file<P: AsRef<Path>>(path: P) -> Result<ParseResult, CsvError> {
    let bytes = std::fs::read(path.as_ref())
        .map_err(|e| CsvError::new(0, format!("Cannot read file: {}", e)))?;
    parse_bytes_auto(&bytes)
}

/// Parse a JSON array of flat objects.
pub fn parse_json_records(content: &str) -> Result<Vec<Record>, String> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| format!("Invalid JSON: {}", e))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(format!(
                "expected an array of objects, found {}",
                json_kind(&other)
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let kind = json_kind(&item);
            Record::from_json(item)
                .ok_or_else(|| format!("element {} is {}, expected an object", i, kind))
        })
        .collect()
}

/// Read a JSON file holding an array of objects.
pub fn read_json_file<P: AsRef<Path>>(path: P) -> Result<Vec<Record>, String> {
    let content = std::fs::read_to_string(path.as_ref())
        .map_err(|e| format!("Cannot read file: {}", e))?;
    parse_json_records(&content)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_csv() {
        let rows = parse_csv_str("title,date\nFirst,01/02/2020\nSecond,03/04/2021", ',').unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("title"), Some(&FieldValue::from("First")));
        assert_eq!(rows[1].get("date"), Some(&FieldValue::from("03/04/2021")));
    }

    #[test]
    fn test_quoted_values_keep_delimiters() {
        let rows = parse_csv_str("name,tags\n\"Alice\",\"a, b\"", ',').unwrap();
        assert_eq!(rows[0].get("tags"), Some(&FieldValue::from("a, b")));
    }

    #[test]
    fn test_short_rows_get_null() {
        let rows = parse_csv_str("a,b,c\n1,2", ',').unwrap();
        assert_eq!(rows[0].get("c"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_header_order_preserved() {
        let rows = parse_csv_str("z,a,m\n1,2,3", ',').unwrap();
        assert_eq!(rows[0].field_names().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_empty_csv_error() {
        let err = parse_csv_str("", ',').unwrap_err();
        assert!(err.message.contains("Empty"));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("title"), ',');
    }

    #[test]
    fn test_auto_parse_strips_bom() {
        let bytes = "\u{feff}name;age\nAlice;30".as_bytes();
        let result = parse_bytes_auto(bytes).unwrap();

        assert_eq!(result.delimiter, ';');
        assert_eq!(result.headers, vec!["name", "age"]);
        assert_eq!(result.records[0].get("name"), Some(&FieldValue::from("Alice")));
    }

    #[test]
    fn test_short_utf8_is_not_reinterpreted() {
        for name in ["Élodie", "Åsa"] {
            let result = parse_bytes_auto(format!("t\n{}\n", name).as_bytes()).unwrap();
            assert_eq!(result.encoding, "utf-8");
            assert_eq!(result.records[0].get("t"), Some(&FieldValue::from(name)));
        }
    }

    #[test]
    fn test_latin1_bytes_still_detected() {
        // "t\nSociété\n" in ISO-8859-1, not valid UTF-8
        let bytes: &[u8] = &[0x74, 0x0A, 0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9, 0x0A];
        let result = parse_bytes_auto(bytes).unwrap();
        assert_ne!(result.encoding, "utf-8");
        assert!(result.records[0].get("t").is_some());
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_json_records() {
        let rows = parse_json_records(r#"[{"a": "1"}, {"a": "2", "b": ["x"]}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("b"), Some(&FieldValue::List(vec!["x".into()])));
    }

    #[test]
    fn test_json_rejects_non_array_and_non_objects() {
        let err = parse_json_records(r#"{"a": 1}"#).unwrap_err();
        assert!(err.contains("expected an array"));

        let err = parse_json_records(r#"[{"a": 1}, 5]"#).unwrap_err();
        assert!(err.contains("element 1"));
    }
}
