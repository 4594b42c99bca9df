//! Error types for the stashtools pipeline and importer.
//!
//! - [`RecordError`] - per-record data errors, contained by the executor
//! - [`FetchError`] - remote resource download errors, contained by `wget`
//! - [`OutputError`] - accumulator and finalisation errors
//! - [`PipelineError`] - top-level interpreter errors
//! - [`ClientError`] - stash-box GraphQL client errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Per-record Errors
// =============================================================================

/// Errors caused by the data of a single record.
///
/// These never abort a run: the executor skips the remaining commands of the
/// failing record and moves on to the next one.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The field holds a value the command cannot operate on.
    #[error("field '{field}' holds {found}, expected {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Date string did not match the format.
    #[error("cannot parse '{value}' in field '{field}' as a date with format '{format}'")]
    InvalidDate {
        field: String,
        value: String,
        format: String,
    },

    /// Duration string did not match the pattern.
    #[error("cannot parse '{value}' in field '{field}' as a duration: {message}")]
    InvalidDuration {
        field: String,
        value: String,
        message: String,
    },

    /// Pattern failed to compile at runtime.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

// =============================================================================
// Fetch Errors
// =============================================================================

/// Errors while downloading a remote resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status.
    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Could not write the local copy.
    #[error("Failed to store download: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors from output accumulators and the finalizer.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Two command kinds target the same output file.
    #[error("output '{file}' is written by `{existing}`, it cannot also take `{requested}`")]
    KindConflict {
        file: String,
        existing: &'static str,
        requested: &'static str,
    },

    /// Writing an output file failed.
    #[error("Failed to write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialising or reading back an output failed.
    #[error("Output JSON error for '{}': {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level interpreter errors.
///
/// Everything except [`PipelineError::Record`] is fatal: it indicates a broken
/// pipeline definition or unusable input and stops the run before any output
/// is flushed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Command name not in the registry.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Token stream ran out before the command's arity was satisfied.
    #[error("not enough arguments for '{command}'; usage: {usage}")]
    MissingArguments {
        command: &'static str,
        usage: &'static str,
    },

    /// Argument rejected at build time.
    #[error("invalid arguments for '{command}': {message}; usage: {usage}")]
    InvalidArguments {
        command: &'static str,
        usage: &'static str,
        message: String,
    },

    /// Include script could not be read or tokenized.
    #[error("cannot include '{}': {message}", .path.display())]
    Include { path: PathBuf, message: String },

    /// Include scripts nested deeper than allowed.
    #[error("include depth limit {limit} exceeded at '{}'", .path.display())]
    IncludeDepth { path: PathBuf, limit: usize },

    /// `end` without an open scope.
    #[error("'end' outside of any record source scope")]
    UnbalancedScope,

    /// Record source could not be read.
    #[error("cannot read records from '{}': {message}", .path.display())]
    Source { path: PathBuf, message: String },

    /// Map file could not be read.
    #[error("cannot load map file '{}': {message}", .path.display())]
    MapFile { path: PathBuf, message: String },

    /// Per-record data error.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Output error.
    #[error(transparent)]
    Output(#[from] OutputError),
}

impl PipelineError {
    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::Record(_))
    }
}

// =============================================================================
// Client Errors
// =============================================================================

/// Errors from the stash-box GraphQL client and importer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Required configuration missing.
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// Non-200 answer.
    #[error("GraphQL query failed: {status} - {body}")]
    Http { status: u16, body: String },

    /// Server returned GraphQL errors.
    #[error("GraphQL error: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    /// Response did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Row could not be turned into a scene.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Local file error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for record-level operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for output operations.
pub type OutputResult<T> = Result<T, OutputError>;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_errors_are_not_fatal() {
        let err: PipelineError = RecordError::InvalidDate {
            field: "date".into(),
            value: "soon".into(),
            format: "%Y".into(),
        }
        .into();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn test_configuration_errors_are_fatal() {
        let err = PipelineError::MissingArguments {
            command: "mv",
            usage: "mv <field> <to>",
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("mv <field> <to>"));

        let err: PipelineError = OutputError::KindConflict {
            file: "out.json".into(),
            existing: "write",
            requested: "extractmap",
        }
        .into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("out.json"));
    }

    #[test]
    fn test_graphql_error_format() {
        let err = ClientError::GraphQl(vec!["bad input".into(), "denied".into()]);
        assert_eq!(err.to_string(), "GraphQL error: bad input; denied");
    }
}
