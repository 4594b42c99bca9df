//! # stashtools - record transformation and stash-box import tools
//!
//! A command-pipeline interpreter that reshapes CSV or JSON records into the
//! shape a stash-box server expects, plus a GraphQL client and importer that
//! feed the result into the server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Arguments  │────▶│  Tokenizer  │────▶│  Executor   │────▶│  Finalizer  │
//! │  + scripts  │     │ (cmd tree)  │     │ (per record)│     │ (JSON out)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                   │
//!                                          ┌─────────────┐     ┌────▼────────┐
//!                                          │  stash-box  │◀────│  Importer   │
//!                                          │  (GraphQL)  │     │             │
//!                                          └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stashtools::run_pipeline;
//!
//! let result = run_pipeline([
//!     "readcsv", "scenes.csv",
//!     "parsedate", "date", "%m/%d/%Y",
//!     "write", "scenes.json",
//! ])?;
//! println!("{}", result.report.summary());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`logs`] - Diagnostic logging to stderr
//! - [`config`] - Interpreter options and server settings
//! - [`record`] - Record and field value model
//! - [`parser`] - CSV and JSON input with auto-detection
//! - [`pipeline`] - Command registry, tokenizer, executor, outputs
//! - [`stashbox`] - GraphQL client
//! - [`import`] - Scene importer and extraction-map resolver

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod record;

// Parsing
pub mod parser;

// Interpreter
pub mod pipeline;

// Server side
pub mod import;
pub mod stashbox;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ClientError, ClientResult, FetchError, OutputError, OutputResult, PipelineError,
    PipelineResult, RecordError, RecordResult,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{PipelineOptions, ScopeMode, StashBoxConfig};

// =============================================================================
// Re-exports - Records and parsing
// =============================================================================

pub use record::{FieldValue, Record};

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_str,
    parse_json_records, read_csv_file, read_json_file, CsvError, ParseResult,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{
    describe_tree, execute, run_pipeline, Accumulator, Command, CommandRegistry, CommandSpec,
    ExecutionReport, Fetcher, HttpFetcher, OutputKind, Outputs, Pipeline, RecordFailure,
    RecordStore, RunResult, Tokenizer,
};

// =============================================================================
// Re-exports - stash-box
// =============================================================================

pub use import::{
    import_file, import_records, make_scene_create_input, resolve_map, ImportSummary,
    ResolveSummary,
};
pub use stashbox::{EntityKind, SceneApi, StashBoxClient};
