//! Command-pipeline interpreter.
//!
//! Arguments are tokenized into a command tree, the tree is executed against
//! a [`RecordStore`], and every output that received a write is flushed once
//! at the end. A fatal error anywhere before the flush leaves all output
//! files untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! use stashtools::pipeline::{Pipeline, RecordStore};
//!
//! let pipeline = Pipeline::new(Default::default());
//! let mut store = RecordStore::new();
//! let result = pipeline.run(
//!     ["readcsv", "scenes.csv", "tolist", "tags", ",", "write", "out.json"],
//!     &mut store,
//! )?;
//! println!("{}", result.report.summary());
//! ```

pub mod command;
pub mod commands;
pub mod executor;
pub mod fetch;
pub mod mapfile;
pub mod output;
pub mod registry;
pub mod store;
pub mod tokenizer;

use std::path::PathBuf;

pub use command::{describe_tree, Command};
pub use executor::{execute, ExecutionReport, RecordFailure};
pub use fetch::{Fetcher, HttpFetcher};
pub use output::{Accumulator, OutputKind, Outputs};
pub use registry::{CommandRegistry, CommandSpec};
pub use store::RecordStore;
pub use tokenizer::Tokenizer;

use crate::config::PipelineOptions;
use crate::error::PipelineResult;
use crate::logs::{log_info_indent, log_success, log_warning};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub report: ExecutionReport,
    /// Output files written by the finalizer
    pub written: Vec<PathBuf>,
}

/// Interpreter bound to a registry and options.
pub struct Pipeline {
    registry: CommandRegistry,
    options: PipelineOptions,
}

impl Pipeline {
    /// Pipeline with every built-in command.
    pub fn new(options: PipelineOptions) -> Self {
        Self::with_registry(CommandRegistry::standard(), options)
    }

    pub fn with_registry(registry: CommandRegistry, options: PipelineOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Build the command tree without running it.
    pub fn parse<I, S>(&self, args: I) -> PipelineResult<Vec<Command>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tokenizer::new(&self.registry, &self.options).build(args)
    }

    /// Build, execute and flush.
    pub fn run<I, S>(&self, args: I, store: &mut RecordStore) -> PipelineResult<RunResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let commands = self.parse(args)?;
        if commands.is_empty() {
            log_warning("No commands given, nothing to do");
        }

        let report = execute(&commands, store)?;
        if report.failures.is_empty() {
            log_success(report.summary());
        } else {
            log_warning(report.summary());
        }

        let written = store.outputs().flush()?;
        for path in &written {
            log_info_indent(format!("💾 Wrote {}", path.display()), 1);
        }

        Ok(RunResult { report, written })
    }
}

/// Run a pipeline with default options and a live fetcher.
pub fn run_pipeline<I, S>(args: I) -> PipelineResult<RunResult>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Pipeline::new(PipelineOptions::default()).run(args, &mut RecordStore::new())
}
