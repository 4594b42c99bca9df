//! Walks a command tree against a [`RecordStore`].
//!
//! Commands run strictly in order. A record source makes each of its records
//! current in turn and runs its children against it. A per-record error stops
//! the remaining children for that record only; anything fatal unwinds the
//! whole run.

use serde::Serialize;
use std::path::Path;

use super::command::Command;
use super::registry::{Action, SourceOpener};
use super::store::RecordStore;
use crate::error::PipelineResult;
use crate::logs::{log_info, log_warning_indent};

/// A record whose scope was cut short.
#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    /// Source file the record came from
    pub source: String,
    /// Zero-based position in that file
    pub index: usize,
    pub command: String,
    pub message: String,
}

/// Outcome of executing a command tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub records_processed: usize,
    pub failures: Vec<RecordFailure>,
}

impl ExecutionReport {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} records processed, {} failed",
            self.records_processed,
            self.failures.len()
        )
    }
}

/// Where the record being processed came from.
struct Position<'a> {
    source: &'a str,
    index: usize,
}

/// Execute a command tree.
pub fn execute(commands: &[Command], store: &mut RecordStore) -> PipelineResult<ExecutionReport> {
    let mut report = ExecutionReport::default();
    run_sequence(commands, store, &mut report, None)?;
    Ok(report)
}

fn run_sequence(
    commands: &[Command],
    store: &mut RecordStore,
    report: &mut ExecutionReport,
    position: Option<&Position>,
) -> PipelineResult<()> {
    for command in commands {
        match run_command(command, store, report) {
            Ok(()) => {}
            Err(e) if !e.is_fatal() => {
                let failure = RecordFailure {
                    source: position.map(|p| p.source.to_string()).unwrap_or_default(),
                    index: position.map(|p| p.index).unwrap_or(0),
                    command: command.name().to_string(),
                    message: e.to_string(),
                };
                log_warning_indent(
                    format!(
                        "{} record {}: {}: {}",
                        failure.source, failure.index, failure.command, failure.message
                    ),
                    1,
                );
                report.failures.push(failure);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn run_command(
    command: &Command,
    store: &mut RecordStore,
    report: &mut ExecutionReport,
) -> PipelineResult<()> {
    match command.action() {
        Action::Mutate(handler) => handler(store, command),
        Action::Source(open) => run_source(command, open, store, report),
    }
}

fn run_source(
    command: &Command,
    open: SourceOpener,
    store: &mut RecordStore,
    report: &mut ExecutionReport,
) -> PipelineResult<()> {
    let source = command.arg(0);
    let records = open(Path::new(source))?;
    log_info(format!("📖 {} {}: {} records", command.name(), source, records.len()));

    let outer = std::mem::take(&mut store.current);
    let result = records
        .into_iter()
        .enumerate()
        .try_for_each(|(index, record)| {
            store.current = record;
            report.records_processed += 1;
            run_sequence(
                &command.children,
                store,
                report,
                Some(&Position { source, index }),
            )
        });
    store.current = outer;
    result
}
