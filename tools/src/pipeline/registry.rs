//! Command registry.
//!
//! Maps case-insensitive command names to immutable [`CommandSpec`]s. The
//! registry is built once by the caller and handed to the tokenizer; there is
//! no global command table.

use std::collections::HashMap;
use std::path::Path;

use super::command::Command;
use super::commands;
use super::output::OutputKind;
use super::store::RecordStore;
use crate::error::{PipelineError, PipelineResult};
use crate::record::Record;

/// Mutates the store for the current record.
pub type Handler = fn(&mut RecordStore, &Command) -> PipelineResult<()>;

/// Opens a record source.
pub type SourceOpener = fn(&Path) -> PipelineResult<Vec<Record>>;

/// Build-time argument check. The error message is reported with the usage.
pub type ArgValidator = fn(&[String]) -> Result<(), String>;

/// What a command does when executed.
#[derive(Debug, Clone, Copy)]
pub enum Action {
    /// Field mutator or output writer.
    Mutate(Handler),
    /// Record source; the command owns a nested scope.
    Source(SourceOpener),
}

/// Which argument names an output file, and of which kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputTarget {
    pub arg: usize,
    pub kind: OutputKind,
}

/// Immutable description of a command.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub nargs: usize,
    pub usage: &'static str,
    pub action: Action,
    pub validate: Option<ArgValidator>,
    pub output: Option<OutputTarget>,
}

impl CommandSpec {
    pub fn mutator(
        name: &'static str,
        nargs: usize,
        usage: &'static str,
        handler: Handler,
    ) -> Self {
        Self {
            name,
            nargs,
            usage,
            action: Action::Mutate(handler),
            validate: None,
            output: None,
        }
    }

    pub fn source(name: &'static str, usage: &'static str, opener: SourceOpener) -> Self {
        Self {
            name,
            nargs: 1,
            usage,
            action: Action::Source(opener),
            validate: None,
            output: None,
        }
    }

    pub fn with_validator(mut self, validate: ArgValidator) -> Self {
        self.validate = Some(validate);
        self
    }

    pub fn with_output(mut self, arg: usize, kind: OutputKind) -> Self {
        self.output = Some(OutputTarget { arg, kind });
        self
    }

    /// Whether this command owns a nested scope.
    pub fn is_scope(&self) -> bool {
        matches!(self.action, Action::Source(_))
    }
}

/// Registry of available commands.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    specs: HashMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in command
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for spec in builtin_specs() {
            registry.register(spec);
        }
        registry
    }

    /// Add or replace a command. Names are stored lowercase.
    pub fn register(&mut self, spec: CommandSpec) {
        debug_assert_eq!(spec.name, spec.name.to_lowercase());
        self.specs.insert(spec.name, spec);
    }

    pub fn lookup(&self, name: &str) -> PipelineResult<&CommandSpec> {
        self.specs
            .get(name.to_lowercase().as_str())
            .ok_or_else(|| PipelineError::UnknownCommand(name.to_string()))
    }

    /// All commands sorted by name.
    pub fn specs(&self) -> Vec<&CommandSpec> {
        let mut specs: Vec<_> = self.specs.values().collect();
        specs.sort_by_key(|s| s.name);
        specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn builtin_specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec::source("readcsv", "readcsv <file>", commands::read_csv),
        CommandSpec::source("readjson", "readjson <file>", commands::read_json),
        CommandSpec::mutator("write", 1, "write <file>", commands::write)
            .with_output(0, OutputKind::Records),
        CommandSpec::mutator("rm", 1, "rm <field>", commands::rm),
        CommandSpec::mutator("mv", 2, "mv <field> <to>", commands::mv),
        CommandSpec::mutator("keep", 1, "keep <comma-separated fields>", commands::keep)
            .with_validator(commands::validate_keep),
        CommandSpec::mutator(
            "replace",
            3,
            "replace <field> <regex> <replacement>",
            commands::replace,
        )
        .with_validator(commands::validate_replace),
        CommandSpec::mutator(
            "parsedate",
            2,
            "parsedate <field> <strptime-format>",
            commands::parse_date,
        )
        .with_validator(commands::validate_parse_date),
        CommandSpec::mutator(
            "parseduration",
            2,
            "parseduration <field> <named-group-regex>",
            commands::parse_duration,
        )
        .with_validator(commands::validate_parse_duration),
        CommandSpec::mutator("setstr", 2, "setstr <field> <literal>", commands::set_str),
        CommandSpec::mutator(
            "tolist",
            2,
            "tolist <field> <separator>",
            commands::to_list,
        )
        .with_validator(commands::validate_to_list),
        CommandSpec::mutator("wget", 3, "wget <field> <dir> <suffix>", commands::wget),
        CommandSpec::mutator("extractmap", 2, "extractmap <field> <outfile>", commands::extract_map)
            .with_output(1, OutputKind::Extraction),
        CommandSpec::mutator("mapvalues", 2, "mapvalues <field> <mapfile>", commands::map_values),
    ]
}
