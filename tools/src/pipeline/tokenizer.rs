//! Turns a flat argument list into a command tree.
//!
//! Grammar: `<command> <arg>... [<command> <arg>...]...`. Every command takes
//! exactly as many tokens as its spec declares. A record source (`readcsv`,
//! `readjson`) then builds its child pipeline from the tokens that follow.
//!
//! In [`ScopeMode::Legacy`] there is no end-of-scope marker: a record source
//! owns *every* remaining token, so anything written after it runs once per
//! record, never after the source has finished. [`ScopeMode::Delimited`]
//! adds `end`, which closes the innermost source.
//!
//! `run <script>` is expanded here: the script's non-blank, non-comment
//! lines are shell-split and spliced into the stream in place.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;

use super::command::Command;
use super::output::{output_key, OutputKind};
use super::registry::CommandRegistry;
use crate::config::{PipelineOptions, ScopeMode, END_OF_SCOPE, INCLUDE_DIRECTIVE};
use crate::error::{OutputError, PipelineError, PipelineResult};

const INCLUDE_USAGE: &str = "run <scriptfile>";

#[derive(Debug)]
struct Token {
    text: String,
    /// Include nesting this token came from
    depth: usize,
}

/// Command tree builder bound to a registry and options.
pub struct Tokenizer<'a> {
    registry: &'a CommandRegistry,
    options: &'a PipelineOptions,
}

impl<'a> Tokenizer<'a> {
    pub fn new(registry: &'a CommandRegistry, options: &'a PipelineOptions) -> Self {
        Self { registry, options }
    }

    /// Build the command tree, consuming every token.
    pub fn build<I, S>(&self, args: I) -> PipelineResult<Vec<Command>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens: VecDeque<Token> = args
            .into_iter()
            .map(|text| Token {
                text: text.into(),
                depth: 0,
            })
            .collect();

        let commands = self.build_scope(&mut tokens, 0)?;
        check_output_kinds(&commands)?;
        Ok(commands)
    }

    fn build_scope(
        &self,
        tokens: &mut VecDeque<Token>,
        nesting: usize,
    ) -> PipelineResult<Vec<Command>> {
        let mut commands = Vec::new();

        while let Some(token) = tokens.pop_front() {
            let name = token.text.to_lowercase();

            if name == INCLUDE_DIRECTIVE {
                self.splice_include(tokens, token.depth)?;
                continue;
            }

            if self.options.scope_mode == ScopeMode::Delimited && name == END_OF_SCOPE {
                if nesting == 0 {
                    return Err(PipelineError::UnbalancedScope);
                }
                return Ok(commands);
            }

            let spec = *self.registry.lookup(&name)?;

            let mut args = Vec::with_capacity(spec.nargs);
            for _ in 0..spec.nargs {
                let arg = tokens.pop_front().ok_or(PipelineError::MissingArguments {
                    command: spec.name,
                    usage: spec.usage,
                })?;
                args.push(arg.text);
            }

            if let Some(validate) = spec.validate {
                validate(&args).map_err(|message| PipelineError::InvalidArguments {
                    command: spec.name,
                    usage: spec.usage,
                    message,
                })?;
            }

            let mut command = Command::new(spec, args);
            if spec.is_scope() {
                command.children = self.build_scope(tokens, nesting + 1)?;
            }
            commands.push(command);
        }

        Ok(commands)
    }

    /// Replace `run <script>` with the script's tokens.
    fn splice_include(&self, tokens: &mut VecDeque<Token>, depth: usize) -> PipelineResult<()> {
        let path = tokens
            .pop_front()
            .map(|t| PathBuf::from(t.text))
            .ok_or(PipelineError::MissingArguments {
                command: INCLUDE_DIRECTIVE,
                usage: INCLUDE_USAGE,
            })?;

        let depth = depth + 1;
        if depth > self.options.max_include_depth {
            return Err(PipelineError::IncludeDepth {
                path,
                limit: self.options.max_include_depth,
            });
        }

        let script = fs::read_to_string(&path).map_err(|e| PipelineError::Include {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let words = split_script(&script).map_err(|message| PipelineError::Include {
            path: path.clone(),
            message,
        })?;

        for text in words.into_iter().rev() {
            tokens.push_front(Token { text, depth });
        }
        Ok(())
    }
}

/// Shell-split every non-blank, non-comment line of a script.
pub fn split_script(script: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    for (i, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts =
            shell_words::split(line).map_err(|e| format!("line {}: {}", i + 1, e))?;
        words.extend(parts);
    }
    Ok(words)
}

/// Reject trees where one output file is targeted by two command kinds.
fn check_output_kinds(commands: &[Command]) -> PipelineResult<()> {
    fn visit(
        commands: &[Command],
        seen: &mut HashMap<PathBuf, OutputKind>,
    ) -> Result<(), OutputError> {
        for command in commands {
            if let Some((file, target)) = command.output() {
                let key = output_key(file);
                match seen.get(&key) {
                    Some(existing) if *existing != target.kind => {
                        return Err(OutputError::KindConflict {
                            file: file.to_string(),
                            existing: existing.command(),
                            requested: target.kind.command(),
                        });
                    }
                    _ => {
                        seen.insert(key, target.kind);
                    }
                }
            }
            visit(&command.children, seen)?;
        }
        Ok(())
    }

    visit(commands, &mut HashMap::new())?;
    Ok(())
}
