//! Parsed command tree nodes.

use super::registry::{Action, CommandSpec, OutputTarget};

/// A resolved invocation: spec, arguments and, for record sources, the
/// commands run once per record.
#[derive(Debug, Clone)]
pub struct Command {
    pub spec: CommandSpec,
    pub args: Vec<String>,
    pub children: Vec<Command>,
}

impl Command {
    pub fn new(spec: CommandSpec, args: Vec<String>) -> Self {
        debug_assert_eq!(args.len(), spec.nargs);
        Self {
            spec,
            args,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Argument by position. Arity is checked when the tree is built.
    pub fn arg(&self, index: usize) -> &str {
        &self.args[index]
    }

    pub fn is_scope(&self) -> bool {
        self.spec.is_scope()
    }

    pub fn action(&self) -> Action {
        self.spec.action
    }

    /// Output file this command writes to, if any.
    pub fn output(&self) -> Option<(&str, OutputTarget)> {
        self.spec
            .output
            .map(|target| (self.arg(target.arg), target))
    }

    /// Render back to tokens, one line per command, children indented.
    pub fn describe(&self, indent: usize, out: &mut String) {
        out.push_str(&"  ".repeat(indent));
        out.push_str(self.name());
        for arg in &self.args {
            out.push(' ');
            out.push_str(&shell_words::quote(arg));
        }
        out.push('\n');
        for child in &self.children {
            child.describe(indent + 1, out);
        }
    }
}

/// Render a whole tree, see [`Command::describe`].
pub fn describe_tree(commands: &[Command]) -> String {
    let mut out = String::new();
    for command in commands {
        command.describe(0, &mut out);
    }
    out
}
