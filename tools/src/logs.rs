//! Diagnostic output for pipeline and import runs, printed to stderr so
//! stdout stays free for `--dry-run` and `commands` listings.

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting depth (record source scopes)
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }
}

/// Print an entry to stderr, indented by its nesting depth.
pub fn log(entry: LogEntry) {
    let prefix = match entry.level {
        LogLevel::Info => "   ",
        LogLevel::Success => "   ✓",
        LogLevel::Warning => "   ⚠️",
        LogLevel::Error => "   ❌",
    };
    eprintln!("{}", render(&entry, prefix));
}

fn render(entry: &LogEntry, prefix: &str) -> String {
    let indent = "   ".repeat(entry.indent as usize);
    format!("{}{} {}", indent, prefix, entry.message)
}

pub fn log_info(msg: impl Into<String>) {
    log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    log(LogEntry::warning(msg));
}

pub fn log_error(msg: impl Into<String>) {
    log(LogEntry::error(msg));
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    log(LogEntry::info(msg).with_indent(indent));
}

pub fn log_warning_indent(msg: impl Into<String>, indent: u8) {
    log(LogEntry::warning(msg).with_indent(indent));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_indents_by_depth() {
        let entry = LogEntry::warning("fetch failed").with_indent(2);
        let expected = format!("{}⚠️ fetch failed", " ".repeat(9));
        assert_eq!(render(&entry, "   ⚠️"), expected);
        assert_eq!(entry.level, LogLevel::Warning);
    }

    #[test]
    fn test_entries_default_to_top_level() {
        let entry = LogEntry::info("done");
        assert_eq!(entry.indent, 0);
        assert_eq!(render(&entry, "   "), "    done");
    }
}
