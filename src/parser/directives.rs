use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

// `title\=` is what HTML→Markdown conversion leaves behind for `title=`
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^title\\?=(.*)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Ignore,
    Title(String),
    Unknown(String),
}

impl Directive {
    /// Parse a directive line with its leading `.` already stripped.
    pub fn parse(command: &str) -> Self {
        if command.trim_end() == "ignore" {
            return Directive::Ignore;
        }
        if let Some(caps) = TITLE_RE.captures(command) {
            return Directive::Title(caps[1].to_string());
        }
        Directive::Unknown(command.to_string())
    }
}

/// Anything a title directive can be applied to.
pub trait Titled {
    fn set_title(&mut self, title: String);
}

/// Apply `directives` in order. `ignore` discards the table and stops
/// interpretation; unknown directives are skipped.
pub fn interpret<T: Titled, S: AsRef<str>>(directives: &[S], mut table: T) -> Option<T> {
    for raw in directives {
        match Directive::parse(raw.as_ref()) {
            Directive::Ignore => {
                debug!("table discarded by directive");
                return None;
            }
            Directive::Title(title) => table.set_title(title),
            Directive::Unknown(cmd) => debug!(directive = %cmd, "unknown directive skipped"),
        }
    }
    Some(table)
}
