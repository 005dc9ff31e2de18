use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::directives::Titled;

static ALIGN_CELL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^:?-+:?$").unwrap());

pub const DEFAULT_SEPARATOR: char = '|';

/// One table block as it appeared in the document, with the directive lines
/// that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTableBlock {
    pub directives: Vec<String>,
    pub lines: Vec<String>,
    /// 0-based index of the first row in the source text.
    pub start_line: usize,
    pub separator: char,
    pub title: Option<String>,
}

impl RawTableBlock {
    /// Split every row into trimmed cells. A Markdown alignment row
    /// (`|---|:-:|`) directly under the first row is dropped; further down,
    /// dash-only rows are data.
    pub fn grid(&self) -> Vec<Vec<String>> {
        self.lines
            .iter()
            .map(|line| split_row(line, self.separator))
            .enumerate()
            .filter(|(i, cells)| !(*i == 1 && is_alignment_row(cells)))
            .map(|(_, cells)| cells)
            .collect()
    }
}

impl Titled for RawTableBlock {
    fn set_title(&mut self, title: String) {
        self.title = Some(title);
    }
}

/// Walk `text` line by line and cut out every table block, in source order.
pub fn scan_tables(text: &str, separator: char) -> Vec<RawTableBlock> {
    // trailing blank line closes a table that runs to the end of the text
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .chain(std::iter::once(""))
        .collect();

    let mut blocks = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut start: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        // ── Blank ──
        if line.is_empty() {
            if let Some(s) = start.take() {
                close_block(&lines, s, i, separator, &mut pending, &mut blocks);
            }
            continue;
        }

        // ── Directive: .command ──
        if let Some(command) = line.strip_prefix('.') {
            if let Some(s) = start.take() {
                close_block(&lines, s, i, separator, &mut pending, &mut blocks);
            }
            pending.push(command.to_string());
            continue;
        }

        // ── Table row ──
        if line.starts_with(separator) {
            if start.is_none() {
                start = Some(i);
            }
            continue;
        }

        // ── Any other text ends a running table ──
        if let Some(s) = start.take() {
            close_block(&lines, s, i, separator, &mut pending, &mut blocks);
        }
    }

    if !pending.is_empty() {
        debug!(directives = ?pending, "directives without a following table");
    }
    debug!(tables = blocks.len(), "scanned document");
    blocks
}

fn close_block(
    lines: &[&str],
    start: usize,
    end: usize,
    separator: char,
    pending: &mut Vec<String>,
    blocks: &mut Vec<RawTableBlock>,
) {
    blocks.push(RawTableBlock {
        directives: std::mem::take(pending),
        lines: lines[start..end].iter().map(|l| l.to_string()).collect(),
        start_line: start,
        separator,
        title: None,
    });
}

/// `| a | b |` → `["a", "b"]`. The closing separator is optional.
pub fn split_row(line: &str, separator: char) -> Vec<String> {
    let line = line.trim();
    let inner = line.strip_prefix(separator).unwrap_or(line);
    let inner = inner.strip_suffix(separator).unwrap_or(inner);
    inner
        .split(separator)
        .map(|cell| cell.trim().to_string())
        .collect()
}

fn is_alignment_row(cells: &[String]) -> bool {
    !cells.is_empty() && cells.iter().all(|c| ALIGN_CELL_RE.is_match(c))
}
