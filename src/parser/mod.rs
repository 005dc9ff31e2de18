pub mod directives;
pub mod normalize;
pub mod scan;

use itertools::{Either, Itertools};
use tracing::{debug, warn};

use crate::error::TableError;
use normalize::{NormalizedTable, NumericPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub separator: char,
    pub numeric: NumericPolicy,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            separator: scan::DEFAULT_SEPARATOR,
            numeric: NumericPolicy::default(),
        }
    }
}

pub type TableResult = Result<NormalizedTable, TableError>;

/// Three-pass pipeline: body text → table blocks → directives applied → typed tables.
///
/// Discarded tables never reach the normalizer. A malformed table yields an
/// `Err` in its slot and the remaining tables are still processed.
pub fn extract_tables(body: &str, opts: &ExtractOptions) -> Vec<TableResult> {
    scan::scan_tables(body, opts.separator)
        .into_iter()
        .filter_map(|mut block| {
            let start_line = block.start_line;
            let commands = std::mem::take(&mut block.directives);
            let Some(block) = directives::interpret(&commands, block) else {
                debug!(line = start_line + 1, "skipping ignored table");
                return None;
            };
            let grid = block.grid();
            let result = normalize::normalize(grid, block.title, opts.numeric);
            if let Err(e) = &result {
                warn!(line = start_line + 1, error = %e, "table not normalized");
            }
            Some(result)
        })
        .collect()
}

/// Separate good tables from failures, keeping source order within each.
pub fn split_results(results: Vec<TableResult>) -> (Vec<NormalizedTable>, Vec<TableError>) {
    results.into_iter().partition_map(|r| match r {
        Ok(t) => Either::Left(t),
        Err(e) => Either::Right(e),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Index(usize),
    Title(String),
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        match s.parse::<usize>() {
            Ok(i) => Selector::Index(i),
            Err(_) => Selector::Title(s.to_string()),
        }
    }
}

/// First table at the given position or carrying the given title.
pub fn find_table<'a>(tables: &'a [NormalizedTable], selector: &Selector) -> Option<&'a NormalizedTable> {
    match selector {
        Selector::Index(i) => tables.get(*i),
        Selector::Title(title) => tables.iter().find(|t| t.title.as_deref() == Some(title.as_str())),
    }
}
