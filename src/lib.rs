//! Typed tables from separator-delimited markup in notebook entries.
//!
//! A body is scanned for table blocks, each block's directives are applied,
//! and surviving blocks are normalized into [`NormalizedTable`]s. Key-value
//! tables can then be merged over a metadata record into one flat mapping.

pub mod cell;
pub mod error;
pub mod export;
pub mod metadata;
pub mod parser;
pub mod project;
pub mod settings;
pub mod summary;

pub use cell::CellValue;
pub use error::{ExportError, ProjectError, SettingsError, SummaryError, TableError};
pub use metadata::MetadataRecord;
pub use parser::normalize::{NormalizedTable, NumericPolicy, TableShape};
pub use parser::{extract_tables, find_table, split_results, ExtractOptions, Selector, TableResult};
pub use project::{
    project, Conflict, ConflictPolicy, ConflictResolver, FlatProjection, KeyValueProjector, Resolution, Selection,
};
pub use settings::Settings;
