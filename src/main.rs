use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;

use notebook_tables::export::{self, ExportOptions};
use notebook_tables::metadata::{self, MetadataRecord};
use notebook_tables::summary::{self, MissingPolicy};
use notebook_tables::{
    find_table, split_results, CellValue, ConflictPolicy, ConflictResolver, ExtractOptions, KeyValueProjector,
    NormalizedTable, NumericPolicy, Selection, Selector, Settings, TableResult,
};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

const CHUNK_SIZE: usize = 64;

#[derive(Parser)]
#[command(name = "notebook_tables", about = "Typed tables from lab notebook entries")]
struct Cli {
    /// Numeric conversion for table cells (strict, coerce, off)
    #[arg(long, global = true)]
    numeric: Option<NumericPolicy>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tables found in each document
    Tables {
        files: Vec<PathBuf>,
        /// Print one table in full (position or title)
        #[arg(short, long)]
        show: Option<String>,
    },
    /// Merge key-value tables (and entry metadata) into one flat record
    Project {
        file: PathBuf,
        /// Notebook entry JSON supplying the metadata record
        #[arg(short, long)]
        metadata: Option<PathBuf>,
        /// Duplicate-key policy (use_first, use_last, raise_error, user_selection)
        #[arg(short, long)]
        policy: Option<ConflictPolicy>,
        /// Write the JSON report here instead of printing
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Parameters to summarize, in order
        #[arg(short, long)]
        summary: Vec<String>,
        /// What to do with summary parameters that are absent (raise, ignore, coerce)
        #[arg(long, default_value = "raise")]
        missing: MissingPolicy,
    },
    /// Write each table as delimited text
    Export {
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        /// Export only the table at this position
        #[arg(short, long)]
        index: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings")?;
    let mut extract = settings.extract_options()?;
    if let Some(numeric) = cli.numeric {
        extract.numeric = numeric;
    }

    let result = match cli.command {
        Commands::Tables { files, show } => {
            let docs = read_documents(&files)?;
            let extracted = extract_all(&docs, &extract)?;
            let selector = show.as_deref().map(Selector::from);

            for (doc, results) in docs.iter().zip(extracted) {
                println!("{}", doc.path.display());
                print_overview(&results);

                if let Some(selector) = &selector {
                    let (tables, _) = split_results(results);
                    match find_table(&tables, selector) {
                        Some(table) => println!("\n{}", table),
                        None => println!("  no table matches {:?}", selector),
                    }
                }
            }
            Ok(())
        }
        Commands::Project {
            file,
            metadata: entry_path,
            policy,
            out,
            summary: params,
            missing,
        } => {
            let doc = read_document(&file)?;
            let (tables, errors) = split_results(notebook_tables::extract_tables(&doc.body, &extract));
            for e in &errors {
                eprintln!("skipped table: {}", e);
            }

            let mut record = doc.entry.as_ref().map(metadata::from_entry).unwrap_or_default();
            if let Some(path) = entry_path {
                let entry = read_entry(&path)?;
                record.extend(metadata::from_entry(&entry));
            }

            let policy = policy.unwrap_or(settings.conflicts);
            let mut console = ConsoleResolver::new(io::stdin().lock());
            let mut projector = KeyValueProjector::new(policy);
            if policy == ConflictPolicy::UserSelection {
                projector = projector.with_resolver(&mut console);
            }
            let projection = projector
                .project(&tables, &record)
                .with_context(|| format!("projecting {}", file.display()))?;

            match out {
                Some(path) => {
                    let f = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
                    export::write_projection_json(&projection, BufWriter::new(f))?;
                    info!(path = %path.display(), keys = projection.values.len(), "wrote projection");
                }
                None => print_projection(&projection.values),
            }
            for c in &projection.conflicts {
                println!("  {}", c);
            }

            if !params.is_empty() {
                let line = summary::summarize(&projection.values, &params, missing, "; ")?;
                println!("\n{}", line);
            }
            Ok(())
        }
        Commands::Export { files, out_dir, index } => {
            let opts = settings.export_options()?;
            let docs = read_documents(&files)?;
            let extracted = extract_all(&docs, &extract)?;
            let mut written = 0;

            for (doc, results) in docs.iter().zip(extracted) {
                let (tables, errors) = split_results(results);
                if !errors.is_empty() {
                    eprintln!("{}: {} table(s) skipped", doc.path.display(), errors.len());
                }
                written += export_document(&doc.path, &tables, &out_dir, index, &opts)?;
            }
            println!("Wrote {} file(s) to {}", written, out_dir.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

// ── Documents ──

struct Document {
    path: PathBuf,
    body: String,
    /// Present when the input was a notebook entry rather than a bare body.
    entry: Option<Value>,
}

fn read_document(path: &Path) -> Result<Document> {
    if path.extension().is_some_and(|e| e == "json") {
        let entry = read_entry(path)?;
        let body = metadata::entry_body(&entry).unwrap_or_default().to_string();
        return Ok(Document {
            path: path.to_path_buf(),
            body,
            entry: Some(entry),
        });
    }
    let body = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(Document {
        path: path.to_path_buf(),
        body,
        entry: None,
    })
}

fn read_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    paths.iter().map(|p| read_document(p)).collect()
}

fn read_entry(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing entry {}", path.display()))
}

// ── Extraction ──

#[cfg(feature = "rayon")]
fn extract_chunk(docs: &[Document], opts: &ExtractOptions) -> Vec<Vec<TableResult>> {
    docs.par_iter()
        .map(|d| notebook_tables::extract_tables(&d.body, opts))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn extract_chunk(docs: &[Document], opts: &ExtractOptions) -> Vec<Vec<TableResult>> {
    docs.iter()
        .map(|d| notebook_tables::extract_tables(&d.body, opts))
        .collect()
}

fn extract_all(docs: &[Document], opts: &ExtractOptions) -> Result<Vec<Vec<TableResult>>> {
    let pb = ProgressBar::new(docs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut all = Vec::with_capacity(docs.len());
    for chunk in docs.chunks(CHUNK_SIZE) {
        all.extend(extract_chunk(chunk, opts));
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(all)
}

fn export_document(
    path: &Path,
    tables: &[NormalizedTable],
    out_dir: &Path,
    index: Option<usize>,
    opts: &ExportOptions,
) -> Result<usize> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tables".into());

    match index {
        Some(i) => {
            fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
            let target = out_dir.join(format!("{}-{}.csv", stem, i + 1));
            export::export_selected(tables, i, &target, opts)
                .with_context(|| format!("exporting table {} of {}", i, path.display()))?;
            Ok(1)
        }
        None => {
            let written = export::export_tables(tables, out_dir, &stem, opts)
                .with_context(|| format!("exporting {}", path.display()))?;
            Ok(written.len())
        }
    }
}

// ── Output ──

fn print_overview(results: &[TableResult]) {
    println!(
        "{:>3} | {:<28} | {:<9} | {:>5} | {:>5}",
        "#", "Title", "Shape", "Rows", "Cols"
    );
    println!("{}", "-".repeat(62));

    for (i, r) in results.iter().enumerate() {
        match r {
            Ok(t) => {
                let title = truncate(t.title.as_deref().unwrap_or("-"), 28);
                let shape = if t.is_key_value() { "key-value" } else { "grid" };
                println!(
                    "{:>3} | {:<28} | {:<9} | {:>5} | {:>5}",
                    i,
                    title,
                    shape,
                    t.height(),
                    t.width()
                );
            }
            Err(e) => println!("{:>3} | {}", i, e),
        }
    }
    println!();
}

fn print_projection(values: &MetadataRecord) {
    let width = values.keys().map(|k| k.chars().count()).max().unwrap_or(0).min(32);
    for (k, v) in values {
        println!("{:<width$}  {}", truncate(k, 32), v, width = width);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

// ── Conflict prompts ──

/// Asks on the console which of two duplicate values to keep.
struct ConsoleResolver<R> {
    input: R,
}

impl<R: BufRead> ConsoleResolver<R> {
    fn new(input: R) -> Self {
        ConsoleResolver { input }
    }
}

impl<R: BufRead> ConflictResolver for ConsoleResolver<R> {
    fn resolve_conflict(&mut self, key: &str, existing: &CellValue, new: &CellValue) -> Result<Selection, String> {
        println!("Duplicate key '{}'", key);
        println!("  0: {}", existing);
        println!("  1: {}", new);

        loop {
            print!("Keep which value? [0/1] ");
            io::stdout().flush().map_err(|e| e.to_string())?;

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => return Err("no answer (end of input)".to_string()),
                Ok(_) => {}
                Err(e) => return Err(e.to_string()),
            }

            match line.trim().parse::<u8>().ok().and_then(|n| Selection::try_from(n).ok()) {
                Some(selection) => return Ok(selection),
                None => println!("Please answer 0 or 1."),
            }
        }
    }
}
