use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::directives::Titled;
use crate::cell::{parse_number, CellValue};
use crate::error::TableError;

/// Header labels that mark the first column as a row index.
const INDEX_HEADERS: &[&str] = &["probe", "sample", "nr."];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericPolicy {
    /// A column becomes numeric only if every cell parses.
    #[default]
    Strict,
    /// Grid cells that fail to parse become `Missing` in any column with at least one
    /// number. Key-value values convert cell by cell and otherwise stay text.
    Coerce,
    Off,
}

impl FromStr for NumericPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(NumericPolicy::Strict),
            "coerce" => Ok(NumericPolicy::Coerce),
            "off" => Ok(NumericPolicy::Off),
            other => Err(format!("unknown numeric policy '{}' (strict, coerce, off)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableShape {
    /// Two source columns: index labels + one value column.
    KeyValue,
    /// Header row promoted, optionally with an index column.
    Grid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTable {
    pub title: Option<String>,
    pub shape: TableShape,
    /// Column labels of the data area; empty for key-value tables.
    pub headers: Vec<String>,
    /// Row labels; empty when no index column was promoted.
    pub index: Vec<String>,
    /// Header label of a promoted index column (`Probe`, `Sample`, …).
    pub index_name: Option<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl NormalizedTable {
    pub fn is_key_value(&self) -> bool {
        self.shape == TableShape::KeyValue
    }

    pub fn has_index(&self) -> bool {
        self.is_key_value() || self.index_name.is_some()
    }

    /// Number of data columns (index column excluded).
    pub fn data_width(&self) -> usize {
        match self.shape {
            TableShape::KeyValue => 1,
            TableShape::Grid => self.headers.len(),
        }
    }

    /// Column count of the source table, index column included.
    pub fn width(&self) -> usize {
        self.data_width() + usize::from(self.has_index())
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, i: usize) -> Option<&[CellValue]> {
        self.rows.get(i).map(Vec::as_slice)
    }

    pub fn column(&self, j: usize) -> Option<Vec<&CellValue>> {
        if j >= self.data_width() {
            return None;
        }
        Some(self.rows.iter().map(|r| &r[j]).collect())
    }

    /// `(key, value)` rows of a key-value table, in source order.
    pub fn pairs(&self) -> Option<impl Iterator<Item = (&str, &CellValue)> + '_> {
        if !self.is_key_value() {
            return None;
        }
        Some(self.index.iter().map(String::as_str).zip(self.rows.iter().map(|r| &r[0])))
    }
}

impl Titled for NormalizedTable {
    fn set_title(&mut self, title: String) {
        self.title = Some(title);
    }
}

impl fmt::Display for NormalizedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(title) = &self.title {
            writeln!(f, "{}", title)?;
        }
        if !self.headers.is_empty() {
            let mut header: Vec<&str> = Vec::with_capacity(self.width());
            if self.has_index() {
                header.push(self.index_name.as_deref().unwrap_or(""));
            }
            header.extend(self.headers.iter().map(String::as_str));
            writeln!(f, "{}", header.join("\t"))?;
        }
        for (i, row) in self.rows.iter().enumerate() {
            let mut cells: Vec<String> = Vec::with_capacity(self.width());
            if let Some(label) = self.index.get(i) {
                cells.push(label.clone());
            }
            cells.extend(row.iter().map(|c| c.to_string()));
            writeln!(f, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}

/// Turn a rectangular grid of trimmed strings into a typed table.
///
/// Two columns: column 0 becomes the row index. Otherwise row 0 becomes the
/// header, and a first header of `Probe`/`Sample`/`Nr.` (any case) promotes
/// that column to the row index as well. Numeric coercion runs last.
pub fn normalize(
    grid: Vec<Vec<String>>,
    title: Option<String>,
    policy: NumericPolicy,
) -> Result<NormalizedTable, TableError> {
    let width = check_rectangular(&grid)?;

    if grid.is_empty() {
        return Ok(NormalizedTable {
            title,
            shape: TableShape::Grid,
            headers: Vec::new(),
            index: Vec::new(),
            index_name: None,
            rows: Vec::new(),
        });
    }

    if width == 2 {
        let (index, values): (Vec<String>, Vec<Vec<String>>) = grid
            .into_iter()
            .map(|mut row| {
                let value = row.pop().unwrap_or_default();
                let key = row.pop().unwrap_or_default();
                (key, vec![value])
            })
            .unzip();
        debug!(rows = index.len(), "key-value table");
        return Ok(NormalizedTable {
            title,
            shape: TableShape::KeyValue,
            headers: Vec::new(),
            index,
            index_name: None,
            rows: coerce_values(values, policy),
        });
    }

    let mut rows = grid.into_iter();
    let raw_header = rows.next().unwrap_or_default();
    let promote_index = raw_header
        .first()
        .is_some_and(|h| INDEX_HEADERS.contains(&h.to_lowercase().as_str()));
    let mut headers = unique_headers(raw_header);
    let mut body: Vec<Vec<String>> = rows.collect();

    let (index, index_name) = if promote_index {
        let name = headers.remove(0);
        let labels = body.iter_mut().map(|row| row.remove(0)).collect();
        debug!(index = %name, "promoted index column");
        (labels, Some(name))
    } else {
        (Vec::new(), None)
    };

    let data_width = headers.len();
    debug!(columns = data_width, rows = body.len(), "grid table");
    Ok(NormalizedTable {
        title,
        shape: TableShape::Grid,
        headers,
        index,
        index_name,
        rows: coerce_columns(body, data_width, policy),
    })
}

fn check_rectangular(grid: &[Vec<String>]) -> Result<usize, TableError> {
    let expected = grid.first().map_or(0, Vec::len);
    match grid.iter().position(|row| row.len() != expected) {
        Some(row) => Err(TableError::Malformed {
            row,
            expected,
            found: grid[row].len(),
        }),
        None => Ok(expected),
    }
}

/// Empty labels become `Unnamed: <pos>`, repeats get `.1`, `.2`, … suffixes.
fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());
    for (pos, label) in raw.into_iter().enumerate() {
        let base = if label.is_empty() {
            format!("Unnamed: {}", pos)
        } else {
            label
        };
        let mut candidate = base.clone();
        let mut n = 0;
        while used.contains(&candidate) {
            n += 1;
            candidate = format!("{}.{}", base, n);
        }
        used.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// The value column of a key-value table mixes types row by row. Under
/// `Coerce` each cell converts on its own and unparseable ones stay text.
fn coerce_values(rows: Vec<Vec<String>>, policy: NumericPolicy) -> Vec<Vec<CellValue>> {
    match policy {
        NumericPolicy::Coerce => rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|raw| parse_number(&raw).map_or(CellValue::Text(raw), CellValue::Number))
                    .collect()
            })
            .collect(),
        NumericPolicy::Strict | NumericPolicy::Off => coerce_columns(rows, 1, policy),
    }
}

/// Per-column coercion; a column is converted as a whole or not at all.
fn coerce_columns(rows: Vec<Vec<String>>, width: usize, policy: NumericPolicy) -> Vec<Vec<CellValue>> {
    let numeric: Vec<Option<Vec<Option<f64>>>> = (0..width)
        .map(|j| {
            if policy == NumericPolicy::Off || rows.is_empty() {
                return None;
            }
            let parsed: Vec<Option<f64>> = rows.iter().map(|r| parse_number(&r[j])).collect();
            let convert = match policy {
                NumericPolicy::Strict => parsed.iter().all(Option::is_some),
                NumericPolicy::Coerce => parsed.iter().any(Option::is_some),
                NumericPolicy::Off => false,
            };
            convert.then_some(parsed)
        })
        .collect();

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            row.into_iter()
                .enumerate()
                .map(|(j, raw)| match &numeric[j] {
                    Some(parsed) => parsed[i].map_or(CellValue::Missing, CellValue::Number),
                    None => CellValue::Text(raw),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn texts(cells: &[&str]) -> Vec<CellValue> {
        cells.iter().map(|c| CellValue::text(*c)).collect()
    }

    #[test]
    fn two_columns_become_key_value() {
        let t = normalize(grid(&[&["a", "b"], &["1", "2"], &["c", "x"]]), None, NumericPolicy::Off).unwrap();
        assert_eq!(t.shape, TableShape::KeyValue);
        assert!(t.headers.is_empty());
        assert_eq!(t.index, vec!["a", "1", "c"]);
        assert_eq!(t.rows, vec![texts(&["b"]), texts(&["2"]), texts(&["x"])]);
        assert_eq!(t.width(), 2);
        assert_eq!(t.height(), 3);
    }

    #[test]
    fn header_promotion_only() {
        let t = normalize(
            grid(&[&["Time / min", "Flux", "Note"], &["1", "2,5", "ok"], &["2", "3,0", "late"]]),
            None,
            NumericPolicy::Strict,
        )
        .unwrap();
        assert_eq!(t.shape, TableShape::Grid);
        assert_eq!(t.headers, vec!["Time / min", "Flux", "Note"]);
        assert!(t.index.is_empty());
        assert_eq!(t.index_name, None);
        assert_eq!(t.rows[0], vec![CellValue::Number(1.0), CellValue::Number(2.5), CellValue::text("ok")]);
        assert_eq!(t.width(), 3);
    }

    #[test]
    fn header_and_index_promotion() {
        for label in ["Probe", "SAMPLE", "nr.", "Nr."] {
            let t = normalize(
                grid(&[&[label, "m / g", "c"], &["A", "1", "2"], &["B", "3", "4"]]),
                None,
                NumericPolicy::Strict,
            )
            .unwrap();
            assert_eq!(t.headers, vec!["m / g", "c"], "{}", label);
            assert_eq!(t.index, vec!["A", "B"]);
            assert_eq!(t.index_name.as_deref(), Some(label));
            assert_eq!(t.rows[1], vec![CellValue::Number(3.0), CellValue::Number(4.0)]);
            assert_eq!(t.width(), 3);
        }
    }

    #[test]
    fn index_label_must_match_exactly() {
        let t = normalize(grid(&[&["Probes", "x", "y"], &["A", "1", "2"]]), None, NumericPolicy::Off).unwrap();
        assert!(t.index.is_empty());
        assert_eq!(t.headers.len(), 3);
    }

    #[test]
    fn strict_is_all_or_nothing() {
        let g = grid(&[&["h1", "h2", "h3"], &["1,5", "1,5", "x"], &["2,0", "2,0", "y"], &["x", "3,0", "z"]]);
        let t = normalize(g, None, NumericPolicy::Strict).unwrap();
        let first: Vec<CellValue> = t.column(0).unwrap().into_iter().cloned().collect();
        assert_eq!(first, texts(&["1,5", "2,0", "x"]));
        let second: Vec<CellValue> = t.column(1).unwrap().into_iter().cloned().collect();
        assert_eq!(second, vec![CellValue::Number(1.5), CellValue::Number(2.0), CellValue::Number(3.0)]);
    }

    #[test]
    fn coerce_marks_failures_missing() {
        let g = grid(&[&["h1", "h2", "h3"], &["1,5", "a", "x"], &["2,0", "b", "y"], &["x", "c", "z"]]);
        let t = normalize(g, None, NumericPolicy::Coerce).unwrap();
        let first: Vec<CellValue> = t.column(0).unwrap().into_iter().cloned().collect();
        assert_eq!(first, vec![CellValue::Number(1.5), CellValue::Number(2.0), CellValue::Missing]);
        // a column without a single number stays text
        let second: Vec<CellValue> = t.column(1).unwrap().into_iter().cloned().collect();
        assert_eq!(second, texts(&["a", "b", "c"]));
    }

    #[test]
    fn off_keeps_text() {
        let t = normalize(grid(&[&["a", "b", "c"], &["1", "2", "3"]]), None, NumericPolicy::Off).unwrap();
        assert_eq!(t.rows[0], texts(&["1", "2", "3"]));
    }

    #[test]
    fn key_value_column_coercion() {
        let g = grid(&[&["k", "1,5"], &["x", "2"]]);
        let t = normalize(g.clone(), None, NumericPolicy::Strict).unwrap();
        assert_eq!(t.rows, vec![vec![CellValue::Number(1.5)], vec![CellValue::Number(2.0)]]);

        let g = grid(&[&["k", "v"], &["x", "1,5"]]);
        let t = normalize(g.clone(), None, NumericPolicy::Strict).unwrap();
        assert_eq!(t.rows, vec![texts(&["v"]), texts(&["1,5"])]);
        let t = normalize(g, None, NumericPolicy::Coerce).unwrap();
        assert_eq!(t.rows, vec![texts(&["v"]), vec![CellValue::Number(1.5)]]);
        assert!(t.rows.iter().flatten().all(|c| !c.is_missing()));
        assert_eq!(t.row(1), Some(&[CellValue::Number(1.5)][..]));
        assert_eq!(t.row(2), None);
    }

    #[test]
    fn ragged_grid_is_malformed() {
        let err = normalize(grid(&[&["a", "b", "c"], &["1", "2"]]), None, NumericPolicy::Strict).unwrap_err();
        assert_eq!(err, TableError::Malformed { row: 1, expected: 3, found: 2 });
    }

    #[test]
    fn headers_made_unique_and_non_empty() {
        let t = normalize(grid(&[&["x", "", "x", "x"], &["1", "2", "3", "4"]]), None, NumericPolicy::Off).unwrap();
        assert_eq!(t.headers, vec!["x", "Unnamed: 1", "x.1", "x.2"]);
    }

    #[test]
    fn single_column_takes_header_rule() {
        let t = normalize(grid(&[&["only"], &["1"], &["2"]]), None, NumericPolicy::Strict).unwrap();
        assert_eq!(t.headers, vec!["only"]);
        assert_eq!(t.rows, vec![vec![CellValue::Number(1.0)], vec![CellValue::Number(2.0)]]);
    }

    #[test]
    fn header_only_table() {
        let t = normalize(grid(&[&["Probe", "a", "b"]]), Some("t".into()), NumericPolicy::Strict).unwrap();
        assert_eq!(t.headers, vec!["a", "b"]);
        assert_eq!(t.height(), 0);
        assert_eq!(t.title.as_deref(), Some("t"));
    }

    #[test]
    fn pairs_only_for_key_value() {
        let kv = normalize(grid(&[&["a", "1"], &["b", "2"]]), None, NumericPolicy::Off).unwrap();
        let pairs: Vec<(&str, &CellValue)> = kv.pairs().unwrap().collect();
        assert_eq!(pairs, vec![("a", &CellValue::text("1")), ("b", &CellValue::text("2"))]);

        let g = normalize(grid(&[&["a", "b", "c"]]), None, NumericPolicy::Off).unwrap();
        assert!(g.pairs().is_none());
    }

    #[test]
    fn display_renders_tab_separated() {
        let t = normalize(
            grid(&[&["Probe", "m"], &["A", "1"]]),
            None,
            NumericPolicy::Off,
        )
        .unwrap();
        // two columns: key-value, no header line
        assert_eq!(t.to_string(), "Probe\tm\nA\t1\n");

        let t = normalize(grid(&[&["Sample", "m", "n"], &["A", "1,5", "2"]]), Some("T".into()), NumericPolicy::Strict).unwrap();
        assert_eq!(t.to_string(), "T\nSample\tm\tn\nA\t1.5\t2\n");
    }
}
