use std::fmt;

use serde::{Deserialize, Serialize};

/// One data cell of a normalized table.
///
/// `Missing` is only ever produced by numeric coercion under
/// [`NumericPolicy::Coerce`](crate::parser::normalize::NumericPolicy::Coerce);
/// scanning alone yields text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Missing,
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn is_number(&self) -> bool {
        matches!(self, CellValue::Number(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    /// Render for delimited output: numbers use `decimal` as the decimal mark,
    /// missing values become an empty field.
    pub fn render(&self, decimal: char) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(v) => format_number(*v, decimal),
            CellValue::Missing => String::new(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(v) => write!(f, "{}", v),
            CellValue::Missing => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

/// Parse a cell as a number, accepting a comma as decimal separator.
/// Non-finite results ("inf", "NaN") are treated as text.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn format_number(v: f64, decimal: char) -> String {
    let s = v.to_string();
    if decimal == '.' {
        s
    } else {
        s.replace('.', &decimal.to_string())
    }
}
