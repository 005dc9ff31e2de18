use std::str::FromStr;

use indexmap::IndexMap;
use itertools::Itertools;
use tracing::warn;

use crate::cell::CellValue;
use crate::error::SummaryError;

const UNIT_SPLIT: &str = " / ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    #[default]
    Raise,
    Ignore,
    Coerce,
}

impl FromStr for MissingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raise" => Ok(MissingPolicy::Raise),
            "ignore" => Ok(MissingPolicy::Ignore),
            "coerce" => Ok(MissingPolicy::Coerce),
            other => Err(format!("unknown missing-parameter policy '{}'", other)),
        }
    }
}

/// Unit part of a `name / unit` parameter label.
pub fn unit_of(parameter: &str) -> Option<&str> {
    parameter
        .split_once(UNIT_SPLIT)
        .map(|(_, unit)| unit.trim())
        .filter(|u| !u.is_empty())
}

/// `"v1; v2; …"` for the requested parameters. Numbers get the unit from
/// their label appended (`time / min` = 20 → `20 min`).
pub fn summarize<S: AsRef<str>>(
    values: &IndexMap<String, CellValue>,
    parameters: &[S],
    missing: MissingPolicy,
    separator: &str,
) -> Result<String, SummaryError> {
    let mut parts = Vec::with_capacity(parameters.len());

    for param in parameters {
        let param = param.as_ref();
        let Some(value) = values.get(param) else {
            match missing {
                MissingPolicy::Raise => return Err(SummaryError::MissingParameter(param.to_string())),
                MissingPolicy::Ignore => warn!(parameter = param, "missing summary parameter"),
                MissingPolicy::Coerce => parts.push("None".to_string()),
            }
            continue;
        };

        let rendered = match unit_of(param) {
            Some(unit) if value.is_number() => format!("{} {}", value, unit),
            _ => value.to_string(),
        };
        parts.push(rendered);
    }

    Ok(parts.into_iter().join(separator))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, CellValue)]) -> IndexMap<String, CellValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn units_for_numbers_only() {
        let v = values(&[
            ("time / min", CellValue::Number(20.0)),
            ("name", CellValue::text("sam")),
            ("label / unit", CellValue::text("PES")),
        ]);
        let s = summarize(&v, &["time / min", "name", "label / unit"], MissingPolicy::Raise, "; ").unwrap();
        assert_eq!(s, "20 min; sam; PES");
    }

    #[test]
    fn missing_policies() {
        let v = values(&[("name", CellValue::text("sam"))]);
        let params = ["name", "id"];

        let err = summarize(&v, &params, MissingPolicy::Raise, "; ").unwrap_err();
        assert!(matches!(err, SummaryError::MissingParameter(ref p) if p == "id"));
        assert_eq!(summarize(&v, &params, MissingPolicy::Ignore, "; ").unwrap(), "sam");
        assert_eq!(summarize(&v, &params, MissingPolicy::Coerce, "; ").unwrap(), "sam; None");
    }

    #[test]
    fn empty_summary() {
        let v = values(&[]);
        let none: [&str; 0] = [];
        assert_eq!(summarize(&v, &none, MissingPolicy::Raise, "; ").unwrap(), "");
        assert_eq!(summarize(&v, &["x"], MissingPolicy::Ignore, "; ").unwrap(), "");
    }

    #[test]
    fn unit_parsing() {
        assert_eq!(unit_of("Pressure / bar"), Some("bar"));
        assert_eq!(unit_of("c / g / L"), Some("g / L"));
        assert_eq!(unit_of("name"), None);
        assert_eq!(unit_of("odd / "), None);
    }
}
