use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cell::CellValue;
use crate::error::ProjectError;
use crate::metadata::MetadataRecord;
use crate::parser::normalize::NormalizedTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    UseFirst,
    UseLast,
    #[default]
    RaiseError,
    UserSelection,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "use_first" => Ok(ConflictPolicy::UseFirst),
            "use_last" => Ok(ConflictPolicy::UseLast),
            "raise_error" => Ok(ConflictPolicy::RaiseError),
            "user_selection" => Ok(ConflictPolicy::UserSelection),
            other => Err(format!(
                "unknown conflict policy '{}' (use_first, use_last, raise_error, user_selection)",
                other
            )),
        }
    }
}

/// Answer to a tie-break request: 0 keeps the existing value, 1 takes the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Existing,
    New,
}

impl TryFrom<u8> for Selection {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Selection::Existing),
            1 => Ok(Selection::New),
            other => Err(other),
        }
    }
}

/// Port for the `user_selection` policy. Called synchronously once per conflict.
pub trait ConflictResolver {
    fn resolve_conflict(
        &mut self,
        key: &str,
        existing: &CellValue,
        new: &CellValue,
    ) -> Result<Selection, String>;
}

impl<F> ConflictResolver for F
where
    F: FnMut(&str, &CellValue, &CellValue) -> Selection,
{
    fn resolve_conflict(
        &mut self,
        key: &str,
        existing: &CellValue,
        new: &CellValue,
    ) -> Result<Selection, String> {
        Ok(self(key, existing, new))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeptExisting,
    TookNew,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub key: String,
    pub existing: CellValue,
    pub new: CellValue,
    pub resolution: Resolution,
    /// Title of the table that supplied the new value.
    pub table: Option<String>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.table.as_deref().unwrap_or("untitled table");
        match self.resolution {
            Resolution::KeptExisting => write!(
                f,
                "duplicate '{}': kept '{}', discarded '{}' from {}",
                self.key, self.existing, self.new, source
            ),
            Resolution::TookNew => write!(
                f,
                "duplicate '{}': replaced '{}' with '{}' from {}",
                self.key, self.existing, self.new, source
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatProjection {
    pub values: IndexMap<String, CellValue>,
    pub conflicts: Vec<Conflict>,
}

impl FlatProjection {
    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.values.get(key)
    }
}

/// Merges key-value tables over a metadata record into one flat mapping.
pub struct KeyValueProjector<'r> {
    policy: ConflictPolicy,
    resolver: Option<&'r mut dyn ConflictResolver>,
}

impl<'r> KeyValueProjector<'r> {
    pub fn new(policy: ConflictPolicy) -> Self {
        KeyValueProjector {
            policy,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: &'r mut dyn ConflictResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Start from a copy of `metadata`, then add every `(key, value)` row of
    /// every key-value table in order. Grid tables are skipped.
    pub fn project(
        &mut self,
        tables: &[NormalizedTable],
        metadata: &MetadataRecord,
    ) -> Result<FlatProjection, ProjectError> {
        if self.policy == ConflictPolicy::UserSelection && self.resolver.is_none() {
            return Err(ProjectError::MissingResolver);
        }

        let mut values = metadata.clone();
        let mut conflicts = Vec::new();

        for table in tables {
            let Some(pairs) = table.pairs() else {
                debug!(title = ?table.title, width = table.width(), "not a key-value table");
                continue;
            };

            for (key, value) in pairs {
                let Some(existing) = values.get_mut(key) else {
                    values.insert(key.to_string(), value.clone());
                    continue;
                };

                warn!(key, table = ?table.title, "duplicate key");
                let resolution = match self.policy {
                    ConflictPolicy::UseFirst => Resolution::KeptExisting,
                    ConflictPolicy::UseLast => Resolution::TookNew,
                    ConflictPolicy::RaiseError => {
                        return Err(ProjectError::DuplicateKey(key.to_string()));
                    }
                    ConflictPolicy::UserSelection => {
                        let resolver = self.resolver.as_deref_mut().ok_or(ProjectError::MissingResolver)?;
                        match resolver.resolve_conflict(key, existing, value) {
                            Ok(Selection::Existing) => Resolution::KeptExisting,
                            Ok(Selection::New) => Resolution::TookNew,
                            Err(message) => {
                                return Err(ProjectError::Resolver {
                                    key: key.to_string(),
                                    message,
                                })
                            }
                        }
                    }
                };

                let conflict = Conflict {
                    key: key.to_string(),
                    existing: existing.clone(),
                    new: value.clone(),
                    resolution,
                    table: table.title.clone(),
                };
                debug!("{}", conflict);
                if resolution == Resolution::TookNew {
                    *existing = value.clone();
                }
                conflicts.push(conflict);
            }
        }

        Ok(FlatProjection { values, conflicts })
    }
}

/// Project without an interactive tie-break.
pub fn project(
    tables: &[NormalizedTable],
    metadata: &MetadataRecord,
    policy: ConflictPolicy,
) -> Result<FlatProjection, ProjectError> {
    KeyValueProjector::new(policy).project(tables, metadata)
}
