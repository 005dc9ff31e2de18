use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::SettingsError;
use crate::export::ExportOptions;
use crate::parser::normalize::NumericPolicy;
use crate::parser::ExtractOptions;
use crate::project::ConflictPolicy;

const CONFIG_FILE: &str = "notebook_tables";
const ENV_PREFIX: &str = "NOTEBOOK_TABLES";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub table_separator: String,
    pub numeric: NumericPolicy,
    pub conflicts: ConflictPolicy,
    pub field_separator: String,
    pub decimal_separator: String,
}

impl Settings {
    /// Defaults, then `notebook_tables.toml` if present, then `NOTEBOOK_TABLES_*` variables.
    pub fn load() -> Result<Self, SettingsError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX));
        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let settings = builder
            .set_default("table_separator", "|")?
            .set_default("numeric", "strict")?
            .set_default("conflicts", "raise_error")?
            .set_default("field_separator", ";")?
            .set_default("decimal_separator", ",")?
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn extract_options(&self) -> Result<ExtractOptions, SettingsError> {
        let separator = single_char("table_separator", &self.table_separator)?;
        // '.' introduces directives
        if separator == '.' {
            return Err(SettingsError::Separator {
                key: "table_separator",
                value: self.table_separator.clone(),
            });
        }
        Ok(ExtractOptions {
            separator,
            numeric: self.numeric,
        })
    }

    pub fn export_options(&self) -> Result<ExportOptions, SettingsError> {
        let field = single_char("field_separator", &self.field_separator)?;
        if !field.is_ascii() {
            return Err(SettingsError::Separator {
                key: "field_separator",
                value: self.field_separator.clone(),
            });
        }
        Ok(ExportOptions {
            field_separator: field as u8,
            decimal: single_char("decimal_separator", &self.decimal_separator)?,
        })
    }
}

fn single_char(key: &'static str, value: &str) -> Result<char, SettingsError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(SettingsError::Separator {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Settings, SettingsError> {
        Settings::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn defaults() {
        let s = from_toml("").unwrap();
        assert_eq!(s.numeric, NumericPolicy::Strict);
        assert_eq!(s.conflicts, ConflictPolicy::RaiseError);
        assert_eq!(s.extract_options().unwrap(), ExtractOptions::default());
        assert_eq!(s.export_options().unwrap(), ExportOptions::default());
    }

    #[test]
    fn overrides() {
        let s = from_toml(
            r#"
            numeric = "coerce"
            conflicts = "use_last"
            field_separator = ","
            decimal_separator = "."
            "#,
        )
        .unwrap();
        assert_eq!(s.numeric, NumericPolicy::Coerce);
        assert_eq!(s.conflicts, ConflictPolicy::UseLast);
        let export = s.export_options().unwrap();
        assert_eq!(export.field_separator, b',');
        assert_eq!(export.decimal, '.');
    }

    #[test]
    fn bad_policy_rejected() {
        assert!(from_toml(r#"numeric = "sometimes""#).is_err());
    }

    #[test]
    fn bad_separators_rejected() {
        let s = from_toml(r#"table_separator = "||""#).unwrap();
        assert!(matches!(s.extract_options(), Err(SettingsError::Separator { key: "table_separator", .. })));

        let s = from_toml(r#"table_separator = ".""#).unwrap();
        assert!(s.extract_options().is_err());

        let s = from_toml(r#"field_separator = "§""#).unwrap();
        assert!(s.export_options().is_err());
    }
}
