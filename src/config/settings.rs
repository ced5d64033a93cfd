//! TOML-based configuration for trellis.
//!
//! Supports a config file (trellis.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [database]
//! path = "${DATA_DIR}/library.db"
//! dialect = "sqlite"
//!
//! [read]
//! collapse_none = true
//! total_field = "total"
//!
//! [[junctions]]
//! source = "book"
//! target = "tag"
//! interim = "book_tag"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::schema::SchemaBuilder;
use crate::sql::dialect::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,

    pub read: ReadSettings,

    /// Junction tables named explicitly for many-to-many links.
    pub junctions: Vec<JunctionSettings>,
}

/// Database location and SQL dialect.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file path (supports ${ENV_VAR} expansion). `:memory:` opens
    /// an in-memory database.
    pub path: String,

    /// Dialect used when printing plans.
    pub dialect: Dialect,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            dialect: Dialect::Sqlite,
        }
    }
}

impl DatabaseSettings {
    /// Get the database path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.path)
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

/// Read-path defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadSettings {
    /// Replace nested objects whose values are all null with null.
    pub collapse_none: bool,

    /// Output field carrying the total row count.
    pub total_field: String,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            collapse_none: true,
            total_field: crate::builder::TOTAL_FIELD.to_string(),
        }
    }
}

/// One explicit junction between two tables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JunctionSettings {
    pub source: String,
    pub target: String,
    pub interim: String,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TRELLIS_CONFIG`
    /// 2. `./trellis.toml`
    /// 3. `~/.config/trellis/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TRELLIS_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("trellis.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("trellis").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.read.total_field.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "read.total_field must not be empty".to_string(),
            ));
        }
        for junction in &self.junctions {
            if junction.source == junction.interim || junction.target == junction.interim {
                return Err(SettingsError::InvalidConfig(format!(
                    "junction {} <-> {} cannot use an endpoint as interim",
                    junction.source, junction.target
                )));
            }
        }
        Ok(())
    }

    /// Register the configured junctions on a schema builder.
    pub fn apply_junctions(&self, mut builder: SchemaBuilder) -> SchemaBuilder {
        for junction in &self.junctions {
            builder = builder.junction(&junction.source, &junction.target, &junction.interim);
        }
        builder
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next();
            let name: String = chars.by_ref().take_while(|&ch| ch != '}').collect();
            name
        } else {
            let mut name = String::new();
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                name.push(ch);
                chars.next();
            }
            if name.is_empty() {
                // Lone '$'
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_braces() {
        env::set_var("TRELLIS_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${TRELLIS_TEST_VAR}").unwrap(), "hello");
        assert_eq!(
            expand_env_vars("prefix_${TRELLIS_TEST_VAR}_suffix").unwrap(),
            "prefix_hello_suffix"
        );
        env::remove_var("TRELLIS_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        env::set_var("TRELLIS_TEST_VAR2", "world");
        assert_eq!(expand_env_vars("$TRELLIS_TEST_VAR2").unwrap(), "world");
        assert_eq!(expand_env_vars("$TRELLIS_TEST_VAR2!").unwrap(), "world!");
        assert_eq!(expand_env_vars("cost $").unwrap(), "cost $");
        env::remove_var("TRELLIS_TEST_VAR2");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("${NONEXISTENT_VAR_12345}");
        assert!(matches!(result, Err(SettingsError::MissingEnvVar(name)) if name == "NONEXISTENT_VAR_12345"));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[database]
path = "./library.db"
dialect = "postgres"

[read]
collapse_none = false
total_field = "count"

[[junctions]]
source = "book"
target = "tag"
interim = "book_tag"
"#;

        let settings = Settings::from_toml(toml).unwrap();

        assert_eq!(settings.database.path, "./library.db");
        assert_eq!(settings.database.dialect, Dialect::Postgres);
        assert!(!settings.database.is_in_memory());
        assert!(!settings.read.collapse_none);
        assert_eq!(settings.read.total_field, "count");
        assert_eq!(
            settings.junctions,
            vec![JunctionSettings {
                source: "book".into(),
                target: "tag".into(),
                interim: "book_tag".into(),
            }]
        );
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert!(settings.database.is_in_memory());
        assert_eq!(settings.database.dialect, Dialect::Sqlite);
        assert!(settings.read.collapse_none);
        assert_eq!(settings.read.total_field, "total");
        assert!(settings.junctions.is_empty());
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let settings = Settings::from_toml("[read]\ncollapse_none = false\n").unwrap();
        assert!(!settings.read.collapse_none);
        assert_eq!(settings.read.total_field, "total");
        assert_eq!(settings.database.path, ":memory:");
    }

    #[test]
    fn test_invalid_junction() {
        let toml = r#"
[[junctions]]
source = "book"
target = "tag"
interim = "tag"
"#;
        assert!(matches!(
            Settings::from_toml(toml),
            Err(SettingsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Settings::from_file("/nonexistent/trellis.toml"),
            Err(SettingsError::FileNotFound(_))
        ));
    }
}
