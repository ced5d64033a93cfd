//! Configuration for trellis.
//!
//! Settings come from a TOML file with environment variable expansion and
//! describe the database, read-path defaults and explicit junction tables.

mod settings;

pub use settings::{expand_env_vars, DatabaseSettings, JunctionSettings, ReadSettings, Settings, SettingsError};
