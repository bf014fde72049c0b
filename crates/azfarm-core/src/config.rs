//! Named configuration entries handed to plugins by the host.
//!
//! The host exposes plugin settings as a flat set of string entries. A
//! [`ConfigStore`] is the read side of that; [`MapConfigStore`] is the
//! in-process implementation, loadable from a flat TOML table.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// Result type alias for configuration lookups.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while reading configuration entries.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration entry: {0}")]
    Missing(String),

    #[error("configuration entry {name} has invalid value {value:?}: expected {expected}")]
    Invalid {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration file: {0}")]
    Parse(String),
}

/// Read access to the host's named configuration entries.
///
/// Empty values are treated the same as absent ones.
pub trait ConfigStore {
    /// Raw value of an entry, if present and non-empty.
    fn entry(&self, name: &str) -> Option<String>;

    /// Value of an entry that must be set.
    fn required(&self, name: &str) -> ConfigResult<String> {
        self.entry(name)
            .ok_or_else(|| ConfigError::Missing(name.to_string()))
    }

    /// Value of an entry, or `default` when unset.
    fn entry_or(&self, name: &str, default: &str) -> String {
        self.entry(name).unwrap_or_else(|| default.to_string())
    }

    /// Boolean entry, or `default` when unset.
    fn bool_entry_or(&self, name: &str, default: bool) -> ConfigResult<bool> {
        match self.entry(name) {
            Some(value) => parse_bool(name, &value),
            None => Ok(default),
        }
    }

    /// Unsigned integer entry, or `default` when unset.
    fn u64_entry_or(&self, name: &str, default: u64) -> ConfigResult<u64> {
        match self.entry(name) {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name: name.to_string(),
                value,
                expected: "an unsigned integer",
            }),
            None => Ok(default),
        }
    }
}

fn parse_bool(name: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name: name.to_string(),
            value: value.to_string(),
            expected: "a boolean",
        }),
    }
}

/// Split a `;`-separated multi-value entry, dropping empty items.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// In-memory configuration store.
#[derive(Debug, Clone, Default)]
pub struct MapConfigStore {
    entries: HashMap<String, String>,
}

impl MapConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(name.to_string(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    /// Load entries from a flat TOML table.
    ///
    /// Strings, booleans, integers and floats are accepted; non-string
    /// scalars are stored in their TOML text form.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut store = Self::new();
        for (name, value) in table {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                other => {
                    return Err(ConfigError::Parse(format!(
                        "entry {name} must be a scalar, found {}",
                        other.type_str()
                    )));
                }
            };
            store.set(&name, text);
        }
        Ok(store)
    }

    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

impl ConfigStore for MapConfigStore {
    fn entry(&self, name: &str) -> Option<String> {
        self.entries
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}

impl<T: ConfigStore + ?Sized> ConfigStore for &T {
    fn entry(&self, name: &str) -> Option<String> {
        (**self).entry(name)
    }
}
