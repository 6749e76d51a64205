//! Runtime configuration of the mapper

use crate::errors::ConfigurationError;
use crate::value_objects::{CascadePolicy, FetchMode};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs shared by the mapper, resolver and query engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OgmConfig {
    /// Joins an embedded field name and its sub-field into a property key
    pub embedded_key_separator: String,
    /// Delete policy for relationships that do not declare one
    pub default_cascade: CascadePolicy,
    /// Fetch mode for relationships that do not declare one
    pub default_fetch: FetchMode,
    /// How many relationship hops eager hydration follows from a root entity
    pub max_fetch_depth: usize,
}

impl Default for OgmConfig {
    fn default() -> Self {
        Self {
            embedded_key_separator: "_".to_string(),
            default_cascade: CascadePolicy::Detach,
            default_fetch: FetchMode::Eager,
            max_fetch_depth: 3,
        }
    }
}

impl OgmConfig {
    /// Parse a JSON document; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: OgmConfig =
            serde_json::from_str(json).map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.embedded_key_separator.is_empty() {
            return Err(ConfigurationError::InvalidConfig(
                "embedded_key_separator cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Property key of `field` nested under `prefix`
    pub fn embedded_key(&self, prefix: &str, field: &str) -> String {
        if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}{}{field}", self.embedded_key_separator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = OgmConfig::from_json_str(r#"{ "max_fetch_depth": 1, "default_cascade": "restrict" }"#).unwrap();

        assert_eq!(config.max_fetch_depth, 1);
        assert_eq!(config.default_cascade, CascadePolicy::Restrict);
        assert_eq!(config.embedded_key_separator, "_");
    }

    #[test]
    fn test_empty_separator_rejected() {
        let result = OgmConfig::from_json_str(r#"{ "embedded_key_separator": "" }"#);
        assert!(matches!(result, Err(ConfigurationError::InvalidConfig(_))));
    }

    #[test]
    fn test_unreadable_file_names_the_path() {
        let err = OgmConfig::from_json_file("/nonexistent/ogm.json").unwrap_err();

        assert_eq!(err.to_string(), "reading /nonexistent/ogm.json");
        assert!(err.root_cause().downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_embedded_key() {
        let config = OgmConfig::default();
        assert_eq!(config.embedded_key("", "city"), "city");
        assert_eq!(config.embedded_key("area", "postcode"), "area_postcode");
    }
}
