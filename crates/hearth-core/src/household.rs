//! Household configuration
//!
//! Names the reserved system user, the two members behind the legacy
//! `"Both"` label, and the bank-category rules used for auto-labelling.
//!
//! ## Configuration Resolution
//!
//! 1. An explicit path (`--household`), when given
//! 2. The override in the data dir (~/.local/share/hearth/household.toml)
//! 3. The embedded default (compiled into binary)

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/household.toml");

/// Household-wide settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HouseholdConfig {
    /// Username of the reserved system user
    #[serde(default = "default_username")]
    pub default_username: String,
    /// Display names of the two members a legacy "Both" label refers to
    #[serde(default)]
    pub legacy_members: Vec<String>,
    #[serde(default)]
    pub auto_label: AutoLabelRules,
}

/// Bank category rules for legacy auto-labelling
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AutoLabelRules {
    /// Categories that stay unlabeled
    #[serde(default)]
    pub unlabeled_categories: Vec<String>,
    /// Categories labelled with the first legacy member
    #[serde(default)]
    pub primary_member_categories: Vec<String>,
}

fn default_username() -> String {
    "default".to_string()
}

impl Default for HouseholdConfig {
    fn default() -> Self {
        parse_config(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            default_username: default_username(),
            legacy_members: vec![],
            auto_label: AutoLabelRules::default(),
        })
    }
}

impl HouseholdConfig {
    /// Load with the override chain described in the module docs
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Household config not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => parse_config(DEFAULT_CONFIG),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        parse_config(&content)
    }

    /// The two legacy members, if exactly two are configured
    pub fn legacy_pair(&self) -> Option<(&str, &str)> {
        match self.legacy_members.as_slice() {
            [a, b] => Some((a.as_str(), b.as_str())),
            _ => None,
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("hearth").join("household.toml"))
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<HouseholdConfig> {
    let config: HouseholdConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid household TOML: {}", e)))?;

    if config.default_username.trim().is_empty() {
        return Err(Error::Config("default_username must not be empty".to_string()));
    }
    if !config.legacy_members.is_empty() && config.legacy_members.len() != 2 {
        return Err(Error::Config(format!(
            "legacy_members must name exactly two members, got {}",
            config.legacy_members.len()
        )));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_embedded_default_parses() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.default_username, "default");
        assert_eq!(config.legacy_pair(), Some(("Ruby", "Jack")));
        assert!(config
            .auto_label
            .unlabeled_categories
            .contains(&"Dining".to_string()));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_username = "system"
legacy_members = ["Ana", "Ben"]
"#
        )
        .unwrap();

        let config = HouseholdConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.default_username, "system");
        assert_eq!(config.legacy_pair(), Some(("Ana", "Ben")));
        assert!(config.auto_label.primary_member_categories.is_empty());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = HouseholdConfig::load(Some(Path::new("/nonexistent/household.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_wrong_member_count() {
        let result = parse_config(r#"legacy_members = ["Solo"]"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
