//! Session settings
//!
//! A flat ordered key/value bag shared by driver and target. The driver
//! ships its bag inside the wire handshake, so both sides agree on
//! timeouts, log levels and feature selection.

#![allow(dead_code)]

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::{ProgramError, XmlError};
use crate::serial::XmlNode;
use crate::utils::logger::LogLevel;

/// Default per-test timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Remote log level, shipped to the target.
pub const KEY_LOG_LEVEL: &str = "LogLevel";
/// Log level of this process only.
pub const KEY_LOCAL_LOG_LEVEL: &str = "LocalLogLevel";
/// Disables all test timeouts, for debugging.
pub const KEY_DISABLE_TIMEOUTS: &str = "DisableTimeouts";
/// Fallback per-test timeout in milliseconds.
pub const KEY_DEFAULT_TIMEOUT: &str = "DefaultTimeout";
/// Persisted category selection.
pub const KEY_CURRENT_CATEGORY: &str = "CurrentCategory";
/// Persisted feature tokens.
pub const KEY_CURRENT_FEATURES: &str = "CurrentFeatures";

/// Settings file locations (in order of precedence)
const SETTINGS_LOCATIONS: &[&str] = &[
    "./testwire.xml",
    "./.testwire/settings.xml",
    "~/.config/testwire/settings.xml",
];

/// Flat string key/value settings, kept in key order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsBag {
    values: BTreeMap<String, String>,
}

impl SettingsBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overlay another bag on top of this one; the other bag wins.
    pub fn merge(&mut self, other: &SettingsBag) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    /// Apply `KEY=VALUE` assignments from the command line.
    pub fn apply_assignments<'a>(
        &mut self,
        assignments: impl IntoIterator<Item = &'a str>,
    ) -> std::result::Result<(), ProgramError> {
        for assignment in assignments {
            let (key, value) = assignment.split_once('=').ok_or_else(|| {
                ProgramError::new(format!("invalid setting '{assignment}', expected KEY=VALUE"))
            })?;
            if key.is_empty() {
                return Err(ProgramError::new(format!(
                    "invalid setting '{assignment}', empty key"
                )));
            }
            self.set(key, value);
        }
        Ok(())
    }

    pub fn bool_value(&self, key: &str) -> Option<bool> {
        self.get(key).map(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn int_value(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.get(KEY_LOG_LEVEL).and_then(LogLevel::from_str)
    }

    pub fn local_log_level(&self) -> Option<LogLevel> {
        self.get(KEY_LOCAL_LOG_LEVEL).and_then(LogLevel::from_str)
    }

    pub fn disable_timeouts(&self) -> bool {
        self.bool_value(KEY_DISABLE_TIMEOUTS).unwrap_or(false)
    }

    pub fn default_timeout_ms(&self) -> u64 {
        self.int_value(KEY_DEFAULT_TIMEOUT)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("Settings");
        for (key, value) in self.iter() {
            node.add_child(
                XmlNode::new("Setting")
                    .with_attr("Key", key)
                    .with_attr("Value", value),
            );
        }
        node
    }

    pub fn from_xml(node: &XmlNode) -> std::result::Result<Self, XmlError> {
        if node.name != "Settings" {
            return Err(XmlError::malformed(format!(
                "expected a Settings element, found <{}>",
                node.name
            )));
        }
        let mut bag = SettingsBag::new();
        for child in node.children_named("Setting") {
            bag.set(child.require_attr("Key")?, child.require_attr("Value")?);
        }
        Ok(bag)
    }

    /// Load settings from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let root = XmlNode::parse(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
        Ok(Self::from_xml(&root)?)
    }

    /// Save settings to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }
        let content = self.to_xml().to_document()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }

    /// Find a settings file in the standard locations
    pub fn find() -> Option<PathBuf> {
        for location in SETTINGS_LOCATIONS {
            let path = expand_path(location);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    /// Path used by `--save-options` when no explicit file is given
    pub fn default_save_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("testwire").join("settings.xml"),
            None => PathBuf::from("testwire.xml"),
        }
    }

    /// Load settings from the standard locations, empty if none exist
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::find() {
            Self::load(&path)
        } else {
            Ok(Self::new())
        }
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignments() {
        let mut bag = SettingsBag::new();
        bag.apply_assignments(["LogLevel=debug", "DefaultTimeout=5000"])
            .unwrap();
        assert_eq!(bag.log_level(), Some(LogLevel::Debug));
        assert_eq!(bag.default_timeout_ms(), 5000);
        assert!(bag.apply_assignments(["NoEquals"]).is_err());
        assert!(bag.apply_assignments(["=value"]).is_err());
    }

    #[test]
    fn test_typed_accessors() {
        let mut bag = SettingsBag::new();
        assert!(!bag.disable_timeouts());
        assert_eq!(bag.default_timeout_ms(), DEFAULT_TIMEOUT_MS);
        bag.set(KEY_DISABLE_TIMEOUTS, "True");
        bag.set(KEY_DEFAULT_TIMEOUT, "250");
        assert!(bag.disable_timeouts());
        assert_eq!(bag.default_timeout_ms(), 250);
    }

    #[test]
    fn test_merge_overlays() {
        let mut base = SettingsBag::new();
        base.set("A", "1");
        base.set("B", "1");
        let mut overlay = SettingsBag::new();
        overlay.set("B", "2");
        base.merge(&overlay);
        assert_eq!(base.get("A"), Some("1"));
        assert_eq!(base.get("B"), Some("2"));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.xml");

        let mut bag = SettingsBag::new();
        bag.set(KEY_LOG_LEVEL, "debug");
        bag.set(KEY_CURRENT_CATEGORY, "all");
        bag.save(&path).unwrap();

        let loaded = SettingsBag::load(&path).unwrap();
        assert_eq!(loaded, bag);
    }

    #[test]
    fn test_rejects_wrong_root() {
        let node = XmlNode::new("Options");
        assert!(SettingsBag::from_xml(&node).is_err());
    }
}
