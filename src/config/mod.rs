//! Configuration module
//!
//! Handles loading and managing session settings.

pub mod settings;

pub use settings::SettingsBag;
