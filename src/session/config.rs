//! Session configuration
//!
//! Categories and features declared by the suite, plus the current
//! selection. Unknown names are hard failures, so a typo never silently
//! runs the wrong set of tests.

#![allow(dead_code)]

use crate::config::settings::{KEY_CURRENT_CATEGORY, KEY_CURRENT_FEATURES};
use crate::config::SettingsBag;
use crate::errors::ProgramError;
use crate::suite::{FeatureSpec, SuiteSpec};

/// One feature and its current state.
#[derive(Clone, Debug)]
pub struct FeatureState {
    pub spec: FeatureSpec,
    pub enabled: bool,
}

/// Category and feature selection for one session.
#[derive(Clone, Debug, Default)]
pub struct TestConfiguration {
    categories: Vec<String>,
    /// `None` selects every category.
    current_category: Option<String>,
    features: Vec<FeatureState>,
}

impl TestConfiguration {
    pub fn from_suite(suite: &SuiteSpec) -> Self {
        let features = suite
            .features
            .iter()
            .map(|spec| FeatureState {
                enabled: spec.constant.unwrap_or(spec.default_on),
                spec: spec.clone(),
            })
            .collect();
        Self {
            categories: suite.categories(),
            current_category: None,
            features,
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn current_category(&self) -> Option<&str> {
        self.current_category.as_deref()
    }

    pub fn select_category(&mut self, name: &str) -> Result<(), ProgramError> {
        if name == "all" {
            self.current_category = None;
            return Ok(());
        }
        if self.categories.iter().any(|c| c == name) {
            self.current_category = Some(name.to_owned());
            Ok(())
        } else {
            Err(ProgramError::new(format!("unknown category: {name}")))
        }
    }

    /// Whether a case tagged with `category` runs under the current
    /// selection. Selecting a category runs only that category.
    pub fn matches_category(&self, category: Option<&str>) -> bool {
        match &self.current_category {
            None => true,
            Some(selected) => category == Some(selected.as_str()),
        }
    }

    pub fn features(&self) -> &[FeatureState] {
        &self.features
    }

    /// `Some(state)` for declared features, `None` for unknown names.
    pub fn is_feature_enabled(&self, name: &str) -> Option<bool> {
        self.features
            .iter()
            .find(|f| f.spec.name == name)
            .map(|f| f.enabled)
    }

    pub fn set_feature(&mut self, name: &str, enabled: bool) -> Result<(), ProgramError> {
        let feature = self
            .features
            .iter_mut()
            .find(|f| f.spec.name == name)
            .ok_or_else(|| ProgramError::new(format!("unknown feature: {name}")))?;
        if feature.spec.constant.is_some() {
            return Err(ProgramError::new(format!(
                "feature cannot be changed: {name}"
            )));
        }
        feature.enabled = enabled;
        Ok(())
    }

    /// Apply a comma separated feature selection: `all` enables every
    /// modifiable feature, `+name` and `-name` toggle one, a bare name
    /// acts as `+name`.
    pub fn apply_feature_tokens(&mut self, tokens: &str) -> Result<(), ProgramError> {
        for token in tokens.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if token == "all" {
                for feature in &mut self.features {
                    if feature.spec.constant.is_none() {
                        feature.enabled = true;
                    }
                }
            } else if let Some(name) = token.strip_prefix('+') {
                self.set_feature(name, true)?;
            } else if let Some(name) = token.strip_prefix('-') {
                self.set_feature(name, false)?;
            } else {
                self.set_feature(token, true)?;
            }
        }
        Ok(())
    }

    /// Restore the persisted selection from a settings bag.
    pub fn load_from_settings(&mut self, settings: &SettingsBag) -> Result<(), ProgramError> {
        if let Some(category) = settings.get(KEY_CURRENT_CATEGORY) {
            self.select_category(category)?;
        }
        if let Some(tokens) = settings.get(KEY_CURRENT_FEATURES) {
            let tokens = tokens.to_owned();
            self.apply_feature_tokens(&tokens)?;
        }
        Ok(())
    }

    /// Persist the current selection into a settings bag.
    pub fn save_to_settings(&self, settings: &mut SettingsBag) {
        settings.set(
            KEY_CURRENT_CATEGORY,
            self.current_category.as_deref().unwrap_or("all"),
        );
        let tokens: Vec<String> = self
            .features
            .iter()
            .filter(|f| f.spec.constant.is_none())
            .map(|f| {
                if f.enabled {
                    format!("+{}", f.spec.name)
                } else {
                    format!("-{}", f.spec.name)
                }
            })
            .collect();
        settings.set(KEY_CURRENT_FEATURES, tokens.join(","));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> TestConfiguration {
        let suite = SuiteSpec::new("demo")
            .with_feature(FeatureSpec::new("heavy", "long running tests", false))
            .with_feature(FeatureSpec::new("experimental", "unfinished tests", false))
            .with_feature(FeatureSpec::constant("core", "always on", true));
        let mut config = TestConfiguration::from_suite(&suite);
        config.categories = vec!["net".into(), "quick".into()];
        config
    }

    #[test]
    fn test_feature_tokens() {
        let mut config = sample_config();
        assert_eq!(config.is_feature_enabled("heavy"), Some(false));

        config.apply_feature_tokens("+heavy").unwrap();
        assert_eq!(config.is_feature_enabled("heavy"), Some(true));

        config.apply_feature_tokens("-heavy,experimental").unwrap();
        assert_eq!(config.is_feature_enabled("heavy"), Some(false));
        assert_eq!(config.is_feature_enabled("experimental"), Some(true));

        config.apply_feature_tokens("-experimental,all").unwrap();
        assert_eq!(config.is_feature_enabled("heavy"), Some(true));
        assert_eq!(config.is_feature_enabled("experimental"), Some(true));
    }

    #[test]
    fn test_unknown_feature_is_hard_failure() {
        let mut config = sample_config();
        assert!(config.apply_feature_tokens("+bogus").is_err());
        assert!(config.apply_feature_tokens("bogus").is_err());
    }

    #[test]
    fn test_constant_feature_not_modifiable() {
        let mut config = sample_config();
        assert!(config.apply_feature_tokens("-core").is_err());
        assert_eq!(config.is_feature_enabled("core"), Some(true));
        // "all" skips constants instead of failing.
        config.apply_feature_tokens("all").unwrap();
        assert_eq!(config.is_feature_enabled("core"), Some(true));
    }

    #[test]
    fn test_category_selection() {
        let mut config = sample_config();
        assert!(config.matches_category(None));
        assert!(config.matches_category(Some("net")));

        config.select_category("net").unwrap();
        assert!(config.matches_category(Some("net")));
        assert!(!config.matches_category(Some("quick")));
        assert!(!config.matches_category(None));

        config.select_category("all").unwrap();
        assert!(config.matches_category(None));

        assert!(config.select_category("bogus").is_err());
    }

    #[test]
    fn test_settings_round_trip() {
        let mut config = sample_config();
        config.select_category("net").unwrap();
        config.apply_feature_tokens("+heavy").unwrap();

        let mut settings = SettingsBag::new();
        config.save_to_settings(&mut settings);

        let mut restored = sample_config();
        restored.load_from_settings(&settings).unwrap();
        assert_eq!(restored.current_category(), Some("net"));
        assert_eq!(restored.is_feature_enabled("heavy"), Some(true));
        assert_eq!(restored.is_feature_enabled("experimental"), Some(false));
    }
}
