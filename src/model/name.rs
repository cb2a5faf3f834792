//! Structured test names
//!
//! A test name is a base name plus the ordered parameter values that
//! produced this particular instance of the test. Parameter order is
//! significant; hidden parameters stay out of the display form but are
//! kept for serialization.

#![allow(dead_code)]

use std::fmt;

/// One parameter attached to a test name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestParameter {
    pub name: String,
    pub value: String,
    pub is_hidden: bool,
}

impl TestParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_hidden: false,
        }
    }

    pub fn hidden(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_hidden: true,
        }
    }
}

/// Immutable structured name of a test node.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TestName {
    name: String,
    parameters: Vec<TestParameter>,
}

impl TestName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[TestParameter] {
        &self.parameters
    }

    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    /// Base name plus the visible parameter values in parentheses.
    pub fn full_name(&self) -> String {
        let visible: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| !p.is_hidden)
            .map(|p| p.value.as_str())
            .collect();
        if visible.is_empty() {
            self.name.clone()
        } else {
            format!("{}({})", self.name, visible.join(","))
        }
    }

    pub fn builder(name: impl Into<String>) -> TestNameBuilder {
        TestNameBuilder::new(name)
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Builder used during resolution to extend a name level by level.
#[derive(Clone, Debug, Default)]
pub struct TestNameBuilder {
    name: String,
    parameters: Vec<TestParameter>,
}

impl TestNameBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    /// Seed the builder with an existing name, keeping its parameters.
    pub fn from_name(name: &TestName) -> Self {
        Self {
            name: name.name.clone(),
            parameters: name.parameters.clone(),
        }
    }

    /// Replace the base name, keeping accumulated parameters.
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_parameter(mut self, parameter: TestParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn push_parameter(&mut self, parameter: TestParameter) {
        self.parameters.push(parameter);
    }

    pub fn build(self) -> TestName {
        TestName {
            name: self.name,
            parameters: self.parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_plain() {
        let name = TestName::new("Connect");
        assert_eq!(name.full_name(), "Connect");
    }

    #[test]
    fn test_full_name_with_parameters() {
        let name = TestName::builder("Connect")
            .with_parameter(TestParameter::new("useTls", "true"))
            .with_parameter(TestParameter::new("version", "Tls12"))
            .build();
        assert_eq!(name.full_name(), "Connect(true,Tls12)");
    }

    #[test]
    fn test_hidden_parameters_not_displayed() {
        let name = TestName::builder("Connect")
            .with_parameter(TestParameter::new("useTls", "true"))
            .with_parameter(TestParameter::hidden("iteration", "2"))
            .build();
        assert_eq!(name.full_name(), "Connect(true)");
        assert_eq!(name.parameters().len(), 2);
    }

    #[test]
    fn test_builder_preserves_order() {
        let first = TestName::builder("Outer")
            .with_parameter(TestParameter::new("a", "1"))
            .build();
        let second = TestNameBuilder::from_name(&first)
            .rename("Inner")
            .with_parameter(TestParameter::new("b", "2"))
            .build();
        let params: Vec<&str> = second.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, vec!["a", "b"]);
        assert_eq!(second.full_name(), "Inner(1,2)");
    }
}
