//! Test results
//!
//! Results form a tree mirroring the executed hierarchy. Inner nodes do
//! not compute an aggregate status on their own; consumers fold the
//! leaves they care about.

#![allow(dead_code)]

use std::fmt;

use super::log::LogEntry;
use super::name::TestName;
use super::path::TestPath;

/// Final status of a test node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TestStatus {
    #[default]
    None,
    Success,
    Error,
    Ignored,
    Unstable,
    Canceled,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::None => "None",
            TestStatus::Success => "Success",
            TestStatus::Error => "Error",
            TestStatus::Ignored => "Ignored",
            TestStatus::Unstable => "Unstable",
            TestStatus::Canceled => "Canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<TestStatus> {
        match s {
            "None" => Some(TestStatus::None),
            "Success" => Some(TestStatus::Success),
            "Error" => Some(TestStatus::Error),
            "Ignored" => Some(TestStatus::Ignored),
            "Unstable" => Some(TestStatus::Unstable),
            "Canceled" => Some(TestStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestStatus::None)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Success)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::None => " ",
            TestStatus::Success => "✓",
            TestStatus::Error => "✗",
            TestStatus::Ignored => "○",
            TestStatus::Unstable => "~",
            TestStatus::Canceled => "!",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recorded error on a result node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorInfo {
    pub error_type: String,
    pub message: String,
    pub stack_trace: Option<String>,
}

impl ErrorInfo {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

/// Result of one executed test node.
#[derive(Clone, Debug, PartialEq)]
pub struct TestResult {
    name: TestName,
    status: TestStatus,
    path: Option<TestPath>,
    elapsed_ms: Option<u64>,
    errors: Vec<ErrorInfo>,
    messages: Vec<String>,
    log_entries: Vec<LogEntry>,
    children: Vec<TestResult>,
}

impl TestResult {
    pub fn new(name: TestName) -> Self {
        Self {
            name,
            status: TestStatus::None,
            path: None,
            elapsed_ms: None,
            errors: Vec::new(),
            messages: Vec::new(),
            log_entries: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_status(name: TestName, status: TestStatus) -> Self {
        let mut result = Self::new(name);
        result.status = status;
        result
    }

    pub fn name(&self) -> &TestName {
        &self.name
    }

    pub fn status(&self) -> TestStatus {
        self.status
    }

    pub fn set_status(&mut self, status: TestStatus) {
        self.status = status;
    }

    pub fn path(&self) -> Option<&TestPath> {
        self.path.as_ref()
    }

    pub fn set_path(&mut self, path: TestPath) {
        self.path = Some(path);
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        self.elapsed_ms
    }

    pub fn set_elapsed_ms(&mut self, elapsed: u64) {
        self.elapsed_ms = Some(elapsed);
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ErrorInfo) {
        self.errors.push(error);
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn log_entries(&self) -> &[LogEntry] {
        &self.log_entries
    }

    pub fn add_log_entry(&mut self, entry: LogEntry) {
        self.log_entries.push(entry);
    }

    pub fn children(&self) -> &[TestResult] {
        &self.children
    }

    pub fn add_child(&mut self, child: TestResult) {
        self.children.push(child);
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first visit of every node in the tree, parents first.
    pub fn visit(&self, visitor: &mut impl FnMut(&TestResult)) {
        visitor(self);
        for child in &self.children {
            child.visit(visitor);
        }
    }

    /// Depth-first visit of the leaves only.
    pub fn visit_leaves(&self, visitor: &mut impl FnMut(&TestResult)) {
        if self.is_leaf() {
            visitor(self);
        } else {
            for child in &self.children {
                child.visit_leaves(visitor);
            }
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.symbol(), self.name.full_name())?;
        if let Some(elapsed) = self.elapsed_ms {
            write!(f, " [{elapsed}ms]")?;
        }
        Ok(())
    }
}

/// Leaf counts folded from a result tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResultSummary {
    pub total: usize,
    pub passed: usize,
    pub errors: usize,
    pub ignored: usize,
    pub unstable: usize,
    pub canceled: usize,
}

impl ResultSummary {
    pub fn from_result(result: &TestResult) -> Self {
        let mut summary = ResultSummary::default();
        result.visit_leaves(&mut |leaf| summary.count(leaf.status()));
        // A canceled group with no leaves below it still counts.
        result.visit(&mut |node| {
            if !node.is_leaf() && node.status() == TestStatus::Canceled {
                summary.canceled += 1;
            }
        });
        summary
    }

    fn count(&mut self, status: TestStatus) {
        self.total += 1;
        match status {
            TestStatus::Success => self.passed += 1,
            TestStatus::Error => self.errors += 1,
            TestStatus::Ignored => self.ignored += 1,
            TestStatus::Unstable => self.unstable += 1,
            TestStatus::Canceled => self.canceled += 1,
            TestStatus::None => {}
        }
    }

    /// Overall status used for the process exit code.
    pub fn exit_status(&self) -> TestStatus {
        if self.canceled > 0 {
            TestStatus::Canceled
        } else if self.errors > 0 {
            TestStatus::Error
        } else if self.unstable > 0 {
            TestStatus::Unstable
        } else {
            TestStatus::Success
        }
    }
}

impl fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Passed: {} | Errors: {} | Unstable: {} | Ignored: {} | Canceled: {}",
            self.total, self.passed, self.errors, self.unstable, self.ignored, self.canceled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TestStatus::None,
            TestStatus::Success,
            TestStatus::Error,
            TestStatus::Ignored,
            TestStatus::Unstable,
            TestStatus::Canceled,
        ] {
            assert_eq!(TestStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TestStatus::from_str("Passed"), None);
    }

    #[test]
    fn test_summary_counts_leaves() {
        let mut root = TestResult::new(TestName::new("suite"));
        let mut fixture = TestResult::new(TestName::new("fixture"));
        fixture.add_child(TestResult::with_status(
            TestName::new("a"),
            TestStatus::Success,
        ));
        fixture.add_child(TestResult::with_status(TestName::new("b"), TestStatus::Error));
        fixture.add_child(TestResult::with_status(
            TestName::new("c"),
            TestStatus::Ignored,
        ));
        root.add_child(fixture);

        let summary = ResultSummary::from_result(&root);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.exit_status(), TestStatus::Error);
    }

    #[test]
    fn test_exit_status_precedence() {
        let mut summary = ResultSummary::default();
        summary.count(TestStatus::Success);
        assert_eq!(summary.exit_status(), TestStatus::Success);
        summary.count(TestStatus::Unstable);
        assert_eq!(summary.exit_status(), TestStatus::Unstable);
        summary.count(TestStatus::Error);
        assert_eq!(summary.exit_status(), TestStatus::Error);
        summary.count(TestStatus::Canceled);
        assert_eq!(summary.exit_status(), TestStatus::Canceled);
    }
}
