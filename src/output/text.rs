//! Console result printer
//!
//! Renders a finished result tree as a summary box plus detail lines
//! for everything that did not pass. Never mutates the tree.

#![allow(dead_code)]

use crate::model::{ResultSummary, TestResult, TestStatus};

/// Console printer for result trees.
pub struct ResultPrinter {
    colorize: bool,
    show_ignored: bool,
}

impl ResultPrinter {
    pub fn new() -> Self {
        Self {
            colorize: true,
            show_ignored: false,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Also list ignored leaves in the detail section.
    pub fn show_ignored(mut self) -> Self {
        self.show_ignored = true;
        self
    }

    fn status_str(&self, status: TestStatus) -> String {
        let plain = match status {
            TestStatus::Success => "✓ PASS",
            TestStatus::Error => "✗ FAIL",
            TestStatus::Ignored => "○ SKIP",
            TestStatus::Unstable => "! UNSTABLE",
            TestStatus::Canceled => "⊘ CANCELED",
            TestStatus::None => "  NONE",
        };
        if !self.colorize {
            return plain.to_string();
        }
        match status {
            TestStatus::Success => format!("\x1b[32m{plain}\x1b[0m"),
            TestStatus::Error => format!("\x1b[31m{plain}\x1b[0m"),
            TestStatus::Ignored => format!("\x1b[90m{plain}\x1b[0m"),
            TestStatus::Unstable => format!("\x1b[33m{plain}\x1b[0m"),
            TestStatus::Canceled => format!("\x1b[31m{plain}\x1b[0m"),
            TestStatus::None => plain.to_string(),
        }
    }

    fn count_str(&self, count: usize, color: &str) -> String {
        if self.colorize && count > 0 {
            format!("\x1b[{color}m{count}\x1b[0m")
        } else {
            count.to_string()
        }
    }

    /// End-of-run report: summary box plus detail lines.
    pub fn format_report(&self, result: &TestResult, elapsed_ms: u64) -> String {
        let summary = ResultSummary::from_result(result);
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  Test Run: {:49} ║\n",
            result.name().full_name()
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        let passed = self.count_str(summary.passed, "32");
        let errors = self.count_str(summary.errors, "31");
        let unstable = self.count_str(summary.unstable, "33");
        let canceled = self.count_str(summary.canceled, "31");
        output.push_str(&format!(
            "║  Total: {:3} | Passed: {} | Errors: {} | Unstable: {}          ║\n",
            summary.total, passed, errors, unstable
        ));
        output.push_str(&format!(
            "║  Ignored: {:2} | Canceled: {} | Elapsed: {:7}ms              ║\n",
            summary.ignored, canceled, elapsed_ms
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        let details = self.format_details(result);
        if !details.is_empty() {
            output.push('\n');
            output.push_str(&details);
        }
        output
    }

    fn format_details(&self, result: &TestResult) -> String {
        let mut output = String::new();
        result.visit_leaves(&mut |leaf| {
            let listed = match leaf.status() {
                TestStatus::Error | TestStatus::Unstable | TestStatus::Canceled => true,
                TestStatus::Ignored => self.show_ignored,
                _ => false,
            };
            if !listed {
                return;
            }
            output.push_str(&format!(
                "  {} {} [{}ms]\n",
                self.status_str(leaf.status()),
                leaf.name().full_name(),
                leaf.elapsed_ms().unwrap_or(0)
            ));
            for error in leaf.errors() {
                output.push_str(&format!("      {}: {}\n", error.error_type, error.message));
            }
            for message in leaf.messages() {
                output.push_str(&format!("      {message}\n"));
            }
        });
        output
    }

    /// One line per run for quiet contexts.
    pub fn format_brief(&self, result: &TestResult, elapsed_ms: u64) -> String {
        let summary = ResultSummary::from_result(result);
        format!(
            "{}: {}/{} passed in {}ms [{}]",
            result.name().full_name(),
            summary.passed,
            summary.total,
            elapsed_ms,
            summary.exit_status().as_str()
        )
    }
}

impl Default for ResultPrinter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorInfo, TestName};

    fn sample_tree() -> TestResult {
        let mut passing = TestResult::new(TestName::new("passes"));
        passing.set_status(TestStatus::Success);
        passing.set_elapsed_ms(4);

        let mut failing = TestResult::new(TestName::new("fails"));
        failing.set_status(TestStatus::Error);
        failing.set_elapsed_ms(7);
        failing.add_error(ErrorInfo::new("Assertion", "expected 2, got 3"));

        let mut ignored = TestResult::new(TestName::new("skipped"));
        ignored.set_status(TestStatus::Ignored);

        let mut fixture = TestResult::new(TestName::new("checks"));
        fixture.add_child(passing);
        fixture.add_child(failing);
        fixture.add_child(ignored);

        let mut root = TestResult::new(TestName::new("demo"));
        root.add_child(fixture);
        root
    }

    #[test]
    fn test_report_lists_failures_with_detail() {
        let report = ResultPrinter::new().no_color().format_report(&sample_tree(), 42);
        assert!(report.contains("Test Run: demo"));
        assert!(report.contains("Total:   3"));
        assert!(report.contains("✗ FAIL fails [7ms]"));
        assert!(report.contains("Assertion: expected 2, got 3"));
        assert!(!report.contains("passes [4ms]"));
        assert!(!report.contains("skipped"));
    }

    #[test]
    fn test_show_ignored_toggle() {
        let printer = ResultPrinter::new().no_color().show_ignored();
        let report = printer.format_report(&sample_tree(), 42);
        assert!(report.contains("○ SKIP skipped"));
    }

    #[test]
    fn test_brief_line() {
        let brief = ResultPrinter::new().no_color().format_brief(&sample_tree(), 42);
        assert_eq!(brief, "demo: 1/3 passed in 42ms [Error]");
    }
}
