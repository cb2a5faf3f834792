//! JUnit XML export
//!
//! Flattens a result tree into the de-facto `testsuites` schema so CI
//! servers can ingest runs. Every group node with direct leaf children
//! becomes a `testsuite`; its leaves become `testcase` elements.

#![allow(dead_code)]

use chrono::Utc;

use crate::errors::XmlError;
use crate::model::{ResultSummary, TestResult, TestStatus};
use crate::serial::XmlNode;

/// Builds JUnit documents from finished result trees.
pub struct JunitReport {
    hostname: String,
    timestamp: String,
}

impl JunitReport {
    pub fn new() -> Self {
        Self {
            hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Render the whole tree as a `testsuites` document.
    pub fn to_document(&self, result: &TestResult) -> Result<String, XmlError> {
        let summary = ResultSummary::from_result(result);
        let mut root = XmlNode::new("testsuites")
            .with_attr("name", result.name().full_name())
            .with_attr("tests", summary.total.to_string())
            .with_attr("failures", (summary.errors + summary.unstable).to_string())
            .with_attr("errors", summary.canceled.to_string());

        let mut next_id = 0usize;
        self.collect_suites(result, &mut Vec::new(), &mut next_id, &mut root);
        root.to_document()
    }

    fn collect_suites(
        &self,
        node: &TestResult,
        trail: &mut Vec<String>,
        next_id: &mut usize,
        out: &mut XmlNode,
    ) {
        trail.push(node.name().full_name());
        if node.children().iter().any(|c| c.is_leaf()) {
            out.add_child(self.suite_node(node, &trail.join("."), *next_id));
            *next_id += 1;
        }
        for child in node.children() {
            if !child.is_leaf() {
                self.collect_suites(child, trail, next_id, out);
            }
        }
        trail.pop();
    }

    fn suite_node(&self, node: &TestResult, qualified: &str, id: usize) -> XmlNode {
        let mut tests = 0usize;
        let mut failures = 0usize;
        let mut errors = 0usize;
        let mut skipped = 0usize;
        let mut elapsed_ms = 0u64;

        let mut suite = XmlNode::new("testsuite");
        let properties = self.properties_node(node);

        let mut cases = Vec::new();
        for leaf in node.children().iter().filter(|c| c.is_leaf()) {
            tests += 1;
            elapsed_ms += leaf.elapsed_ms().unwrap_or(0);
            match leaf.status() {
                TestStatus::Error | TestStatus::Unstable => failures += 1,
                TestStatus::Canceled => errors += 1,
                TestStatus::Ignored | TestStatus::None => skipped += 1,
                TestStatus::Success => {}
            }
            cases.push(self.case_node(leaf, qualified));
        }

        suite.set_attr("id", id.to_string());
        suite.set_attr("name", qualified);
        suite.set_attr("tests", tests.to_string());
        suite.set_attr("failures", failures.to_string());
        suite.set_attr("errors", errors.to_string());
        suite.set_attr("skipped", skipped.to_string());
        suite.set_attr("time", format_seconds(elapsed_ms));
        suite.set_attr("timestamp", &self.timestamp);
        suite.set_attr("hostname", &self.hostname);

        if let Some(properties) = properties {
            suite.add_child(properties);
        }
        for case in cases {
            suite.add_child(case);
        }
        if let Some(out) = system_out(node) {
            suite.add_child(out);
        }
        suite
    }

    /// Visible name parameters become suite properties.
    fn properties_node(&self, node: &TestResult) -> Option<XmlNode> {
        let visible: Vec<_> = node
            .name()
            .parameters()
            .iter()
            .filter(|p| !p.is_hidden)
            .collect();
        if visible.is_empty() {
            return None;
        }
        let mut properties = XmlNode::new("properties");
        for parameter in visible {
            properties.add_child(
                XmlNode::new("property")
                    .with_attr("name", &parameter.name)
                    .with_attr("value", &parameter.value),
            );
        }
        Some(properties)
    }

    fn case_node(&self, leaf: &TestResult, classname: &str) -> XmlNode {
        let mut case = XmlNode::new("testcase")
            .with_attr("name", leaf.name().full_name())
            .with_attr("classname", classname)
            .with_attr("time", format_seconds(leaf.elapsed_ms().unwrap_or(0)));

        match leaf.status() {
            TestStatus::Success => {}
            TestStatus::Ignored | TestStatus::None => {
                case.add_child(XmlNode::new("skipped"));
            }
            TestStatus::Canceled => {
                case.add_child(
                    XmlNode::new("error")
                        .with_attr("type", "Canceled")
                        .with_attr("message", "test run was canceled"),
                );
            }
            TestStatus::Error | TestStatus::Unstable => {
                for error in leaf.errors() {
                    let mut failure = XmlNode::new("failure")
                        .with_attr("type", &error.error_type)
                        .with_attr("message", &error.message);
                    if let Some(stack) = &error.stack_trace {
                        failure = failure.with_text(stack);
                    }
                    case.add_child(failure);
                }
                if leaf.errors().is_empty() {
                    case.add_child(
                        XmlNode::new("failure")
                            .with_attr("type", leaf.status().as_str())
                            .with_attr("message", "test did not pass"),
                    );
                }
            }
        }

        if let Some(out) = system_out(leaf) {
            case.add_child(out);
        }
        case
    }
}

impl Default for JunitReport {
    fn default() -> Self {
        Self::new()
    }
}

fn format_seconds(elapsed_ms: u64) -> String {
    format!("{:.3}", elapsed_ms as f64 / 1000.0)
}

fn system_out(node: &TestResult) -> Option<XmlNode> {
    let mut lines: Vec<String> = node.messages().to_vec();
    lines.extend(node.log_entries().iter().map(|e| e.to_string()));
    if lines.is_empty() {
        None
    } else {
        Some(XmlNode::new("system-out").with_text(lines.join("\n")))
    }
}
