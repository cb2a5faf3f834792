//! XML codecs for the core model
//!
//! Element and attribute names here are part of the remote protocol and
//! the stored result format; both ends must agree on them exactly.

#![allow(dead_code)]

use crate::errors::XmlError;
use crate::model::{
    ErrorInfo, LogEntry, LogEntryKind, NodeFlags, NodeType, PathNode, StatisticsEvent, TestName,
    TestNameBuilder, TestParameter, TestPath, TestResult, TestStatus,
};

use super::xml::XmlNode;

fn bool_attr(node: &XmlNode, key: &str) -> Result<bool, XmlError> {
    match node.attr(key) {
        None => Ok(false),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(XmlError::malformed(format!(
            "<{}> has a non-boolean {} attribute: {}",
            node.name, key, other
        ))),
    }
}

impl TestParameter {
    pub fn to_xml(&self) -> XmlNode {
        XmlNode::new("Parameter")
            .with_attr("Name", &self.name)
            .with_attr("Value", &self.value)
            .with_attr("IsHidden", if self.is_hidden { "true" } else { "false" })
    }

    pub fn from_xml(node: &XmlNode) -> Result<TestParameter, XmlError> {
        Ok(TestParameter {
            name: node.require_attr("Name")?.to_owned(),
            value: node.require_attr("Value")?.to_owned(),
            is_hidden: bool_attr(node, "IsHidden")?,
        })
    }
}

impl TestName {
    pub fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("TestName").with_attr("Name", self.name());
        for parameter in self.parameters() {
            node.add_child(parameter.to_xml());
        }
        node
    }

    pub fn from_xml(node: &XmlNode) -> Result<TestName, XmlError> {
        let mut builder = TestNameBuilder::new(node.require_attr("Name")?);
        for child in node.children_named("Parameter") {
            builder.push_parameter(TestParameter::from_xml(child)?);
        }
        Ok(builder.build())
    }
}

impl PathNode {
    pub fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("Node")
            .with_attr("Type", self.node_type.as_str())
            .with_attr("Identifier", &self.identifier);
        if let Some(name) = &self.name {
            node.set_attr("Name", name);
        }
        if let Some(parameter) = &self.parameter {
            node.set_attr("Parameter", parameter);
        }
        if !self.flags.is_empty() {
            node.set_attr("Flags", self.flags.to_names());
        }
        node
    }

    pub fn from_xml(node: &XmlNode) -> Result<PathNode, XmlError> {
        let type_name = node.require_attr("Type")?;
        let node_type = NodeType::from_str(type_name)
            .ok_or_else(|| XmlError::malformed(format!("unknown node type: {type_name}")))?;
        let flags = match node.attr("Flags") {
            None => NodeFlags::empty(),
            Some(names) => NodeFlags::from_names(names)
                .ok_or_else(|| XmlError::malformed(format!("unknown node flags: {names}")))?,
        };
        Ok(PathNode {
            node_type,
            identifier: node.require_attr("Identifier")?.to_owned(),
            name: node.attr("Name").map(str::to_owned),
            parameter: node.attr("Parameter").map(str::to_owned),
            flags,
        })
    }
}

impl TestPath {
    pub fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("TestPath");
        for path_node in self.nodes() {
            node.add_child(path_node.to_xml());
        }
        node
    }

    pub fn from_xml(node: &XmlNode) -> Result<TestPath, XmlError> {
        let mut path = TestPath::new();
        for child in node.children_named("Node") {
            path.push(PathNode::from_xml(child)?);
        }
        Ok(path)
    }
}

impl ErrorInfo {
    pub fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("Error")
            .with_attr("Type", &self.error_type)
            .with_attr("Message", &self.message);
        if let Some(stack_trace) = &self.stack_trace {
            node.set_attr("StackTrace", stack_trace);
        }
        node
    }

    pub fn from_xml(node: &XmlNode) -> Result<ErrorInfo, XmlError> {
        Ok(ErrorInfo {
            error_type: node.require_attr("Type")?.to_owned(),
            message: node.require_attr("Message")?.to_owned(),
            stack_trace: node.attr("StackTrace").map(str::to_owned),
        })
    }
}

impl LogEntry {
    pub fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("LogEntry")
            .with_attr("Kind", self.kind.as_str())
            .with_attr("LogLevel", self.level.to_string())
            .with_attr("Text", &self.text);
        if let Some(error) = &self.error {
            node.add_child(XmlNode::new("Error").with_attr("Message", error));
        }
        node
    }

    pub fn from_xml(node: &XmlNode) -> Result<LogEntry, XmlError> {
        let kind_name = node.require_attr("Kind")?;
        let kind = LogEntryKind::from_str(kind_name)
            .ok_or_else(|| XmlError::malformed(format!("unknown log entry kind: {kind_name}")))?;
        let level = node
            .require_attr("LogLevel")?
            .parse::<i32>()
            .map_err(|_| XmlError::malformed("non-numeric LogLevel attribute"))?;
        let error = match node.find_child("Error") {
            Some(child) => Some(child.require_attr("Message")?.to_owned()),
            None => None,
        };
        Ok(LogEntry {
            kind,
            level,
            text: node.require_attr("Text")?.to_owned(),
            error,
        })
    }
}

impl StatisticsEvent {
    pub fn to_xml(&self) -> XmlNode {
        let node = XmlNode::new("Statistics").with_attr("Event", self.type_name());
        match self {
            StatisticsEvent::Reset => node,
            StatisticsEvent::Running { name } => node.with_child(name.to_xml()),
            StatisticsEvent::Finished { name, status } => node
                .with_attr("Status", status.as_str())
                .with_child(name.to_xml()),
        }
    }

    pub fn from_xml(node: &XmlNode) -> Result<StatisticsEvent, XmlError> {
        match node.require_attr("Event")? {
            "Reset" => Ok(StatisticsEvent::Reset),
            "Running" => Ok(StatisticsEvent::Running {
                name: TestName::from_xml(node.require_child("TestName")?)?,
            }),
            "Finished" => {
                let status_name = node.require_attr("Status")?;
                let status = TestStatus::from_str(status_name)
                    .ok_or_else(|| XmlError::malformed(format!("unknown status: {status_name}")))?;
                Ok(StatisticsEvent::Finished {
                    name: TestName::from_xml(node.require_child("TestName")?)?,
                    status,
                })
            }
            other => Err(XmlError::malformed(format!(
                "unknown statistics event: {other}"
            ))),
        }
    }
}

impl TestResult {
    pub fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("TestResult").with_attr("Status", self.status().as_str());
        if let Some(elapsed) = self.elapsed_ms() {
            node.set_attr("ElapsedTime", elapsed.to_string());
        }
        node.add_child(self.name().to_xml());
        if let Some(path) = self.path() {
            node.add_child(path.to_xml());
        }
        for error in self.errors() {
            node.add_child(error.to_xml());
        }
        for message in self.messages() {
            node.add_child(XmlNode::new("Message").with_attr("Text", message));
        }
        for entry in self.log_entries() {
            node.add_child(entry.to_xml());
        }
        for child in self.children() {
            node.add_child(child.to_xml());
        }
        node
    }

    pub fn from_xml(node: &XmlNode) -> Result<TestResult, XmlError> {
        let status_name = node.require_attr("Status")?;
        let status = TestStatus::from_str(status_name)
            .ok_or_else(|| XmlError::malformed(format!("unknown status: {status_name}")))?;
        let name = TestName::from_xml(node.require_child("TestName")?)?;

        let mut result = TestResult::new(name);
        result.set_status(status);
        if let Some(elapsed) = node.attr("ElapsedTime") {
            let elapsed = elapsed
                .parse::<u64>()
                .map_err(|_| XmlError::malformed("non-numeric ElapsedTime attribute"))?;
            result.set_elapsed_ms(elapsed);
        }
        if let Some(path) = node.find_child("TestPath") {
            result.set_path(TestPath::from_xml(path)?);
        }
        for child in &node.children {
            match child.name.as_str() {
                "Error" => result.add_error(ErrorInfo::from_xml(child)?),
                "Message" => result.add_message(child.require_attr("Text")?),
                "LogEntry" => result.add_log_entry(LogEntry::from_xml(child)?),
                "TestResult" => result.add_child(TestResult::from_xml(child)?),
                _ => {}
            }
        }
        Ok(result)
    }
}

/// Write a result tree as a standalone document.
pub fn write_result_document(result: &TestResult) -> Result<String, XmlError> {
    result.to_xml().to_document()
}

/// Read a result tree back from a document.
pub fn read_result_document(text: &str) -> Result<TestResult, XmlError> {
    let root = XmlNode::parse(text)?;
    if root.name != "TestResult" {
        return Err(XmlError::malformed(format!(
            "expected a TestResult document, found <{}>",
            root.name
        )));
    }
    TestResult::from_xml(&root)
}
