//! Test paths
//!
//! A path records how a test node was reached, so the exact node can be
//! resolved again later without re-enumerating the whole tree, locally
//! or on a remote target.

#![allow(dead_code)]

use bitflags::bitflags;
use std::fmt;

/// Kind of node on a test path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Suite,
    Fixture,
    Parameter,
    Case,
    Instance,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Suite => "Suite",
            NodeType::Fixture => "Fixture",
            NodeType::Parameter => "Parameter",
            NodeType::Case => "Case",
            NodeType::Instance => "Instance",
        }
    }

    pub fn from_str(s: &str) -> Option<NodeType> {
        match s {
            "Suite" => Some(NodeType::Suite),
            "Fixture" => Some(NodeType::Fixture),
            "Parameter" => Some(NodeType::Parameter),
            "Case" => Some(NodeType::Case),
            "Instance" => Some(NodeType::Instance),
            _ => None,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

bitflags! {
    /// Behavior flags attached to a path node.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct NodeFlags: u32 {
        /// Listed when browsing the tree.
        const BROWSABLE = 1;
        /// Excluded from display names.
        const HIDDEN = 2;
        /// Excluded from path display, still serialized.
        const PATH_HIDDEN = 4;
        /// Siblings keep running after a failure below this node.
        const CONTINUE_ON_ERROR = 8;
    }
}

impl NodeFlags {
    const NAMED: &'static [(NodeFlags, &'static str)] = &[
        (NodeFlags::BROWSABLE, "Browsable"),
        (NodeFlags::HIDDEN, "Hidden"),
        (NodeFlags::PATH_HIDDEN, "PathHidden"),
        (NodeFlags::CONTINUE_ON_ERROR, "ContinueOnError"),
    ];

    /// Comma separated flag names, empty for no flags.
    pub fn to_names(&self) -> String {
        let mut names = Vec::new();
        for (flag, name) in Self::NAMED {
            if self.contains(*flag) {
                names.push(*name);
            }
        }
        names.join(",")
    }

    pub fn from_names(s: &str) -> Option<NodeFlags> {
        let mut flags = NodeFlags::empty();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let found = Self::NAMED.iter().find(|(_, name)| *name == part)?;
            flags |= found.0;
        }
        Some(flags)
    }
}

/// One step on a test path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathNode {
    pub node_type: NodeType,
    pub identifier: String,
    pub name: Option<String>,
    pub parameter: Option<String>,
    pub flags: NodeFlags,
}

impl PathNode {
    pub fn new(node_type: NodeType, identifier: impl Into<String>) -> Self {
        Self {
            node_type,
            identifier: identifier.into(),
            name: None,
            parameter: None,
            flags: NodeFlags::empty(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_parameter(mut self, value: impl Into<String>) -> Self {
        self.parameter = Some(value.into());
        self
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Root-to-leaf address of a test node.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TestPath {
    nodes: Vec<PathNode>,
}

impl TestPath {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn root(node: PathNode) -> Self {
        Self { nodes: vec![node] }
    }

    pub fn nodes(&self) -> &[PathNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaf(&self) -> Option<&PathNode> {
        self.nodes.last()
    }

    pub fn push(&mut self, node: PathNode) {
        self.nodes.push(node);
    }

    /// New path with one more node appended.
    pub fn child(&self, node: PathNode) -> TestPath {
        let mut nodes = self.nodes.clone();
        nodes.push(node);
        TestPath { nodes }
    }

    /// Dotted human-readable form, skipping path-hidden nodes.
    pub fn display_name(&self) -> String {
        let mut parts = Vec::new();
        for node in &self.nodes {
            if node.flags.contains(NodeFlags::PATH_HIDDEN) {
                continue;
            }
            match (&node.parameter, &node.name) {
                (Some(value), _) => parts.push(value.clone()),
                (None, Some(name)) => parts.push(name.clone()),
                (None, None) => parts.push(node.identifier.clone()),
            }
        }
        parts.join(".")
    }
}

impl fmt::Display for TestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_round_trip() {
        for ty in [
            NodeType::Suite,
            NodeType::Fixture,
            NodeType::Parameter,
            NodeType::Case,
            NodeType::Instance,
        ] {
            assert_eq!(NodeType::from_str(ty.as_str()), Some(ty));
        }
        assert_eq!(NodeType::from_str("Assembly"), None);
    }

    #[test]
    fn test_flags_names() {
        let flags = NodeFlags::BROWSABLE | NodeFlags::CONTINUE_ON_ERROR;
        assert_eq!(flags.to_names(), "Browsable,ContinueOnError");
        assert_eq!(NodeFlags::from_names("Browsable,ContinueOnError"), Some(flags));
        assert_eq!(NodeFlags::from_names(""), Some(NodeFlags::empty()));
        assert_eq!(NodeFlags::from_names("Bogus"), None);
    }

    #[test]
    fn test_display_name_skips_hidden() {
        let mut path = TestPath::root(PathNode::new(NodeType::Suite, "suite"));
        path.push(PathNode::new(NodeType::Fixture, "Connect").with_name("Connect"));
        path.push(
            PathNode::new(NodeType::Instance, "setup").with_flags(NodeFlags::PATH_HIDDEN),
        );
        path.push(PathNode::new(NodeType::Parameter, "useTls").with_parameter("true"));
        assert_eq!(path.display_name(), "suite.Connect.true");
        assert_eq!(path.len(), 4);
    }
}
