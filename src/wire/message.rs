//! Wire messages
//!
//! One XML element per frame. Element and attribute names are the
//! protocol; both ends must agree on them exactly, and an unknown root
//! element is fatal to the connection.

#![allow(dead_code)]

use crate::config::SettingsBag;
use crate::errors::XmlError;
use crate::host::TestCaseInfo;
use crate::model::{LogEntry, StatisticsEvent, TestName, TestPath, TestResult};
use crate::serial::XmlNode;

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

fn id_attr(node: &XmlNode, key: &str) -> Result<u64, XmlError> {
    node.require_attr(key)?
        .parse::<u64>()
        .map_err(|_| XmlError::malformed(format!("<{}> has a non-numeric {} attribute", node.name, key)))
}

/// Operation invoked on a remote framework object.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteRequest {
    LoadTestSuite,
    ResolveTest(TestPath),
    RunTest(TestPath),
    Cancel,
    Shutdown,
}

impl RemoteRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            RemoteRequest::LoadTestSuite => "LoadTestSuite",
            RemoteRequest::ResolveTest(_) => "ResolveTest",
            RemoteRequest::RunTest(_) => "RunTest",
            RemoteRequest::Cancel => "Cancel",
            RemoteRequest::Shutdown => "Shutdown",
        }
    }

    fn body(&self) -> Option<XmlNode> {
        match self {
            RemoteRequest::ResolveTest(path) | RemoteRequest::RunTest(path) => {
                Some(path.to_xml())
            }
            _ => None,
        }
    }

    fn from_xml(node: &XmlNode) -> Result<RemoteRequest, XmlError> {
        let operation = node.require_attr("Operation")?;
        match operation {
            "LoadTestSuite" => Ok(RemoteRequest::LoadTestSuite),
            "ResolveTest" => Ok(RemoteRequest::ResolveTest(TestPath::from_xml(
                node.require_child("TestPath")?,
            )?)),
            "RunTest" => Ok(RemoteRequest::RunTest(TestPath::from_xml(
                node.require_child("TestPath")?,
            )?)),
            "Cancel" => Ok(RemoteRequest::Cancel),
            "Shutdown" => Ok(RemoteRequest::Shutdown),
            other => Err(XmlError::malformed(format!("unknown operation: {other}"))),
        }
    }
}

/// One declared feature as the target reports it.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteFeature {
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

/// Suite description returned by `LoadTestSuite`.
#[derive(Clone, Debug, PartialEq)]
pub struct SuiteInfo {
    pub name: String,
    pub categories: Vec<String>,
    pub features: Vec<RemoteFeature>,
    pub root: TestCaseInfo,
}

impl SuiteInfo {
    fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("TestSuite").with_attr("Name", &self.name);
        for category in &self.categories {
            node.add_child(XmlNode::new("Category").with_attr("Name", category));
        }
        for feature in &self.features {
            node.add_child(
                XmlNode::new("Feature")
                    .with_attr("Name", &feature.name)
                    .with_attr("Description", &feature.description)
                    .with_attr("Enabled", if feature.enabled { "true" } else { "false" }),
            );
        }
        node.add_child(case_to_xml(&self.root));
        node
    }

    fn from_xml(node: &XmlNode) -> Result<SuiteInfo, XmlError> {
        let mut categories = Vec::new();
        for child in node.children_named("Category") {
            categories.push(child.require_attr("Name")?.to_owned());
        }
        let mut features = Vec::new();
        for child in node.children_named("Feature") {
            features.push(RemoteFeature {
                name: child.require_attr("Name")?.to_owned(),
                description: child.require_attr("Description")?.to_owned(),
                enabled: bool_attr(child, "Enabled")?,
            });
        }
        Ok(SuiteInfo {
            name: node.require_attr("Name")?.to_owned(),
            categories,
            features,
            root: case_from_xml(node.require_child("TestCase")?)?,
        })
    }
}

fn case_to_xml(info: &TestCaseInfo) -> XmlNode {
    XmlNode::new("TestCase")
        .with_child(info.name.to_xml())
        .with_child(info.path.to_xml())
}

fn case_from_xml(node: &XmlNode) -> Result<TestCaseInfo, XmlError> {
    Ok(TestCaseInfo {
        name: TestName::from_xml(node.require_child("TestName")?)?,
        path: TestPath::from_xml(node.require_child("TestPath")?)?,
    })
}

/// Payload of a successful response.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    TestSuite(SuiteInfo),
    TestCase(TestCaseInfo),
    TestResult(TestResult),
    Ok,
}

impl ResponseBody {
    fn to_xml(&self) -> XmlNode {
        match self {
            ResponseBody::TestSuite(info) => info.to_xml(),
            ResponseBody::TestCase(info) => case_to_xml(info),
            ResponseBody::TestResult(result) => result.to_xml(),
            ResponseBody::Ok => XmlNode::new("Ok"),
        }
    }

    fn from_xml(node: &XmlNode) -> Result<ResponseBody, XmlError> {
        match node.name.as_str() {
            "TestSuite" => Ok(ResponseBody::TestSuite(SuiteInfo::from_xml(node)?)),
            "TestCase" => Ok(ResponseBody::TestCase(case_from_xml(node)?)),
            "TestResult" => Ok(ResponseBody::TestResult(TestResult::from_xml(node)?)),
            "Ok" => Ok(ResponseBody::Ok),
            other => Err(XmlError::malformed(format!(
                "unknown response body: <{other}>"
            ))),
        }
    }
}

/// One-way notification delivered to a peer object.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteEvent {
    Log(LogEntry),
    Statistics(StatisticsEvent),
}

impl RemoteEvent {
    fn to_xml(&self) -> XmlNode {
        match self {
            RemoteEvent::Log(entry) => entry.to_xml(),
            RemoteEvent::Statistics(event) => event.to_xml(),
        }
    }

    fn from_xml(node: &XmlNode) -> Result<RemoteEvent, XmlError> {
        match node.name.as_str() {
            "LogEntry" => Ok(RemoteEvent::Log(LogEntry::from_xml(node)?)),
            "Statistics" => Ok(RemoteEvent::Statistics(StatisticsEvent::from_xml(node)?)),
            other => Err(XmlError::malformed(format!("unknown event body: <{other}>"))),
        }
    }
}

/// Top-level frame payload.
#[derive(Clone, Debug, PartialEq)]
pub enum WireMessage {
    /// First message on a connection, driver to target.
    Handshake {
        want_statistics: bool,
        /// Driver-side object receiving log and statistics events.
        logger_id: Option<u64>,
        settings: Option<SettingsBag>,
    },
    /// Target's reply, announcing its framework object.
    HandshakeDone { framework_id: u64 },
    Request {
        id: u64,
        object_id: u64,
        request: RemoteRequest,
    },
    Response {
        id: u64,
        body: ResponseBody,
    },
    Fault {
        id: u64,
        message: String,
    },
    Event {
        object_id: u64,
        event: RemoteEvent,
    },
}

impl WireMessage {
    pub fn to_xml(&self) -> XmlNode {
        match self {
            WireMessage::Handshake {
                want_statistics,
                logger_id,
                settings,
            } => {
                let mut node = XmlNode::new("Handshake").with_attr(
                    "WantStatistics",
                    if *want_statistics { "true" } else { "false" },
                );
                if let Some(id) = logger_id {
                    node.set_attr("LoggerId", id.to_string());
                }
                if let Some(bag) = settings {
                    node.add_child(bag.to_xml());
                }
                node
            }
            WireMessage::HandshakeDone { framework_id } => XmlNode::new("HandshakeDone")
                .with_attr("FrameworkId", framework_id.to_string()),
            WireMessage::Request {
                id,
                object_id,
                request,
            } => {
                let mut node = XmlNode::new("Request")
                    .with_attr("Id", id.to_string())
                    .with_attr("ObjectId", object_id.to_string())
                    .with_attr("Operation", request.operation());
                if let Some(body) = request.body() {
                    node.add_child(body);
                }
                node
            }
            WireMessage::Response { id, body } => XmlNode::new("Response")
                .with_attr("Id", id.to_string())
                .with_child(body.to_xml()),
            WireMessage::Fault { id, message } => XmlNode::new("Fault")
                .with_attr("Id", id.to_string())
                .with_attr("Message", message),
            WireMessage::Event { object_id, event } => XmlNode::new("Event")
                .with_attr("ObjectId", object_id.to_string())
                .with_child(event.to_xml()),
        }
    }

    pub fn from_xml(node: &XmlNode) -> Result<WireMessage, XmlError> {
        match node.name.as_str() {
            "Handshake" => {
                let logger_id = match node.attr("LoggerId") {
                    None => None,
                    Some(text) => Some(text.parse::<u64>().map_err(|_| {
                        XmlError::malformed("non-numeric LoggerId attribute")
                    })?),
                };
                let settings = match node.find_child("Settings") {
                    None => None,
                    Some(child) => Some(SettingsBag::from_xml(child)?),
                };
                Ok(WireMessage::Handshake {
                    want_statistics: bool_attr(node, "WantStatistics")?,
                    logger_id,
                    settings,
                })
            }
            "HandshakeDone" => Ok(WireMessage::HandshakeDone {
                framework_id: id_attr(node, "FrameworkId")?,
            }),
            "Request" => Ok(WireMessage::Request {
                id: id_attr(node, "Id")?,
                object_id: id_attr(node, "ObjectId")?,
                request: RemoteRequest::from_xml(node)?,
            }),
            "Response" => {
                let body = node
                    .children
                    .first()
                    .ok_or_else(|| XmlError::malformed("<Response> has no body"))?;
                Ok(WireMessage::Response {
                    id: id_attr(node, "Id")?,
                    body: ResponseBody::from_xml(body)?,
                })
            }
            "Fault" => Ok(WireMessage::Fault {
                id: id_attr(node, "Id")?,
                message: node.require_attr("Message")?.to_owned(),
            }),
            "Event" => {
                let body = node
                    .children
                    .first()
                    .ok_or_else(|| XmlError::malformed("<Event> has no body"))?;
                Ok(WireMessage::Event {
                    object_id: id_attr(node, "ObjectId")?,
                    event: RemoteEvent::from_xml(body)?,
                })
            }
            other => Err(XmlError::malformed(format!(
                "unknown wire message: <{other}>"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::KEY_LOG_LEVEL;
    use crate::model::{NodeType, PathNode, TestStatus};

    fn sample_path() -> TestPath {
        let mut path = TestPath::root(PathNode::new(NodeType::Suite, "demo"));
        path.push(PathNode::new(NodeType::Fixture, "Connect"));
        path.push(PathNode::new(NodeType::Case, "Handshake"));
        path
    }

    fn round_trip(message: WireMessage) {
        let doc = message.to_xml().to_compact().unwrap();
        let back = WireMessage::from_xml(&XmlNode::parse(&doc).unwrap()).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_handshake_round_trip() {
        let mut settings = SettingsBag::new();
        settings.set(KEY_LOG_LEVEL, "debug");
        round_trip(WireMessage::Handshake {
            want_statistics: true,
            logger_id: Some(2),
            settings: Some(settings),
        });
        round_trip(WireMessage::Handshake {
            want_statistics: false,
            logger_id: None,
            settings: None,
        });
        round_trip(WireMessage::HandshakeDone { framework_id: 1 });
    }

    #[test]
    fn test_request_round_trip() {
        round_trip(WireMessage::Request {
            id: 1,
            object_id: 1,
            request: RemoteRequest::LoadTestSuite,
        });
        round_trip(WireMessage::Request {
            id: 2,
            object_id: 1,
            request: RemoteRequest::ResolveTest(sample_path()),
        });
        round_trip(WireMessage::Request {
            id: 3,
            object_id: 1,
            request: RemoteRequest::RunTest(sample_path()),
        });
        round_trip(WireMessage::Request {
            id: 4,
            object_id: 1,
            request: RemoteRequest::Cancel,
        });
        round_trip(WireMessage::Request {
            id: 5,
            object_id: 1,
            request: RemoteRequest::Shutdown,
        });
    }

    #[test]
    fn test_response_round_trip() {
        let root = TestCaseInfo {
            name: TestName::new("demo"),
            path: sample_path(),
        };
        round_trip(WireMessage::Response {
            id: 7,
            body: ResponseBody::TestSuite(SuiteInfo {
                name: "demo".into(),
                categories: vec!["net".into(), "quick".into()],
                features: vec![RemoteFeature {
                    name: "heavy".into(),
                    description: "long running tests".into(),
                    enabled: false,
                }],
                root: root.clone(),
            }),
        });
        round_trip(WireMessage::Response {
            id: 8,
            body: ResponseBody::TestCase(root),
        });

        let mut result = TestResult::new(TestName::new("Handshake"));
        result.set_status(TestStatus::Success);
        result.set_elapsed_ms(12);
        round_trip(WireMessage::Response {
            id: 9,
            body: ResponseBody::TestResult(result),
        });
        round_trip(WireMessage::Response {
            id: 10,
            body: ResponseBody::Ok,
        });
        round_trip(WireMessage::Fault {
            id: 11,
            message: "no object 9".into(),
        });
    }

    #[test]
    fn test_event_round_trip() {
        round_trip(WireMessage::Event {
            object_id: 2,
            event: RemoteEvent::Log(LogEntry::message("starting handshake")),
        });
        round_trip(WireMessage::Event {
            object_id: 2,
            event: RemoteEvent::Statistics(StatisticsEvent::Finished {
                name: TestName::new("Handshake"),
                status: TestStatus::Success,
            }),
        });
    }

    #[test]
    fn test_unknown_root_rejected() {
        let node = XmlNode::new("Telemetry");
        assert!(WireMessage::from_xml(&node).is_err());
        let request = XmlNode::new("Request")
            .with_attr("Id", "1")
            .with_attr("ObjectId", "1")
            .with_attr("Operation", "Reboot");
        assert!(WireMessage::from_xml(&request).is_err());
    }
}
