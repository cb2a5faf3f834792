//! Core data model: names, paths, results and log events

pub mod log;
pub mod name;
pub mod path;
pub mod result;

pub use log::{LogEntry, LogEntryKind, StatisticsEvent};
pub use name::{TestName, TestNameBuilder, TestParameter};
pub use path::{NodeFlags, NodeType, PathNode, TestPath};
pub use result::{ErrorInfo, ResultSummary, TestResult, TestStatus};
