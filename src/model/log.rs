//! Log entries and statistics events
//!
//! Both are discrete notifications raised while a session runs. They are
//! delivered in raise order, locally and across the wire; consumers keep
//! whatever counts they need.

#![allow(dead_code)]

use std::fmt;

use super::name::TestName;
use super::result::TestStatus;

/// Kind of a captured log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogEntryKind {
    Debug,
    Message,
    Error,
}

impl LogEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEntryKind::Debug => "Debug",
            LogEntryKind::Message => "Message",
            LogEntryKind::Error => "Error",
        }
    }

    pub fn from_str(s: &str) -> Option<LogEntryKind> {
        match s {
            "Debug" => Some(LogEntryKind::Debug),
            "Message" => Some(LogEntryKind::Message),
            "Error" => Some(LogEntryKind::Error),
            _ => None,
        }
    }
}

/// One captured log line, with optional attached error detail.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub kind: LogEntryKind,
    pub level: i32,
    pub text: String,
    pub error: Option<String>,
}

impl LogEntry {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            kind: LogEntryKind::Message,
            level: 0,
            text: text.into(),
            error: None,
        }
    }

    pub fn debug(level: i32, text: impl Into<String>) -> Self {
        Self {
            kind: LogEntryKind::Debug,
            level,
            text: text.into(),
            error: None,
        }
    }

    pub fn error(text: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: LogEntryKind::Error,
            level: 0,
            text: text.into(),
            error: detail,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.text)
    }
}

/// Progress notification raised while a session runs.
#[derive(Clone, Debug, PartialEq)]
pub enum StatisticsEvent {
    /// Counters start over, raised once per run.
    Reset,
    Running {
        name: TestName,
    },
    Finished {
        name: TestName,
        status: TestStatus,
    },
}

impl StatisticsEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            StatisticsEvent::Reset => "Reset",
            StatisticsEvent::Running { .. } => "Running",
            StatisticsEvent::Finished { .. } => "Finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_kind_round_trip() {
        for kind in [LogEntryKind::Debug, LogEntryKind::Message, LogEntryKind::Error] {
            assert_eq!(LogEntryKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(LogEntryKind::from_str("Warning"), None);
    }

    #[test]
    fn test_log_entry_display() {
        let entry = LogEntry::message("hello");
        assert_eq!(entry.to_string(), "[Message] hello");
    }
}
