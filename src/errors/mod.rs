//! Error taxonomy for the framework
//!
//! Separates framework bugs, test-body failures, protocol faults, helper
//! process failures and CLI mistakes. Each kind has its own reporting path
//! and its own effect on the process exit code.

#![allow(dead_code)]

use thiserror::Error;

/// Violation of a framework invariant.
///
/// Never blamed on the test body: it aborts the current step (resolution,
/// serialization, run) and surfaces to the caller.
#[derive(Debug, Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    pub message: String,
}

impl InternalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure raised by a test body or a fixture hook.
///
/// Becomes the status of the innermost result node and never propagates
/// past its invoker. The kind tag is what expected-failure declarations
/// match against.
#[derive(Debug, Error)]
pub enum TestError {
    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind}: {message}")]
    Tagged { kind: String, message: String },
}

impl TestError {
    pub fn assertion(message: impl Into<String>) -> Self {
        TestError::Assertion(message.into())
    }

    pub fn tagged(kind: impl Into<String>, message: impl Into<String>) -> Self {
        TestError::Tagged {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Kind tag used for expected-failure matching and result records.
    pub fn kind(&self) -> &str {
        match self {
            TestError::Assertion(_) => "Assertion",
            TestError::Io(_) => "Io",
            TestError::Tagged { kind, .. } => kind,
        }
    }
}

/// Protocol-level failure on a remote connection.
///
/// Fatal to the connection: all pending calls fail with it and the
/// transport is torn down.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("remote fault: {0}")]
    Fault(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Xml(#[from] XmlError),
}

/// Failure launching or supervising an external helper process.
#[derive(Debug, Error)]
pub struct ExternalToolError {
    pub message: String,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
}

impl ExternalToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stderr: None,
            exit_code: None,
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        let text = stderr.into();
        if !text.is_empty() {
            self.stderr = Some(text);
        }
        self
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }
}

impl std::fmt::Display for ExternalToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "external tool failed: {}", self.message)?;
        if let Some(code) = self.exit_code {
            write!(f, " (exit code {code})")?;
        }
        if let Some(stderr) = &self.stderr {
            write!(f, "\n{stderr}")?;
        }
        Ok(())
    }
}

/// Invalid command line or configuration input.
///
/// Reported before any test runs.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProgramError(pub String);

impl ProgramError {
    pub fn new(message: impl Into<String>) -> Self {
        ProgramError(message.into())
    }
}

/// XML read/write failure, used by every serializer in the crate.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("xml escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Malformed(String),
}

impl XmlError {
    pub fn malformed(message: impl Into<String>) -> Self {
        XmlError::Malformed(message.into())
    }
}

/// Failure of a session-level operation, local or remote.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(TestError::assertion("boom").kind(), "Assertion");
        assert_eq!(TestError::tagged("Connection", "refused").kind(), "Connection");
        let io = TestError::from(std::io::Error::other("nope"));
        assert_eq!(io.kind(), "Io");
    }

    #[test]
    fn test_external_tool_display() {
        let err = ExternalToolError::new("launcher died")
            .with_stderr("segfault")
            .with_exit_code(Some(139));
        let text = err.to_string();
        assert!(text.contains("launcher died"));
        assert!(text.contains("139"));
        assert!(text.contains("segfault"));
    }
}
