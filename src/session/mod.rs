//! Test sessions
//!
//! A session owns one loaded suite and serves the same operations
//! locally and through a remote connection: expose the root test case,
//! resolve a path to a runnable subtree, run it under a cancellation
//! token, and report progress as statistics events. The session keeps
//! no cumulative counts; consumers fold the event stream themselves.

#![allow(dead_code)]

pub mod config;

pub use config::TestConfiguration;

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::SettingsBag;
use crate::errors::{InternalError, ProgramError, SessionError};
use crate::host::{self, ResolvedTest, TestCaseInfo, TestHost};
use crate::invoke::{self, LoggerBackend, RunContext, TestLogger};
use crate::model::{
    LogEntry, LogEntryKind, StatisticsEvent, TestPath, TestResult, TestStatus,
};
use crate::suite::SuiteSpec;

/// Running totals folded from the statistics event stream.
///
/// `Reset` starts the counters over, so one summary can watch several
/// runs in a row and always describe the latest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub started: usize,
    pub finished: usize,
    pub passed: usize,
    pub errors: usize,
    pub ignored: usize,
    pub unstable: usize,
    pub canceled: usize,
    /// Full name of the test currently running, if any.
    pub current: Option<String>,
}

impl SessionSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &StatisticsEvent) {
        match event {
            StatisticsEvent::Reset => *self = Self::default(),
            StatisticsEvent::Running { name } => {
                self.started += 1;
                self.current = Some(name.full_name());
            }
            StatisticsEvent::Finished { status, .. } => {
                self.finished += 1;
                self.current = None;
                match status {
                    TestStatus::Success => self.passed += 1,
                    TestStatus::Error => self.errors += 1,
                    TestStatus::Ignored => self.ignored += 1,
                    TestStatus::Unstable => self.unstable += 1,
                    TestStatus::Canceled => self.canceled += 1,
                    TestStatus::None => {}
                }
            }
        }
    }

    /// True when nothing went wrong so far.
    pub fn is_clean(&self) -> bool {
        self.errors == 0 && self.unstable == 0 && self.canceled == 0
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} finished | {} passed | {} errors | {} unstable | {} ignored | {} canceled",
            self.finished, self.passed, self.errors, self.unstable, self.ignored, self.canceled
        )
    }
}

/// Driver-side logger backend: bridges captured entries to `tracing`
/// and folds statistics into a shared [`SessionSummary`].
pub struct ConsoleBackend {
    summary: Arc<Mutex<SessionSummary>>,
    /// Debug entries above this level are dropped.
    debug_level: i32,
}

impl ConsoleBackend {
    pub fn new() -> Self {
        Self {
            summary: Arc::new(Mutex::new(SessionSummary::new())),
            debug_level: 0,
        }
    }

    pub fn with_debug_level(mut self, level: i32) -> Self {
        self.debug_level = level;
        self
    }

    /// Snapshot of the counters at this moment.
    pub fn summary(&self) -> SessionSummary {
        match self.summary.lock() {
            Ok(summary) => summary.clone(),
            Err(_) => SessionSummary::new(),
        }
    }
}

impl Default for ConsoleBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerBackend for ConsoleBackend {
    fn log(&self, entry: &LogEntry) {
        match entry.kind {
            LogEntryKind::Debug => {
                if entry.level <= self.debug_level {
                    debug!("{}", entry.text);
                }
            }
            LogEntryKind::Message => info!("{}", entry.text),
            LogEntryKind::Error => {
                error!("{}", entry.text);
                if let Some(detail) = &entry.error {
                    error!("{detail}");
                }
            }
        }
    }

    fn statistics(&self, event: &StatisticsEvent) {
        if let Ok(mut summary) = self.summary.lock() {
            summary.apply(event);
        }
        match event {
            StatisticsEvent::Running { name } => debug!("running {}", name.full_name()),
            StatisticsEvent::Finished { name, status } => {
                debug!("finished {} [{}]", name.full_name(), status.as_str());
            }
            StatisticsEvent::Reset => {}
        }
    }
}

/// Session executing the suite inside this process.
pub struct LocalSession {
    suite: SuiteSpec,
    settings: Arc<SettingsBag>,
    config: TestConfiguration,
    logger: TestLogger,
    /// Resolved host tree, rebuilt after configuration changes.
    root: Option<Arc<TestHost>>,
}

impl LocalSession {
    /// Create a session over `suite`, restoring any persisted category
    /// and feature selection from `settings`.
    pub fn new(suite: SuiteSpec, settings: SettingsBag) -> Result<Self, ProgramError> {
        let mut config = TestConfiguration::from_suite(&suite);
        config.load_from_settings(&settings)?;
        Ok(Self {
            suite,
            settings: Arc::new(settings),
            config,
            logger: TestLogger::new(Arc::new(invoke::NullBackend)),
            root: None,
        })
    }

    pub fn with_backend(mut self, backend: Arc<dyn LoggerBackend>) -> Self {
        self.logger = TestLogger::new(backend);
        self
    }

    pub fn suite(&self) -> &SuiteSpec {
        &self.suite
    }

    pub fn settings(&self) -> &SettingsBag {
        &self.settings
    }

    pub fn configuration(&self) -> &TestConfiguration {
        &self.config
    }

    /// Mutable selection access. Drops the resolved tree, the next
    /// operation resolves again under the new selection.
    pub fn configuration_mut(&mut self) -> &mut TestConfiguration {
        self.root = None;
        &mut self.config
    }

    fn tree(&mut self) -> Result<&Arc<TestHost>, InternalError> {
        if self.root.is_none() {
            self.root = Some(host::resolve_suite(&self.suite, &self.config)?);
        }
        match &self.root {
            Some(root) => Ok(root),
            None => Err(InternalError::new("suite resolution produced no tree")),
        }
    }

    /// Name and path of the suite root.
    pub fn root_case(&mut self) -> Result<TestCaseInfo, InternalError> {
        Ok(host::root_info(self.tree()?))
    }

    /// Resolve a path to a runnable subtree with pinned values.
    pub fn resolve(&mut self, path: &TestPath) -> Result<ResolvedTest, InternalError> {
        let root = self.tree()?.clone();
        host::resolve_path(&root, path)
    }

    /// Look a test up by dotted display name, `None` when absent.
    pub fn find_case(&mut self, name: &str) -> Result<Option<TestPath>, InternalError> {
        let root = self.tree()?.clone();
        Ok(host::find_by_name(&root, name))
    }

    /// Run the subtree a path addresses and return its result tree.
    pub async fn run(
        &mut self,
        path: &TestPath,
        token: &CancellationToken,
    ) -> Result<TestResult, SessionError> {
        let resolved = self.resolve(path)?;
        Ok(self.run_resolved(&resolved, token).await)
    }

    /// Run the whole suite under the current selection.
    pub async fn run_all(&mut self, token: &CancellationToken) -> Result<TestResult, SessionError> {
        let root = self.root_case()?;
        self.run(&root.path, token).await
    }

    async fn run_resolved(&self, resolved: &ResolvedTest, token: &CancellationToken) -> TestResult {
        let run = RunContext {
            settings: self.settings.clone(),
            config: Arc::new(self.config.clone()),
            logger: self.logger.clone(),
        };
        run.logger.statistics(StatisticsEvent::Reset);
        invoke::run_tree(&run, &resolved.tree, token).await
    }
}

/// A driver-facing session, either in-process or across a connection.
pub enum TestSession {
    Local(LocalSession),
    Remote(crate::wire::RemoteSession),
}

impl TestSession {
    pub fn local(session: LocalSession) -> Self {
        TestSession::Local(session)
    }

    pub fn remote(session: crate::wire::RemoteSession) -> Self {
        TestSession::Remote(session)
    }

    pub async fn root_case(&mut self) -> Result<TestCaseInfo, SessionError> {
        match self {
            TestSession::Local(session) => Ok(session.root_case()?),
            TestSession::Remote(session) => session.load_test_suite().await,
        }
    }

    pub async fn resolve(&mut self, path: &TestPath) -> Result<TestCaseInfo, SessionError> {
        match self {
            TestSession::Local(session) => Ok(session.resolve(path)?.info),
            TestSession::Remote(session) => session.resolve_test(path).await,
        }
    }

    pub async fn run(
        &mut self,
        path: &TestPath,
        token: &CancellationToken,
    ) -> Result<TestResult, SessionError> {
        match self {
            TestSession::Local(session) => session.run(path, token).await,
            TestSession::Remote(session) => session.run_test(path, token).await,
        }
    }

    /// Release remote resources. A local session has none.
    pub async fn shutdown(self) -> Result<(), SessionError> {
        match self {
            TestSession::Local(_) => Ok(()),
            TestSession::Remote(session) => session.shutdown().await,
        }
    }
}
