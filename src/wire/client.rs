//! Driver side of the remote protocol
//!
//! Connects to a target, registers a logger servant so log entries and
//! statistics stream back while a run is in flight, and exposes the
//! remote framework object as a session.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SettingsBag;
use crate::errors::{ServerError, SessionError};
use crate::host::TestCaseInfo;
use crate::invoke::LoggerBackend;
use crate::model::{TestPath, TestResult};

use super::connection::{Connection, ObjectProxy, Servant};
use super::message::{RemoteEvent, RemoteRequest, ResponseBody, SuiteInfo, WireMessage};

/// Driver-side servant receiving log and statistics events.
struct LoggerServant {
    backend: Arc<dyn LoggerBackend>,
}

#[async_trait]
impl Servant for LoggerServant {
    async fn call(&self, _request: RemoteRequest) -> Result<ResponseBody, ServerError> {
        Err(ServerError::Protocol(
            "the logger object serves no requests".into(),
        ))
    }

    fn event(&self, event: RemoteEvent) {
        match event {
            RemoteEvent::Log(entry) => self.backend.log(&entry),
            RemoteEvent::Statistics(statistics) => self.backend.statistics(&statistics),
        }
    }
}

fn protocol_mismatch(operation: &str) -> SessionError {
    ServerError::Protocol(format!("unexpected response body for {operation}")).into()
}

/// Session served by a remote target process.
pub struct RemoteSession {
    connection: Connection,
    framework: ObjectProxy,
    suite: Option<SuiteInfo>,
}

impl RemoteSession {
    /// Connect and handshake. The driver's settings ship to the target,
    /// which overlays them on its own.
    pub async fn connect(
        endpoint: &str,
        settings: &SettingsBag,
        backend: Arc<dyn LoggerBackend>,
    ) -> Result<RemoteSession, SessionError> {
        debug!("connecting to {endpoint}");
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(ServerError::Io)?;
        Self::over(stream, settings, backend).await
    }

    /// Handshake over a stream established elsewhere, such as a device
    /// target dialing back after a helper launch.
    pub async fn over(
        stream: TcpStream,
        settings: &SettingsBag,
        backend: Arc<dyn LoggerBackend>,
    ) -> Result<RemoteSession, SessionError> {
        let connection = Connection::new(stream);
        let logger = connection.register(Arc::new(LoggerServant { backend }));
        connection.send(WireMessage::Handshake {
            want_statistics: true,
            logger_id: Some(logger.local_id()?),
            settings: Some(settings.clone()),
        })?;
        let framework = match connection.await_handshake().await? {
            WireMessage::HandshakeDone { framework_id } => connection.proxy(framework_id),
            other => {
                connection.close();
                return Err(ServerError::Handshake(format!(
                    "expected a handshake reply, got <{}>",
                    other.to_xml().name
                ))
                .into());
            }
        };
        debug!("connected, framework object {}", framework.id());
        Ok(RemoteSession {
            connection,
            framework,
            suite: None,
        })
    }

    /// Suite description from the target, fetched once and cached.
    pub async fn suite_info(&mut self) -> Result<SuiteInfo, SessionError> {
        if let Some(info) = &self.suite {
            return Ok(info.clone());
        }
        let body = self
            .connection
            .call(&self.framework, RemoteRequest::LoadTestSuite)
            .await?;
        match body {
            ResponseBody::TestSuite(info) => {
                self.suite = Some(info.clone());
                Ok(info)
            }
            _ => Err(protocol_mismatch("LoadTestSuite")),
        }
    }

    /// Root test case of the remote suite.
    pub async fn load_test_suite(&mut self) -> Result<TestCaseInfo, SessionError> {
        Ok(self.suite_info().await?.root)
    }

    pub async fn resolve_test(&self, path: &TestPath) -> Result<TestCaseInfo, SessionError> {
        let body = self
            .connection
            .call(&self.framework, RemoteRequest::ResolveTest(path.clone()))
            .await?;
        match body {
            ResponseBody::TestCase(info) => Ok(info),
            _ => Err(protocol_mismatch("ResolveTest")),
        }
    }

    /// Run a test on the target. Cancelling `token` sends `Cancel` so
    /// the remote run unwinds; the final result still comes back over
    /// the same call.
    pub async fn run_test(
        &self,
        path: &TestPath,
        token: &CancellationToken,
    ) -> Result<TestResult, SessionError> {
        let call = self
            .connection
            .call(&self.framework, RemoteRequest::RunTest(path.clone()));
        tokio::pin!(call);
        let mut cancel_sent = false;
        let body = loop {
            tokio::select! {
                outcome = &mut call => break outcome?,
                _ = token.cancelled(), if !cancel_sent => {
                    cancel_sent = true;
                    let connection = self.connection.clone();
                    let framework = self.framework.clone();
                    tokio::spawn(async move {
                        if let Err(error) = connection.call(&framework, RemoteRequest::Cancel).await {
                            debug!("cancel call failed: {error}");
                        }
                    });
                }
            }
        };
        match body {
            ResponseBody::TestResult(result) => Ok(result),
            _ => Err(protocol_mismatch("RunTest")),
        }
    }

    pub async fn cancel(&self) -> Result<(), SessionError> {
        match self
            .connection
            .call(&self.framework, RemoteRequest::Cancel)
            .await?
        {
            ResponseBody::Ok => Ok(()),
            _ => Err(protocol_mismatch("Cancel")),
        }
    }

    /// Shut the target session down and drop the connection. The
    /// transport is closed even when the call fails.
    pub async fn shutdown(self) -> Result<(), SessionError> {
        let outcome = self
            .connection
            .call(&self.framework, RemoteRequest::Shutdown)
            .await;
        self.connection.close();
        match outcome {
            Ok(ResponseBody::Ok) => Ok(()),
            Ok(_) => Err(protocol_mismatch("Shutdown")),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::KEY_CURRENT_CATEGORY;
    use crate::model::{LogEntry, StatisticsEvent, TestStatus};
    use crate::suite::{test_fn, CaseSpec, FixtureSpec, SuiteSpec};
    use crate::wire::server::serve_connection;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct RecordingBackend {
        entries: Mutex<Vec<LogEntry>>,
        events: Mutex<Vec<StatisticsEvent>>,
    }

    impl LoggerBackend for RecordingBackend {
        fn log(&self, entry: &LogEntry) {
            self.entries.lock().unwrap().push(entry.clone());
        }

        fn statistics(&self, event: &StatisticsEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn wire_suite() -> SuiteSpec {
        SuiteSpec::new("wire").with_fixture(
            FixtureSpec::new("checks")
                .with_case(CaseSpec::new(
                    "passes",
                    test_fn(|ctx| async move {
                        ctx.log_message("hello from the target");
                        Ok(true)
                    }),
                ))
                .with_case(CaseSpec::new("fails", test_fn(|_ctx| async { Ok(false) }))),
        )
    }

    async fn spawn_target(suite: SuiteSpec) -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_connection(stream, suite, SettingsBag::new())
                .await
                .unwrap();
        });
        (addr.to_string(), handle)
    }

    #[tokio::test]
    async fn test_remote_run_streams_events_and_returns_result() {
        let (endpoint, target) = spawn_target(wire_suite()).await;
        let backend = Arc::new(RecordingBackend::default());
        let mut session = RemoteSession::connect(&endpoint, &SettingsBag::new(), backend.clone())
            .await
            .unwrap();

        let root = session.load_test_suite().await.unwrap();
        assert_eq!(root.name.full_name(), "wire");

        let result = session
            .run_test(&root.path, &CancellationToken::new())
            .await
            .unwrap();
        let mut statuses = Vec::new();
        result.visit_leaves(&mut |leaf| {
            statuses.push((leaf.name().full_name(), leaf.status()));
        });
        statuses.sort();
        assert_eq!(
            statuses,
            vec![
                ("fails".to_string(), TestStatus::Error),
                ("passes".to_string(), TestStatus::Success),
            ]
        );

        // Events landed before the result call returned.
        let events = backend.events.lock().unwrap().clone();
        assert_eq!(events.first(), Some(&StatisticsEvent::Reset));
        let finished = events
            .iter()
            .filter(|event| matches!(event, StatisticsEvent::Finished { .. }))
            .count();
        assert_eq!(finished, 2);

        let texts: Vec<String> = backend
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.text.clone())
            .collect();
        assert!(texts.contains(&"hello from the target".to_string()));

        session.shutdown().await.unwrap();
        target.await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_and_rerun_single_leaf() {
        let (endpoint, _target) = spawn_target(wire_suite()).await;
        let backend = Arc::new(RecordingBackend::default());
        let mut session = RemoteSession::connect(&endpoint, &SettingsBag::new(), backend)
            .await
            .unwrap();

        let root = session.load_test_suite().await.unwrap();
        let result = session
            .run_test(&root.path, &CancellationToken::new())
            .await
            .unwrap();

        let mut passing_path = None;
        result.visit_leaves(&mut |leaf| {
            if leaf.status() == TestStatus::Success {
                passing_path = leaf.path().cloned();
            }
        });
        let path = passing_path.unwrap();

        let case = session.resolve_test(&path).await.unwrap();
        assert_eq!(case.name.full_name(), "passes");

        let rerun = session
            .run_test(&path, &CancellationToken::new())
            .await
            .unwrap();
        let mut leaves = 0;
        rerun.visit_leaves(&mut |leaf| {
            leaves += 1;
            assert_eq!(leaf.status(), TestStatus::Success);
        });
        assert_eq!(leaves, 1);

        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_driver_cancel_unwinds_remote_run() {
        let suite = SuiteSpec::new("wire").with_fixture(
            FixtureSpec::new("slow").with_case(CaseSpec::new(
                "stalls",
                test_fn(|_ctx| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(true)
                }),
            )),
        );
        let (endpoint, _target) = spawn_target(suite).await;
        let backend = Arc::new(RecordingBackend::default());
        let mut session = RemoteSession::connect(&endpoint, &SettingsBag::new(), backend)
            .await
            .unwrap();
        let root = session.load_test_suite().await.unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = session.run_test(&root.path, &token).await.unwrap();
        assert_eq!(result.status(), TestStatus::Canceled);

        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_settings_select_category() {
        let suite = SuiteSpec::new("wire").with_fixture(
            FixtureSpec::new("checks")
                .with_case(
                    CaseSpec::new("quick", test_fn(|_ctx| async { Ok(true) }))
                        .with_category("quick"),
                )
                .with_case(
                    CaseSpec::new("full", test_fn(|_ctx| async { Ok(true) })).with_category("full"),
                ),
        );
        let (endpoint, _target) = spawn_target(suite).await;

        let mut settings = SettingsBag::new();
        settings.set(KEY_CURRENT_CATEGORY, "quick");
        let backend = Arc::new(RecordingBackend::default());
        let mut session = RemoteSession::connect(&endpoint, &settings, backend)
            .await
            .unwrap();

        let info = session.suite_info().await.unwrap();
        assert_eq!(info.categories, vec!["full".to_string(), "quick".to_string()]);

        let root = session.load_test_suite().await.unwrap();
        let result = session
            .run_test(&root.path, &CancellationToken::new())
            .await
            .unwrap();
        let mut names = Vec::new();
        result.visit_leaves(&mut |leaf| names.push(leaf.name().full_name()));
        assert_eq!(names, vec!["quick"]);

        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_unknown_path_is_remote_fault() {
        let (endpoint, _target) = spawn_target(wire_suite()).await;
        let backend = Arc::new(RecordingBackend::default());
        let session = RemoteSession::connect(&endpoint, &SettingsBag::new(), backend)
            .await
            .unwrap();

        let mut bogus = TestPath::new();
        bogus.push(crate::model::PathNode::new(
            crate::model::NodeType::Suite,
            "elsewhere",
        ));
        let outcome = session.resolve_test(&bogus).await;
        assert!(matches!(
            outcome,
            Err(SessionError::Server(ServerError::Fault(_)))
        ));

        session.shutdown().await.unwrap();
    }
}
