//! Target side of the remote protocol
//!
//! Accepts driver connections, adopts the handshake settings, serves
//! the local suite through a framework servant and forwards log and
//! statistics events through the driver's logger proxy as they occur.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SettingsBag;
use crate::errors::ServerError;
use crate::invoke::{LoggerBackend, NullBackend};
use crate::model::{LogEntry, StatisticsEvent};
use crate::session::LocalSession;
use crate::suite::SuiteSpec;

use super::connection::{Connection, ObjectProxy, Servant};
use super::message::{RemoteEvent, RemoteFeature, RemoteRequest, ResponseBody, SuiteInfo, WireMessage};

/// How long a target waits after `Shutdown` for the driver to hang up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Backend forwarding entries and events to the driver's logger proxy.
///
/// Send failures mean the transport is gone; the run unwinds through
/// its cancellation token, so nothing is reported here.
struct WireBackend {
    connection: Connection,
    logger: ObjectProxy,
    want_statistics: bool,
}

impl LoggerBackend for WireBackend {
    fn log(&self, entry: &LogEntry) {
        let _ = self
            .connection
            .send_event(&self.logger, RemoteEvent::Log(entry.clone()));
    }

    fn statistics(&self, event: &StatisticsEvent) {
        if self.want_statistics {
            let _ = self
                .connection
                .send_event(&self.logger, RemoteEvent::Statistics(event.clone()));
        }
    }
}

/// The framework object a driver talks to.
struct FrameworkServant {
    session: tokio::sync::Mutex<LocalSession>,
    /// Token of the in-flight run, replaced per run.
    run_token: Mutex<CancellationToken>,
    /// Parent for run tokens; fired when the transport drops.
    connection_closed: CancellationToken,
    /// Fired by `Shutdown`.
    shutdown: CancellationToken,
}

#[async_trait]
impl Servant for FrameworkServant {
    async fn call(&self, request: RemoteRequest) -> Result<ResponseBody, ServerError> {
        match request {
            RemoteRequest::LoadTestSuite => {
                let mut session = self.session.lock().await;
                let root = session
                    .root_case()
                    .map_err(|error| ServerError::Fault(error.to_string()))?;
                let features = session
                    .configuration()
                    .features()
                    .iter()
                    .map(|feature| RemoteFeature {
                        name: feature.spec.name.clone(),
                        description: feature.spec.description.clone(),
                        enabled: feature.enabled,
                    })
                    .collect();
                Ok(ResponseBody::TestSuite(SuiteInfo {
                    name: session.suite().name.clone(),
                    categories: session.configuration().categories().to_vec(),
                    features,
                    root,
                }))
            }
            RemoteRequest::ResolveTest(path) => {
                let mut session = self.session.lock().await;
                let resolved = session
                    .resolve(&path)
                    .map_err(|error| ServerError::Fault(error.to_string()))?;
                Ok(ResponseBody::TestCase(resolved.info))
            }
            RemoteRequest::RunTest(path) => {
                let token = self.connection_closed.child_token();
                if let Ok(mut slot) = self.run_token.lock() {
                    *slot = token.clone();
                }
                let mut session = self.session.lock().await;
                info!("running {}", path.display_name());
                let result = session
                    .run(&path, &token)
                    .await
                    .map_err(|error| ServerError::Fault(error.to_string()))?;
                Ok(ResponseBody::TestResult(result))
            }
            RemoteRequest::Cancel => {
                debug!("cancel requested");
                if let Ok(slot) = self.run_token.lock() {
                    slot.cancel();
                }
                Ok(ResponseBody::Ok)
            }
            RemoteRequest::Shutdown => {
                debug!("shutdown requested");
                self.shutdown.cancel();
                Ok(ResponseBody::Ok)
            }
        }
    }

    fn event(&self, _event: RemoteEvent) {
        debug!("framework object ignores events");
    }
}

/// Serve one driver connection to completion.
pub async fn serve_connection(
    stream: TcpStream,
    suite: SuiteSpec,
    base_settings: SettingsBag,
) -> Result<(), ServerError> {
    let connection = Connection::new(stream);

    let (want_statistics, logger_id, settings) = match connection.await_handshake().await? {
        WireMessage::Handshake {
            want_statistics,
            logger_id,
            settings,
        } => (want_statistics, logger_id, settings),
        other => {
            return Err(ServerError::Handshake(format!(
                "expected a handshake, got <{}>",
                other.to_xml().name
            )))
        }
    };

    let mut merged = base_settings;
    if let Some(bag) = &settings {
        merged.merge(bag);
    }

    let backend: Arc<dyn LoggerBackend> = match logger_id {
        Some(id) => Arc::new(WireBackend {
            connection: connection.clone(),
            logger: connection.proxy(id),
            want_statistics,
        }),
        None => Arc::new(NullBackend),
    };

    let session = LocalSession::new(suite, merged)
        .map_err(|error| ServerError::Handshake(error.to_string()))?
        .with_backend(backend);

    let shutdown = CancellationToken::new();
    let servant = Arc::new(FrameworkServant {
        session: tokio::sync::Mutex::new(session),
        run_token: Mutex::new(connection.closed().child_token()),
        connection_closed: connection.closed(),
        shutdown: shutdown.clone(),
    });
    let framework = connection.register(servant);
    connection.send(WireMessage::HandshakeDone {
        framework_id: framework.id(),
    })?;
    info!("driver connected, framework object {}", framework.id());

    let closed = connection.closed();
    tokio::select! {
        _ = closed.cancelled() => {
            debug!("driver dropped the connection");
        }
        _ = shutdown.cancelled() => {
            // The driver hangs up once it has the shutdown response.
            tokio::select! {
                _ = closed.cancelled() => {}
                _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                    warn!("driver did not hang up after shutdown");
                }
            }
        }
    }
    connection.close();
    info!("driver session ended");
    Ok(())
}

/// Accept and serve driver connections until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    suite: SuiteSpec,
    settings: SettingsBag,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!("listening on {addr}");
    }
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = shutdown.cancelled() => return Ok(()),
        };
        info!("driver connecting from {peer}");
        let suite = suite.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            if let Err(error) = serve_connection(stream, suite, settings).await {
                warn!("driver session failed: {error}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{test_fn, CaseSpec, FixtureSpec};

    fn tiny_suite() -> SuiteSpec {
        SuiteSpec::new("wire").with_fixture(
            FixtureSpec::new("checks")
                .with_case(CaseSpec::new("passes", test_fn(|_ctx| async { Ok(true) }))),
        )
    }

    #[tokio::test]
    async fn test_driver_hangup_ends_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let target = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_connection(stream, tiny_suite(), SettingsBag::new()).await
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let driver = Connection::new(stream);
        driver
            .send(WireMessage::Handshake {
                want_statistics: false,
                logger_id: None,
                settings: None,
            })
            .unwrap();
        match driver.await_handshake().await.unwrap() {
            WireMessage::HandshakeDone { .. } => {}
            other => panic!("unexpected handshake reply <{}>", other.to_xml().name),
        }

        // Hanging up without a shutdown call ends the session cleanly.
        driver.close();
        let served = tokio::time::timeout(Duration::from_secs(5), target).await;
        assert!(matches!(served, Ok(Ok(Ok(())))));
    }
}
