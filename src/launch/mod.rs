//! External helper launchers
//!
//! A device target is an app started out of process by a helper
//! command (emulator runner, install script). The launcher spawns the
//! helper with the listen endpoint substituted into its arguments and
//! waits for the target app to dial back; helper failures surface as
//! [`ExternalToolError`] with captured stderr.

#![allow(dead_code)]

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info};

use crate::errors::ExternalToolError;

/// Placeholder replaced with the listen endpoint in helper arguments.
pub const ENDPOINT_PLACEHOLDER: &str = "{endpoint}";

/// Default wait for the launched target to connect.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// A launched target app, connected and ready to handshake.
#[derive(Debug)]
pub struct LaunchedTarget {
    pub stream: TcpStream,
    /// The helper process; it dies with this handle.
    pub helper: Child,
}

/// Spawns a helper command and waits for its app to connect.
pub struct HelperLauncher {
    program: String,
    args: Vec<String>,
    ready_timeout: Duration,
}

impl HelperLauncher {
    /// Split a whitespace-separated command line. The first word is the
    /// program, the rest are arguments.
    pub fn new(command_line: &str) -> Result<Self, ExternalToolError> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ExternalToolError::new("launcher command is empty"))?;
        Ok(Self {
            program: program.to_owned(),
            args: parts.map(str::to_owned).collect(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        })
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Arguments with the endpoint substituted. When no argument names
    /// the placeholder, the endpoint is appended.
    fn resolved_args(&self, endpoint: &str) -> Vec<String> {
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(ENDPOINT_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(ENDPOINT_PLACEHOLDER, endpoint)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(endpoint.to_owned());
        }
        args
    }

    /// Start the helper and wait for the target app to dial back on
    /// `listener`. `endpoint` is the address as the app must see it.
    pub async fn launch(
        &self,
        listener: &TcpListener,
        endpoint: &str,
    ) -> Result<LaunchedTarget, ExternalToolError> {
        let args = self.resolved_args(endpoint);
        info!("launching helper: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                ExternalToolError::new(format!("cannot start {}: {error}", self.program))
            })?;
        let stderr = child.stderr.take();

        let deadline = tokio::time::sleep(self.ready_timeout);
        tokio::pin!(deadline);

        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(|error| {
                    ExternalToolError::new(format!("accepting the target failed: {error}"))
                })?;
                info!("target connected from {peer}");
                forward_helper_stderr(stderr);
                Ok(LaunchedTarget { stream, helper: child })
            }
            status = child.wait() => {
                let code = status.ok().and_then(|status| status.code());
                Err(ExternalToolError::new("helper exited before the target connected")
                    .with_exit_code(code)
                    .with_stderr(drain_stderr(stderr).await))
            }
            _ = &mut deadline => {
                let _ = child.start_kill();
                Err(ExternalToolError::new(format!(
                    "target did not connect within {:?}",
                    self.ready_timeout
                ))
                .with_stderr(drain_stderr(stderr).await))
            }
        }
    }
}

/// Keep the live helper's stderr visible without blocking it.
fn forward_helper_stderr(stderr: Option<ChildStderr>) {
    if let Some(stderr) = stderr {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("helper: {line}");
            }
        });
    }
}

async fn drain_stderr(stderr: Option<ChildStderr>) -> String {
    let mut text = String::new();
    if let Some(mut stderr) = stderr {
        let _ = tokio::time::timeout(
            Duration::from_millis(500),
            stderr.read_to_string(&mut text),
        )
        .await;
    }
    text.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_split_and_substitution() {
        let launcher = HelperLauncher::new("run-emulator --wire {endpoint} --cold").unwrap();
        assert_eq!(
            launcher.resolved_args("127.0.0.1:4711"),
            vec!["--wire", "127.0.0.1:4711", "--cold"]
        );

        // Without a placeholder the endpoint lands at the end.
        let launcher = HelperLauncher::new("run-emulator --cold").unwrap();
        assert_eq!(
            launcher.resolved_args("127.0.0.1:4711"),
            vec!["--cold", "127.0.0.1:4711"]
        );

        assert!(HelperLauncher::new("   ").is_err());
    }

    #[tokio::test]
    async fn test_helper_exit_is_reported_with_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let launcher = HelperLauncher::new("false").unwrap();
        let error = launcher.launch(&listener, &endpoint).await.unwrap_err();
        assert_eq!(error.exit_code, Some(1));
        assert!(error.message.contains("exited"));
    }

    /// Writes an executable stand-in for a helper command. Bodies must
    /// ignore their arguments, including the appended endpoint.
    #[cfg(unix)]
    fn write_script(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("helper.sh");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_helper_stderr_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "#!/bin/sh\necho boom >&2\nexit 3\n");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let launcher = HelperLauncher::new(&script.to_string_lossy()).unwrap();
        let error = launcher.launch(&listener, &endpoint).await.unwrap_err();
        assert_eq!(error.exit_code, Some(3));
        assert_eq!(error.stderr.as_deref(), Some("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ready_timeout_kills_helper() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "#!/bin/sh\nsleep 30\n");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let launcher = HelperLauncher::new(&script.to_string_lossy())
            .unwrap()
            .with_ready_timeout(Duration::from_millis(200));
        let error = launcher.launch(&listener, &endpoint).await.unwrap_err();
        assert!(error.message.contains("did not connect"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_target_dialing_back_completes_launch() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(&dir, "#!/bin/sh\nsleep 30\n");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _stream = TcpStream::connect(addr).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let launcher = HelperLauncher::new(&script.to_string_lossy())
            .unwrap()
            .with_ready_timeout(Duration::from_secs(10));
        let target = launcher.launch(&listener, &addr.to_string()).await.unwrap();
        assert!(target.stream.peer_addr().is_ok());
    }
}
