//! Built-in self-check suite
//!
//! Ships with the binary so a fresh install has something to run and so
//! remote setups can be smoke-tested end to end. The cases cover every
//! host kind and pass with the default selection.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::TestError;
use crate::invoke::TestContext;
use crate::session::TestConfiguration;
use crate::suite::{
    hook_fn, test_fn, CaseSpec, FeatureSpec, FixtureSpec, FixtureValue, InstanceFactory,
    ParamSpec, ParamType, ParamValue, ParameterProvider, SuiteSpec,
};

/// Rolling checksum used by the demo bodies.
fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |acc, byte| acc.wrapping_mul(31).wrapping_add(*byte as u32))
}

/// In-memory echo endpoint handed out by [`ChannelFactory`].
#[derive(Debug)]
pub struct EchoChannel {
    port: i64,
    queue: Mutex<VecDeque<String>>,
}

impl EchoChannel {
    pub fn port(&self) -> i64 {
        self.port
    }

    pub fn send(&self, text: &str) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(text.to_owned());
        }
    }

    pub fn recv(&self) -> Option<String> {
        self.queue.lock().ok()?.pop_front()
    }
}

impl FixtureValue for EchoChannel {
    fn type_name(&self) -> &'static str {
        "EchoChannel"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Creates one fresh [`EchoChannel`] per iteration, bound to the port
/// parameter in scope.
struct ChannelFactory;

#[async_trait]
impl InstanceFactory for ChannelFactory {
    fn type_name(&self) -> &'static str {
        "EchoChannel"
    }

    async fn create(&self, ctx: &TestContext) -> Result<Arc<dyn FixtureValue>, TestError> {
        let port = ctx
            .int_param("port")
            .ok_or_else(|| TestError::tagged("Setup", "no port bound for the channel"))?;
        ctx.log_debug(2, format!("opening echo channel on port {port}"));
        Ok(Arc::new(EchoChannel {
            port,
            queue: Mutex::new(VecDeque::new()),
        }))
    }

    async fn destroy(
        &self,
        ctx: &TestContext,
        value: Arc<dyn FixtureValue>,
    ) -> Result<(), TestError> {
        if let Some(channel) = value.as_any().downcast_ref::<EchoChannel>() {
            ctx.log_debug(2, format!("closing echo channel on port {}", channel.port));
        }
        Ok(())
    }
}

/// Shared read-only instance reused by every iteration.
#[derive(Debug)]
pub struct Alphabet {
    pub letters: String,
}

impl FixtureValue for Alphabet {
    fn type_name(&self) -> &'static str {
        "Alphabet"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Well-known ports; the `tls` filter narrows to the encrypted one.
struct PortProvider;

impl ParameterProvider for PortProvider {
    fn serves(&self) -> &str {
        "Port"
    }

    fn values(&self, _config: &TestConfiguration, filter: Option<&str>) -> Vec<ParamValue> {
        match filter {
            Some("tls") => vec![ParamValue::Int(443)],
            _ => vec![
                ParamValue::Int(80),
                ParamValue::Int(443),
                ParamValue::Int(8080),
            ],
        }
    }
}

/// Payload sizes; the `slow` feature adds a large one.
struct LengthProvider;

impl ParameterProvider for LengthProvider {
    fn serves(&self) -> &str {
        "Int"
    }

    fn values(&self, config: &TestConfiguration, _filter: Option<&str>) -> Vec<ParamValue> {
        let mut lengths = vec![0i64, 1, 64];
        if config.is_feature_enabled("slow").unwrap_or(false) {
            lengths.push(4096);
        }
        lengths.into_iter().map(ParamValue::Int).collect()
    }
}

fn transfer_fixture() -> FixtureSpec {
    FixtureSpec::new("transfer")
        .with_category("quick")
        .with_setup(hook_fn(|ctx| async move {
            ctx.log_message("transfer: preparing scratch state");
            Ok(())
        }))
        .with_teardown(hook_fn(|ctx| async move {
            ctx.log_message("transfer: scratch state dropped");
            Ok(())
        }))
        .with_param(ParamSpec::auto("useTls", ParamType::Bool))
        .with_case(
            CaseSpec::new(
                "echo",
                test_fn(|ctx| async move {
                    let payload = ctx
                        .str_param("payload")
                        .ok_or_else(|| TestError::tagged("Setup", "payload not bound"))?
                        .to_owned();
                    let secured = ctx.bool_param("useTls").unwrap_or(false);
                    ctx.log_message(format!("echoing {payload:?} (tls: {secured})"));
                    let twice: String = payload.chars().rev().collect::<String>().chars().rev().collect();
                    Ok(twice == payload)
                }),
            )
            .with_param(ParamSpec::values(
                "payload",
                vec![
                    ParamValue::Str("ping".to_owned()),
                    ParamValue::Str("pong".to_owned()),
                ],
            )),
        )
        .with_case(
            CaseSpec::new(
                "rejects_oversize",
                test_fn(|_ctx| async move {
                    Err(TestError::tagged("Overflow", "frame larger than 64 KiB"))
                }),
            )
            .expecting_error("Overflow"),
        )
}

fn checksum_fixture() -> FixtureSpec {
    FixtureSpec::new("checksum")
        .with_category("quick")
        .with_provider(Arc::new(LengthProvider))
        .with_param(ParamSpec::auto(
            "mode",
            ParamType::Enum {
                name: "Mode",
                values: &["Plain", "Rolling"],
            },
        ))
        .with_case(
            CaseSpec::new(
                "stable",
                test_fn(|ctx| async move {
                    let mode = ctx
                        .str_param("mode")
                        .ok_or_else(|| TestError::tagged("Setup", "mode not bound"))?;
                    let sample = b"selfcheck";
                    let (a, b) = match mode {
                        "Plain" => (sample.len() as u32, sample.len() as u32),
                        _ => (checksum(sample), checksum(sample)),
                    };
                    if a != b {
                        return Err(TestError::assertion("same input produced different sums"));
                    }
                    Ok(checksum(b"ping") != checksum(b"pong"))
                }),
            )
            .with_repeat(3),
        )
        .with_case(CaseSpec::new(
            "zero_filled",
            test_fn(|ctx| async move {
                let length = ctx
                    .int_param("length")
                    .ok_or_else(|| TestError::tagged("Setup", "length not bound"))?;
                let data = vec![0u8; length as usize];
                // All-zero input folds to zero at every length.
                Ok(checksum(&data) == 0)
            }),
        )
        .with_param(ParamSpec::auto("length", ParamType::Int)))
        .with_case(
            CaseSpec::new(
                "seeded",
                test_fn(|ctx| async move {
                    let seed = ctx.int_param("seed").unwrap_or(0);
                    Ok(checksum(&seed.to_le_bytes()) == checksum(&seed.to_le_bytes()))
                }),
            )
            .with_param(ParamSpec::fixed("seed", ParamValue::Int(7)).hidden()),
        )
}

fn channel_fixture() -> FixtureSpec {
    FixtureSpec::new("channel")
        .with_category("full")
        .with_provider(Arc::new(PortProvider))
        .with_factory(Arc::new(ChannelFactory))
        .with_case(
            CaseSpec::new(
                "connect",
                test_fn(|ctx| async move {
                    let channel = ctx
                        .instance::<EchoChannel>("conn")
                        .ok_or_else(|| TestError::tagged("Setup", "channel not bound"))?;
                    channel.send("ping");
                    ctx.log_message(format!("connected on port {}", channel.port()));
                    Ok(channel.recv().as_deref() == Some("ping") && channel.recv().is_none())
                }),
            )
            .with_timeout_ms(5_000)
            .with_param(ParamSpec::provider("port", Arc::new(PortProvider)))
            .with_param(ParamSpec::auto("conn", ParamType::Custom { type_name: "EchoChannel" })),
        )
        .with_case(
            CaseSpec::new(
                "secure_port_only",
                test_fn(|ctx| async move { Ok(ctx.int_param("port") == Some(443)) }),
            )
            .with_param(ParamSpec::provider("port", Arc::new(PortProvider)).with_filter("tls")),
        )
        .with_case(
            CaseSpec::new(
                "shared_alphabet",
                test_fn(|ctx| async move {
                    let alphabet = ctx
                        .instance::<Alphabet>("alphabet")
                        .ok_or_else(|| TestError::tagged("Setup", "alphabet not bound"))?;
                    Ok(alphabet.letters.contains('a') && alphabet.letters.len() == 6)
                }),
            )
            .with_param(ParamSpec::capture(
                "alphabet",
                Arc::new(Alphabet {
                    letters: "abcdef".to_owned(),
                }),
            )),
        )
        .with_case(
            CaseSpec::new(
                "burst",
                test_fn(|ctx| async move {
                    let mut sum = 0u32;
                    for chunk in 0..512u32 {
                        sum = sum.wrapping_add(checksum(&chunk.to_le_bytes()));
                        if chunk % 128 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                    ctx.log_debug(1, format!("burst folded to {sum:08x}"));
                    Ok(sum != 0)
                }),
            )
            .with_feature("slow")
            .with_repeat(5)
            .with_timeout_ms(30_000),
        )
        .with_case(
            CaseSpec::new(
                "drain_latency",
                test_fn(|ctx| async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    ctx.log_debug(2, "drained within the deadline");
                    Ok(true)
                }),
            )
            .marked_unstable()
            .with_timeout_ms(10_000),
        )
        .with_case(
            CaseSpec::new(
                "peer_handshake",
                test_fn(|_ctx| async move {
                    Err(TestError::tagged("Connection", "no peer configured"))
                }),
            )
            .ignored_because("requires a reachable peer"),
        )
}

/// The suite compiled into the binary.
pub fn selfcheck_suite() -> SuiteSpec {
    SuiteSpec::new("selfcheck")
        .with_feature(FeatureSpec::new("slow", "long running stress cases", false))
        .with_feature(FeatureSpec::constant("builtin", "compiled-in suite", true))
        .with_fixture(transfer_fixture())
        .with_fixture(checksum_fixture())
        .with_fixture(channel_fixture())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    use crate::config::SettingsBag;
    use crate::model::{ResultSummary, TestStatus};
    use crate::session::LocalSession;

    #[tokio::test]
    async fn test_selfcheck_runs_green_by_default() {
        let mut session = LocalSession::new(selfcheck_suite(), SettingsBag::new()).unwrap();
        let result = session.run_all(&CancellationToken::new()).await.unwrap();

        let summary = ResultSummary::from_result(&result);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.canceled, 0);
        assert_eq!(summary.ignored, 1);
        assert!(summary.total > 20);
        assert_eq!(summary.passed, summary.total - summary.ignored);
    }

    #[tokio::test]
    async fn test_slow_feature_adds_cases() {
        let mut session = LocalSession::new(selfcheck_suite(), SettingsBag::new()).unwrap();
        let baseline = ResultSummary::from_result(
            &session.run_all(&CancellationToken::new()).await.unwrap(),
        );

        let mut session = LocalSession::new(selfcheck_suite(), SettingsBag::new()).unwrap();
        session
            .configuration_mut()
            .apply_feature_tokens("+slow")
            .unwrap();
        let widened = ResultSummary::from_result(
            &session.run_all(&CancellationToken::new()).await.unwrap(),
        );

        assert!(widened.total > baseline.total);
        assert_eq!(widened.errors, 0);
    }

    #[tokio::test]
    async fn test_quick_category_excludes_channel_fixture() {
        let mut session = LocalSession::new(selfcheck_suite(), SettingsBag::new()).unwrap();
        session.configuration_mut().select_category("quick").unwrap();
        let result = session.run_all(&CancellationToken::new()).await.unwrap();

        let mut seen = Vec::new();
        result.visit(&mut |node| seen.push(node.name().name().to_owned()));
        assert!(!seen.iter().any(|n| n == "connect"));
        assert!(seen.iter().any(|n| n == "echo"));

        let summary = ResultSummary::from_result(&result);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.ignored, 0);
    }

    #[tokio::test]
    async fn test_single_leaf_reruns_pinned() {
        let mut session = LocalSession::new(selfcheck_suite(), SettingsBag::new()).unwrap();
        let path = session
            .find_case("channel.secure_port_only")
            .unwrap()
            .unwrap();
        let result = session.run(&path, &CancellationToken::new()).await.unwrap();

        let mut leaves = 0;
        result.visit_leaves(&mut |leaf| {
            leaves += 1;
            assert_eq!(leaf.status(), TestStatus::Success);
            assert_eq!(leaf.name().full_name(), "secure_port_only(443)");
        });
        assert_eq!(leaves, 1);
    }
}
