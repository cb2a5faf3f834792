//! Invoker chain
//!
//! Executes a resolved host tree. Each host gets an invoker: group hosts
//! name a result node and recurse, instance hosts drive the
//! initialize/step/destroy lifecycle around their subtree, case hosts
//! run the body and classify the outcome. Odometer expansion falls out
//! of the nesting: an outer instance advances only after the whole inner
//! subtree ran for its current value, and inner instances are recreated
//! per outer step.
//!
//! Body failures never escape an invoker. They are recorded on the
//! result node and folded into the boolean pass verdict; only framework
//! invariant violations propagate further up.

#![allow(dead_code)]

pub mod context;

pub use context::{ActiveParam, LoggerBackend, NullBackend, RunEnv, TestContext, TestLogger};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::SettingsBag;
use crate::errors::TestError;
use crate::host::instance::TestInstance;
use crate::host::{HostKind, TestHost};
use crate::model::{
    ErrorInfo, NodeFlags, StatisticsEvent, TestName, TestNameBuilder, TestPath, TestResult,
    TestStatus,
};
use crate::session::TestConfiguration;
use crate::suite::CaseSpec;
use crate::utils::timer::Timer;

/// Session-wide inputs shared by every invoker in one run.
#[derive(Clone)]
pub struct RunContext {
    pub settings: Arc<SettingsBag>,
    pub config: Arc<TestConfiguration>,
    pub logger: TestLogger,
}

impl RunContext {
    /// Leaf timeout in effect, `None` when timeouts are disabled.
    fn effective_timeout(&self, declared: Option<u64>) -> Option<u64> {
        if self.settings.disable_timeouts() {
            None
        } else {
            Some(declared.unwrap_or_else(|| self.settings.default_timeout_ms()))
        }
    }

    fn body_context(&self, env: &RunEnv, logger: TestLogger, token: CancellationToken) -> TestContext {
        TestContext::new(
            env.name.clone(),
            env.snapshot(),
            logger,
            self.settings.clone(),
            self.config.clone(),
            token,
        )
    }
}

/// What one leaf invocation produced, before it becomes a status.
#[derive(Debug)]
pub enum Outcome {
    Success,
    /// Body returned false (`None`) or failed with an error.
    Failure(Option<TestError>),
    Canceled,
    TimedOut(u64),
}

/// One node of the executable chain. Returns true when everything below
/// it passed.
#[async_trait]
pub trait TestInvoker: Send + Sync {
    async fn invoke(
        &self,
        run: &RunContext,
        env: &mut RunEnv,
        parent: &mut TestResult,
        token: &CancellationToken,
    ) -> bool;
}

/// Build the invoker chain for a resolved subtree.
pub fn build_invoker(host: &Arc<TestHost>) -> Box<dyn TestInvoker> {
    build(host, None)
}

fn build(host: &Arc<TestHost>, inherited_timeout: Option<u64>) -> Box<dyn TestInvoker> {
    match &host.kind {
        HostKind::Case(case) => Box::new(CaseInvoker {
            host: host.clone(),
            case: case.clone(),
            timeout_ms: case.timeout_ms.or(inherited_timeout),
        }),
        _ => {
            let inherited = host.timeout_ms.or(inherited_timeout);
            Box::new(HostInvoker {
                host: host.clone(),
                inner: build_children(host, inherited),
            })
        }
    }
}

fn build_children(host: &Arc<TestHost>, inherited_timeout: Option<u64>) -> Box<dyn TestInvoker> {
    if host.children.len() == 1 {
        build(&host.children[0], inherited_timeout)
    } else {
        Box::new(CollectionInvoker {
            continue_on_error: host.flags.contains(NodeFlags::CONTINUE_ON_ERROR),
            invokers: host.children.iter().map(|c| build(c, inherited_timeout)).collect(),
        })
    }
}

/// Runs sibling invokers in declaration order.
pub struct CollectionInvoker {
    continue_on_error: bool,
    invokers: Vec<Box<dyn TestInvoker>>,
}

#[async_trait]
impl TestInvoker for CollectionInvoker {
    async fn invoke(
        &self,
        run: &RunContext,
        env: &mut RunEnv,
        parent: &mut TestResult,
        token: &CancellationToken,
    ) -> bool {
        let mut ok = true;
        for invoker in &self.invokers {
            if token.is_cancelled() {
                ok = false;
                break;
            }
            if !invoker.invoke(run, env, parent, token).await {
                ok = false;
                if !self.continue_on_error {
                    break;
                }
            }
        }
        ok
    }
}

/// Wraps the inner chain with one host's naming and lifecycle.
pub struct HostInvoker {
    host: Arc<TestHost>,
    inner: Box<dyn TestInvoker>,
}

#[async_trait]
impl TestInvoker for HostInvoker {
    async fn invoke(
        &self,
        run: &RunContext,
        env: &mut RunEnv,
        parent: &mut TestResult,
        token: &CancellationToken,
    ) -> bool {
        match TestInstance::for_host(&self.host) {
            Some(instance) => self.invoke_instance(instance, run, env, parent, token).await,
            None => self.invoke_group(run, env, parent, token).await,
        }
    }
}

impl HostInvoker {
    /// Pure naming node: new result child, recurse, restore the walk.
    async fn invoke_group(
        &self,
        run: &RunContext,
        env: &mut RunEnv,
        parent: &mut TestResult,
        token: &CancellationToken,
    ) -> bool {
        let saved_name = env.name.clone();
        let saved_path = env.path.clone();
        env.name = self.host.child_name(&env.name);
        env.path.push(self.host.path_node());

        let mut node = TestResult::new(env.name.clone());
        let ok = self.inner.invoke(run, env, &mut node, token).await;
        parent.add_child(node);

        env.name = saved_name;
        env.path = saved_path;
        ok
    }

    async fn invoke_instance(
        &self,
        mut instance: TestInstance,
        run: &RunContext,
        env: &mut RunEnv,
        parent: &mut TestResult,
        token: &CancellationToken,
    ) -> bool {
        let setup_ctx = run.body_context(env, run.logger.clone(), token.clone());
        if let Err(error) = instance.initialize(&setup_ctx).await {
            if token.is_cancelled() {
                parent.set_status(TestStatus::Canceled);
            } else {
                parent.add_error(error_info(&error));
                parent.set_status(TestStatus::Error);
            }
            if let Err(error) = instance.destroy(&setup_ctx).await {
                parent.add_error(error_info(&error));
            }
            return false;
        }

        let continue_on_error = self.host.flags.contains(NodeFlags::CONTINUE_ON_ERROR);
        let per_step_nodes = matches!(
            self.host.kind,
            HostKind::Values { .. } | HostKind::Repeat { .. }
        );
        let saved_name = env.name.clone();
        let saved_path = env.path.clone();
        let mut ok = true;

        while instance.has_next() {
            if token.is_cancelled() {
                ok = false;
                break;
            }
            instance.move_next();

            let mut builder = TestNameBuilder::from_name(&saved_name);
            let mut path_node = self.host.path_node();
            if let Some(parameter) = instance.current_parameter() {
                path_node.parameter = Some(parameter.value.clone());
                builder.push_parameter(parameter);
            }
            env.name = builder.build();
            env.path = saved_path.child(path_node);

            let pushed = match instance.current_value() {
                Some(value) => {
                    env.params.push(ActiveParam {
                        name: instance.name().to_owned(),
                        value,
                    });
                    true
                }
                None => false,
            };

            let step_ok = if per_step_nodes {
                let mut node = TestResult::new(env.name.clone());
                let step_ok = self.inner.invoke(run, env, &mut node, token).await;
                parent.add_child(node);
                step_ok
            } else {
                self.inner.invoke(run, env, parent, token).await
            };

            if pushed {
                env.params.pop();
            }
            if !step_ok {
                ok = false;
                if !continue_on_error {
                    break;
                }
            }
        }
        env.name = saved_name;
        env.path = saved_path;

        let teardown_ctx = run.body_context(env, run.logger.clone(), token.clone());
        if let Err(error) = instance.destroy(&teardown_ctx).await {
            if token.is_cancelled() {
                parent.set_status(TestStatus::Canceled);
            } else {
                parent.add_error(error_info(&error));
                if matches!(parent.status(), TestStatus::None | TestStatus::Success) {
                    parent.set_status(TestStatus::Error);
                }
            }
            ok = false;
        }
        ok
    }
}

/// Leaf invoker: runs the body under its timeout and classifies.
pub struct CaseInvoker {
    host: Arc<TestHost>,
    case: Arc<CaseSpec>,
    timeout_ms: Option<u64>,
}

#[async_trait]
impl TestInvoker for CaseInvoker {
    async fn invoke(
        &self,
        run: &RunContext,
        env: &mut RunEnv,
        parent: &mut TestResult,
        token: &CancellationToken,
    ) -> bool {
        let name = TestNameBuilder::from_name(&env.name)
            .rename(self.case.name.clone())
            .build();
        let path = env.path.child(self.host.path_node());

        if let Some(reason) = &self.case.ignored {
            let mut result = TestResult::with_status(name.clone(), TestStatus::Ignored);
            result.set_path(path);
            result.add_message(reason.clone());
            run.logger.statistics(StatisticsEvent::Finished {
                name,
                status: TestStatus::Ignored,
            });
            parent.add_child(result);
            return true;
        }
        if token.is_cancelled() {
            return false;
        }

        run.logger.statistics(StatisticsEvent::Running { name: name.clone() });

        let capture = Arc::new(Mutex::new(Vec::new()));
        let body_token = token.child_token();
        let ctx = run.body_context(
            &RunEnv {
                name: name.clone(),
                path: path.clone(),
                params: env.params.clone(),
            },
            run.logger.with_capture(capture.clone()),
            body_token.clone(),
        );

        let timer = Timer::start();
        let body = (self.case.run)(ctx);
        let outcome = match run.effective_timeout(self.timeout_ms) {
            Some(timeout_ms) => {
                tokio::select! {
                    biased;
                    result = body => classify(result),
                    _ = token.cancelled() => {
                        body_token.cancel();
                        Outcome::Canceled
                    }
                    _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                        body_token.cancel();
                        Outcome::TimedOut(timeout_ms)
                    }
                }
            }
            None => {
                tokio::select! {
                    biased;
                    result = body => classify(result),
                    _ = token.cancelled() => {
                        body_token.cancel();
                        Outcome::Canceled
                    }
                }
            }
        };
        let elapsed_ms = timer.elapsed_ms();
        let outcome = apply_expected_error(outcome, self.case.expected_error.as_deref());

        let mut result = TestResult::new(name.clone());
        result.set_path(path);
        result.set_elapsed_ms(elapsed_ms);
        if let Ok(mut entries) = capture.lock() {
            for entry in entries.drain(..) {
                result.add_log_entry(entry);
            }
        }
        let status = record_outcome(&mut result, outcome, self.case.unstable);
        run.logger.statistics(StatisticsEvent::Finished { name, status });
        parent.add_child(result);
        status == TestStatus::Success
    }
}

fn classify(result: Result<bool, TestError>) -> Outcome {
    match result {
        Ok(true) => Outcome::Success,
        Ok(false) => Outcome::Failure(None),
        Err(error) => Outcome::Failure(Some(error)),
    }
}

/// Reinterpret the outcome of a case that declares an expected error.
/// Cancellation is never reinterpreted.
fn apply_expected_error(outcome: Outcome, expected: Option<&str>) -> Outcome {
    let Some(expected) = expected else {
        return outcome;
    };
    match outcome {
        Outcome::Success => Outcome::Failure(Some(TestError::Assertion(format!(
            "expected an error of kind {expected}, but the test succeeded"
        )))),
        Outcome::Failure(None) => Outcome::Failure(Some(TestError::Assertion(format!(
            "expected an error of kind {expected}, but the test returned false"
        )))),
        Outcome::Failure(Some(error)) => {
            if error.kind() == expected {
                Outcome::Success
            } else {
                Outcome::Failure(Some(TestError::Assertion(format!(
                    "expected an error of kind {expected}, got {}: {error}",
                    error.kind()
                ))))
            }
        }
        other => other,
    }
}

fn record_outcome(result: &mut TestResult, outcome: Outcome, unstable: bool) -> TestStatus {
    let status = match outcome {
        Outcome::Success => TestStatus::Success,
        Outcome::Failure(error) => {
            let info = match &error {
                Some(error) => error_info(error),
                None => ErrorInfo::new("Assertion", "test returned false"),
            };
            result.add_error(info);
            if unstable {
                TestStatus::Unstable
            } else {
                TestStatus::Error
            }
        }
        Outcome::Canceled => TestStatus::Canceled,
        Outcome::TimedOut(timeout_ms) => {
            result.add_message(format!("test timed out after {timeout_ms} ms"));
            TestStatus::Canceled
        }
    };
    result.set_status(status);
    status
}

fn error_info(error: &TestError) -> ErrorInfo {
    ErrorInfo::new(error.kind(), error.to_string())
}

/// Run a resolved tree from its suite root, producing the root result.
pub async fn run_tree(
    run: &RunContext,
    tree: &Arc<TestHost>,
    token: &CancellationToken,
) -> TestResult {
    let invoker = build_invoker(tree);
    let mut env = RunEnv::new(TestName::default(), TestPath::new());
    let mut scratch = TestResult::new(TestName::default());
    invoker.invoke(run, &mut env, &mut scratch, token).await;

    let mut result = match scratch.children().first() {
        Some(root) => root.clone(),
        None => TestResult::new(TestName::default()),
    };
    if token.is_cancelled() && result.status() == TestStatus::None {
        result.set_status(TestStatus::Canceled);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::resolve_suite;
    use crate::suite::{
        hook_fn, test_fn, CaseSpec, FixtureSpec, ParamSpec, ParamValue, SuiteSpec,
    };

    async fn run_suite(suite: SuiteSpec, token: &CancellationToken) -> TestResult {
        let config = TestConfiguration::from_suite(&suite);
        let root = resolve_suite(&suite, &config).unwrap();
        let run = RunContext {
            settings: Arc::new(SettingsBag::new()),
            config: Arc::new(config),
            logger: TestLogger::new(Arc::new(NullBackend)),
        };
        run_tree(&run, &root, token).await
    }

    fn leaves(result: &TestResult) -> Vec<TestResult> {
        let mut leaves = Vec::new();
        result.visit_leaves(&mut |leaf| leaves.push(leaf.clone()));
        leaves
    }

    #[tokio::test]
    async fn test_two_dimensions_expand_in_odometer_order() {
        let seen: Arc<Mutex<Vec<(i64, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f")
                .with_param(ParamSpec::values(
                    "a",
                    vec![ParamValue::Int(1), ParamValue::Int(2)],
                ))
                .with_param(ParamSpec::values(
                    "b",
                    vec![
                        ParamValue::Str("x".to_owned()),
                        ParamValue::Str("y".to_owned()),
                    ],
                ))
                .with_case(CaseSpec::new(
                    "case",
                    test_fn(move |ctx| {
                        let sink = sink.clone();
                        async move {
                            let a = ctx.int_param("a").unwrap();
                            let b = ctx.str_param("b").unwrap().to_owned();
                            sink.lock().unwrap().push((a, b));
                            Ok(true)
                        }
                    }),
                )),
        );

        let result = run_suite(suite, &CancellationToken::new()).await;
        let order = seen.lock().unwrap().clone();
        // Last declared dimension varies fastest.
        assert_eq!(
            order,
            vec![
                (1, "x".to_owned()),
                (1, "y".to_owned()),
                (2, "x".to_owned()),
                (2, "y".to_owned()),
            ]
        );
        let leaves = leaves(&result);
        assert_eq!(leaves.len(), 4);
        assert!(leaves.iter().all(|l| l.status() == TestStatus::Success));
        assert_eq!(leaves[0].name().full_name(), "case(1,x)");
        assert_eq!(leaves[3].name().full_name(), "case(2,y)");
    }

    #[tokio::test]
    async fn test_teardown_runs_after_body_failure() {
        let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let setup_sink = events.clone();
        let teardown_sink = events.clone();
        let body_sink = events.clone();
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f")
                .with_setup(hook_fn(move |_ctx| {
                    let sink = setup_sink.clone();
                    async move {
                        sink.lock().unwrap().push("setup");
                        Ok(())
                    }
                }))
                .with_teardown(hook_fn(move |_ctx| {
                    let sink = teardown_sink.clone();
                    async move {
                        sink.lock().unwrap().push("teardown");
                        Ok(())
                    }
                }))
                .with_case(CaseSpec::new(
                    "failing",
                    test_fn(move |_ctx| {
                        let sink = body_sink.clone();
                        async move {
                            sink.lock().unwrap().push("body");
                            Err(TestError::Assertion("broken".to_owned()))
                        }
                    }),
                )),
        );

        let result = run_suite(suite, &CancellationToken::new()).await;
        assert_eq!(*events.lock().unwrap(), vec!["setup", "body", "teardown"]);
        let leaves = leaves(&result);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].status(), TestStatus::Error);
        assert_eq!(leaves[0].errors()[0].error_type, "Assertion");
    }

    #[tokio::test]
    async fn test_setup_failure_skips_cases_but_not_teardown() {
        let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let setup_sink = events.clone();
        let teardown_sink = events.clone();
        let body_sink = events.clone();
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f")
                .with_setup(hook_fn(move |_ctx| {
                    let sink = setup_sink.clone();
                    async move {
                        sink.lock().unwrap().push("setup");
                        Err(TestError::Assertion("setup broken".to_owned()))
                    }
                }))
                .with_teardown(hook_fn(move |_ctx| {
                    let sink = teardown_sink.clone();
                    async move {
                        sink.lock().unwrap().push("teardown");
                        Ok(())
                    }
                }))
                .with_case(CaseSpec::new(
                    "case",
                    test_fn(move |_ctx| {
                        let sink = body_sink.clone();
                        async move {
                            sink.lock().unwrap().push("body");
                            Ok(true)
                        }
                    }),
                )),
        );

        let result = run_suite(suite, &CancellationToken::new()).await;
        assert_eq!(*events.lock().unwrap(), vec!["setup", "teardown"]);
        let fixture = &result.children()[0];
        assert_eq!(fixture.status(), TestStatus::Error);
        assert!(fixture.children().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_reports_canceled() {
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f").with_case(
                CaseSpec::new(
                    "slow",
                    test_fn(|_ctx| async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(true)
                    }),
                )
                .with_timeout_ms(50),
            ),
        );

        let result = run_suite(suite, &CancellationToken::new()).await;
        let leaves = leaves(&result);
        assert_eq!(leaves[0].status(), TestStatus::Canceled);
        assert!(leaves[0].messages()[0].contains("timed out after 50 ms"));
    }

    #[tokio::test]
    async fn test_disabled_timeouts_let_slow_tests_finish() {
        let mut settings = SettingsBag::new();
        settings.set(crate::config::settings::KEY_DISABLE_TIMEOUTS, "true");
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f").with_case(
                CaseSpec::new(
                    "slow",
                    test_fn(|_ctx| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(true)
                    }),
                )
                .with_timeout_ms(10),
            ),
        );
        let config = TestConfiguration::from_suite(&suite);
        let root = resolve_suite(&suite, &config).unwrap();
        let run = RunContext {
            settings: Arc::new(settings),
            config: Arc::new(config),
            logger: TestLogger::new(Arc::new(NullBackend)),
        };
        let result = run_tree(&run, &root, &CancellationToken::new()).await;
        assert_eq!(leaves(&result)[0].status(), TestStatus::Success);
    }

    #[tokio::test]
    async fn test_expected_error_matrix() {
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f")
                .with_case(
                    CaseSpec::new(
                        "matching",
                        test_fn(|_ctx| async {
                            Err(TestError::Tagged {
                                kind: "Timeout".to_owned(),
                                message: "no response".to_owned(),
                            })
                        }),
                    )
                    .expecting_error("Timeout"),
                )
                .with_case(
                    CaseSpec::new(
                        "wrong_kind",
                        test_fn(|_ctx| async {
                            Err(TestError::Assertion("unrelated".to_owned()))
                        }),
                    )
                    .expecting_error("Timeout"),
                )
                .with_case(
                    CaseSpec::new("no_error", test_fn(|_ctx| async { Ok(true) }))
                        .expecting_error("Timeout"),
                ),
        );

        let result = run_suite(suite, &CancellationToken::new()).await;
        let leaves = leaves(&result);
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[0].status(), TestStatus::Success);
        assert_eq!(leaves[1].status(), TestStatus::Error);
        let message = &leaves[1].errors()[0].message;
        assert!(message.contains("Timeout") && message.contains("Assertion"));
        assert_eq!(leaves[2].status(), TestStatus::Error);
        assert!(leaves[2].errors()[0].message.contains("succeeded"));
    }

    #[tokio::test]
    async fn test_returning_false_is_an_assertion_error() {
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f")
                .with_case(CaseSpec::new("no", test_fn(|_ctx| async { Ok(false) }))),
        );
        let result = run_suite(suite, &CancellationToken::new()).await;
        let leaves = leaves(&result);
        assert_eq!(leaves[0].status(), TestStatus::Error);
        assert_eq!(leaves[0].errors()[0].error_type, "Assertion");
    }

    #[tokio::test]
    async fn test_cancellation_stops_later_cases() {
        let token = CancellationToken::new();
        let to_cancel = token.clone();
        let ran_second = Arc::new(Mutex::new(false));
        let second_sink = ran_second.clone();
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f")
                .with_case(CaseSpec::new(
                    "first",
                    test_fn(move |_ctx| {
                        let to_cancel = to_cancel.clone();
                        async move {
                            to_cancel.cancel();
                            tokio::time::sleep(Duration::from_secs(30)).await;
                            Ok(true)
                        }
                    }),
                ))
                .with_case(CaseSpec::new(
                    "second",
                    test_fn(move |_ctx| {
                        let sink = second_sink.clone();
                        async move {
                            *sink.lock().unwrap() = true;
                            Ok(true)
                        }
                    }),
                )),
        );

        let result = run_suite(suite, &token).await;
        assert!(!*ran_second.lock().unwrap());
        let leaves = leaves(&result);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].status(), TestStatus::Canceled);
        assert_eq!(result.status(), TestStatus::Canceled);
    }

    #[tokio::test]
    async fn test_ignored_case_reports_without_running() {
        let ran = Arc::new(Mutex::new(false));
        let sink = ran.clone();
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f").with_case(
                CaseSpec::new(
                    "skipped",
                    test_fn(move |_ctx| {
                        let sink = sink.clone();
                        async move {
                            *sink.lock().unwrap() = true;
                            Ok(true)
                        }
                    }),
                )
                .ignored_because("needs a live endpoint"),
            ),
        );

        let result = run_suite(suite, &CancellationToken::new()).await;
        assert!(!*ran.lock().unwrap());
        let leaves = leaves(&result);
        assert_eq!(leaves[0].status(), TestStatus::Ignored);
        assert_eq!(leaves[0].messages()[0], "needs a live endpoint");
    }

    #[tokio::test]
    async fn test_unstable_failure_reports_unstable() {
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f").with_case(
                CaseSpec::new("flaky", test_fn(|_ctx| async { Ok(false) })).marked_unstable(),
            ),
        );
        let result = run_suite(suite, &CancellationToken::new()).await;
        assert_eq!(leaves(&result)[0].status(), TestStatus::Unstable);
    }

    #[tokio::test]
    async fn test_repeat_runs_all_iterations() {
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f").with_case(
                CaseSpec::new(
                    "rep",
                    test_fn(move |ctx| {
                        let sink = sink.clone();
                        async move {
                            *sink.lock().unwrap() += 1;
                            // Fail the middle iteration only.
                            Ok(ctx.int_param("iteration") != Some(1))
                        }
                    }),
                )
                .with_repeat(3),
            ),
        );
        let result = run_suite(suite, &CancellationToken::new()).await;
        assert_eq!(*count.lock().unwrap(), 3);
        let statuses: Vec<TestStatus> = leaves(&result).iter().map(|l| l.status()).collect();
        assert_eq!(
            statuses,
            vec![TestStatus::Success, TestStatus::Error, TestStatus::Success]
        );
    }

    #[tokio::test]
    async fn test_statistics_events_in_raise_order() {
        struct Recorder(Mutex<Vec<String>>);
        impl LoggerBackend for Recorder {
            fn log(&self, _entry: &crate::model::LogEntry) {}
            fn statistics(&self, event: &StatisticsEvent) {
                let line = match event {
                    StatisticsEvent::Reset => "reset".to_owned(),
                    StatisticsEvent::Running { name } => format!("running {}", name.full_name()),
                    StatisticsEvent::Finished { name, status } => {
                        format!("finished {} {}", name.full_name(), status.as_str())
                    }
                };
                self.0.lock().unwrap().push(line);
            }
        }

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f")
                .with_case(CaseSpec::new("one", test_fn(|_ctx| async { Ok(true) })))
                .with_case(CaseSpec::new("two", test_fn(|_ctx| async { Ok(false) }))),
        );
        let config = TestConfiguration::from_suite(&suite);
        let root = resolve_suite(&suite, &config).unwrap();
        let run = RunContext {
            settings: Arc::new(SettingsBag::new()),
            config: Arc::new(config),
            logger: TestLogger::new(recorder.clone()),
        };
        run_tree(&run, &root, &CancellationToken::new()).await;

        let lines = recorder.0.lock().unwrap().clone();
        assert_eq!(
            lines,
            vec![
                "running one",
                "finished one Success",
                "running two",
                "finished two Error",
            ]
        );
    }

    #[tokio::test]
    async fn test_captured_log_entries_land_on_the_leaf() {
        let suite = SuiteSpec::new("suite").with_fixture(
            FixtureSpec::new("f").with_case(CaseSpec::new(
                "logging",
                test_fn(|ctx| async move {
                    ctx.log_message("starting");
                    ctx.log_debug(2, "detail");
                    Ok(true)
                }),
            )),
        );
        let result = run_suite(suite, &CancellationToken::new()).await;
        let leaves = leaves(&result);
        let entries = leaves[0].log_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "starting");
        assert_eq!(entries[1].level, 2);
    }
}
