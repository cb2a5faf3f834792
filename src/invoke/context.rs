//! Run-time context handed to test bodies, hooks and factories
//!
//! A `TestContext` is a cheap clone: the name and parameter snapshot it
//! carries belong to one invocation step, everything else is shared
//! session state behind `Arc`s.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::SettingsBag;
use crate::errors::TestError;
use crate::model::{LogEntry, StatisticsEvent, TestName, TestPath};
use crate::session::TestConfiguration;
use crate::suite::{FixtureValue, ParamValue};

/// Live value bound to a parameter slot for the current step.
#[derive(Clone, Debug)]
pub enum ActiveValue {
    Param(ParamValue),
    Instance(Arc<dyn FixtureValue>),
}

impl ActiveValue {
    pub fn as_param(&self) -> Option<&ParamValue> {
        match self {
            ActiveValue::Param(value) => Some(value),
            ActiveValue::Instance(_) => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Arc<dyn FixtureValue>> {
        match self {
            ActiveValue::Param(_) => None,
            ActiveValue::Instance(value) => Some(value),
        }
    }

    /// Serialized form, when the value has one.
    pub fn wire_value(&self) -> Option<String> {
        match self {
            ActiveValue::Param(value) => Some(value.to_wire()),
            ActiveValue::Instance(value) => value.wire_value(),
        }
    }
}

/// One bound parameter in the invocation environment.
#[derive(Clone, Debug)]
pub struct ActiveParam {
    pub name: String,
    pub value: ActiveValue,
}

/// Mutable walk state threaded through the invoker chain. Hosts push
/// their contribution on entry and restore it on exit.
#[derive(Clone, Debug)]
pub struct RunEnv {
    pub name: TestName,
    pub path: TestPath,
    pub params: Vec<ActiveParam>,
}

impl RunEnv {
    pub fn new(name: TestName, path: TestPath) -> Self {
        Self {
            name,
            path,
            params: Vec::new(),
        }
    }

    /// Immutable snapshot of the bound parameters for one body call.
    pub fn snapshot(&self) -> Arc<Vec<ActiveParam>> {
        Arc::new(self.params.clone())
    }
}

/// Consumes log entries and statistics events in raise order.
pub trait LoggerBackend: Send + Sync {
    fn log(&self, entry: &LogEntry);
    fn statistics(&self, event: &StatisticsEvent);
}

/// Backend that drops everything.
pub struct NullBackend;

impl LoggerBackend for NullBackend {
    fn log(&self, _entry: &LogEntry) {}
    fn statistics(&self, _event: &StatisticsEvent) {}
}

/// Forwards log entries to the session backend and, while a leaf runs,
/// captures them for the leaf result.
#[derive(Clone)]
pub struct TestLogger {
    backend: Arc<dyn LoggerBackend>,
    capture: Option<Arc<Mutex<Vec<LogEntry>>>>,
}

impl TestLogger {
    pub fn new(backend: Arc<dyn LoggerBackend>) -> Self {
        Self {
            backend,
            capture: None,
        }
    }

    pub fn backend(&self) -> &Arc<dyn LoggerBackend> {
        &self.backend
    }

    /// Same backend, with entries additionally captured into `sink`.
    pub fn with_capture(&self, sink: Arc<Mutex<Vec<LogEntry>>>) -> Self {
        Self {
            backend: self.backend.clone(),
            capture: Some(sink),
        }
    }

    pub fn log(&self, entry: LogEntry) {
        if let Some(capture) = &self.capture {
            if let Ok(mut entries) = capture.lock() {
                entries.push(entry.clone());
            }
        }
        self.backend.log(&entry);
    }

    pub fn message(&self, text: impl Into<String>) {
        self.log(LogEntry::message(text));
    }

    pub fn debug(&self, level: i32, text: impl Into<String>) {
        self.log(LogEntry::debug(level, text));
    }

    pub fn error(&self, error: &TestError) {
        self.log(LogEntry::error(error.to_string(), Some(format!("{error:?}"))));
    }

    pub fn statistics(&self, event: StatisticsEvent) {
        self.backend.statistics(&event);
    }
}

/// Everything a test body or hook can reach while it runs.
#[derive(Clone)]
pub struct TestContext {
    name: TestName,
    params: Arc<Vec<ActiveParam>>,
    logger: TestLogger,
    settings: Arc<SettingsBag>,
    config: Arc<TestConfiguration>,
    token: CancellationToken,
}

impl TestContext {
    pub fn new(
        name: TestName,
        params: Arc<Vec<ActiveParam>>,
        logger: TestLogger,
        settings: Arc<SettingsBag>,
        config: Arc<TestConfiguration>,
        token: CancellationToken,
    ) -> Self {
        Self {
            name,
            params,
            logger,
            settings,
            config,
            token,
        }
    }

    pub fn name(&self) -> &TestName {
        &self.name
    }

    pub fn settings(&self) -> &SettingsBag {
        &self.settings
    }

    pub fn logger(&self) -> &TestLogger {
        &self.logger
    }

    /// Cancelled when the run is aborted or this test's timeout fires.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.config.is_feature_enabled(name).unwrap_or(false)
    }

    pub fn param(&self, name: &str) -> Option<&ActiveValue> {
        self.params
            .iter()
            .rev()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    pub fn bool_param(&self, name: &str) -> Option<bool> {
        self.param(name)?.as_param()?.as_bool()
    }

    pub fn int_param(&self, name: &str) -> Option<i64> {
        self.param(name)?.as_param()?.as_int()
    }

    pub fn str_param(&self, name: &str) -> Option<&str> {
        self.param(name)?.as_param()?.as_str()
    }

    /// Downcast a bound fixture instance to its concrete type.
    pub fn instance<T: 'static>(&self, name: &str) -> Option<&T> {
        self.param(name)?.as_instance()?.as_any().downcast_ref()
    }

    pub fn log_message(&self, text: impl Into<String>) {
        self.logger.message(text);
    }

    pub fn log_debug(&self, level: i32, text: impl Into<String>) {
        self.logger.debug(level, text);
    }

    pub fn log_error(&self, error: &TestError) {
        self.logger.error(error);
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> TestContext {
    use crate::suite::SuiteSpec;
    TestContext::new(
        TestName::new("test"),
        Arc::new(Vec::new()),
        TestLogger::new(Arc::new(NullBackend)),
        Arc::new(SettingsBag::new()),
        Arc::new(TestConfiguration::from_suite(&SuiteSpec::new("test"))),
        CancellationToken::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_lookup_prefers_innermost() {
        let params = vec![
            ActiveParam {
                name: "n".to_owned(),
                value: ActiveValue::Param(ParamValue::Int(1)),
            },
            ActiveParam {
                name: "n".to_owned(),
                value: ActiveValue::Param(ParamValue::Int(2)),
            },
        ];
        let ctx = test_context();
        let ctx = TestContext {
            params: Arc::new(params),
            ..ctx
        };
        assert_eq!(ctx.int_param("n"), Some(2));
        assert_eq!(ctx.int_param("missing"), None);
    }

    #[test]
    fn test_logger_capture_and_forward() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let logger = TestLogger::new(Arc::new(NullBackend)).with_capture(sink.clone());
        logger.message("one");
        logger.debug(2, "two");
        let entries = sink.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "one");
        assert_eq!(entries[1].level, 2);
    }

    #[test]
    fn test_active_value_wire_forms() {
        let value = ActiveValue::Param(ParamValue::Bool(true));
        assert_eq!(value.wire_value(), Some("true".to_owned()));
        assert!(value.as_instance().is_none());
    }
}
