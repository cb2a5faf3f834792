//! Declarative test suite registry
//!
//! Test content is registered as explicit specs instead of being
//! discovered by runtime inspection: a suite declares fixtures, fixtures
//! declare parameters and cases, and every parameter slot names where
//! its values come from. Resolution walks these specs once per session.

#![allow(dead_code)]

pub mod builtin;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::errors::TestError;
use crate::invoke::TestContext;
use crate::model::NodeFlags;
use crate::session::TestConfiguration;

/// Async test body. Returning `false` fails the test.
pub type TestFn =
    Arc<dyn Fn(TestContext) -> BoxFuture<'static, Result<bool, TestError>> + Send + Sync>;

/// Async fixture hook, run by setup and teardown.
pub type HookFn =
    Arc<dyn Fn(TestContext) -> BoxFuture<'static, Result<(), TestError>> + Send + Sync>;

/// Wrap an async function as a test body.
pub fn test_fn<F, Fut>(f: F) -> TestFn
where
    F: Fn(TestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, TestError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Wrap an async function as a fixture hook.
pub fn hook_fn<F, Fut>(f: F) -> HookFn
where
    F: Fn(TestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TestError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Concrete value of a parameter slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Enum(&'static str),
}

impl ParamValue {
    /// Serialized form used on names and paths.
    pub fn to_wire(&self) -> String {
        match self {
            ParamValue::Bool(v) => v.to_string(),
            ParamValue::Int(v) => v.to_string(),
            ParamValue::Str(v) => v.clone(),
            ParamValue::Enum(v) => (*v).to_string(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v.as_str()),
            ParamValue::Enum(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// Declared type of a parameter slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Int,
    Str,
    Enum {
        name: &'static str,
        values: &'static [&'static str],
    },
    /// Instance-producing slot; requires a factory or provider.
    Custom { type_name: &'static str },
}

impl ParamType {
    /// Tag matched against provider declarations.
    pub fn type_tag(&self) -> &str {
        match self {
            ParamType::Bool => "Bool",
            ParamType::Int => "Int",
            ParamType::Str => "String",
            ParamType::Enum { name, .. } => name,
            ParamType::Custom { type_name } => type_name,
        }
    }

    /// Parse a serialized value back, used when re-resolving paths.
    pub fn parse_wire(&self, text: &str) -> Option<ParamValue> {
        match self {
            ParamType::Bool => match text {
                "true" => Some(ParamValue::Bool(true)),
                "false" => Some(ParamValue::Bool(false)),
                _ => None,
            },
            ParamType::Int => text.parse().ok().map(ParamValue::Int),
            ParamType::Str => Some(ParamValue::Str(text.to_owned())),
            ParamType::Enum { values, .. } => values
                .iter()
                .copied()
                .find(|v| *v == text)
                .map(ParamValue::Enum),
            ParamType::Custom { .. } => None,
        }
    }
}

/// Arbitrary host-constructed instance handed to test bodies.
pub trait FixtureValue: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &'static str;

    /// Serialized form used on test paths. Instances without one cannot
    /// be pinned to a path.
    fn wire_value(&self) -> Option<String> {
        None
    }

    fn as_any(&self) -> &dyn std::any::Any;
}

/// Creates and tears down custom fixture instances, once per iteration.
#[async_trait]
pub trait InstanceFactory: Send + Sync {
    fn type_name(&self) -> &'static str;

    async fn create(&self, ctx: &TestContext) -> Result<Arc<dyn FixtureValue>, TestError>;

    async fn destroy(
        &self,
        ctx: &TestContext,
        value: Arc<dyn FixtureValue>,
    ) -> Result<(), TestError> {
        let _ = (ctx, value);
        Ok(())
    }
}

/// Supplies the values a parameter slot enumerates.
pub trait ParameterProvider: Send + Sync {
    /// Type tag this provider serves, matched against parameter slots.
    fn serves(&self) -> &str;

    fn values(&self, config: &TestConfiguration, filter: Option<&str>) -> Vec<ParamValue>;
}

/// Where a parameter slot gets its values from.
#[derive(Clone)]
pub enum ParamSource {
    /// Resolved by the fallback rules for the declared type.
    Auto(ParamType),
    Values(Vec<ParamValue>),
    Fixed(ParamValue),
    Provider {
        provider: Arc<dyn ParameterProvider>,
        filter: Option<String>,
    },
    /// Reuses one previously captured instance.
    Capture(Arc<dyn FixtureValue>),
    /// Creates a fresh instance per iteration.
    Factory(Arc<dyn InstanceFactory>),
}

impl fmt::Debug for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSource::Auto(ty) => write!(f, "Auto({})", ty.type_tag()),
            ParamSource::Values(values) => write!(f, "Values({})", values.len()),
            ParamSource::Fixed(value) => write!(f, "Fixed({value})"),
            ParamSource::Provider { provider, .. } => write!(f, "Provider({})", provider.serves()),
            ParamSource::Capture(value) => write!(f, "Capture({})", value.type_name()),
            ParamSource::Factory(factory) => write!(f, "Factory({})", factory.type_name()),
        }
    }
}

/// One declared parameter slot.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: String,
    pub hidden: bool,
    pub source: ParamSource,
}

impl ParamSpec {
    pub fn auto(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            source: ParamSource::Auto(param_type),
        }
    }

    pub fn values(name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            source: ParamSource::Values(values),
        }
    }

    pub fn fixed(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            source: ParamSource::Fixed(value),
        }
    }

    pub fn provider(name: impl Into<String>, provider: Arc<dyn ParameterProvider>) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            source: ParamSource::Provider {
                provider,
                filter: None,
            },
        }
    }

    pub fn capture(name: impl Into<String>, value: Arc<dyn FixtureValue>) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            source: ParamSource::Capture(value),
        }
    }

    pub fn factory(name: impl Into<String>, factory: Arc<dyn InstanceFactory>) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            source: ParamSource::Factory(factory),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        if let ParamSource::Provider {
            filter: slot_filter,
            ..
        } = &mut self.source
        {
            *slot_filter = Some(filter.into());
        }
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// One declared test case.
#[derive(Clone)]
pub struct CaseSpec {
    pub name: String,
    pub category: Option<String>,
    pub feature: Option<String>,
    pub timeout_ms: Option<u64>,
    pub repeat: Option<u32>,
    pub params: Vec<ParamSpec>,
    /// `TestError` kind tag the body is expected to fail with. An exact
    /// tag match succeeds; anything else is an error naming both tags.
    pub expected_error: Option<String>,
    /// Skip reason; the case reports `Ignored` without running.
    pub ignored: Option<String>,
    /// Known-flaky marker; failures report `Unstable` instead of `Error`.
    pub unstable: bool,
    pub flags: NodeFlags,
    pub run: TestFn,
}

impl CaseSpec {
    pub fn new(name: impl Into<String>, run: TestFn) -> Self {
        Self {
            name: name.into(),
            category: None,
            feature: None,
            timeout_ms: None,
            repeat: None,
            params: Vec::new(),
            expected_error: None,
            ignored: None,
            unstable: false,
            flags: NodeFlags::BROWSABLE,
            run,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_repeat(mut self, count: u32) -> Self {
        self.repeat = Some(count);
        self
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn expecting_error(mut self, kind: impl Into<String>) -> Self {
        self.expected_error = Some(kind.into());
        self
    }

    pub fn ignored_because(mut self, reason: impl Into<String>) -> Self {
        self.ignored = Some(reason.into());
        self
    }

    pub fn marked_unstable(mut self) -> Self {
        self.unstable = true;
        self
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl fmt::Debug for CaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseSpec")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("feature", &self.feature)
            .field("params", &self.params.len())
            .finish()
    }
}

/// One declared fixture: shared parameters, hooks and cases.
#[derive(Clone)]
pub struct FixtureSpec {
    pub name: String,
    pub category: Option<String>,
    pub feature: Option<String>,
    pub timeout_ms: Option<u64>,
    pub params: Vec<ParamSpec>,
    pub providers: Vec<Arc<dyn ParameterProvider>>,
    pub factories: Vec<Arc<dyn InstanceFactory>>,
    pub setup: Option<HookFn>,
    pub teardown: Option<HookFn>,
    pub cases: Vec<CaseSpec>,
    pub flags: NodeFlags,
}

impl FixtureSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            feature: None,
            timeout_ms: None,
            params: Vec::new(),
            providers: Vec::new(),
            factories: Vec::new(),
            setup: None,
            teardown: None,
            cases: Vec::new(),
            flags: NodeFlags::BROWSABLE | NodeFlags::CONTINUE_ON_ERROR,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ParameterProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_factory(mut self, factory: Arc<dyn InstanceFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    pub fn with_setup(mut self, hook: HookFn) -> Self {
        self.setup = Some(hook);
        self
    }

    pub fn with_teardown(mut self, hook: HookFn) -> Self {
        self.teardown = Some(hook);
        self
    }

    pub fn with_case(mut self, case: CaseSpec) -> Self {
        self.cases.push(case);
        self
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl fmt::Debug for FixtureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureSpec")
            .field("name", &self.name)
            .field("cases", &self.cases.len())
            .finish()
    }
}

/// One declared feature toggle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureSpec {
    pub name: String,
    pub description: String,
    pub default_on: bool,
    /// Fixed value; constant features cannot be toggled.
    pub constant: Option<bool>,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, default_on: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default_on,
            constant: None,
        }
    }

    pub fn constant(
        name: impl Into<String>,
        description: impl Into<String>,
        value: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default_on: value,
            constant: Some(value),
        }
    }
}

/// A complete declared test suite.
#[derive(Clone)]
pub struct SuiteSpec {
    pub name: String,
    pub fixtures: Vec<FixtureSpec>,
    pub features: Vec<FeatureSpec>,
}

impl SuiteSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixtures: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn with_fixture(mut self, fixture: FixtureSpec) -> Self {
        self.fixtures.push(fixture);
        self
    }

    pub fn with_feature(mut self, feature: FeatureSpec) -> Self {
        self.features.push(feature);
        self
    }

    /// All category names declared by fixtures and cases, sorted.
    pub fn categories(&self) -> Vec<String> {
        let mut categories = BTreeSet::new();
        for fixture in &self.fixtures {
            if let Some(category) = &fixture.category {
                categories.insert(category.clone());
            }
            for case in &fixture.cases {
                if let Some(category) = &case.category {
                    categories.insert(category.clone());
                }
            }
        }
        categories.into_iter().collect()
    }
}

impl fmt::Debug for SuiteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteSpec")
            .field("name", &self.name)
            .field("fixtures", &self.fixtures.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_value_wire_forms() {
        assert_eq!(ParamValue::Bool(true).to_wire(), "true");
        assert_eq!(ParamValue::Int(-3).to_wire(), "-3");
        assert_eq!(ParamValue::Enum("V12").to_wire(), "V12");
    }

    #[test]
    fn test_param_type_parse_wire() {
        assert_eq!(ParamType::Bool.parse_wire("true"), Some(ParamValue::Bool(true)));
        assert_eq!(ParamType::Bool.parse_wire("yes"), None);
        assert_eq!(ParamType::Int.parse_wire("42"), Some(ParamValue::Int(42)));
        let version = ParamType::Enum {
            name: "Version",
            values: &["V10", "V11"],
        };
        assert_eq!(version.parse_wire("V11"), Some(ParamValue::Enum("V11")));
        assert_eq!(version.parse_wire("V12"), None);
        let custom = ParamType::Custom { type_name: "Conn" };
        assert_eq!(custom.parse_wire("anything"), None);
    }

    #[test]
    fn test_suite_categories_sorted_unique() {
        let suite = SuiteSpec::new("demo")
            .with_fixture(
                FixtureSpec::new("a").with_category("net").with_case(
                    CaseSpec::new("x", test_fn(|_ctx| async { Ok(true) })).with_category("quick"),
                ),
            )
            .with_fixture(FixtureSpec::new("b").with_category("net"));
        assert_eq!(suite.categories(), vec!["net".to_string(), "quick".to_string()]);
    }
}
