//! Host tree resolution
//!
//! Turns the declared suite into an immutable tree of test hosts, with
//! the category and feature selection applied and every parameter slot
//! bound to a concrete source. Resolution happens once per session;
//! running, browsing and path lookup all walk the resolved tree.
//!
//! Parameter slots resolve in priority order: an instance-producing slot
//! needs a factory (its own or exactly one matching fixture factory);
//! an explicit source wins next; then a fixture provider matching the
//! slot type; then the built-in fallbacks (booleans, enumerations).
//! Anything left over is an internal error, never a silent skip.

#![allow(dead_code)]

pub mod instance;

use std::sync::Arc;

use crate::errors::InternalError;
use crate::model::{
    NodeFlags, NodeType, PathNode, TestName, TestNameBuilder, TestParameter, TestPath,
};
use crate::session::TestConfiguration;
use crate::suite::{
    CaseSpec, FixtureSpec, FixtureValue, HookFn, InstanceFactory, ParamSource, ParamSpec,
    ParamType, ParamValue, SuiteSpec,
};

/// What a resolved host contributes at run time.
#[derive(Clone)]
pub enum HostKind {
    /// Pure grouping and naming node.
    Group,
    /// Setup/teardown wrapper, one instance per surrounding combination.
    Hooks {
        setup: Option<HookFn>,
        teardown: Option<HookFn>,
    },
    /// Enumerates concrete values.
    Values {
        hidden: bool,
        values: Vec<ParamValue>,
    },
    /// Single pinned value.
    Fixed {
        hidden: bool,
        value: ParamValue,
    },
    /// Repeats its subtree a fixed number of times.
    Repeat { count: u32 },
    /// Reuses one captured instance.
    Capture {
        hidden: bool,
        value: Arc<dyn FixtureValue>,
    },
    /// Creates a fresh instance through the factory.
    Factory {
        hidden: bool,
        factory: Arc<dyn InstanceFactory>,
    },
    /// Leaf case.
    Case(Arc<CaseSpec>),
}

/// One node of the resolved host tree.
#[derive(Clone)]
pub struct TestHost {
    pub kind: HostKind,
    pub node_type: NodeType,
    pub identifier: String,
    pub display_name: Option<String>,
    pub flags: NodeFlags,
    pub timeout_ms: Option<u64>,
    pub children: Vec<Arc<TestHost>>,
}

impl TestHost {
    /// Path node for this host in the static (unpinned) tree.
    pub fn path_node(&self) -> PathNode {
        let mut node = PathNode::new(self.node_type, &self.identifier).with_flags(self.flags);
        if let Some(name) = &self.display_name {
            node = node.with_name(name);
        }
        if let HostKind::Fixed { value, .. } = &self.kind {
            node = node.with_parameter(value.to_wire());
        }
        node
    }

    /// Extend a name with this host's contribution.
    pub fn child_name(&self, parent: &TestName) -> TestName {
        let mut builder = TestNameBuilder::from_name(parent);
        match &self.kind {
            HostKind::Group | HostKind::Case(_) => {
                if let Some(name) = &self.display_name {
                    builder = builder.rename(name.clone());
                }
            }
            HostKind::Fixed { hidden, value } => {
                builder.push_parameter(parameter(&self.identifier, value.to_wire(), *hidden));
            }
            // Enumerating hosts contribute per iteration, not here.
            HostKind::Hooks { .. }
            | HostKind::Values { .. }
            | HostKind::Repeat { .. }
            | HostKind::Capture { .. }
            | HostKind::Factory { .. } => {}
        }
        builder.build()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, HostKind::Case(_))
    }
}

fn parameter(name: &str, value: String, hidden: bool) -> TestParameter {
    if hidden {
        TestParameter::hidden(name, value)
    } else {
        TestParameter::new(name, value)
    }
}

/// Name and path of one resolvable test node.
#[derive(Clone, Debug, PartialEq)]
pub struct TestCaseInfo {
    pub name: TestName,
    pub path: TestPath,
}

/// A path resolved against the tree, ready to run.
#[derive(Clone)]
pub struct ResolvedTest {
    pub info: TestCaseInfo,
    /// Spine from the suite root with pinned values, ending in the
    /// addressed subtree.
    pub tree: Arc<TestHost>,
}

/// Build the host tree for a suite under the given selection.
pub fn resolve_suite(
    suite: &SuiteSpec,
    config: &TestConfiguration,
) -> Result<Arc<TestHost>, InternalError> {
    let mut fixtures = Vec::new();
    for fixture in &suite.fixtures {
        if !feature_enabled(config, fixture.feature.as_deref())? {
            continue;
        }
        if let Some(host) = resolve_fixture(fixture, config)? {
            fixtures.push(host);
        }
    }
    Ok(Arc::new(TestHost {
        kind: HostKind::Group,
        node_type: NodeType::Suite,
        identifier: suite.name.clone(),
        display_name: Some(suite.name.clone()),
        flags: NodeFlags::BROWSABLE | NodeFlags::CONTINUE_ON_ERROR,
        timeout_ms: None,
        children: fixtures,
    }))
}

fn feature_enabled(
    config: &TestConfiguration,
    feature: Option<&str>,
) -> Result<bool, InternalError> {
    match feature {
        None => Ok(true),
        Some(name) => config
            .is_feature_enabled(name)
            .ok_or_else(|| InternalError::new(format!("undeclared feature: {name}"))),
    }
}

fn resolve_fixture(
    fixture: &FixtureSpec,
    config: &TestConfiguration,
) -> Result<Option<Arc<TestHost>>, InternalError> {
    let mut cases = Vec::new();
    for case in &fixture.cases {
        if !feature_enabled(config, case.feature.as_deref())? {
            continue;
        }
        let category = case.category.as_deref().or(fixture.category.as_deref());
        if !config.matches_category(category) {
            continue;
        }
        cases.push(resolve_case(fixture, case, config)?);
    }
    if cases.is_empty() {
        return Ok(None);
    }

    let mut children = if fixture.setup.is_some() || fixture.teardown.is_some() {
        vec![Arc::new(TestHost {
            kind: HostKind::Hooks {
                setup: fixture.setup.clone(),
                teardown: fixture.teardown.clone(),
            },
            node_type: NodeType::Instance,
            identifier: "instance".to_owned(),
            display_name: None,
            flags: NodeFlags::HIDDEN | NodeFlags::PATH_HIDDEN | NodeFlags::CONTINUE_ON_ERROR,
            timeout_ms: None,
            children: cases,
        })]
    } else {
        cases
    };

    // Last declared parameter becomes the innermost host, so it varies
    // fastest when enumerating.
    for param in fixture.params.iter().rev() {
        children = vec![Arc::new(param_host(fixture, param, config, children)?)];
    }

    Ok(Some(Arc::new(TestHost {
        kind: HostKind::Group,
        node_type: NodeType::Fixture,
        identifier: fixture.name.clone(),
        display_name: Some(fixture.name.clone()),
        flags: fixture.flags,
        timeout_ms: fixture.timeout_ms,
        children,
    })))
}

fn resolve_case(
    fixture: &FixtureSpec,
    case: &CaseSpec,
    config: &TestConfiguration,
) -> Result<Arc<TestHost>, InternalError> {
    let mut node = Arc::new(TestHost {
        kind: HostKind::Case(Arc::new(case.clone())),
        node_type: NodeType::Case,
        identifier: case.name.clone(),
        display_name: Some(case.name.clone()),
        flags: case.flags,
        timeout_ms: case.timeout_ms,
        children: Vec::new(),
    });
    for param in case.params.iter().rev() {
        node = Arc::new(param_host(fixture, param, config, vec![node])?);
    }
    if let Some(count) = case.repeat {
        node = Arc::new(TestHost {
            kind: HostKind::Repeat { count },
            node_type: NodeType::Parameter,
            identifier: "iteration".to_owned(),
            display_name: None,
            flags: NodeFlags::CONTINUE_ON_ERROR,
            timeout_ms: None,
            children: vec![node],
        });
    }
    Ok(node)
}

fn param_host(
    fixture: &FixtureSpec,
    param: &ParamSpec,
    config: &TestConfiguration,
    children: Vec<Arc<TestHost>>,
) -> Result<TestHost, InternalError> {
    let kind = resolve_param_source(fixture, param, config)?;
    // Every value of an enumerating host runs even after one fails.
    Ok(TestHost {
        kind,
        node_type: NodeType::Parameter,
        identifier: param.name.clone(),
        display_name: None,
        flags: NodeFlags::CONTINUE_ON_ERROR,
        timeout_ms: None,
        children,
    })
}

fn resolve_param_source(
    fixture: &FixtureSpec,
    param: &ParamSpec,
    config: &TestConfiguration,
) -> Result<HostKind, InternalError> {
    match &param.source {
        ParamSource::Values(values) => {
            if values.is_empty() {
                return Err(InternalError::new(format!(
                    "parameter {} has an empty value list",
                    param.name
                )));
            }
            Ok(HostKind::Values {
                hidden: param.hidden,
                values: values.clone(),
            })
        }
        ParamSource::Fixed(value) => Ok(HostKind::Fixed {
            hidden: param.hidden,
            value: value.clone(),
        }),
        ParamSource::Provider { provider, filter } => {
            let values = provider.values(config, filter.as_deref());
            if values.is_empty() {
                return Err(InternalError::new(format!(
                    "provider {} produced no values for parameter {}",
                    provider.serves(),
                    param.name
                )));
            }
            Ok(HostKind::Values {
                hidden: param.hidden,
                values,
            })
        }
        ParamSource::Capture(value) => Ok(HostKind::Capture {
            hidden: param.hidden,
            value: value.clone(),
        }),
        ParamSource::Factory(factory) => Ok(HostKind::Factory {
            hidden: param.hidden,
            factory: factory.clone(),
        }),
        ParamSource::Auto(ParamType::Custom { type_name }) => {
            let mut matching = fixture
                .factories
                .iter()
                .filter(|f| f.type_name() == *type_name);
            let factory = matching.next().ok_or_else(|| {
                InternalError::new(format!(
                    "no factory for parameter {} of type {}",
                    param.name, type_name
                ))
            })?;
            if matching.next().is_some() {
                return Err(InternalError::new(format!(
                    "ambiguous factories for parameter {} of type {}",
                    param.name, type_name
                )));
            }
            Ok(HostKind::Factory {
                hidden: param.hidden,
                factory: factory.clone(),
            })
        }
        ParamSource::Auto(param_type) => {
            let tag = param_type.type_tag().to_owned();
            let mut matching = fixture.providers.iter().filter(|p| p.serves() == tag);
            if let Some(provider) = matching.next() {
                if matching.next().is_some() {
                    return Err(InternalError::new(format!(
                        "ambiguous providers for parameter {} of type {}",
                        param.name, tag
                    )));
                }
                let values = provider.values(config, None);
                if values.is_empty() {
                    return Err(InternalError::new(format!(
                        "provider {} produced no values for parameter {}",
                        tag, param.name
                    )));
                }
                return Ok(HostKind::Values {
                    hidden: param.hidden,
                    values,
                });
            }
            match param_type {
                ParamType::Bool => Ok(HostKind::Values {
                    hidden: param.hidden,
                    values: vec![ParamValue::Bool(false), ParamValue::Bool(true)],
                }),
                ParamType::Enum { values, .. } => Ok(HostKind::Values {
                    hidden: param.hidden,
                    values: values.iter().map(|v| ParamValue::Enum(v)).collect(),
                }),
                _ => Err(InternalError::new(format!(
                    "cannot resolve parameter {} of type {}",
                    param.name, tag
                ))),
            }
        }
    }
}

/// Name and static path of the tree root.
pub fn root_info(root: &TestHost) -> TestCaseInfo {
    TestCaseInfo {
        name: TestName::new(root.display_name.clone().unwrap_or_else(|| root.identifier.clone())),
        path: TestPath::root(root.path_node()),
    }
}

/// Resolve a serialized path back to a runnable subtree.
///
/// Parameter nodes carrying a value are pinned to that value; unpinned
/// enumerating nodes keep their full value set. Unknown identifiers and
/// values not produced by the host are internal errors.
pub fn resolve_path(
    root: &Arc<TestHost>,
    path: &TestPath,
) -> Result<ResolvedTest, InternalError> {
    let nodes = path.nodes();
    let first = nodes
        .first()
        .ok_or_else(|| InternalError::new("cannot resolve an empty test path"))?;
    if first.node_type != root.node_type || first.identifier != root.identifier {
        return Err(InternalError::new(format!(
            "path root {} does not match suite {}",
            first.identifier, root.identifier
        )));
    }

    let pinned = resolve_spine(root, &nodes[1..])?;
    let mut name = TestName::new(
        root.display_name
            .clone()
            .unwrap_or_else(|| root.identifier.clone()),
    );
    let mut spine_path = TestPath::root(root.path_node());
    describe_spine(&pinned, &mut name, &mut spine_path, nodes.len() - 1);

    Ok(ResolvedTest {
        info: TestCaseInfo {
            name,
            path: path.clone(),
        },
        tree: pinned,
    })
}

fn resolve_spine(
    host: &Arc<TestHost>,
    remaining: &[PathNode],
) -> Result<Arc<TestHost>, InternalError> {
    let Some(next) = remaining.first() else {
        return Ok(host.clone());
    };
    // Sibling cases wrap themselves in their own parameter hosts, so
    // several children can carry the same identifier. Each one is a
    // candidate until its subtree accepts the rest of the path.
    let mut failure = None;
    for child in &host.children {
        if child.node_type != next.node_type || child.identifier != next.identifier {
            continue;
        }
        let outcome =
            pin_host(child, next).and_then(|pinned| resolve_spine(&pinned, &remaining[1..]));
        match outcome {
            Ok(resolved) => {
                let mut parent = (**host).clone();
                parent.children = vec![resolved];
                return Ok(Arc::new(parent));
            }
            Err(error) => failure = Some(error),
        }
    }
    Err(failure.unwrap_or_else(|| {
        InternalError::new(format!(
            "path node {} not found under {}",
            next.identifier, host.identifier
        ))
    }))
}

fn pin_host(host: &Arc<TestHost>, node: &PathNode) -> Result<Arc<TestHost>, InternalError> {
    let Some(wire) = &node.parameter else {
        return Ok(host.clone());
    };
    match &host.kind {
        HostKind::Values { hidden, values } => {
            let value = values
                .iter()
                .find(|v| v.to_wire() == *wire)
                .ok_or_else(|| {
                    InternalError::new(format!(
                        "parameter {} does not produce the value {}",
                        host.identifier, wire
                    ))
                })?;
            let mut pinned = (**host).clone();
            pinned.kind = HostKind::Fixed {
                hidden: *hidden,
                value: value.clone(),
            };
            Ok(Arc::new(pinned))
        }
        HostKind::Fixed { value, .. } => {
            if value.to_wire() == *wire {
                Ok(host.clone())
            } else {
                Err(InternalError::new(format!(
                    "parameter {} is fixed to {}, not {}",
                    host.identifier,
                    value.to_wire(),
                    wire
                )))
            }
        }
        HostKind::Repeat { count } => {
            let iteration: u32 = wire.parse().map_err(|_| {
                InternalError::new(format!("non-numeric iteration value: {wire}"))
            })?;
            if iteration >= *count {
                return Err(InternalError::new(format!(
                    "iteration {iteration} out of range, host repeats {count} times"
                )));
            }
            let mut pinned = (**host).clone();
            pinned.kind = HostKind::Repeat { count: 1 };
            Ok(Arc::new(pinned))
        }
        // Instance hosts recreate their value instead of parsing it.
        HostKind::Capture { .. } | HostKind::Factory { .. } => Ok(host.clone()),
        HostKind::Group | HostKind::Hooks { .. } | HostKind::Case(_) => Ok(host.clone()),
    }
}

fn describe_spine(host: &Arc<TestHost>, name: &mut TestName, path: &mut TestPath, depth: usize) {
    if depth == 0 {
        return;
    }
    let Some(child) = host.children.first() else {
        return;
    };
    *name = child.child_name(name);
    path.push(child.path_node());
    describe_spine(child, name, path, depth - 1);
}

/// Find a node by its dotted display name, e.g. `Handshake.Connect`.
/// Returns the static path, with enumerating parameters left unpinned.
/// A trailing value list pins the visible parameters instead, so
/// `Handshake.Connect(false,V10)` addresses one combination the way
/// result names print it.
pub fn find_by_name(root: &Arc<TestHost>, query: &str) -> Option<TestPath> {
    fn walk(
        host: &Arc<TestHost>,
        chain: &mut Vec<Arc<TestHost>>,
        dotted: &str,
        target: &str,
    ) -> bool {
        for child in &host.children {
            let child_dotted = match (&child.kind, &child.display_name) {
                (HostKind::Group | HostKind::Case(_), Some(name)) => {
                    if dotted.is_empty() {
                        name.clone()
                    } else {
                        format!("{dotted}.{name}")
                    }
                }
                _ => dotted.to_owned(),
            };
            chain.push(child.clone());
            if child_dotted == target || walk(child, chain, &child_dotted, target) {
                return true;
            }
            chain.pop();
        }
        false
    }

    let (base, values) = match query.strip_suffix(')').and_then(|rest| rest.split_once('(')) {
        Some((base, list)) => (base, Some(list)),
        None => (query, None),
    };

    let mut chain = Vec::new();
    if !walk(root, &mut chain, "", base) {
        return None;
    }
    let pins = match values {
        Some(list) => pin_visible(&chain, list)?,
        None => vec![None; chain.len()],
    };

    let mut path = TestPath::root(root.path_node());
    for (host, pin) in chain.iter().zip(pins) {
        let mut node = host.path_node();
        if let Some(value) = pin {
            node.parameter = Some(value);
        }
        path.push(node);
    }
    Some(path)
}

/// Map a comma-joined value list onto the visible parameters along the
/// chain, in declaration order. `None` when counts or values disagree.
fn pin_visible(chain: &[Arc<TestHost>], list: &str) -> Option<Vec<Option<String>>> {
    let mut pins = vec![None; chain.len()];
    let given: Vec<&str> = if list.is_empty() {
        Vec::new()
    } else {
        list.split(',').collect()
    };
    let mut given = given.into_iter();
    for (pin, host) in pins.iter_mut().zip(chain) {
        match &host.kind {
            HostKind::Values {
                hidden: false,
                values,
            } => {
                let wire = given.next()?;
                if !values.iter().any(|value| value.to_wire() == wire) {
                    return None;
                }
                *pin = Some(wire.to_owned());
            }
            HostKind::Fixed {
                hidden: false,
                value,
            } => {
                if value.to_wire() != given.next()? {
                    return None;
                }
            }
            // Instance values have no wire form to compare against.
            HostKind::Capture { hidden: false, .. } | HostKind::Factory { hidden: false, .. } => {
                return None;
            }
            _ => {}
        }
    }
    if given.next().is_some() {
        return None;
    }
    Some(pins)
}
