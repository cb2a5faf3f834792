//! Runtime instances of resolved hosts
//!
//! An instance realizes one host node for one invocation: create it,
//! `initialize`, step through its values with `has_next`/`move_next`,
//! then `destroy` exactly once, whatever happened in between. The value
//! construction is front loaded: enumerating hosts carry materialized
//! values and factories build their instance during `initialize`, so
//! advancing never suspends.
//!
//! Enumeration follows the before-first convention: no value is current
//! until the first `move_next`, and `has_next` answers whether another
//! `move_next` is allowed. An instance with N values sees exactly N
//! calls to `move_next`.

#![allow(dead_code)]

use std::sync::Arc;

use crate::errors::TestError;
use crate::host::{HostKind, TestHost};
use crate::invoke::context::{ActiveValue, TestContext};
use crate::model::TestParameter;
use crate::suite::{FixtureValue, HookFn, InstanceFactory, ParamValue};

enum InstanceKind {
    Hooks {
        setup: Option<HookFn>,
        teardown: Option<HookFn>,
    },
    Values {
        hidden: bool,
        values: Vec<ParamValue>,
    },
    Fixed {
        hidden: bool,
        value: ParamValue,
    },
    Repeat {
        count: u32,
    },
    Capture {
        hidden: bool,
        value: Arc<dyn FixtureValue>,
    },
    Factory {
        hidden: bool,
        factory: Arc<dyn InstanceFactory>,
        value: Option<Arc<dyn FixtureValue>>,
    },
}

/// Live state of one host node during an invocation.
pub struct TestInstance {
    name: String,
    kind: InstanceKind,
    /// Steps taken so far; 0 means before the first value.
    pos: u64,
    initialized: bool,
    destroyed: bool,
}

impl TestInstance {
    /// Instance for a host that carries runtime state. Group and case
    /// hosts have none and are driven by their invokers directly.
    pub fn for_host(host: &TestHost) -> Option<TestInstance> {
        let kind = match &host.kind {
            HostKind::Group | HostKind::Case(_) => return None,
            HostKind::Hooks { setup, teardown } => InstanceKind::Hooks {
                setup: setup.clone(),
                teardown: teardown.clone(),
            },
            HostKind::Values { hidden, values } => InstanceKind::Values {
                hidden: *hidden,
                values: values.clone(),
            },
            HostKind::Fixed { hidden, value } => InstanceKind::Fixed {
                hidden: *hidden,
                value: value.clone(),
            },
            HostKind::Repeat { count } => InstanceKind::Repeat { count: *count },
            HostKind::Capture { hidden, value } => InstanceKind::Capture {
                hidden: *hidden,
                value: value.clone(),
            },
            HostKind::Factory { hidden, factory } => InstanceKind::Factory {
                hidden: *hidden,
                factory: factory.clone(),
                value: None,
            },
        };
        Some(TestInstance {
            name: host.identifier.clone(),
            kind,
            pos: 0,
            initialized: false,
            destroyed: false,
        })
    }

    fn steps(&self) -> u64 {
        match &self.kind {
            InstanceKind::Values { values, .. } => values.len() as u64,
            InstanceKind::Repeat { count } => u64::from(*count),
            _ => 1,
        }
    }

    /// Runs setup work: fixture setup hooks, factory construction.
    pub async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        debug_assert!(!self.initialized && !self.destroyed);
        self.initialized = true;
        match &mut self.kind {
            InstanceKind::Hooks {
                setup: Some(hook), ..
            } => (hook)(ctx.clone()).await,
            InstanceKind::Factory { factory, value, .. } => {
                *value = Some(factory.create(ctx).await?);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Whether another `move_next` is allowed. Side-effect free.
    pub fn has_next(&self) -> bool {
        !self.destroyed && self.pos < self.steps()
    }

    /// Advance to the next value. Callers check `has_next` first.
    pub fn move_next(&mut self) {
        debug_assert!(self.initialized && self.has_next());
        self.pos += 1;
    }

    /// Name contribution of the current value, if it has one.
    pub fn current_parameter(&self) -> Option<TestParameter> {
        let index = self.pos.checked_sub(1)?;
        let (hidden, wire) = match &self.kind {
            InstanceKind::Hooks { .. } => return None,
            InstanceKind::Values { hidden, values } => {
                (*hidden, values[index as usize].to_wire())
            }
            InstanceKind::Fixed { hidden, value } => (*hidden, value.to_wire()),
            InstanceKind::Repeat { .. } => (true, index.to_string()),
            InstanceKind::Capture { hidden, value } => (*hidden, value.wire_value()?),
            InstanceKind::Factory { hidden, value, .. } => {
                (*hidden, value.as_ref()?.wire_value()?)
            }
        };
        Some(if hidden {
            TestParameter::hidden(&self.name, wire)
        } else {
            TestParameter::new(&self.name, wire)
        })
    }

    /// Environment contribution of the current value.
    pub fn current_value(&self) -> Option<ActiveValue> {
        let index = self.pos.checked_sub(1)?;
        match &self.kind {
            InstanceKind::Hooks { .. } => None,
            InstanceKind::Values { values, .. } => {
                Some(ActiveValue::Param(values[index as usize].clone()))
            }
            InstanceKind::Fixed { value, .. } => Some(ActiveValue::Param(value.clone())),
            InstanceKind::Repeat { .. } => {
                Some(ActiveValue::Param(ParamValue::Int(index as i64)))
            }
            InstanceKind::Capture { value, .. } => Some(ActiveValue::Instance(value.clone())),
            InstanceKind::Factory { value, .. } => {
                value.as_ref().map(|v| ActiveValue::Instance(v.clone()))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs teardown work. Must be called exactly once per created
    /// instance, even when `initialize` failed partway; captured values
    /// are not owned here and are left alone.
    pub async fn destroy(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        debug_assert!(!self.destroyed);
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        match &mut self.kind {
            InstanceKind::Hooks {
                teardown: Some(hook),
                ..
            } => (hook)(ctx.clone()).await,
            InstanceKind::Factory { factory, value, .. } => match value.take() {
                Some(value) => factory.destroy(ctx, value).await,
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

impl Drop for TestInstance {
    fn drop(&mut self) {
        if !self.destroyed && !std::thread::panicking() {
            debug_assert!(false, "test instance {} dropped without destroy", self.name);
        }
    }
}
