#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;

use serde_json::Value;

use flowrun::{
    Activity, ActivityContext, ActivityRegistry, Attribute, Mapper, Metadata, ModelRegistry,
    Scope, ScopeMut, TaskBehavior, TaskContext, TaskEntry, TaskId,
};

// --- Test Activities ---

/// Copies its `msg` input attribute to its `out` output attribute.
#[derive(Debug)]
pub struct EchoActivity {
    metadata: Metadata,
}

impl EchoActivity {
    pub fn new() -> Self {
        Self {
            metadata: Metadata {
                id: "echo".to_string(),
                inputs: vec![Attribute::string("msg", "")],
                outputs: vec![Attribute::string("out", "")],
            },
        }
    }
}

impl Activity for EchoActivity {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn eval(&self, ctx: &mut dyn ActivityContext) -> Result<bool> {
        let msg = ctx.attr_value("msg").unwrap_or_default();
        ctx.set_attr_value("out", &msg);
        Ok(true)
    }
}

/// Counts how often it is evaluated; declares a single output `y` it
/// never writes itself.
#[derive(Debug)]
pub struct CountingActivity {
    metadata: Metadata,
    calls: AtomicUsize,
}

impl CountingActivity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            metadata: Metadata {
                id: "counter".to_string(),
                inputs: Vec::new(),
                outputs: vec![Attribute::string("y", "")],
            },
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Activity for CountingActivity {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn eval(&self, _ctx: &mut dyn ActivityContext) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

/// Stays pending on eval (stashing its result in `out`); completion has
/// to arrive through a post-eval work item.
#[derive(Debug)]
pub struct PendingActivity {
    metadata: Metadata,
}

impl PendingActivity {
    pub fn new() -> Self {
        Self {
            metadata: Metadata {
                id: "pending".to_string(),
                inputs: Vec::new(),
                outputs: vec![Attribute::string("out", "")],
            },
        }
    }
}

impl Activity for PendingActivity {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn eval(&self, ctx: &mut dyn ActivityContext) -> Result<bool> {
        ctx.set_attr_value("out", "later");
        Ok(false)
    }
}

// --- Test Behaviors ---

/// Container behavior that enters every child through a single broadcast
/// entry carrying a fixed code; each entered task records the code it was
/// handed in its state and schedules nothing further.
#[derive(Debug)]
pub struct BroadcastTaskBehavior {
    pub enter_code: i32,
}

impl TaskBehavior for BroadcastTaskBehavior {
    fn enter(&self, ctx: &mut TaskContext<'_, '_>, enter_code: i32) -> (bool, i32) {
        ctx.set_state(enter_code);
        (false, 0)
    }

    fn eval(&self, ctx: &mut TaskContext<'_, '_>, _eval_code: i32) -> anyhow::Result<(bool, i32)> {
        ctx.enter_children(&[TaskEntry::all_children(self.enter_code)])?;
        Ok((false, 0))
    }

    fn post_eval(
        &self,
        _ctx: &mut TaskContext<'_, '_>,
        _eval_code: i32,
        _resume_data: Option<&Value>,
    ) -> anyhow::Result<(bool, i32)> {
        Ok((true, 0))
    }

    fn done(&self, _ctx: &mut TaskContext<'_, '_>, _done_code: i32) -> (bool, i32, Vec<TaskEntry>) {
        (true, 0, Vec::new())
    }

    fn child_done(
        &self,
        _ctx: &mut TaskContext<'_, '_>,
        _child: TaskId,
        _child_done_code: i32,
    ) -> (bool, i32) {
        (false, 0)
    }
}

// --- Test Mappers ---

/// Copies source attributes to target attributes by name, counting how
/// often it was applied.
#[derive(Debug)]
pub struct AssignMapper {
    assigns: Vec<(String, String)>,
    applied: AtomicUsize,
}

impl AssignMapper {
    pub fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            assigns: pairs
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            applied: AtomicUsize::new(0),
        })
    }

    pub fn applications(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }
}

impl Mapper for AssignMapper {
    fn apply(&self, source: &dyn Scope, target: &mut dyn ScopeMut) {
        self.applied.fetch_add(1, Ordering::SeqCst);
        for (from, to) in &self.assigns {
            if let Some(value) = source.attr_value(from) {
                target.set_attr_value(to, &value);
            }
        }
    }
}

/// Writes fixed values into the target scope.
#[derive(Debug)]
pub struct ConstMapper {
    sets: Vec<(String, String)>,
}

impl ConstMapper {
    pub fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            sets: pairs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
    }
}

impl Mapper for ConstMapper {
    fn apply(&self, _source: &dyn Scope, target: &mut dyn ScopeMut) {
        for (name, value) in &self.sets {
            target.set_attr_value(name, value);
        }
    }
}

// --- Setup ---

/// A model registry plus an activity registry with the standard test
/// activities installed.
pub fn setup() -> (ModelRegistry, Arc<ActivityRegistry>) {
    let models = ModelRegistry::new();
    let activities = Arc::new(ActivityRegistry::new());
    activities.register(Arc::new(EchoActivity::new()));
    activities.register(Arc::new(PendingActivity::new()));
    (models, activities)
}
