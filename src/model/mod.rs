pub mod simple;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use serde_json::Value;

use crate::flow::definition::TaskId;
use crate::runtime::context::TaskContext;
use crate::runtime::status::Status;

/// What a flow behavior sees of the instance it interprets.
pub trait FlowContext {
    fn instance_id(&self) -> &str;
    fn status(&self) -> Status;
    fn state(&self) -> i32;
    fn set_state(&mut self, state: i32);
    /// Merges a payload into the instance attributes (string entries of a
    /// JSON object; anything else is ignored).
    fn update_attrs(&mut self, payload: &Value);
}

/// The interpretation policy for a flow type: how an instance starts,
/// resumes, and observes overall completion.
pub trait FlowBehavior: Send + Sync + Debug {
    /// Returns whether the flow may start, and the eval code to schedule
    /// the root task with.
    fn start(&self, ctx: &mut dyn FlowContext, payload: &Value) -> (bool, i32);

    fn resume(&self, ctx: &mut dyn FlowContext, payload: &Value) -> bool;

    /// All tasks are done; called just before `done`.
    fn tasks_done(&self, ctx: &mut dyn FlowContext, done_code: i32);

    fn done(&self, ctx: &mut dyn FlowContext);
}

/// A request to enter a task. `task: None` inside `enter_children` means
/// "all children of the current task".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskEntry {
    pub task: Option<TaskId>,
    pub enter_code: i32,
}

impl TaskEntry {
    pub fn new(task: TaskId, enter_code: i32) -> Self {
        Self {
            task: Some(task),
            enter_code,
        }
    }

    /// An entry targeting every child of the current task.
    pub fn all_children(enter_code: i32) -> Self {
        Self {
            task: None,
            enter_code,
        }
    }
}

/// The interpretation policy for a task type.
///
/// `eval` and `post_eval` may fail; an error aborts the current step and
/// surfaces from `Instance::do_step`. The remaining transitions are
/// infallible by contract.
pub trait TaskBehavior: Send + Sync + Debug {
    /// The task was entered. Returns whether to schedule an eval, and
    /// with which code.
    fn enter(&self, ctx: &mut TaskContext<'_, '_>, enter_code: i32) -> (bool, i32);

    /// Evaluate the task. Returns `(done, done_code)`.
    fn eval(&self, ctx: &mut TaskContext<'_, '_>, eval_code: i32) -> Result<(bool, i32)>;

    /// A scheduled post-eval fired (asynchronous completion). The engine
    /// always passes `None` resume data; activities stash resumption
    /// payloads in task attributes.
    fn post_eval(
        &self,
        ctx: &mut TaskContext<'_, '_>,
        eval_code: i32,
        resume_data: Option<&Value>,
    ) -> Result<(bool, i32)>;

    /// The task completed. Returns whether to notify the parent (and with
    /// which code), plus follow-on task entries to schedule.
    fn done(&self, ctx: &mut TaskContext<'_, '_>, done_code: i32) -> (bool, i32, Vec<TaskEntry>);

    /// A child of this task completed. Returns whether this task is now
    /// done itself.
    fn child_done(
        &self,
        ctx: &mut TaskContext<'_, '_>,
        child: TaskId,
        child_done_code: i32,
    ) -> (bool, i32);
}

/// The behavior registry for one flow model: flow and task behaviors
/// keyed by type id.
#[derive(Debug)]
pub struct FlowModel {
    id: String,
    flow_behaviors: HashMap<i32, Arc<dyn FlowBehavior>>,
    task_behaviors: HashMap<i32, Arc<dyn TaskBehavior>>,
}

impl FlowModel {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            flow_behaviors: HashMap::new(),
            task_behaviors: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn register_flow_behavior(&mut self, type_id: i32, behavior: Arc<dyn FlowBehavior>) {
        self.flow_behaviors.insert(type_id, behavior);
    }

    pub fn register_task_behavior(&mut self, type_id: i32, behavior: Arc<dyn TaskBehavior>) {
        self.task_behaviors.insert(type_id, behavior);
    }

    pub fn flow_behavior(&self, type_id: i32) -> Option<Arc<dyn FlowBehavior>> {
        self.flow_behaviors.get(&type_id).cloned()
    }

    pub fn task_behavior(&self, type_id: i32) -> Option<Arc<dyn TaskBehavior>> {
        self.task_behaviors.get(&type_id).cloned()
    }
}

/// Global-style lookup of flow models by model id. A fresh registry
/// already contains the built-in simple model.
pub struct ModelRegistry {
    models: DashMap<String, Arc<FlowModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        let registry = Self {
            models: DashMap::new(),
        };
        registry.register(simple::new_model());
        registry
    }

    pub fn register(&self, model: FlowModel) {
        self.models.insert(model.id.clone(), Arc::new(model));
    }

    pub fn get(&self, model_id: &str) -> Option<Arc<FlowModel>> {
        self.models.get(model_id).map(|m| m.clone())
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
