use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, warn};

use crate::activity::{Activity, ActivityContext};
use crate::flow::definition::{Attribute, Definition, LinkId, Task};
use crate::flow::mapper::{Scope, ScopeMut};
use crate::model::TaskEntry;
use crate::runtime::environment::{LinkData, LINK_STATE_TRUE, TaskData};
use crate::runtime::instance::Instance;
use crate::runtime::tracker::{ChangeTracker, ChangeType};

/// The view a task behavior (and, through it, an activity) gets of one
/// task while a work item executes. Borrows the instance mutably for the
/// duration of the call, so every mutation lands in the change journal.
pub struct TaskContext<'i, 'f> {
    pub(crate) inst: &'i mut Instance,
    pub(crate) flow: &'f Definition,
    pub(crate) task: &'f Task,
}

impl<'i, 'f> TaskContext<'i, 'f> {
    /// The flow definition; the reference outlives this context.
    pub fn flow(&self) -> &'f Definition {
        self.flow
    }

    /// The underlying flow task; the reference outlives this context.
    pub fn task(&self) -> &'f Task {
        self.task
    }

    pub fn state(&self) -> i32 {
        self.inst
            .root_env()
            .task_data(self.task.id())
            .map(|d| d.state())
            .unwrap_or(0)
    }

    pub fn set_state(&mut self, state: i32) {
        let (env, tracker) = self.inst.env_and_tracker();
        match env.task_data_mut(self.task.id()) {
            Some(data) => {
                data.state = state;
                let snapshot = data.clone();
                tracker.track_task_data(ChangeType::Upd, self.task.id(), Some(snapshot));
            }
            None => warn!("task {} has no data, dropping state change", self.task.id()),
        }
    }

    /// Creates (if needed) and returns the data of every inbound link, in
    /// inbound order.
    pub fn from_links(&mut self) -> Vec<LinkData> {
        let mut links = Vec::with_capacity(self.task.from_links().len());
        for link_id in self.task.from_links() {
            let Some(link) = self.flow.link(*link_id) else {
                warn!("task {} lists unknown inbound link {}", self.task.id(), link_id);
                continue;
            };
            let (env, tracker) = self.inst.env_and_tracker();
            links.push(env.find_or_create_link_data(link, tracker).clone());
        }
        links
    }

    /// Enters child tasks of this task. An empty list (or a single entry
    /// with no target) enters ALL children, with the entry's code if one
    /// was given; otherwise exactly the listed entries are entered.
    pub fn enter_children(&mut self, entries: &[TaskEntry]) -> Result<()> {
        let broadcast = entries.is_empty() || (entries.len() == 1 && entries[0].task.is_none());

        if broadcast {
            let enter_code = entries.first().map(|e| e.enter_code).unwrap_or(0);
            debug!(
                "entering {} child(ren) of task '{}'",
                self.task.child_tasks().len(),
                self.task.name()
            );
            for child in self.task.child_tasks() {
                self.inst.enter_task(self.flow, *child, enter_code)?;
            }
        } else {
            for entry in entries {
                let Some(task_id) = entry.task else {
                    warn!("ignoring task entry without a target");
                    continue;
                };
                self.inst.enter_task(self.flow, task_id, entry.enter_code)?;
            }
        }
        Ok(())
    }

    /// Marks the link as evaluated-true and returns its data. Link
    /// evaluation is currently an unconditional mark; a pluggable link
    /// behavior slot is reserved for conditional links.
    pub fn eval_link(&mut self, link_id: LinkId, _eval_code: i32) -> Option<LinkData> {
        let Some(link) = self.flow.link(link_id) else {
            warn!("cannot evaluate unknown link {}", link_id);
            return None;
        };
        let (env, tracker) = self.inst.env_and_tracker();
        let data = env.find_or_create_link_data(link, tracker);
        data.state = LINK_STATE_TRUE;
        let snapshot = data.clone();
        tracker.track_link_data(ChangeType::Upd, link_id, Some(snapshot.clone()));
        Some(snapshot)
    }

    /// Resolves the activity declared for this task. The context itself
    /// is the activity's execution context.
    pub fn activity(&self) -> Result<Arc<dyn Activity>> {
        let registry = self.inst.activity_registry()?;
        registry
            .get(self.task.activity_type())
            .ok_or_else(|| anyhow!("activity type '{}' not registered", self.task.activity_type()))
    }

    /// Enqueues a post-eval work item for this task (asynchronous
    /// completion). Returns the work item id.
    pub fn schedule_post_eval(&mut self, eval_code: i32) -> u32 {
        self.inst.push_post_eval(self.task.id(), eval_code)
    }

    /// Number of child tasks of this task that still have live data.
    /// While a child-done notification runs, the notifying child is still
    /// counted.
    pub fn active_child_count(&self) -> usize {
        self.inst.root_env().active_child_count(self.task)
    }
}

impl Scope for TaskContext<'_, '_> {
    fn attr_type(&self, name: &str) -> Option<String> {
        let data = self.inst.root_env().task_data(self.task.id());
        data.and_then(|d| d.attr(name))
            .or_else(|| self.task.attr(name))
            .map(|a| a.ty.clone())
    }

    fn attr_value(&self, name: &str) -> Option<String> {
        let data = self.inst.root_env().task_data(self.task.id());
        data.and_then(|d| d.attr(name))
            .or_else(|| self.task.attr(name))
            .map(|a| a.value.clone())
    }
}

impl ScopeMut for TaskContext<'_, '_> {
    fn set_attr_value(&mut self, name: &str, value: &str) {
        let (env, tracker) = self.inst.env_and_tracker();
        match env.task_data_mut(self.task.id()) {
            Some(data) => {
                let mut scope = TaskScope {
                    data,
                    task: self.task,
                    tracker,
                };
                scope.set_attr_value(name, value);
            }
            None => warn!(
                "task {} has no data, dropping attribute '{}'",
                self.task.id(),
                name
            ),
        }
    }
}

impl ActivityContext for TaskContext<'_, '_> {
    fn flow_instance_id(&self) -> &str {
        self.inst.id()
    }

    fn flow_name(&self) -> &str {
        self.flow.name()
    }

    fn task_name(&self) -> &str {
        self.task.name()
    }
}

// --- Scope adapters for mappers ---

/// Read side of the instance scope: runtime attributes, falling back to
/// the flow's declarations.
pub(crate) struct InstanceScope<'a> {
    pub(crate) attrs: &'a HashMap<String, Attribute>,
    pub(crate) flow: &'a Definition,
}

impl Scope for InstanceScope<'_> {
    fn attr_type(&self, name: &str) -> Option<String> {
        self.attrs
            .get(name)
            .or_else(|| self.flow.attr(name))
            .map(|a| a.ty.clone())
    }

    fn attr_value(&self, name: &str) -> Option<String> {
        self.attrs
            .get(name)
            .or_else(|| self.flow.attr(name))
            .map(|a| a.value.clone())
    }
}

/// Write side of the instance scope. Writes are type-preserving; an
/// unknown name is dropped with a diagnostic.
pub(crate) struct InstanceScopeMut<'a> {
    pub(crate) attrs: &'a mut HashMap<String, Attribute>,
    pub(crate) flow: &'a Definition,
    pub(crate) tracker: &'a mut ChangeTracker,
}

impl Scope for InstanceScopeMut<'_> {
    fn attr_type(&self, name: &str) -> Option<String> {
        self.attrs
            .get(name)
            .or_else(|| self.flow.attr(name))
            .map(|a| a.ty.clone())
    }

    fn attr_value(&self, name: &str) -> Option<String> {
        self.attrs
            .get(name)
            .or_else(|| self.flow.attr(name))
            .map(|a| a.value.clone())
    }
}

impl ScopeMut for InstanceScopeMut<'_> {
    fn set_attr_value(&mut self, name: &str, value: &str) {
        let Some(ty) = self.attr_type(name) else {
            warn!("instance has no attribute '{}', ignoring set", name);
            return;
        };
        let kind = if self.attrs.contains_key(name) {
            ChangeType::Upd
        } else {
            ChangeType::Add
        };
        let attr = Attribute::new(name, ty, value);
        self.tracker.track_attr(kind, attr.clone());
        self.attrs.insert(name.to_string(), attr);
    }
}

/// Read side of one task's scope: task-local values, falling back to the
/// task's declarations.
pub(crate) struct TaskScopeRef<'a> {
    pub(crate) data: Option<&'a TaskData>,
    pub(crate) task: &'a Task,
}

impl Scope for TaskScopeRef<'_> {
    fn attr_type(&self, name: &str) -> Option<String> {
        self.data
            .and_then(|d| d.attr(name))
            .or_else(|| self.task.attr(name))
            .map(|a| a.ty.clone())
    }

    fn attr_value(&self, name: &str) -> Option<String> {
        self.data
            .and_then(|d| d.attr(name))
            .or_else(|| self.task.attr(name))
            .map(|a| a.value.clone())
    }
}

/// Write side of one task's scope.
pub(crate) struct TaskScope<'a> {
    pub(crate) data: &'a mut TaskData,
    pub(crate) task: &'a Task,
    pub(crate) tracker: &'a mut ChangeTracker,
}

impl Scope for TaskScope<'_> {
    fn attr_type(&self, name: &str) -> Option<String> {
        self.data
            .attr(name)
            .or_else(|| self.task.attr(name))
            .map(|a| a.ty.clone())
    }

    fn attr_value(&self, name: &str) -> Option<String> {
        self.data
            .attr(name)
            .or_else(|| self.task.attr(name))
            .map(|a| a.value.clone())
    }
}

impl ScopeMut for TaskScope<'_> {
    fn set_attr_value(&mut self, name: &str, value: &str) {
        let Some(ty) = self.attr_type(name) else {
            warn!(
                "task '{}' has no attribute '{}', ignoring set",
                self.task.name(),
                name
            );
            return;
        };
        self.data
            .attrs
            .insert(name.to_string(), Attribute::new(name, ty, value));
        let snapshot = self.data.clone();
        self.tracker
            .track_task_data(ChangeType::Upd, self.data.task_id(), Some(snapshot));
    }
}
