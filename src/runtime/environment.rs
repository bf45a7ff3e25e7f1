use std::collections::hash_map::Entry;
use std::collections::HashMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::flow::definition::{Attribute, Definition, Link, LinkId, Task, TaskId};
use crate::runtime::tracker::{ChangeTracker, ChangeType};

/// Link state marking an evaluated-true link; successor tasks become
/// ready once all their inbound links carry this state.
pub const LINK_STATE_TRUE: i32 = 2;

/// Runtime state of one task within an environment. Plain data; all
/// mutation goes through the instance so the change journal stays
/// complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    pub(crate) task_id: TaskId,
    pub(crate) state: i32,
    pub(crate) done: bool,
    #[serde(default)]
    pub(crate) attrs: HashMap<String, Attribute>,
}

impl TaskData {
    fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            state: 0,
            done: false,
            attrs: HashMap::new(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn state(&self) -> i32 {
        self.state
    }

    pub fn done(&self) -> bool {
        self.done
    }

    /// A task-local attribute value, if one has been set.
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs.get(name)
    }
}

/// Runtime state of one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkData {
    pub(crate) link_id: LinkId,
    pub(crate) state: i32,
}

impl LinkData {
    fn new(link_id: LinkId) -> Self {
        Self { link_id, state: 0 }
    }

    pub fn link_id(&self) -> LinkId {
        self.link_id
    }

    pub fn state(&self) -> i32 {
        self.state
    }
}

/// Execution scope for a set of tasks: owns the task and link data maps,
/// creates data on demand, and reaps it when tasks are released. A task
/// is absent from the map iff it is not currently active.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnv {
    pub(crate) id: u32,
    pub(crate) task_id: TaskId,
    #[serde(default)]
    pub(crate) task_datas: HashMap<TaskId, TaskData>,
    #[serde(default)]
    pub(crate) link_datas: HashMap<LinkId, LinkData>,
}

impl TaskEnv {
    pub(crate) fn new(id: u32, task_id: TaskId) -> Self {
        Self {
            id,
            task_id,
            task_datas: HashMap::new(),
            link_datas: HashMap::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// The task this environment represents (the root, in practice).
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn task_data(&self, id: TaskId) -> Option<&TaskData> {
        self.task_datas.get(&id)
    }

    pub fn link_data(&self, id: LinkId) -> Option<&LinkData> {
        self.link_datas.get(&id)
    }

    pub fn active_task_count(&self) -> usize {
        self.task_datas.len()
    }

    pub fn active_link_count(&self) -> usize {
        self.link_datas.len()
    }

    pub(crate) fn task_data_mut(&mut self, id: TaskId) -> Option<&mut TaskData> {
        self.task_datas.get_mut(&id)
    }

    pub(crate) fn find_or_create_task_data(
        &mut self,
        task: &Task,
        tracker: &mut ChangeTracker,
    ) -> &mut TaskData {
        match self.task_datas.entry(task.id()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let data = v.insert(TaskData::new(task.id()));
                tracker.track_task_data(ChangeType::Add, data.task_id, Some(data.clone()));
                data
            }
        }
    }

    /// Unconditionally creates fresh data for the task (used for the root
    /// task at start).
    pub(crate) fn new_task_data(
        &mut self,
        task: &Task,
        tracker: &mut ChangeTracker,
    ) -> &mut TaskData {
        let data = TaskData::new(task.id());
        tracker.track_task_data(ChangeType::Add, data.task_id, Some(data.clone()));
        match self.task_datas.entry(task.id()) {
            Entry::Occupied(mut e) => {
                e.insert(data);
                e.into_mut()
            }
            Entry::Vacant(v) => v.insert(data),
        }
    }

    pub(crate) fn find_or_create_link_data(
        &mut self,
        link: &Link,
        tracker: &mut ChangeTracker,
    ) -> &mut LinkData {
        match self.link_datas.entry(link.id()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let data = v.insert(LinkData::new(link.id()));
                tracker.track_link_data(ChangeType::Add, data.link_id, Some(data.clone()));
                data
            }
        }
    }

    /// Reaps a completed task: its own data, any data of its child tasks,
    /// and the data of its inbound links. The only garbage-collection
    /// point in the engine; deltas are recorded for data actually
    /// removed.
    pub(crate) fn release_task(&mut self, task: &Task, tracker: &mut ChangeTracker) {
        if self.task_datas.remove(&task.id()).is_some() {
            tracker.track_task_data(ChangeType::Del, task.id(), None);
        }

        for child in task.child_tasks() {
            if self.task_datas.remove(child).is_some() {
                tracker.track_task_data(ChangeType::Del, *child, None);
            }
        }

        for link in task.from_links() {
            if self.link_datas.remove(link).is_some() {
                tracker.track_link_data(ChangeType::Del, *link, None);
            }
        }
    }

    /// Number of child tasks of `task` that currently have data here.
    pub(crate) fn active_child_count(&self, task: &Task) -> usize {
        task.child_tasks()
            .iter()
            .filter(|id| self.task_datas.contains_key(*id))
            .count()
    }

    /// Rehydration check: every persisted datum must still resolve
    /// against the flow definition.
    pub(crate) fn init(&self, flow: &Definition) -> Result<()> {
        if flow.task(self.task_id).is_none() {
            return Err(anyhow!(
                "flow '{}' has no task {} for the environment",
                flow.name(),
                self.task_id
            ));
        }

        for id in self.task_datas.keys() {
            if flow.task(*id).is_none() {
                return Err(anyhow!(
                    "flow '{}' has no task {} referenced by persisted task data",
                    flow.name(),
                    id
                ));
            }
        }

        for id in self.link_datas.keys() {
            if flow.link(*id).is_none() {
                return Err(anyhow!(
                    "flow '{}' has no link {} referenced by persisted link data",
                    flow.name(),
                    id
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowBuilder;
    use crate::model::simple::MODEL_SIMPLE;

    fn chain() -> Definition {
        // root(1) contains the chain 2 -> 3 -> 4
        FlowBuilder::new("chain", MODEL_SIMPLE)
            .task(2, "a")
            .build()
            .task(3, "b")
            .build()
            .task(4, "c")
            .build()
            .link(1, 2, 3)
            .link(2, 3, 4)
            .build()
            .expect("flow should build")
    }

    #[test]
    fn find_or_create_tracks_a_single_add() {
        let flow = chain();
        let mut env = TaskEnv::new(1, 1);
        let mut tracker = ChangeTracker::new();

        let task = flow.task(2).unwrap();
        env.find_or_create_task_data(task, &mut tracker);
        env.find_or_create_task_data(task, &mut tracker);

        assert_eq!(tracker.task_data_changes().len(), 1);
        assert_eq!(tracker.task_data_changes()[0].kind, ChangeType::Add);
        assert_eq!(env.active_task_count(), 1);
    }

    #[test]
    fn release_purges_task_children_and_inbound_links() {
        let flow = chain();
        let mut env = TaskEnv::new(1, 1);
        let mut tracker = ChangeTracker::new();

        let root = flow.task(1).unwrap();
        let b = flow.task(3).unwrap();
        env.find_or_create_task_data(root, &mut tracker);
        env.find_or_create_task_data(flow.task(2).unwrap(), &mut tracker);
        env.find_or_create_task_data(b, &mut tracker);
        env.find_or_create_link_data(flow.link(1).unwrap(), &mut tracker);

        // releasing b removes b and its inbound link
        env.release_task(b, &mut tracker);
        assert!(env.task_data(3).is_none());
        assert!(env.link_data(1).is_none());

        // releasing the root removes every remaining child
        env.release_task(root, &mut tracker);
        assert_eq!(env.active_task_count(), 0);
    }

    #[test]
    fn init_rejects_stale_ids() {
        let flow = chain();
        let mut env = TaskEnv::new(1, 1);
        let mut tracker = ChangeTracker::new();
        env.find_or_create_task_data(flow.task(2).unwrap(), &mut tracker);

        assert!(env.init(&flow).is_ok());

        let other = FlowBuilder::new("other", MODEL_SIMPLE)
            .build()
            .expect("flow should build");
        assert!(env.init(&other).is_err());
    }
}
