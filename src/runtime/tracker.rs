use serde::{Deserialize, Serialize};

use crate::flow::definition::{Attribute, LinkId, TaskId};
use crate::runtime::environment::{LinkData, TaskData};
use crate::runtime::status::Status;
use crate::runtime::workitem::WorkItem;

/// The kind of a recorded delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Add,
    Upd,
    Del,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrChange {
    pub kind: ChangeType,
    pub attr: Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemChange {
    pub kind: ChangeType,
    pub id: u32,
    /// Snapshot for Add/Upd; `None` for Del.
    pub work_item: Option<WorkItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDataChange {
    pub kind: ChangeType,
    pub id: TaskId,
    pub data: Option<TaskData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDataChange {
    pub kind: ChangeType,
    pub id: LinkId,
    pub data: Option<LinkData>,
}

/// Per-step journal of every state mutation the engine makes. After
/// `do_step` returns, the journal is sufficient to carry a persisted
/// snapshot from the pre-step state to the post-step state. Status and
/// state keep only the latest value; the remaining deltas accumulate in
/// the order they happened and are meant to be applied in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeTracker {
    status: Option<Status>,
    state: Option<i32>,
    attrs: Vec<AttrChange>,
    work_items: Vec<WorkItemChange>,
    task_datas: Vec<TaskDataChange>,
    link_datas: Vec<LinkDataChange>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = Some(status);
    }

    pub(crate) fn set_state(&mut self, state: i32) {
        self.state = Some(state);
    }

    pub(crate) fn track_attr(&mut self, kind: ChangeType, attr: Attribute) {
        self.attrs.push(AttrChange { kind, attr });
    }

    pub(crate) fn track_work_item(&mut self, kind: ChangeType, id: u32, item: Option<WorkItem>) {
        self.work_items.push(WorkItemChange {
            kind,
            id,
            work_item: item,
        });
    }

    pub(crate) fn track_task_data(&mut self, kind: ChangeType, id: TaskId, data: Option<TaskData>) {
        self.task_datas.push(TaskDataChange { kind, id, data });
    }

    pub(crate) fn track_link_data(&mut self, kind: ChangeType, id: LinkId, data: Option<LinkData>) {
        self.link_datas.push(LinkDataChange { kind, id, data });
    }

    pub fn status_change(&self) -> Option<Status> {
        self.status
    }

    pub fn state_change(&self) -> Option<i32> {
        self.state
    }

    pub fn attr_changes(&self) -> &[AttrChange] {
        &self.attrs
    }

    pub fn work_item_changes(&self) -> &[WorkItemChange] {
        &self.work_items
    }

    pub fn task_data_changes(&self) -> &[TaskDataChange] {
        &self.task_datas
    }

    pub fn link_data_changes(&self) -> &[LinkDataChange] {
        &self.link_datas
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.state.is_none()
            && self.attrs.is_empty()
            && self.work_items.is_empty()
            && self.task_datas.is_empty()
            && self.link_datas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_state_keep_latest_only() {
        let mut tracker = ChangeTracker::new();
        tracker.set_status(Status::Active);
        tracker.set_status(Status::Completed);
        tracker.set_state(3);
        tracker.set_state(7);

        assert_eq!(tracker.status_change(), Some(Status::Completed));
        assert_eq!(tracker.state_change(), Some(7));
    }

    #[test]
    fn deltas_accumulate_in_order() {
        let mut tracker = ChangeTracker::new();
        tracker.track_attr(ChangeType::Add, Attribute::string("a", "1"));
        tracker.track_attr(ChangeType::Upd, Attribute::string("a", "2"));

        let kinds: Vec<ChangeType> = tracker.attr_changes().iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeType::Add, ChangeType::Upd]);
        assert_eq!(tracker.attr_changes()[1].attr.value, "2");
    }

    #[test]
    fn fresh_tracker_is_empty() {
        assert!(ChangeTracker::new().is_empty());
    }
}
