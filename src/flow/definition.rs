use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::flow::mapper::Mapper;

pub type TaskId = u32;
pub type LinkId = u32;

/// A named, typed value. The engine treats `type` and `value` as opaque
/// strings; only mappers and activities assign meaning to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            value: value.into(),
        }
    }

    /// Shorthand for a string-typed attribute.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, "string", value)
    }
}

/// A node of the flow graph. Wraps an activity type, declared attributes,
/// optional mappers, and its position in the graph (parent, children,
/// inbound and outbound links).
#[derive(Debug, Clone)]
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) type_id: i32,
    pub(crate) activity_type: String,
    pub(crate) parent: Option<TaskId>,
    pub(crate) child_tasks: Vec<TaskId>,
    pub(crate) from_links: Vec<LinkId>,
    pub(crate) to_links: Vec<LinkId>,
    pub(crate) attrs: HashMap<String, Attribute>,
    pub(crate) input_mapper: Option<Arc<dyn Mapper>>,
    pub(crate) output_mapper: Option<Arc<dyn Mapper>>,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    pub fn activity_type(&self) -> &str {
        &self.activity_type
    }

    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    pub fn child_tasks(&self) -> &[TaskId] {
        &self.child_tasks
    }

    /// Inbound links, in declaration order.
    pub fn from_links(&self) -> &[LinkId] {
        &self.from_links
    }

    /// Outbound links, in declaration order.
    pub fn to_links(&self) -> &[LinkId] {
        &self.to_links
    }

    /// A declared attribute of this task, if any.
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs.get(name)
    }

    pub fn input_mapper(&self) -> Option<&Arc<dyn Mapper>> {
        self.input_mapper.as_ref()
    }

    pub fn output_mapper(&self) -> Option<&Arc<dyn Mapper>> {
        self.output_mapper.as_ref()
    }
}

/// A directed edge between two tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub(crate) id: LinkId,
    pub(crate) from_task: TaskId,
    pub(crate) to_task: TaskId,
}

impl Link {
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn from_task(&self) -> TaskId {
        self.from_task
    }

    pub fn to_task(&self) -> TaskId {
        self.to_task
    }
}

/// An immutable flow definition: a task graph with a single root task,
/// flow-level attribute declarations, and random-access lookup by id.
/// Shared read-only (`Arc`) across every instance of the flow.
#[derive(Debug)]
pub struct Definition {
    pub(crate) name: String,
    pub(crate) model_id: String,
    pub(crate) type_id: i32,
    pub(crate) root_task: TaskId,
    pub(crate) attrs: HashMap<String, Attribute>,
    pub(crate) tasks: HashMap<TaskId, Task>,
    pub(crate) links: HashMap<LinkId, Link>,
}

impl Definition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    pub fn root_task(&self) -> &Task {
        // the builder guarantees the root task exists
        &self.tasks[&self.root_task]
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// A flow-level attribute declaration, if any.
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs.get(name)
    }
}
