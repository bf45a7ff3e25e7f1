use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::flow::definition::{Attribute, Definition, Link, LinkId, Task, TaskId};
use crate::flow::mapper::Mapper;
use crate::model::simple::{TYPE_SIMPLE_FLOW, TYPE_SIMPLE_TASK};

/// Fluent construction of a flow definition.
///
/// The root task is created implicitly (id 1 unless overridden); every
/// other task defaults to being a child of the root. `build` validates the
/// graph references and produces the immutable [`Definition`].
pub struct FlowBuilder {
    name: String,
    model_id: String,
    type_id: i32,
    root_id: TaskId,
    root_name: String,
    attrs: HashMap<String, Attribute>,
    tasks: Vec<Task>,
    links: Vec<Link>,
}

impl FlowBuilder {
    pub fn new(name: &str, model_id: &str) -> Self {
        Self {
            name: name.to_string(),
            model_id: model_id.to_string(),
            type_id: TYPE_SIMPLE_FLOW,
            root_id: 1,
            root_name: "root".to_string(),
            attrs: HashMap::new(),
            tasks: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn type_id(mut self, type_id: i32) -> Self {
        self.type_id = type_id;
        self
    }

    pub fn root(mut self, id: TaskId, name: &str) -> Self {
        self.root_id = id;
        self.root_name = name.to_string();
        self
    }

    /// Declares a flow-level attribute with its default value.
    pub fn flow_attr(mut self, name: &str, ty: &str, value: &str) -> Self {
        self.attrs
            .insert(name.to_string(), Attribute::new(name, ty, value));
        self
    }

    pub fn task(self, id: TaskId, name: &str) -> TaskBuilder {
        TaskBuilder {
            flow_builder: self,
            id,
            name: name.to_string(),
            type_id: TYPE_SIMPLE_TASK,
            activity_type: String::new(),
            parent: None,
            attrs: HashMap::new(),
            input_mapper: None,
            output_mapper: None,
        }
    }

    pub fn link(mut self, id: LinkId, from: TaskId, to: TaskId) -> Self {
        self.links.push(Link {
            id,
            from_task: from,
            to_task: to,
        });
        self
    }

    pub fn build(self) -> Result<Definition> {
        let mut tasks: HashMap<TaskId, Task> = HashMap::new();

        tasks.insert(
            self.root_id,
            Task {
                id: self.root_id,
                name: self.root_name,
                type_id: TYPE_SIMPLE_TASK,
                activity_type: String::new(),
                parent: None,
                child_tasks: Vec::new(),
                from_links: Vec::new(),
                to_links: Vec::new(),
                attrs: HashMap::new(),
                input_mapper: None,
                output_mapper: None,
            },
        );

        // Declaration order decides child ordering, so record it before the
        // tasks disappear into the map.
        let mut declared: Vec<TaskId> = Vec::with_capacity(self.tasks.len());
        for mut task in self.tasks {
            if tasks.contains_key(&task.id) {
                return Err(anyhow!("duplicate task id: {}", task.id));
            }
            if task.parent.is_none() {
                task.parent = Some(self.root_id);
            }
            declared.push(task.id);
            tasks.insert(task.id, task);
        }

        for child in &declared {
            let parent = match tasks.get(child).and_then(|t| t.parent) {
                Some(p) => p,
                None => continue,
            };
            if parent == *child {
                return Err(anyhow!("task {} cannot be its own parent", child));
            }
            match tasks.get_mut(&parent) {
                Some(p) => p.child_tasks.push(*child),
                None => {
                    return Err(anyhow!("task {} references unknown parent {}", child, parent))
                }
            }
        }

        let mut links: HashMap<LinkId, Link> = HashMap::new();
        for link in self.links {
            if links.contains_key(&link.id) {
                return Err(anyhow!("duplicate link id: {}", link.id));
            }
            if !tasks.contains_key(&link.from_task) {
                return Err(anyhow!(
                    "link {} references unknown task {} (from side)",
                    link.id,
                    link.from_task
                ));
            }
            if !tasks.contains_key(&link.to_task) {
                return Err(anyhow!(
                    "link {} references unknown task {} (to side)",
                    link.id,
                    link.to_task
                ));
            }
            if let Some(from) = tasks.get_mut(&link.from_task) {
                from.to_links.push(link.id);
            }
            if let Some(to) = tasks.get_mut(&link.to_task) {
                to.from_links.push(link.id);
            }
            links.insert(link.id, link);
        }

        Ok(Definition {
            name: self.name,
            model_id: self.model_id,
            type_id: self.type_id,
            root_task: self.root_id,
            attrs: self.attrs,
            tasks,
            links,
        })
    }
}

pub struct TaskBuilder {
    flow_builder: FlowBuilder,
    id: TaskId,
    name: String,
    type_id: i32,
    activity_type: String,
    parent: Option<TaskId>,
    attrs: HashMap<String, Attribute>,
    input_mapper: Option<Arc<dyn Mapper>>,
    output_mapper: Option<Arc<dyn Mapper>>,
}

impl TaskBuilder {
    pub fn type_id(mut self, type_id: i32) -> Self {
        self.type_id = type_id;
        self
    }

    pub fn activity(mut self, activity_type: &str) -> Self {
        self.activity_type = activity_type.to_string();
        self
    }

    /// Overrides the default parent (the root task).
    pub fn child_of(mut self, parent: TaskId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Declares a task-scoped attribute with its default value.
    pub fn attr(mut self, name: &str, ty: &str, value: &str) -> Self {
        self.attrs
            .insert(name.to_string(), Attribute::new(name, ty, value));
        self
    }

    pub fn input_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.input_mapper = Some(mapper);
        self
    }

    pub fn output_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.output_mapper = Some(mapper);
        self
    }

    pub fn build(mut self) -> FlowBuilder {
        self.flow_builder.tasks.push(Task {
            id: self.id,
            name: self.name,
            type_id: self.type_id,
            activity_type: self.activity_type,
            parent: self.parent,
            child_tasks: Vec::new(),
            from_links: Vec::new(),
            to_links: Vec::new(),
            attrs: self.attrs,
            input_mapper: self.input_mapper,
            output_mapper: self.output_mapper,
        });
        self.flow_builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::MODEL_SIMPLE;

    #[test]
    fn link_to_undeclared_task_is_rejected() {
        let err = FlowBuilder::new("bad-link", MODEL_SIMPLE)
            .task(2, "a")
            .build()
            .link(1, 2, 9)
            .build()
            .expect_err("link target 9 is not declared");
        assert!(err.to_string().contains("unknown task 9"));
    }

    #[test]
    fn link_from_undeclared_task_is_rejected() {
        let result = FlowBuilder::new("bad-link", MODEL_SIMPLE)
            .task(2, "a")
            .build()
            .link(1, 9, 2)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let result = FlowBuilder::new("dup-task", MODEL_SIMPLE)
            .task(2, "a")
            .build()
            .task(2, "b")
            .build()
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_link_id_is_rejected() {
        let result = FlowBuilder::new("dup-link", MODEL_SIMPLE)
            .task(2, "a")
            .build()
            .task(3, "b")
            .build()
            .task(4, "c")
            .build()
            .link(1, 2, 3)
            .link(1, 3, 4)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let result = FlowBuilder::new("bad-parent", MODEL_SIMPLE)
            .task(2, "a")
            .child_of(9)
            .build()
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn self_parenting_is_rejected() {
        let result = FlowBuilder::new("self-parent", MODEL_SIMPLE)
            .task(2, "a")
            .child_of(2)
            .build()
            .build();
        assert!(result.is_err());
    }
}
