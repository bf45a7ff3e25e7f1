use std::collections::HashMap;
use std::sync::Arc;

use crate::flow::definition::TaskId;
use crate::flow::mapper::Mapper;

/// Host-supplied per-task mapper overrides. A patch replaces a task's
/// declared input or output mapper without touching the flow definition.
#[derive(Debug, Default)]
pub struct Patch {
    input_mappers: HashMap<TaskId, Arc<dyn Mapper>>,
    output_mappers: HashMap<TaskId, Arc<dyn Mapper>>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input_mapper(&mut self, task_id: TaskId, mapper: Arc<dyn Mapper>) {
        self.input_mappers.insert(task_id, mapper);
    }

    pub fn set_output_mapper(&mut self, task_id: TaskId, mapper: Arc<dyn Mapper>) {
        self.output_mappers.insert(task_id, mapper);
    }

    pub fn input_mapper(&self, task_id: TaskId) -> Option<&Arc<dyn Mapper>> {
        self.input_mappers.get(&task_id)
    }

    pub fn output_mapper(&self, task_id: TaskId) -> Option<&Arc<dyn Mapper>> {
        self.output_mappers.get(&task_id)
    }
}
