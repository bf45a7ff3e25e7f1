use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flow::definition::{Attribute, TaskId};

/// Per-task attribute overrides. Inputs are forced onto the task before
/// evaluation (after any input mapper), outputs are forced after
/// completion (before any output mapper); `skip` treats the task as done
/// without evaluating it at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInterceptor {
    #[serde(default)]
    pub inputs: Vec<Attribute>,
    #[serde(default)]
    pub outputs: Vec<Attribute>,
    #[serde(default)]
    pub skip: bool,
}

/// Host-supplied collection of task interceptors, keyed by task id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interceptor {
    tasks: HashMap<TaskId, TaskInterceptor>,
}

impl Interceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_task(&mut self, task_id: TaskId, interceptor: TaskInterceptor) {
        self.tasks.insert(task_id, interceptor);
    }

    pub fn task(&self, task_id: TaskId) -> Option<&TaskInterceptor> {
        self.tasks.get(&task_id)
    }
}
