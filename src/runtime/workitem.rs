use serde::{Deserialize, Serialize};

use crate::flow::definition::TaskId;

/// The kind of execution a work item requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecType {
    Eval,
    PostEval,
}

/// A pending unit of execution: one event to deliver to one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: u32,
    pub task_id: TaskId,
    pub exec_type: ExecType,
    pub eval_code: i32,
}

impl WorkItem {
    pub fn new(id: u32, task_id: TaskId, exec_type: ExecType, eval_code: i32) -> Self {
        Self {
            id,
            task_id,
            exec_type,
            eval_code,
        }
    }
}
