//! The built-in sequential model: tasks become ready when every inbound
//! link has been evaluated, containers complete when their last child
//! does, and completion walks outbound links forward.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::flow::definition::TaskId;
use crate::model::{FlowBehavior, FlowContext, FlowModel, TaskBehavior, TaskEntry};
use crate::runtime::context::TaskContext;
use crate::runtime::environment::LINK_STATE_TRUE;

pub const MODEL_SIMPLE: &str = "simple";
pub const TYPE_SIMPLE_FLOW: i32 = 1;
pub const TYPE_SIMPLE_TASK: i32 = 1;

// task lifecycle states
pub const STATE_ENTERED: i32 = 10;
pub const STATE_READY: i32 = 20;
pub const STATE_WAITING: i32 = 30;
pub const STATE_DONE: i32 = 40;

/// Builds the simple model with its flow and task behaviors registered.
pub fn new_model() -> FlowModel {
    let mut model = FlowModel::new(MODEL_SIMPLE);
    model.register_flow_behavior(TYPE_SIMPLE_FLOW, Arc::new(SimpleFlowBehavior));
    model.register_task_behavior(TYPE_SIMPLE_TASK, Arc::new(SimpleTaskBehavior));
    model
}

#[derive(Debug)]
pub struct SimpleFlowBehavior;

impl FlowBehavior for SimpleFlowBehavior {
    fn start(&self, ctx: &mut dyn FlowContext, _payload: &Value) -> (bool, i32) {
        debug!("starting flow instance {}", ctx.instance_id());
        (true, 0)
    }

    fn resume(&self, ctx: &mut dyn FlowContext, payload: &Value) -> bool {
        debug!("resuming flow instance {}", ctx.instance_id());
        ctx.update_attrs(payload);
        true
    }

    fn tasks_done(&self, ctx: &mut dyn FlowContext, done_code: i32) {
        debug!(
            "all tasks of instance {} done (code {})",
            ctx.instance_id(),
            done_code
        );
    }

    fn done(&self, ctx: &mut dyn FlowContext) {
        debug!("flow instance {} done", ctx.instance_id());
    }
}

#[derive(Debug)]
pub struct SimpleTaskBehavior;

impl TaskBehavior for SimpleTaskBehavior {
    fn enter(&self, ctx: &mut TaskContext<'_, '_>, _enter_code: i32) -> (bool, i32) {
        ctx.set_state(STATE_ENTERED);

        // ready once every inbound link has evaluated true
        let links = ctx.from_links();
        let ready = links.iter().all(|l| l.state() == LINK_STATE_TRUE);

        if ready {
            ctx.set_state(STATE_READY);
            (true, 0)
        } else {
            debug!("task '{}' waiting on inbound links", ctx.task().name());
            ctx.set_state(STATE_WAITING);
            (false, 0)
        }
    }

    fn eval(&self, ctx: &mut TaskContext<'_, '_>, eval_code: i32) -> Result<(bool, i32)> {
        if !ctx.task().child_tasks().is_empty() {
            // container task: run the children, complete via child_done;
            // the eval code is forwarded to each child as its enter code
            ctx.enter_children(&[TaskEntry::all_children(eval_code)])?;
            return Ok((false, 0));
        }

        let activity = ctx.activity()?;
        let done = activity.eval(ctx)?;
        Ok((done, 0))
    }

    fn post_eval(
        &self,
        _ctx: &mut TaskContext<'_, '_>,
        _eval_code: i32,
        _resume_data: Option<&Value>,
    ) -> Result<(bool, i32)> {
        Ok((true, 0))
    }

    fn done(&self, ctx: &mut TaskContext<'_, '_>, _done_code: i32) -> (bool, i32, Vec<TaskEntry>) {
        ctx.set_state(STATE_DONE);

        let flow = ctx.flow();
        let to_links = ctx.task().to_links();
        if to_links.is_empty() {
            // terminal task: bubble completion up
            return (true, 0, Vec::new());
        }

        let mut entries = Vec::with_capacity(to_links.len());
        for link_id in to_links {
            ctx.eval_link(*link_id, 0);
            if let Some(link) = flow.link(*link_id) {
                entries.push(TaskEntry::new(link.to_task(), 0));
            }
        }
        (false, 0, entries)
    }

    fn child_done(
        &self,
        ctx: &mut TaskContext<'_, '_>,
        child: TaskId,
        _child_done_code: i32,
    ) -> (bool, i32) {
        // the notifying child still has live data at this point
        let remaining = ctx.active_child_count();
        debug!(
            "child {} of task '{}' done, {} child(ren) still active",
            child,
            ctx.task().name(),
            remaining
        );
        (remaining <= 1, 0)
    }
}
