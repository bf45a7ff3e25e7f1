//! Stepwise flow-instance runtime.
//!
//! A flow is an immutable directed graph of tasks; an [`Instance`] drives
//! one execution of it, one work item per step, under host control. Flow
//! and task semantics are pluggable behaviors resolved from a model
//! registry; units of work are pluggable activities. Every mutation an
//! instance makes is journaled in a per-step [`ChangeTracker`] so hosts
//! can persist or replicate instance state between steps.

pub mod activity;
pub mod flow;
pub mod model;
pub mod runtime;

pub use activity::{Activity, ActivityContext, ActivityRegistry, Metadata};
pub use flow::{
    Attribute, Definition, FlowBuilder, FlowProvider, InMemoryFlowProvider, Interceptor, Link,
    LinkId, Mapper, Patch, Scope, ScopeMut, Task, TaskId, TaskInterceptor,
};
pub use model::{
    FlowBehavior, FlowContext, FlowModel, ModelRegistry, TaskBehavior, TaskEntry,
};
pub use runtime::{
    ChangeTracker, ChangeType, ExecType, Instance, LinkData, Status, TaskContext, TaskData,
    TaskEnv, WorkItem, LINK_STATE_TRUE,
};
