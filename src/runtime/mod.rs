pub mod context;
pub mod environment;
pub mod instance;
pub mod status;
pub mod tracker;
pub mod workitem;

pub use context::TaskContext;
pub use environment::{LinkData, TaskData, TaskEnv, LINK_STATE_TRUE};
pub use instance::Instance;
pub use status::Status;
pub use tracker::{
    AttrChange, ChangeTracker, ChangeType, LinkDataChange, TaskDataChange, WorkItemChange,
};
pub use workitem::{ExecType, WorkItem};
