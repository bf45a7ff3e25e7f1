use serde::{Deserialize, Serialize};

/// Lifecycle status of a flow instance. Monotonic in normal operation;
/// only a host-driven restart may move it backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[default]
    NotStarted,
    Active,
    Completed,
    Cancelled,
    Failed,
}
