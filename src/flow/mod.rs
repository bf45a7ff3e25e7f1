pub mod builder;
pub mod definition;
pub mod interceptor;
pub mod mapper;
pub mod patch;
pub mod provider;

pub use builder::{FlowBuilder, TaskBuilder};
pub use definition::{Attribute, Definition, Link, LinkId, Task, TaskId};
pub use interceptor::{Interceptor, TaskInterceptor};
pub use mapper::{Mapper, Scope, ScopeMut};
pub use patch::Patch;
pub use provider::{FlowProvider, InMemoryFlowProvider};
