use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;

use crate::flow::definition::Attribute;
use crate::flow::mapper::ScopeMut;

/// Declared inputs and outputs of an activity type. The engine only reads
/// `outputs` (for the default output mapping); the rest is documentation
/// for mapper authors.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// The type name activities are registered and resolved under.
    pub id: String,
    pub inputs: Vec<Attribute>,
    pub outputs: Vec<Attribute>,
}

/// What an activity sees while it runs: the attribute scope of its task
/// plus identity accessors.
pub trait ActivityContext: ScopeMut {
    fn flow_instance_id(&self) -> &str;
    fn flow_name(&self) -> &str;
    fn task_name(&self) -> &str;
}

/// The pluggable unit of work a task wraps.
///
/// `eval` returns whether the activity completed synchronously. An
/// asynchronous activity returns `Ok(false)` and arranges (through the
/// host) for a post-eval work item to finish the task later.
pub trait Activity: Send + Sync + Debug {
    fn metadata(&self) -> &Metadata;
    fn eval(&self, ctx: &mut dyn ActivityContext) -> Result<bool>;
}

/// Registry of activities, keyed by the type name in their metadata.
#[derive(Default)]
pub struct ActivityRegistry {
    activities: DashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, activity: Arc<dyn Activity>) {
        self.activities
            .insert(activity.metadata().id.clone(), activity);
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(type_name).map(|a| a.clone())
    }
}
