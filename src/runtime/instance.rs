use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::activity::ActivityRegistry;
use crate::flow::definition::{Attribute, Definition, Task, TaskId};
use crate::flow::interceptor::Interceptor;
use crate::flow::mapper::{Mapper, Scope, ScopeMut};
use crate::flow::patch::Patch;
use crate::flow::provider::FlowProvider;
use crate::model::{FlowContext, FlowModel, ModelRegistry, TaskBehavior};
use crate::runtime::context::{InstanceScope, InstanceScopeMut, TaskContext, TaskScope, TaskScopeRef};
use crate::runtime::environment::TaskEnv;
use crate::runtime::status::Status;
use crate::runtime::tracker::{ChangeTracker, ChangeType};
use crate::runtime::workitem::{ExecType, WorkItem};

/// One running execution of a flow.
///
/// The instance owns its environment, work queue, attributes, and change
/// journal; the flow definition and the behavior/activity registries are
/// shared, read-only collaborators. All stepping goes through `&mut self`.
/// Hosts that share an instance across threads wrap it in a mutex.
///
/// Serialization covers exactly the persisted-state surface (id, status,
/// state, step id, flow URI, attributes, queue, environment); transient
/// collaborators are skipped and reattached by [`Instance::restart`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    id: String,
    flow_uri: String,
    status: Status,
    state: i32,
    step_id: u32,
    #[serde(default)]
    attrs: HashMap<String, Attribute>,
    #[serde(default)]
    queue: VecDeque<WorkItem>,
    wi_counter: u32,
    root_env: TaskEnv,

    #[serde(skip)]
    flow: Option<Arc<Definition>>,
    #[serde(skip)]
    flow_model: Option<Arc<FlowModel>>,
    #[serde(skip)]
    activities: Option<Arc<ActivityRegistry>>,
    #[serde(skip)]
    provider: Option<Arc<dyn FlowProvider>>,
    #[serde(skip)]
    patch: Option<Patch>,
    #[serde(skip)]
    interceptor: Option<Interceptor>,
    #[serde(skip)]
    tracker: ChangeTracker,
}

impl Instance {
    /// Builds a fresh, not-yet-started instance of the flow. Fails if the
    /// flow's model id is not registered.
    pub fn new(
        id: &str,
        flow_uri: &str,
        flow: Arc<Definition>,
        models: &ModelRegistry,
        activities: Arc<ActivityRegistry>,
    ) -> Result<Self> {
        let model = models
            .get(flow.model_id())
            .ok_or_else(|| anyhow!("unknown flow model '{}'", flow.model_id()))?;

        let root_env = TaskEnv::new(1, flow.root_task().id());

        Ok(Self {
            id: id.to_string(),
            flow_uri: flow_uri.to_string(),
            status: Status::NotStarted,
            state: 0,
            step_id: 0,
            attrs: HashMap::new(),
            queue: VecDeque::new(),
            wi_counter: 0,
            root_env,
            flow: Some(flow),
            flow_model: Some(model),
            activities: Some(activities),
            provider: None,
            patch: None,
            interceptor: None,
            tracker: ChangeTracker::new(),
        })
    }

    /// Installs the provider consulted on restart.
    pub fn set_flow_provider(&mut self, provider: Arc<dyn FlowProvider>) {
        self.provider = Some(provider);
    }

    pub fn set_patch(&mut self, patch: Patch) {
        self.patch = Some(patch);
    }

    pub fn set_interceptor(&mut self, interceptor: Interceptor) {
        self.interceptor = Some(interceptor);
    }

    /// Rehydrates a deserialized instance: resolves the flow definition
    /// from its URI, looks the model up again, and validates that every
    /// persisted task, link, and work item still resolves against the
    /// definition. The only path that rebuilds transient references.
    pub fn restart(
        &mut self,
        id: &str,
        provider: Arc<dyn FlowProvider>,
        models: &ModelRegistry,
        activities: Arc<ActivityRegistry>,
    ) -> Result<()> {
        self.id = id.to_string();

        let flow = provider
            .get_flow(&self.flow_uri)
            .ok_or_else(|| anyhow!("flow provider has no flow for uri '{}'", self.flow_uri))?;
        let model = models
            .get(flow.model_id())
            .ok_or_else(|| anyhow!("unknown flow model '{}'", flow.model_id()))?;

        self.root_env.init(&flow)?;
        for item in &self.queue {
            if self.root_env.task_data(item.task_id).is_none() {
                return Err(anyhow!(
                    "work item {} references task {} with no persisted data",
                    item.id,
                    item.task_id
                ));
            }
        }

        info!("restarted flow instance {} at step {}", self.id, self.step_id);

        self.provider = Some(provider);
        self.flow = Some(flow);
        self.flow_model = Some(model);
        self.activities = Some(activities);
        self.tracker = ChangeTracker::new();
        Ok(())
    }

    // --- accessors ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn flow_uri(&self) -> &str {
        &self.flow_uri
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn state(&self) -> i32 {
        self.state
    }

    pub fn step_id(&self) -> u32 {
        self.step_id
    }

    pub fn flow_definition(&self) -> Option<&Arc<Definition>> {
        self.flow.as_ref()
    }

    pub fn root_env(&self) -> &TaskEnv {
        &self.root_env
    }

    pub fn work_item_count(&self) -> usize {
        self.queue.len()
    }

    /// The instance-scoped attributes set so far (flow declarations are
    /// not materialized here until written).
    pub fn attrs(&self) -> &HashMap<String, Attribute> {
        &self.attrs
    }

    /// The change journal accumulated by the current step.
    pub fn changes(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Discards the current journal and begins a fresh one.
    pub fn reset_changes(&mut self) {
        self.tracker = ChangeTracker::new();
    }

    // --- lifecycle ---

    /// Starts the instance: transitions to Active, merges the payload
    /// into the instance attributes, consults the flow behavior, and (if
    /// accepted) creates the root task data and schedules its eval.
    pub fn start(&mut self, payload: &Value) -> Result<bool> {
        let flow = self.flow_def()?.clone();
        let behavior = self.model()?.flow_behavior(flow.type_id()).ok_or_else(|| {
            anyhow!(
                "flow model '{}' has no flow behavior for type {}",
                flow.model_id(),
                flow.type_id()
            )
        })?;

        self.set_status(Status::Active);
        self.update_attrs(payload);

        let (ok, eval_code) = behavior.start(self, payload);

        if ok {
            let root = flow.root_task();
            self.root_env.new_task_data(root, &mut self.tracker);
            self.schedule_eval(root.id(), eval_code);
        } else {
            warn!("flow behavior declined to start instance {}", self.id);
        }

        Ok(ok)
    }

    /// Resumes the instance through its flow behavior. The engine does
    /// not interpret the payload.
    pub fn resume(&mut self, payload: &Value) -> Result<bool> {
        let flow = self.flow_def()?.clone();
        let behavior = self.model()?.flow_behavior(flow.type_id()).ok_or_else(|| {
            anyhow!(
                "flow model '{}' has no flow behavior for type {}",
                flow.model_id(),
                flow.type_id()
            )
        })?;
        Ok(behavior.resume(self, payload))
    }

    /// Host-driven cancellation; the next step returns without popping.
    /// In-flight work items stay queued and are never executed.
    pub fn cancel(&mut self) {
        info!("cancelling flow instance {}", self.id);
        self.set_status(Status::Cancelled);
    }

    /// Host-driven failure marker, for hosts that give up after a step
    /// error.
    pub fn fail(&mut self) {
        self.set_status(Status::Failed);
    }

    /// Performs one execution step: pops at most one work item and runs
    /// it to completion. Returns whether a work item was processed. An
    /// `Err` means the step hit a definition-level fault and was aborted;
    /// the instance stays Active and the journal holds everything that
    /// happened before the abort.
    pub fn do_step(&mut self) -> Result<bool> {
        self.reset_changes();
        self.step_id += 1;

        if self.status != Status::Active {
            return Ok(false);
        }

        let Some(item) = self.queue.pop_front() else {
            debug!("work queue empty");
            return Ok(false);
        };

        debug!("popped work item {} off queue", item.id);
        self.tracker.track_work_item(ChangeType::Del, item.id, None);

        self.exec_task(item)?;
        Ok(true)
    }

    /// Enqueues a post-eval work item for an asynchronously completing
    /// task. The task must still have live data. Returns the work item
    /// id.
    pub fn schedule_post_eval(&mut self, task_id: TaskId, eval_code: i32) -> Result<u32> {
        if self.root_env.task_data(task_id).is_none() {
            return Err(anyhow!("task {} has no live data to post-eval", task_id));
        }
        Ok(self.push_post_eval(task_id, eval_code))
    }

    // --- instance attribute scope ---

    pub fn attr_type(&self, name: &str) -> Option<String> {
        self.instance_scope_type(name)
    }

    pub fn attr_value(&self, name: &str) -> Option<String> {
        self.attrs
            .get(name)
            .map(|a| a.value.clone())
            .or_else(|| self.flow_attr(name).map(|a| a.value.clone()))
    }

    /// Type-preserving update of a known attribute; unknown names are
    /// dropped with a diagnostic.
    pub fn set_attr_value(&mut self, name: &str, value: &str) {
        let Some(ty) = self.instance_scope_type(name) else {
            warn!("instance has no attribute '{}', ignoring set", name);
            return;
        };
        let kind = if self.attrs.contains_key(name) {
            ChangeType::Upd
        } else {
            ChangeType::Add
        };
        let attr = Attribute::new(name, ty, value);
        self.tracker.track_attr(kind, attr.clone());
        self.attrs.insert(name.to_string(), attr);
    }

    /// Adds a new attribute with an explicit type. A known name is left
    /// untouched; task outputs publish through this path.
    pub fn add_attr(&mut self, name: &str, ty: &str, value: &str) {
        if self.instance_scope_type(name).is_some() {
            warn!("instance already has attribute '{}', ignoring add", name);
            return;
        }
        let attr = Attribute::new(name, ty, value);
        self.tracker.track_attr(ChangeType::Add, attr.clone());
        self.attrs.insert(name.to_string(), attr);
    }

    /// Merges the string entries of a JSON object into the instance
    /// attributes (adding or overwriting, string-typed). Anything else is
    /// ignored.
    pub fn update_attrs(&mut self, payload: &Value) {
        let Some(map) = payload.as_object() else {
            if !payload.is_null() {
                debug!("ignoring non-object payload for instance {}", self.id);
            }
            return;
        };

        for (name, value) in map {
            let Some(s) = value.as_str() else {
                warn!("ignoring non-string payload entry '{}'", name);
                continue;
            };
            let kind = if self.attrs.contains_key(name) {
                ChangeType::Upd
            } else {
                ChangeType::Add
            };
            let attr = Attribute::string(name.clone(), s);
            self.tracker.track_attr(kind, attr.clone());
            self.attrs.insert(name.clone(), attr);
        }
    }

    fn instance_scope_type(&self, name: &str) -> Option<String> {
        self.attrs
            .get(name)
            .map(|a| a.ty.clone())
            .or_else(|| self.flow_attr(name).map(|a| a.ty.clone()))
    }

    fn flow_attr(&self, name: &str) -> Option<Attribute> {
        self.flow
            .as_ref()
            .and_then(|f| f.attr(name))
            .cloned()
    }

    // --- step internals ---

    fn set_status(&mut self, status: Status) {
        self.status = status;
        self.tracker.set_status(status);
    }

    fn flow_def(&self) -> Result<&Arc<Definition>> {
        self.flow.as_ref().ok_or_else(|| {
            anyhow!(
                "instance {} has no flow definition attached; restart it first",
                self.id
            )
        })
    }

    fn model(&self) -> Result<&Arc<FlowModel>> {
        self.flow_model.as_ref().ok_or_else(|| {
            anyhow!(
                "instance {} has no flow model attached; restart it first",
                self.id
            )
        })
    }

    pub(crate) fn activity_registry(&self) -> Result<&Arc<ActivityRegistry>> {
        self.activities.as_ref().ok_or_else(|| {
            anyhow!(
                "instance {} has no activity registry attached; restart it first",
                self.id
            )
        })
    }

    pub(crate) fn env_and_tracker(&mut self) -> (&mut TaskEnv, &mut ChangeTracker) {
        (&mut self.root_env, &mut self.tracker)
    }

    pub(crate) fn schedule_eval(&mut self, task_id: TaskId, eval_code: i32) -> u32 {
        self.push_work_item(task_id, ExecType::Eval, eval_code)
    }

    pub(crate) fn push_post_eval(&mut self, task_id: TaskId, eval_code: i32) -> u32 {
        self.push_work_item(task_id, ExecType::PostEval, eval_code)
    }

    fn push_work_item(&mut self, task_id: TaskId, exec_type: ExecType, eval_code: i32) -> u32 {
        self.wi_counter += 1;
        let item = WorkItem::new(self.wi_counter, task_id, exec_type, eval_code);
        debug!("scheduling {:?} on task {}", exec_type, task_id);
        self.tracker
            .track_work_item(ChangeType::Add, item.id, Some(item.clone()));
        self.queue.push_back(item);
        self.wi_counter
    }

    /// Executes one work item: input mapping and interception, the
    /// behavior's eval or post-eval, and, on completion, output handling
    /// plus done-propagation.
    fn exec_task(&mut self, item: WorkItem) -> Result<()> {
        let flow_arc = self.flow_def()?.clone();
        let flow: &Definition = &flow_arc;
        let task = flow.task(item.task_id).ok_or_else(|| {
            anyhow!("work item {} targets unknown task {}", item.id, item.task_id)
        })?;
        if self.root_env.task_data(task.id()).is_none() {
            return Err(anyhow!(
                "work item {} targets task {} with no live data",
                item.id,
                task.id()
            ));
        }
        let behavior = self
            .model()?
            .task_behavior(task.type_id())
            .ok_or_else(|| anyhow!("no task behavior registered for type {}", task.type_id()))?;

        let (done, done_code) = match item.exec_type {
            ExecType::Eval => {
                // the patch's mapper, if any, wins over the declared one
                let input_mapper = self
                    .patch
                    .as_ref()
                    .and_then(|p| p.input_mapper(task.id()))
                    .cloned()
                    .or_else(|| task.input_mapper().cloned());

                if let Some(mapper) = input_mapper {
                    debug!("applying input mapper to task '{}'", task.name());
                    self.apply_input_mapper(flow, task, &mapper);
                }

                let task_interceptor = self
                    .interceptor
                    .as_ref()
                    .and_then(|i| i.task(task.id()))
                    .cloned();

                let mut eval = true;
                if let Some(ti) = &task_interceptor {
                    debug!("applying interceptor to task '{}'", task.name());
                    let mut ctx = TaskContext {
                        inst: &mut *self,
                        flow,
                        task,
                    };
                    for attr in &ti.inputs {
                        ctx.set_attr_value(&attr.name, &attr.value);
                    }
                    eval = !ti.skip;
                }

                if eval {
                    let mut ctx = TaskContext {
                        inst: &mut *self,
                        flow,
                        task,
                    };
                    behavior.eval(&mut ctx, item.eval_code)?
                } else {
                    // skipped by the interceptor: done without evaluating
                    (true, 0)
                }
            }
            ExecType::PostEval => {
                let mut ctx = TaskContext {
                    inst: &mut *self,
                    flow,
                    task,
                };
                behavior.post_eval(&mut ctx, item.eval_code, None)?
            }
        };

        if done {
            self.mark_task_done(task);
            self.apply_outputs(flow, task)?;
            self.handle_task_done(flow, &behavior, task, done_code)?;
        }

        Ok(())
    }

    fn mark_task_done(&mut self, task: &Task) {
        let (env, tracker) = self.env_and_tracker();
        if let Some(data) = env.task_data_mut(task.id()) {
            data.done = true;
            let snapshot = data.clone();
            tracker.track_task_data(ChangeType::Upd, task.id(), Some(snapshot));
        }
    }

    fn apply_input_mapper(&mut self, flow: &Definition, task: &Task, mapper: &Arc<dyn Mapper>) {
        let Self {
            attrs,
            root_env,
            tracker,
            ..
        } = self;
        let Some(data) = root_env.task_data_mut(task.id()) else {
            warn!("task {} has no data, skipping input mapper", task.id());
            return;
        };
        let source = InstanceScope { attrs, flow };
        let mut target = TaskScope {
            data,
            task,
            tracker,
        };
        mapper.apply(&source, &mut target);
    }

    /// Output handling for a completed task: interceptor outputs first,
    /// then the effective output mapper, or the default `T<id>.<name>`
    /// mapping of the activity's declared outputs.
    fn apply_outputs(&mut self, flow: &Definition, task: &Task) -> Result<()> {
        let task_interceptor = self
            .interceptor
            .as_ref()
            .and_then(|i| i.task(task.id()))
            .cloned();
        if let Some(ti) = &task_interceptor {
            if !ti.outputs.is_empty() {
                let mut ctx = TaskContext {
                    inst: &mut *self,
                    flow,
                    task,
                };
                for attr in &ti.outputs {
                    ctx.set_attr_value(&attr.name, &attr.value);
                }
            }
        }

        let output_mapper = self
            .patch
            .as_ref()
            .and_then(|p| p.output_mapper(task.id()))
            .cloned()
            .or_else(|| task.output_mapper().cloned());

        if let Some(mapper) = output_mapper {
            debug!("applying output mapper for task '{}'", task.name());
            let Self {
                attrs,
                root_env,
                tracker,
                ..
            } = self;
            let source = TaskScopeRef {
                data: root_env.task_data(task.id()),
                task,
            };
            let mut target = InstanceScopeMut {
                attrs,
                flow,
                tracker,
            };
            mapper.apply(&source, &mut target);
            return Ok(());
        }

        if task.activity_type().is_empty() {
            debug!("task '{}' has no activity, skipping default output mapping", task.name());
            return Ok(());
        }

        debug!("applying default output mapping for task '{}'", task.name());
        let activity = self
            .activity_registry()?
            .get(task.activity_type())
            .ok_or_else(|| anyhow!("activity type '{}' not registered", task.activity_type()))?;

        let prefix = format!("T{}.", task.id());
        for out in &activity.metadata().outputs {
            let value = {
                let scope = TaskScopeRef {
                    data: self.root_env.task_data(task.id()),
                    task,
                };
                scope.attr_value(&out.name).unwrap_or_default()
            };
            self.add_attr(&format!("{}{}", prefix, out.name), &out.ty, &value);
        }
        Ok(())
    }

    /// Propagates a completed task upward: ask the behavior what to do,
    /// notify the parent (or finish the flow at the root), schedule any
    /// follow-on entries, and finally release the task. Parent
    /// notification runs before entries so a released parent cannot be
    /// re-entered.
    fn handle_task_done(
        &mut self,
        flow: &Definition,
        behavior: &Arc<dyn TaskBehavior>,
        task: &Task,
        done_code: i32,
    ) -> Result<()> {
        let (notify_parent, child_done_code, entries) = {
            let mut ctx = TaskContext {
                inst: &mut *self,
                flow,
                task,
            };
            behavior.done(&mut ctx, done_code)
        };

        if notify_parent {
            match task.parent().and_then(|id| flow.task(id)) {
                Some(parent) => {
                    // parents are created before their children and
                    // released only after notification
                    if self.root_env.task_data(parent.id()).is_none() {
                        return Err(anyhow!(
                            "parent task {} of completed task {} has no live data",
                            parent.id(),
                            task.id()
                        ));
                    }
                    let parent_behavior =
                        self.model()?.task_behavior(parent.type_id()).ok_or_else(|| {
                            anyhow!("no task behavior registered for type {}", parent.type_id())
                        })?;

                    let (parent_done, parent_done_code) = {
                        let mut ctx = TaskContext {
                            inst: &mut *self,
                            flow,
                            task: parent,
                        };
                        parent_behavior.child_done(&mut ctx, task.id(), child_done_code)
                    };

                    if parent_done {
                        self.mark_task_done(parent);
                        self.handle_task_done(flow, &parent_behavior, parent, parent_done_code)?;
                    }
                }
                None => {
                    // the root finished: the flow is complete
                    let flow_behavior =
                        self.model()?.flow_behavior(flow.type_id()).ok_or_else(|| {
                            anyhow!(
                                "flow model '{}' has no flow behavior for type {}",
                                flow.model_id(),
                                flow.type_id()
                            )
                        })?;
                    flow_behavior.tasks_done(self, child_done_code);
                    flow_behavior.done(self);
                    self.set_status(Status::Completed);
                    info!("flow instance {} completed", self.id);
                }
            }
        }

        for entry in &entries {
            let Some(task_id) = entry.task else {
                warn!("ignoring done-entry without a target task");
                continue;
            };
            self.enter_task(flow, task_id, entry.enter_code)?;
        }

        self.root_env.release_task(task, &mut self.tracker);
        Ok(())
    }

    /// Find-or-create the task's data, run the behavior's enter, and
    /// schedule an eval if the behavior asks for one.
    pub(crate) fn enter_task(
        &mut self,
        flow: &Definition,
        task_id: TaskId,
        enter_code: i32,
    ) -> Result<()> {
        let task = flow
            .task(task_id)
            .ok_or_else(|| anyhow!("cannot enter unknown task {}", task_id))?;
        let behavior = self
            .model()?
            .task_behavior(task.type_id())
            .ok_or_else(|| anyhow!("no task behavior registered for type {}", task.type_id()))?;

        self.root_env
            .find_or_create_task_data(task, &mut self.tracker);

        let (eval, eval_code) = {
            let mut ctx = TaskContext {
                inst: &mut *self,
                flow,
                task,
            };
            behavior.enter(&mut ctx, enter_code)
        };

        if eval {
            self.schedule_eval(task_id, eval_code);
        }
        Ok(())
    }
}

impl FlowContext for Instance {
    fn instance_id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Status {
        self.status
    }

    fn state(&self) -> i32 {
        self.state
    }

    fn set_state(&mut self, state: i32) {
        self.state = state;
        self.tracker.set_state(state);
    }

    fn update_attrs(&mut self, payload: &Value) {
        Instance::update_attrs(self, payload);
    }
}
