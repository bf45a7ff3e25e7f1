mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use common::AssignMapper;
use flowrun::model::simple::MODEL_SIMPLE;
use flowrun::{
    ActivityRegistry, Definition, FlowBuilder, InMemoryFlowProvider, Instance, ModelRegistry,
    Status,
};

const FLOW_URI: &str = "flow://pair";

fn pair_flow() -> Definition {
    FlowBuilder::new("pair", MODEL_SIMPLE)
        .task(2, "a")
        .activity("echo")
        .attr("msg", "string", "")
        .attr("out", "string", "")
        .input_mapper(AssignMapper::new(&[("msg", "msg")]))
        .build()
        .task(3, "b")
        .activity("echo")
        .attr("msg", "string", "")
        .attr("out", "string", "")
        .input_mapper(AssignMapper::new(&[("msg", "msg")]))
        .build()
        .link(1, 2, 3)
        .build()
        .expect("flow should build")
}

fn attr_values(inst: &Instance) -> BTreeMap<String, String> {
    inst.attrs()
        .iter()
        .map(|(name, attr)| (name.clone(), attr.value.clone()))
        .collect()
}

fn run_to_completion(inst: &mut Instance) {
    while inst.do_step().expect("step should succeed") {}
}

#[test]
fn restart_round_trip_matches_uninterrupted_run() {
    let models = ModelRegistry::new();
    let activities = Arc::new(ActivityRegistry::new());
    activities.register(Arc::new(common::EchoActivity::new()));

    let flow = Arc::new(pair_flow());
    let provider = Arc::new(InMemoryFlowProvider::new());
    provider.register(FLOW_URI, flow.clone());

    // 1. Reference run, never interrupted
    let mut reference = Instance::new(
        &Uuid::new_v4().to_string(),
        FLOW_URI,
        flow.clone(),
        &models,
        activities.clone(),
    )
    .expect("instance should build");
    assert!(reference.start(&json!({ "msg": "hi" })).expect("start should succeed"));
    run_to_completion(&mut reference);
    assert_eq!(reference.status(), Status::Completed);

    // 2. Interrupted run: stop mid-flight, after task a completed and
    //    task b got scheduled
    let id = Uuid::new_v4().to_string();
    let mut interrupted = Instance::new(&id, FLOW_URI, flow, &models, activities.clone())
        .expect("instance should build");
    assert!(interrupted.start(&json!({ "msg": "hi" })).expect("start should succeed"));
    assert!(interrupted.do_step().expect("step should succeed"));
    assert!(interrupted.do_step().expect("step should succeed"));
    assert_eq!(interrupted.status(), Status::Active);

    let snapshot = serde_json::to_string(&interrupted).expect("instance should serialize");
    let queued = interrupted.work_item_count();
    drop(interrupted);

    // 3. Rehydrate and resume stepping
    let mut revived: Instance =
        serde_json::from_str(&snapshot).expect("snapshot should deserialize");
    revived
        .restart(&id, provider.clone(), &models, activities.clone())
        .expect("restart should succeed");

    assert_eq!(revived.status(), Status::Active);
    assert_eq!(revived.work_item_count(), queued);
    assert!(revived.root_env().task_data(3).is_some());

    run_to_completion(&mut revived);

    // 4. Same terminal state as the uninterrupted run
    assert_eq!(revived.status(), Status::Completed);
    assert_eq!(attr_values(&revived), attr_values(&reference));
    assert_eq!(revived.attr_value("T3.out").as_deref(), Some("hi"));
}

#[test]
fn restart_fails_without_the_flow() {
    let models = ModelRegistry::new();
    let activities = Arc::new(ActivityRegistry::new());
    activities.register(Arc::new(common::EchoActivity::new()));

    let flow = Arc::new(pair_flow());
    let mut inst = Instance::new(
        &Uuid::new_v4().to_string(),
        FLOW_URI,
        flow,
        &models,
        activities.clone(),
    )
    .expect("instance should build");
    assert!(inst.start(&json!({})).expect("start should succeed"));

    let snapshot = serde_json::to_string(&inst).expect("instance should serialize");
    let mut revived: Instance =
        serde_json::from_str(&snapshot).expect("snapshot should deserialize");

    // an empty provider cannot resolve the flow URI
    let empty = Arc::new(InMemoryFlowProvider::new());
    let err = revived
        .restart("revived", empty, &models, activities)
        .expect_err("restart without the flow should fail");
    assert!(err.to_string().contains(FLOW_URI));
}
