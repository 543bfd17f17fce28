//! End-to-end engine tests: deploy, invoke, suspend/resume, sub-flow calls
//! and failure policies.

use agentflow::{Config, EngineBuilder, FailurePolicy, FlowModel, RunOutcome, SchemaState, Vars};
use serde_json::json;

fn deploy(
    engine: &agentflow::Engine,
    flow: serde_json::Value,
) -> FlowModel {
    let model = FlowModel::from_json(&flow.to_string()).unwrap();
    engine.deploy(&model).unwrap();
    model
}

fn post(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": format!("Post {}", id),
        "excerpt": "…",
        "author": "alice",
        "published_at": "2026-01-01"
    })
}

/// trigger -> post_list -> (action:on_read_more) -> link
fn blog_flow() -> serde_json::Value {
    json!({
        "id": "blog_flow",
        "name": "Blog",
        "nodes": [
            {"id": "n1", "slug": "start", "uses": "trigger",
             "parameters": {"schema": {"type": "object", "properties": {"posts": {"type": "array"}}}}},
            {"id": "n2", "slug": "posts", "uses": "post_list",
             "parameters": {"posts": "{{start.posts}}"},
             "appearance": {"layout": "grid"}},
            {"id": "n3", "slug": "open_link", "uses": "link",
             "parameters": {"href": "blog.example.com/{{posts.id}}"}}
        ],
        "connections": [
            {"id": "c1", "source": "n1", "target": "n2", "source_output": "main"},
            {"id": "c2", "source": "n2", "target": "n3", "source_output": "action:on_read_more"}
        ]
    })
}

#[test]
fn test_render_then_resume_drives_to_return() {
    let engine = EngineBuilder::new().async_worker_thread_number(4).build().unwrap();
    engine.launch();
    deploy(&engine, blog_flow());

    let inputs = Vars::new().with("posts", json!([post("p1"), post("p2")]));
    let run = engine.build_run("blog_flow", inputs).unwrap();
    let rid = engine.start_run(run.clone()).unwrap();

    // phase one: the interface node renders and the run suspends
    let outcome = tokio_test::block_on(run.wait());
    let RunOutcome::Suspended {
        node,
        render,
        actions,
    } = outcome
    else {
        panic!("expected a suspended run, got {:?}", outcome);
    };
    assert_eq!(node, "n2");
    assert_eq!(actions, vec!["on_read_more".to_string()]);
    assert_eq!(render.get::<String>("type"), Some("post_list".to_string()));
    // appearance defaults merged with the instance override
    let appearance = render.get_value("appearance").unwrap();
    assert_eq!(appearance["layout"], "grid");
    assert_eq!(appearance["show_excerpt"], true);

    // phase two: the user picks a post; dispatch resumes over the action
    // edge and reaches the link return node
    engine.resume(&rid, "n2", "on_read_more", post("p1")).unwrap();

    let outcome = tokio_test::block_on(run.wait());
    let RunOutcome::Succeeded {
        output,
    } = outcome
    else {
        panic!("expected success, got {:?}", outcome);
    };
    assert_eq!(output.get::<String>("type"), Some("link".to_string()));
    assert_eq!(output.get::<String>("href"), Some("https://blog.example.com/p1".to_string()));

    engine.shutdown();
}

#[test]
fn test_resume_with_undeclared_action_keeps_run_suspended() {
    let engine = EngineBuilder::new().async_worker_thread_number(4).build().unwrap();
    engine.launch();
    deploy(&engine, blog_flow());

    let inputs = Vars::new().with("posts", json!([post("p1")]));
    let run = engine.build_run("blog_flow", inputs).unwrap();
    let rid = engine.start_run(run.clone()).unwrap();

    let outcome = tokio_test::block_on(run.wait());
    assert!(matches!(outcome, RunOutcome::Suspended { .. }));

    engine.resume(&rid, "n2", "on_share", post("p1")).unwrap();

    // the dispatcher rejects the unknown action and restores the suspension
    let outcome = tokio_test::block_on(run.wait());
    assert!(matches!(outcome, RunOutcome::Suspended { .. }));

    // a valid action still goes through afterwards
    engine.resume(&rid, "n2", "on_read_more", post("p1")).unwrap();
    let outcome = tokio_test::block_on(run.wait());
    assert!(matches!(outcome, RunOutcome::Succeeded { .. }));

    engine.shutdown();
}

#[test]
fn test_call_flow_end_to_end() {
    let engine = EngineBuilder::new().async_worker_thread_number(4).build().unwrap();
    engine.launch();

    deploy(
        &engine,
        json!({
            "id": "greet_flow",
            "name": "Greet",
            "nodes": [
                {"id": "s1", "slug": "start", "uses": "trigger"},
                {"id": "s2", "slug": "done", "uses": "return_value",
                 "parameters": {"value": {"greeting": "hello {{start.name}}"}}}
            ],
            "connections": [
                {"id": "c1", "source": "s1", "target": "s2", "source_output": "main"}
            ]
        }),
    );
    deploy(
        &engine,
        json!({
            "id": "parent_flow",
            "name": "Parent",
            "nodes": [
                {"id": "n1", "slug": "start", "uses": "trigger"},
                {"id": "n2", "slug": "call_greet", "uses": "call_flow",
                 "parameters": {"target_flow_id": "greet_flow", "input_mapping": {"name": "{{start.who}}"}}}
            ],
            "connections": [
                {"id": "c1", "source": "n1", "target": "n2", "source_output": "main"}
            ]
        }),
    );

    let run = engine.build_run("parent_flow", Vars::new().with("who", "world")).unwrap();
    engine.start_run(run.clone()).unwrap();

    let outcome = tokio_test::block_on(run.wait());
    let RunOutcome::Succeeded {
        output,
    } = outcome
    else {
        panic!("expected success, got {:?}", outcome);
    };
    assert_eq!(output.get_value("result"), Some(&json!({"greeting": "hello world"})));

    engine.shutdown();
}

#[test]
fn test_call_flow_recursion_fails_closed() {
    let config = Config {
        max_call_depth: 2,
        ..Config::default()
    };
    let engine = EngineBuilder::new().config(config).async_worker_thread_number(4).build().unwrap();
    engine.launch();

    deploy(
        &engine,
        json!({
            "id": "self_flow",
            "name": "Self",
            "nodes": [
                {"id": "n1", "slug": "start", "uses": "trigger"},
                {"id": "n2", "slug": "again", "uses": "call_flow",
                 "parameters": {"target_flow_id": "self_flow"}}
            ],
            "connections": [
                {"id": "c1", "source": "n1", "target": "n2", "source_output": "main"}
            ]
        }),
    );

    let run = engine.build_run("self_flow", Vars::new()).unwrap();
    engine.start_run(run.clone()).unwrap();

    let outcome = tokio_test::block_on(run.wait());
    let RunOutcome::Failed {
        error, ..
    } = outcome
    else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(error.contains("Failed to call flow self_flow"), "unexpected error: {}", error);

    engine.shutdown();
}

#[test]
fn test_halt_run_policy_fails_the_run() {
    let engine = EngineBuilder::new().async_worker_thread_number(4).build().unwrap();
    engine.launch();

    deploy(
        &engine,
        json!({
            "id": "broken_flow",
            "name": "Broken",
            "nodes": [
                {"id": "n1", "slug": "start", "uses": "trigger"},
                {"id": "n2", "slug": "fetch", "uses": "http_request", "parameters": {"url": ""}},
                {"id": "n3", "slug": "done", "uses": "return_value",
                 "parameters": {"value": {"body": "{{fetch.body}}"}}}
            ],
            "connections": [
                {"id": "c1", "source": "n1", "target": "n2", "source_output": "main"},
                {"id": "c2", "source": "n2", "target": "n3", "source_output": "main"}
            ]
        }),
    );

    let run = engine.build_run("broken_flow", Vars::new()).unwrap();
    engine.start_run(run.clone()).unwrap();

    let outcome = tokio_test::block_on(run.wait());
    let RunOutcome::Failed {
        error, ..
    } = outcome
    else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(error.contains("url is required"), "unexpected error: {}", error);

    engine.shutdown();
}

#[test]
fn test_skip_dependents_policy_lets_other_branches_finish() {
    let config = Config {
        failure_policy: FailurePolicy::SkipDependents,
        ..Config::default()
    };
    let engine = EngineBuilder::new().config(config).async_worker_thread_number(4).build().unwrap();
    engine.launch();

    deploy(
        &engine,
        json!({
            "id": "partial_flow",
            "name": "Partial",
            "nodes": [
                {"id": "n1", "slug": "start", "uses": "trigger"},
                {"id": "n2", "slug": "fetch", "uses": "http_request", "parameters": {"url": ""}},
                {"id": "n3", "slug": "after_fetch", "uses": "transform",
                 "parameters": {"mappings": {"body": "{{fetch.body}}"}}},
                {"id": "n4", "slug": "done", "uses": "return_value",
                 "parameters": {"value": {"ok": true}}}
            ],
            "connections": [
                {"id": "c1", "source": "n1", "target": "n2", "source_output": "main"},
                {"id": "c2", "source": "n2", "target": "n3", "source_output": "main"},
                {"id": "c3", "source": "n1", "target": "n4", "source_output": "main"}
            ]
        }),
    );

    let run = engine.build_run("partial_flow", Vars::new()).unwrap();
    engine.start_run(run.clone()).unwrap();

    let outcome = tokio_test::block_on(run.wait());
    let RunOutcome::Succeeded {
        output,
    } = outcome
    else {
        panic!("expected success, got {:?}", outcome);
    };
    assert_eq!(output.get::<bool>("ok"), Some(true));

    engine.shutdown();
}

#[test]
fn test_cross_flow_schemas_settle_after_late_deploy() {
    let engine = EngineBuilder::new().async_worker_thread_number(4).build().unwrap();
    engine.launch();

    // the parent arrives first; its call node's schema cannot resolve yet
    deploy(
        &engine,
        json!({
            "id": "late_parent",
            "name": "Parent",
            "nodes": [
                {"id": "n1", "slug": "start", "uses": "trigger"},
                {"id": "n2", "slug": "call_sub", "uses": "call_flow",
                 "parameters": {"target_flow_id": "late_sub"}}
            ],
            "connections": [
                {"id": "c1", "source": "n1", "target": "n2", "source_output": "main"}
            ]
        }),
    );
    let schemas = engine.flow_schemas("late_parent").unwrap();
    assert_eq!(schemas.nodes["n2"].output, SchemaState::Unresolved);

    // once the target is deployed, re-propagation fills the deferred slot
    deploy(
        &engine,
        json!({
            "id": "late_sub",
            "name": "Sub",
            "nodes": [
                {"id": "s1", "slug": "start", "uses": "trigger"},
                {"id": "s2", "slug": "done", "uses": "return_value",
                 "parameters": {"value": {"temperature": 21}}}
            ],
            "connections": [
                {"id": "c1", "source": "s1", "target": "s2", "source_output": "main"}
            ]
        }),
    );

    let schemas = engine.flow_schemas("late_parent").unwrap();
    let output = schemas.nodes["n2"].output.as_value().expect("resolved after the target arrived");
    assert_eq!(output["properties"]["result"]["properties"]["temperature"], json!({"type": "number"}));

    engine.shutdown();
}

#[test]
fn test_undeployed_flow_is_a_hard_error() {
    let engine = EngineBuilder::new().async_worker_thread_number(4).build().unwrap();
    engine.launch();

    let err = engine.build_run("ghost_flow", Vars::new()).unwrap_err();
    assert!(err.to_string().contains("not deployed"));

    engine.shutdown();
}

#[test]
fn test_structurally_invalid_flow_is_rejected_at_deploy() {
    let engine = EngineBuilder::new().async_worker_thread_number(4).build().unwrap();
    engine.launch();

    let model = FlowModel::from_json(
        &json!({
            "id": "bad_flow",
            "name": "Bad",
            "nodes": [
                {"id": "n1", "slug": "start", "uses": "trigger"},
                {"id": "n2", "slug": "open_link", "uses": "link", "parameters": {"href": "example.com"}}
            ],
            "connections": [
                {"id": "c1", "source": "n1", "target": "n2", "source_output": "main"}
            ]
        })
        .to_string(),
    )
    .unwrap();

    // a link is only reachable from an interface node
    let err = engine.deploy(&model).unwrap_err();
    assert!(err.to_string().contains("interface"));

    engine.shutdown();
}
