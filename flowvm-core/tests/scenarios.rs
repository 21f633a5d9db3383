//! End-to-end interpreter scenarios: whole process graphs driven through
//! the public engine surface.

use flowvm_core::testing::{
    AutomaticTask, CallActivity, CatchingErrorHandler, EmbeddedSubProcess, EndEvent,
    ErrorRaisingListener, FailingTask, RecordingCaseBridge, RecordingListener, ScopeInterrupter,
    WaitState,
};
use flowvm_core::{
    ActivityBehavior, AtomicOperation, EngineConfig, EngineError, ExecutionCtx, ExecutionTree,
    FlowNodeBehavior, InterruptionKind, MutationEvent, ProcessDefinition, ProcessEngine,
    RunOutcome, EVENT_END, EVENT_START,
};
use std::sync::Arc;

/// Writes one variable and continues.
struct SetVariable {
    name: &'static str,
    value: serde_json::Value,
}

impl ActivityBehavior for SetVariable {
    fn execute(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.set_variable(self.name, self.value.clone())?;
        ctx.enqueue_leave()?;
        Ok(())
    }

    fn as_flow_node(&self) -> Option<&dyn FlowNodeBehavior> {
        Some(self)
    }
}

impl FlowNodeBehavior for SetVariable {
    fn do_leave(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.leave_default()?;
        Ok(())
    }
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn engine_with(definitions: Vec<ProcessDefinition>) -> ProcessEngine {
    init_tracing();
    let mut engine = ProcessEngine::new();
    for def in definitions {
        engine.deploy(def);
    }
    engine
}

fn started_activities(tree: &ExecutionTree) -> Vec<String> {
    tree.log()
        .iter()
        .filter_map(|e| match e {
            MutationEvent::ActivityInstanceStarted { activity, .. } => Some(activity.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn straight_line_process_runs_to_completion() {
    let def = ProcessDefinition::builder("order")
        .activity("task", "serviceTask", Arc::new(AutomaticTask))
        .activity("end", "endEvent", Arc::new(EndEvent))
        .transition("t1", "task", "end")
        .initial("task")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let (root, outcome) = engine.start_process(&mut tree, "order").unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert!(tree.is_empty(), "all executions must be removed at the end");
    assert!(tree.instance_executions(root).is_empty());

    let log = tree.take_log();
    assert!(log
        .iter()
        .any(|e| matches!(e, MutationEvent::ProcessInstanceStarted { execution, .. } if *execution == root)));
    assert!(log
        .iter()
        .any(|e| matches!(e, MutationEvent::ProcessInstanceEnded { execution } if *execution == root)));
}

#[test]
fn listeners_fire_in_traversal_order() {
    let rec = Arc::new(RecordingListener::default());
    let def = ProcessDefinition::builder("audited")
        .process_listener(EVENT_START, rec.clone())
        .activity("task", "serviceTask", Arc::new(AutomaticTask))
        .listener(EVENT_START, rec.clone())
        .activity("end", "endEvent", Arc::new(EndEvent))
        .listener(EVENT_START, rec.clone())
        .listener(EVENT_END, rec.clone())
        .transition("t1", "task", "end")
        .take_listener("t1", rec.clone())
        .initial("task")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    engine.start_process(&mut tree, "audited").unwrap();
    assert_eq!(
        rec.events(),
        vec![
            "start:<process>",
            "start:task",
            "take:t1",
            "start:end",
            "end:end"
        ]
    );
}

#[test]
fn fork_produces_concurrent_branches_in_declared_order() {
    let def = ProcessDefinition::builder("parallel")
        .activity("fork", "parallelGateway", Arc::new(AutomaticTask))
        .activity("w1", "userTask", Arc::new(WaitState))
        .activity("w2", "userTask", Arc::new(WaitState))
        .activity("end1", "endEvent", Arc::new(EndEvent))
        .activity("end2", "endEvent", Arc::new(EndEvent))
        .transition("t1", "fork", "w1")
        .transition("t2", "fork", "w2")
        .transition("t3", "w1", "end1")
        .transition("t4", "w2", "end2")
        .initial("fork")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let (root, outcome) = engine.start_process(&mut tree, "parallel").unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let root_exec = tree.get(root).unwrap();
    assert!(!root_exec.is_active(), "forked scope rests while branches run");
    assert_eq!(root_exec.children().len(), 2);
    for child in root_exec.children() {
        let branch = tree.get(*child).unwrap();
        assert!(branch.is_concurrent());
        assert!(branch.is_active());
    }
    // branches start in the order their transitions were declared
    assert_eq!(started_activities(&tree), vec!["fork", "w1", "w2"]);
    let forked = tree.log().iter().find_map(|e| match e {
        MutationEvent::ConcurrentForked { transitions, .. } => Some(transitions.clone()),
        _ => None,
    });
    assert_eq!(forked, Some(vec!["t1".to_string(), "t2".to_string()]));

    // finishing one branch leaves the scope at rest; finishing the last
    // reactivates it and ends the instance
    let at = |tree: &ExecutionTree, activity: &str| {
        tree.executions()
            .find(|e| e.activity().map(String::as_str) == Some(activity))
            .map(|e| e.id())
            .unwrap()
    };
    let first = at(&tree, "w1");
    engine.signal(&mut tree, first, "done").unwrap();
    assert!(tree.contains(root));
    assert!(!tree.get(root).unwrap().is_active());

    let second = at(&tree, "w2");
    engine.signal(&mut tree, second, "done").unwrap();
    assert!(tree.is_empty());
}

#[test]
fn nested_fork_reuses_the_propagating_branch() {
    let def = ProcessDefinition::builder("nested-parallel")
        .activity("fork1", "parallelGateway", Arc::new(AutomaticTask))
        .activity("w0", "userTask", Arc::new(WaitState))
        .activity("fork2", "parallelGateway", Arc::new(AutomaticTask))
        .activity("wa", "userTask", Arc::new(WaitState))
        .activity("wb", "userTask", Arc::new(WaitState))
        .activity("end0", "endEvent", Arc::new(EndEvent))
        .activity("enda", "endEvent", Arc::new(EndEvent))
        .activity("endb", "endEvent", Arc::new(EndEvent))
        .transition("t1", "fork1", "w0")
        .transition("t2", "fork1", "fork2")
        .transition("t3", "fork2", "wa")
        .transition("t4", "fork2", "wb")
        .transition("t5", "w0", "end0")
        .transition("t6", "wa", "enda")
        .transition("t7", "wb", "endb")
        .initial("fork1")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let (root, outcome) = engine.start_process(&mut tree, "nested-parallel").unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    tree.validate().unwrap();

    // the second fork reuses its own branch for the first transition, so
    // three concurrent siblings sit under the one scope execution
    assert_eq!(tree.instance_executions(root).len(), 4);
    let root_exec = tree.get(root).unwrap();
    assert!(!root_exec.is_active());
    assert_eq!(root_exec.children().len(), 3);
    for child in root_exec.children() {
        let branch = tree.get(*child).unwrap();
        assert!(branch.is_concurrent());
        assert!(branch.is_active());
    }
    let forks: Vec<(Vec<_>, Vec<_>)> = tree
        .log()
        .iter()
        .filter_map(|e| match e {
            MutationEvent::ConcurrentForked {
                branches,
                transitions,
                ..
            } => Some((branches.clone(), transitions.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(forks.len(), 2);
    assert_eq!(forks[1].1, vec!["t3".to_string(), "t4".to_string()]);
    assert_eq!(
        forks[1].0[0], forks[0].0[1],
        "first outgoing execution of a nested fork is the forking branch itself"
    );

    // three-way implicit join: the scope reactivates only with the last branch
    let at = |tree: &ExecutionTree, activity: &str| {
        tree.executions()
            .find(|e| e.activity().map(String::as_str) == Some(activity))
            .map(|e| e.id())
            .unwrap()
    };
    for wait in ["wa", "w0"] {
        let id = at(&tree, wait);
        engine.signal(&mut tree, id, "done").unwrap();
        assert!(!tree.get(root).unwrap().is_active());
    }
    let last = at(&tree, "wb");
    engine.signal(&mut tree, last, "done").unwrap();
    assert!(tree.is_empty());
}

#[test]
fn scope_round_trip_restores_parent_activity_pointer() {
    let def = ProcessDefinition::builder("scoped")
        .activity("task", "serviceTask", Arc::new(AutomaticTask))
        .activity("sub", "subProcess", Arc::new(EmbeddedSubProcess::new("inner")))
        .scope()
        .activity("inner", "userTask", Arc::new(WaitState))
        .in_scope("sub")
        .activity("inner_end", "endEvent", Arc::new(EndEvent))
        .in_scope("sub")
        .activity("end", "endEvent", Arc::new(EndEvent))
        .transition("t1", "task", "sub")
        .transition("ti", "inner", "inner_end")
        .transition("t2", "sub", "end")
        .initial("task")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let (root, _) = engine.start_process(&mut tree, "scoped").unwrap();
    assert_eq!(tree.len(), 2, "scope entry creates a dedicated execution");
    let root_exec = tree.get(root).unwrap();
    assert_eq!(root_exec.activity().map(String::as_str), Some("sub"));
    assert!(!root_exec.is_active());
    let scope_child = root_exec.children()[0];
    let child = tree.get(scope_child).unwrap();
    assert!(child.is_scope());
    assert!(child.is_active());
    assert_eq!(child.activity().map(String::as_str), Some("inner"));

    engine.signal(&mut tree, scope_child, "done").unwrap();
    assert!(tree.is_empty());
    assert!(tree
        .log()
        .iter()
        .any(|e| matches!(e, MutationEvent::ScopeDestroyed { execution } if *execution == scope_child)));
}

#[test]
fn initial_activity_inside_a_scope_instantiates_the_chain() {
    let def = ProcessDefinition::builder("deep-start")
        .activity("sub", "subProcess", Arc::new(EmbeddedSubProcess::new("inner")))
        .scope()
        .activity("inner", "userTask", Arc::new(WaitState))
        .in_scope("sub")
        .activity("inner_end", "endEvent", Arc::new(EndEvent))
        .in_scope("sub")
        .activity("end", "endEvent", Arc::new(EndEvent))
        .transition("ti", "inner", "inner_end")
        .transition("t2", "sub", "end")
        .initial("inner")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    // instantiating the initial activity walks the scope chain: the root
    // enters "sub", a scope child carries the stack down to "inner"
    let (root, outcome) = engine.start_process(&mut tree, "deep-start").unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(tree.instance_executions(root).len(), 2);
    let root_exec = tree.get(root).unwrap();
    assert_eq!(root_exec.activity().map(String::as_str), Some("sub"));
    assert!(!root_exec.is_active());
    let scope_child = root_exec.children()[0];
    let child = tree.get(scope_child).unwrap();
    assert!(child.is_scope());
    assert!(child.is_active());
    assert_eq!(child.activity().map(String::as_str), Some("inner"));

    engine.signal(&mut tree, scope_child, "done").unwrap();
    assert!(tree.is_empty());
}

#[test]
fn starting_flag_clears_on_the_root_after_the_first_entry() {
    // the first transition enters a scope, so entry completes on the newly
    // created scope child rather than on the root itself
    let def = ProcessDefinition::builder("scoped-entry")
        .activity("task", "serviceTask", Arc::new(AutomaticTask))
        .activity("sub", "subProcess", Arc::new(EmbeddedSubProcess::new("inner")))
        .scope()
        .activity("inner", "userTask", Arc::new(WaitState))
        .in_scope("sub")
        .transition("t1", "task", "sub")
        .initial("task")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let (root, _) = engine.start_process(&mut tree, "scoped-entry").unwrap();
    let record = tree
        .snapshot()
        .into_iter()
        .find(|r| r.id == root)
        .unwrap();
    assert!(
        !record.process_instance_starting,
        "root must not stay flagged as starting once the first activity was entered"
    );
}

#[test]
fn interrupting_activity_clears_the_scope() {
    let def = ProcessDefinition::builder("terminating")
        .activity("fork", "parallelGateway", Arc::new(AutomaticTask))
        .activity("w1", "userTask", Arc::new(WaitState))
        .activity("w2", "userTask", Arc::new(WaitState))
        .activity(
            "term",
            "terminateEndEvent",
            Arc::new(ScopeInterrupter::new("cleanup", InterruptionKind::InterruptScope)),
        )
        .activity("cleanup", "userTask", Arc::new(WaitState))
        .activity("end", "endEvent", Arc::new(EndEvent))
        .transition("t1", "fork", "w1")
        .transition("t2", "fork", "w2")
        .transition("t3", "w1", "term")
        .transition("t4", "cleanup", "end")
        .initial("fork")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let (root, _) = engine.start_process(&mut tree, "terminating").unwrap();
    assert_eq!(tree.len(), 3);

    let w1 = tree
        .executions()
        .find(|e| e.activity().map(String::as_str) == Some("w1"))
        .map(|e| e.id())
        .unwrap();
    engine.signal(&mut tree, w1, "done").unwrap();

    // exactly one execution survives: the scope, repositioned and active
    assert_eq!(tree.len(), 1);
    let survivor = tree.get(root).unwrap();
    assert!(survivor.is_active());
    assert_eq!(survivor.activity().map(String::as_str), Some("cleanup"));
    assert!(survivor
        .interrupted_reason()
        .unwrap()
        .contains("'cleanup'"));

    engine.signal(&mut tree, root, "done").unwrap();
    assert!(tree.is_empty());
}

#[test]
fn cancel_interruption_enters_via_the_transition_path() {
    let def = ProcessDefinition::builder("cancellable")
        .activity("sub", "transaction", Arc::new(EmbeddedSubProcess::new("inner")))
        .scope()
        .activity("inner", "userTask", Arc::new(WaitState))
        .in_scope("sub")
        .activity(
            "canceller",
            "cancelEndEvent",
            Arc::new(ScopeInterrupter::new("sub_end", InterruptionKind::CancelScope)),
        )
        .in_scope("sub")
        .activity("sub_end", "endEvent", Arc::new(EndEvent))
        .in_scope("sub")
        .activity("end", "endEvent", Arc::new(EndEvent))
        .transition("tc", "inner", "canceller")
        .transition("t2", "sub", "end")
        .initial("sub")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let (_, _) = engine.start_process(&mut tree, "cancellable").unwrap();
    let inner = tree
        .executions()
        .find(|e| e.activity().map(String::as_str) == Some("inner"))
        .map(|e| e.id())
        .unwrap();

    let outcome = engine.signal(&mut tree, inner, "cancel").unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert!(tree.is_empty());
    let interrupted = tree.log().iter().find_map(|e| match e {
        MutationEvent::ScopeInterrupted { reason, .. } => Some(reason.clone()),
        _ => None,
    });
    assert!(interrupted
        .expect("scope must be interrupted")
        .contains("activity-start-cancel-scope"));
}

#[test]
fn sub_process_passes_output_variables_before_teardown() {
    let child = ProcessDefinition::builder("scoring")
        .activity(
            "score",
            "serviceTask",
            Arc::new(SetVariable {
                name: "result",
                value: serde_json::json!(7),
            }),
        )
        .activity("cend", "endEvent", Arc::new(EndEvent))
        .transition("tc", "score", "cend")
        .initial("score")
        .build()
        .unwrap();
    let parent = ProcessDefinition::builder("applying")
        .activity("call", "callActivity", Arc::new(CallActivity::new("scoring")))
        .activity("wait", "userTask", Arc::new(WaitState))
        .activity("end", "endEvent", Arc::new(EndEvent))
        .transition("t1", "call", "wait")
        .transition("t2", "wait", "end")
        .initial("call")
        .build()
        .unwrap();
    let engine = engine_with(vec![child, parent]);
    let mut tree = ExecutionTree::new();

    let (root, outcome) = engine.start_process(&mut tree, "applying").unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    // the sub-process instance ran and was fully torn down again
    let instances: Vec<_> = tree
        .log()
        .iter()
        .filter_map(|e| match e {
            MutationEvent::ProcessInstanceStarted { execution, definition } => {
                Some((*execution, definition.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(instances.len(), 2);
    let sub_root = instances[1].0;
    assert_eq!(instances[1].1, "scoring");
    assert!(!tree.contains(sub_root));

    let caller = tree.get(root).unwrap();
    assert_eq!(caller.activity().map(String::as_str), Some("wait"));
    assert_eq!(caller.sub_process_instance(), None);
    assert_eq!(caller.variable("result"), Some(&serde_json::json!(7)));
    assert!(tree.log().iter().any(|e| matches!(
        e,
        MutationEvent::VariablesPassed { from, to } if *from == sub_root && *to == root
    )));

    engine.signal(&mut tree, root, "done").unwrap();
    assert!(tree.is_empty());
}

#[test]
fn sub_case_completion_goes_through_the_bridge() {
    let def = ProcessDefinition::builder("casework")
        .activity(
            "task",
            "serviceTask",
            Arc::new(SetVariable {
                name: "verdict",
                value: serde_json::json!("ok"),
            }),
        )
        .activity("end", "endEvent", Arc::new(EndEvent))
        .transition("t1", "task", "end")
        .initial("task")
        .build()
        .unwrap();
    let bridge = Arc::new(RecordingCaseBridge::default());
    let mut engine = engine_with(vec![def]);
    engine.set_case_bridge(bridge.clone());

    let mut tree = ExecutionTree::new();
    let (_, outcome) = engine
        .start_process_for_case(&mut tree, "casework", "case-1".to_string())
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert!(tree.is_empty());
    assert_eq!(
        bridge.notifications(),
        vec!["variables:case-1:1", "completed:case-1"]
    );
}

#[test]
fn async_continuation_suspends_and_resumes_from_a_snapshot() {
    let def = ProcessDefinition::builder("batched")
        .activity("task", "serviceTask", Arc::new(AutomaticTask))
        .activity("slow", "serviceTask", Arc::new(AutomaticTask))
        .async_before()
        .activity("end", "endEvent", Arc::new(EndEvent))
        .transition("t1", "task", "slow")
        .transition("t2", "slow", "end")
        .initial("task")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let (root, outcome) = engine.start_process(&mut tree, "batched").unwrap();
    assert_eq!(outcome, RunOutcome::Suspended(vec![root]));
    assert_eq!(
        tree.get(root).unwrap().pending_operation(),
        Some(AtomicOperation::TransitionNotifyListenerStart)
    );

    // cross the transaction boundary: persist, rebuild, continue
    let snapshot = tree.snapshot();
    let record = snapshot.iter().find(|r| r.id == root).unwrap();
    assert_eq!(
        record.pending_operation.as_deref(),
        Some("transition-notify-listener-start")
    );
    let mut restored = ExecutionTree::restore(snapshot).unwrap();
    let outcome = engine.resume(&mut restored, root).unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert!(restored.is_empty());
}

#[test]
fn process_errors_at_the_async_step_reach_the_boundary_handler() {
    let build = || {
        ProcessDefinition::builder("guarded")
            .activity("task", "serviceTask", Arc::new(AutomaticTask))
            .activity("check", "serviceTask", Arc::new(WaitState))
            .listener(EVENT_START, Arc::new(ErrorRaisingListener::new("credit-check-failed")))
            .transition("t1", "task", "check")
            .initial("task")
            .build()
            .unwrap()
    };

    // without a handler the modeled error aborts the run
    let engine = engine_with(vec![build()]);
    let mut tree = ExecutionTree::new();
    let err = engine.start_process(&mut tree, "guarded").unwrap_err();
    assert_eq!(
        err.as_process_error().map(|e| e.code.as_str()),
        Some("credit-check-failed")
    );

    // with a handler the instance survives, parked where the error was caught
    let handler = Arc::new(CatchingErrorHandler::default());
    let mut engine = engine_with(vec![build()]);
    engine.set_error_handler(handler.clone());
    let mut tree = ExecutionTree::new();
    let (root, outcome) = engine.start_process(&mut tree, "guarded").unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(handler.caught(), vec!["credit-check-failed"]);
    assert!(tree.contains(root));
}

#[test]
fn behavior_failures_carry_activity_context() {
    let def = ProcessDefinition::builder("fragile")
        .activity("task", "serviceTask", Arc::new(AutomaticTask))
        .activity("boom", "serviceTask", Arc::new(FailingTask::new("downstream unavailable")))
        .transition("t1", "task", "boom")
        .initial("task")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let err = engine.start_process(&mut tree, "fragile").unwrap_err();
    match err {
        EngineError::ActivityExecution {
            activity_id,
            activity_type,
            source,
            ..
        } => {
            assert_eq!(activity_id, "boom");
            assert_eq!(activity_type, "serviceTask");
            assert_eq!(source.to_string(), "downstream unavailable");
        }
        other => panic!("expected wrapped behavior failure, got {other}"),
    }
}

#[test]
fn leaving_without_outgoing_transitions_is_a_modeling_error() {
    let def = ProcessDefinition::builder("dead-end")
        .activity("task", "serviceTask", Arc::new(AutomaticTask))
        .initial("task")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let err = engine.start_process(&mut tree, "dead-end").unwrap_err();
    assert!(matches!(
        err,
        EngineError::NoOutgoingTransitions { activity_id, .. } if activity_id == "task"
    ));
}

#[test]
fn runaway_graphs_hit_the_operation_limit() {
    let def = ProcessDefinition::builder("cyclic")
        .activity("a", "serviceTask", Arc::new(AutomaticTask))
        .activity("b", "serviceTask", Arc::new(AutomaticTask))
        .transition("t1", "a", "b")
        .transition("t2", "b", "a")
        .initial("a")
        .build()
        .unwrap();
    let mut engine = ProcessEngine::with_config(EngineConfig { max_operations: 50 });
    engine.deploy(def);
    let mut tree = ExecutionTree::new();

    let err = engine.start_process(&mut tree, "cyclic").unwrap_err();
    assert!(matches!(err, EngineError::OperationLimitExceeded { limit: 50, .. }));
}

#[test]
fn resuming_an_execution_at_rest_fails() {
    let def = ProcessDefinition::builder("idle")
        .activity("wait", "userTask", Arc::new(WaitState))
        .initial("wait")
        .build()
        .unwrap();
    let engine = engine_with(vec![def]);
    let mut tree = ExecutionTree::new();

    let (root, outcome) = engine.start_process(&mut tree, "idle").unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    let err = engine.resume(&mut tree, root).unwrap_err();
    assert!(matches!(err, EngineError::NothingToResume(id) if id == root));
}

#[test]
fn starting_an_unknown_definition_fails_before_touching_the_tree() {
    let engine = ProcessEngine::new();
    let mut tree = ExecutionTree::new();
    let err = engine.start_process(&mut tree, "missing").unwrap_err();
    assert!(matches!(err, EngineError::UnknownDefinition(key) if key == "missing"));
    assert!(tree.is_empty());
}
