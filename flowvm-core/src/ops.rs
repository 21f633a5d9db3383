//! The atomic-operation catalogue.
//!
//! Every interpreter step is one of these operations, keyed by a stable
//! canonical name so a suspended execution can be resumed in a later
//! transaction purely from its persisted state. Operations never call each
//! other directly; they enqueue follow-ups on the dispatcher stack and
//! return, which keeps the call depth flat no matter how long the process
//! runs.

use crate::behavior::ExecutionListener;
use crate::error::{EngineError, Result};
use crate::events::MutationEvent;
use crate::interpreter::ExecutionCtx;
use crate::types::{
    ActivityId, ExecutionId, ScopeInstantiation, TransitionId, EVENT_END, EVENT_START, EVENT_TAKE,
};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtomicOperation {
    /// Fire process-level start listeners and seed the instantiation stack
    /// with the scope chain of the initial activity.
    ProcessStart,
    /// Pop the next activity off the instantiation stack, creating a scope
    /// execution for scope activities.
    ActivityInitStack,
    /// Entry step during instantiation: activity instance, start listeners,
    /// then either deeper into the stack or into execution.
    ActivityInitStackNotifyListenerStart,
    /// Fire take listeners on the pending transition.
    TransitionNotifyListenerTake,
    /// Entry step after a transition: scope creation for scope destinations,
    /// activity instance, start listeners, then execution.
    TransitionNotifyListenerStart,
    /// Invoke the activity's behavior.
    ActivityExecute,
    /// End the activity instance and delegate to the flow-node leave hook.
    ActivityLeave,
    /// Collapse finished scope executions and propagate the execution along
    /// one or several outgoing transitions.
    TransitionDestroyScope,
    /// Fire end listeners and fold the execution back into its
    /// surroundings.
    ActivityNotifyListenerEnd,
    /// Clear the enclosing scope for an interrupting activity entered via
    /// scope instantiation.
    ActivityStartInterruptScope,
    /// Clear the enclosing scope for an interrupting activity entered via
    /// the normal transition path.
    ActivityStartCancelScope,
    /// Fire process-level end listeners and tear down the instance root,
    /// notifying a super execution or super case if one is attached.
    ProcessEnd,
}

impl AtomicOperation {
    /// Stable name persisted in [`crate::types::PersistedExecution`].
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::ProcessStart => "process-start",
            Self::ActivityInitStack => "activity-init-stack",
            Self::ActivityInitStackNotifyListenerStart => {
                "activity-init-stack-notify-listener-start"
            }
            Self::TransitionNotifyListenerTake => "transition-notify-listener-take",
            Self::TransitionNotifyListenerStart => "transition-notify-listener-start",
            Self::ActivityExecute => "activity-execute",
            Self::ActivityLeave => "activity-leave",
            Self::TransitionDestroyScope => "transition-destroy-scope",
            Self::ActivityNotifyListenerEnd => "activity-end",
            Self::ActivityStartInterruptScope => "activity-start-interrupt-scope",
            Self::ActivityStartCancelScope => "activity-start-cancel-scope",
            Self::ProcessEnd => "process-end",
        }
    }

    pub fn from_canonical_name(name: &str) -> Option<Self> {
        Some(match name {
            "process-start" => Self::ProcessStart,
            "activity-init-stack" => Self::ActivityInitStack,
            "activity-init-stack-notify-listener-start" => {
                Self::ActivityInitStackNotifyListenerStart
            }
            "transition-notify-listener-take" => Self::TransitionNotifyListenerTake,
            "transition-notify-listener-start" => Self::TransitionNotifyListenerStart,
            "activity-execute" => Self::ActivityExecute,
            "activity-leave" => Self::ActivityLeave,
            "transition-destroy-scope" => Self::TransitionDestroyScope,
            "activity-end" => Self::ActivityNotifyListenerEnd,
            "activity-start-interrupt-scope" => Self::ActivityStartInterruptScope,
            "activity-start-cancel-scope" => Self::ActivityStartCancelScope,
            "process-end" => Self::ProcessEnd,
            _ => return None,
        })
    }

    /// Whether the trampoline may suspend here instead of executing, when
    /// the destination activity asks for an async continuation.
    pub fn is_async_capable(self) -> bool {
        matches!(self, Self::TransitionNotifyListenerStart)
    }

    /// Whether a modeled process error raised during this operation may be
    /// handed to the host's error-boundary hook instead of aborting.
    pub fn handles_failure_as_process_error(self) -> bool {
        matches!(self, Self::TransitionNotifyListenerStart)
    }

    pub(crate) fn execute(self, ctx: &mut ExecutionCtx<'_>) -> Result<()> {
        match self {
            Self::ProcessStart => process_start(ctx),
            Self::ActivityInitStack => activity_init_stack(ctx),
            Self::ActivityInitStackNotifyListenerStart => activity_init_stack_notify(ctx),
            Self::TransitionNotifyListenerTake => transition_notify_listener_take(ctx),
            Self::TransitionNotifyListenerStart => transition_notify_listener_start(ctx),
            Self::ActivityExecute => activity_execute(ctx),
            Self::ActivityLeave => activity_leave(ctx),
            Self::TransitionDestroyScope => transition_destroy_scope(ctx),
            Self::ActivityNotifyListenerEnd => activity_notify_listener_end(ctx),
            Self::ActivityStartInterruptScope | Self::ActivityStartCancelScope => {
                interrupt_scope(ctx, self)
            }
            Self::ProcessEnd => process_end(ctx),
        }
    }
}

impl std::fmt::Display for AtomicOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_name())
    }
}

// ─── Shared helpers ───────────────────────────────────────────

fn describe(ctx: &ExecutionCtx<'_>) -> String {
    describe_other(ctx, ctx.id)
}

fn describe_other(ctx: &ExecutionCtx<'_>, id: ExecutionId) -> String {
    ctx.tree
        .get(id)
        .map(|e| e.to_string())
        .unwrap_or_else(|_| id.to_string())
}

fn current_activity(ctx: &ExecutionCtx<'_>) -> Result<ActivityId> {
    ctx.tree
        .get(ctx.id)?
        .activity()
        .cloned()
        .ok_or(EngineError::NoCurrentActivity(ctx.id))
}

fn notify_listeners(
    ctx: &mut ExecutionCtx<'_>,
    listeners: Vec<Arc<dyn ExecutionListener>>,
    event: &'static str,
    activity_id: &str,
    activity_type: &str,
) -> Result<()> {
    for listener in listeners {
        if let Err(err) = listener.notify(event, ctx) {
            let execution = describe(ctx);
            return Err(EngineError::from_behavior(
                err,
                activity_id,
                activity_type,
                execution,
            ));
        }
    }
    Ok(())
}

/// A scope execution whose behavior owns child activity instances shares its
/// instance id with its parent execution.
fn propagate_activity_instance(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let (is_scope, activity, instance, parent) = {
        let e = ctx.tree.get(ctx.id)?;
        (
            e.is_scope(),
            e.activity().cloned(),
            e.activity_instance(),
            e.parent(),
        )
    };
    let (Some(activity), Some(parent)) = (activity, parent) else {
        return Ok(());
    };
    if !is_scope {
        return Ok(());
    }
    let def = ctx.definition()?;
    if def.activity(&activity)?.behavior().can_have_child_scopes() {
        ctx.tree.get_mut(parent)?.activity_instance = instance;
    }
    Ok(())
}

// ─── Instance start ───────────────────────────────────────────

fn process_start(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let def = ctx.definition()?;
    debug!(execution = %ctx.id, definition = %def.key(), "starting process instance");
    let listeners = def.listeners(EVENT_START).to_vec();
    let key = def.key().to_string();
    notify_listeners(ctx, listeners, EVENT_START, &key, "process")?;

    let chain = def.scope_chain(def.initial())?;
    ctx.tree.get_mut(ctx.id)?.instantiation = Some(ScopeInstantiation::new(chain));
    ctx.enqueue_here(AtomicOperation::ActivityInitStack)
}

fn activity_init_stack(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let next = {
        let exec = ctx.tree.get_mut(ctx.id)?;
        let inst = exec
            .instantiation
            .as_mut()
            .ok_or(EngineError::EmptyInstantiationStack(ctx.id))?;
        if inst.stack.is_empty() {
            return Err(EngineError::EmptyInstantiationStack(ctx.id));
        }
        inst.stack.remove(0)
    };
    let def = ctx.definition()?;
    let target = if def.activity(&next)?.is_scope() {
        // a scope activity gets a dedicated execution; the remaining chain
        // moves down with it
        ctx.tree.set_activity(ctx.id, Some(next.clone()))?;
        let child = ctx.tree.create_child(ctx.id, true)?;
        let remaining = ctx.tree.get_mut(ctx.id)?.instantiation.take();
        ctx.tree.get_mut(ctx.id)?.active = false;
        ctx.tree.get_mut(child)?.instantiation = remaining;
        ctx.tree.set_activity(child, Some(next))?;
        child
    } else {
        ctx.tree.set_activity(ctx.id, Some(next))?;
        ctx.id
    };
    ctx.enqueue(target, AtomicOperation::ActivityInitStackNotifyListenerStart)
}

fn activity_init_stack_notify(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let activity_id = current_activity(ctx)?;
    let def = ctx.definition()?;
    let act = def.activity(&activity_id)?;
    let activity_type = act.activity_type().to_string();
    let listeners = act.listeners(EVENT_START).to_vec();

    ctx.tree.enter_activity_instance(ctx.id)?;
    ctx.tree.set_transition(ctx.id, None)?;
    notify_listeners(ctx, listeners, EVENT_START, &activity_id, &activity_type)?;

    propagate_activity_instance(ctx)?;
    let more = ctx
        .tree
        .get(ctx.id)?
        .instantiation
        .as_ref()
        .map(|i| !i.stack.is_empty())
        .unwrap_or(false);
    if more {
        ctx.enqueue_here(AtomicOperation::ActivityInitStack)
    } else {
        // instantiation context is step-scoped, dispose before running
        ctx.tree.get_mut(ctx.id)?.instantiation = None;
        ctx.enqueue_here(AtomicOperation::ActivityExecute)
    }
}

// ─── Transition path ──────────────────────────────────────────

fn transition_notify_listener_take(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let transition_id = ctx
        .tree
        .get(ctx.id)?
        .transition()
        .cloned()
        .ok_or_else(|| EngineError::UnknownTransition("<no pending transition>".to_string()))?;
    let def = ctx.definition()?;
    let transition = def.transition(&transition_id)?;
    let source = transition.source().clone();
    let listeners = transition.take_listeners().to_vec();
    let source_type = def.activity(&source)?.activity_type().to_string();
    debug!(execution = %ctx.id, transition = %transition_id, "taking transition");

    notify_listeners(ctx, listeners, EVENT_TAKE, &source, &source_type)?;
    ctx.enqueue_here(AtomicOperation::TransitionNotifyListenerStart)
}

fn transition_notify_listener_start(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let def = ctx.definition()?;
    let (transition, current) = {
        let e = ctx.tree.get(ctx.id)?;
        (e.transition().cloned(), e.activity().cloned())
    };
    // Destination comes from the pending transition, or from the current
    // activity when the transition was already consumed by an earlier step.
    let dest_id = match &transition {
        Some(t) => def.transition(t)?.destination().clone(),
        None => current.ok_or(EngineError::NoCurrentActivity(ctx.id))?,
    };
    let dest = def.activity(&dest_id)?;

    if dest.is_scope() && transition.is_some() {
        // The destination scope gets a dedicated execution. Entry finishes
        // there without the transition, so re-entry cannot recurse.
        ctx.tree.set_transition(ctx.id, None)?;
        ctx.tree.set_activity(ctx.id, Some(dest_id.clone()))?;
        let child = ctx.tree.create_child(ctx.id, true)?;
        ctx.tree.get_mut(ctx.id)?.active = false;
        ctx.tree.set_activity(child, Some(dest_id))?;
        return ctx.enqueue(child, AtomicOperation::TransitionNotifyListenerStart);
    }

    let activity_type = dest.activity_type().to_string();
    let listeners = dest.listeners(EVENT_START).to_vec();
    ctx.tree.enter_activity_instance(ctx.id)?;
    ctx.tree.set_transition(ctx.id, None)?;
    ctx.tree.set_activity(ctx.id, Some(dest_id.clone()))?;
    notify_listeners(ctx, listeners, EVENT_START, &dest_id, &activity_type)?;

    // entry may complete on a scope child; the starting flag lives on the
    // instance root
    let root = ctx.tree.get(ctx.id)?.process_instance();
    ctx.tree.get_mut(root)?.process_instance_starting = false;
    propagate_activity_instance(ctx)?;
    ctx.enqueue_here(AtomicOperation::ActivityExecute)
}

// ─── Behavior invocation ──────────────────────────────────────

fn activity_execute(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let activity_id = current_activity(ctx)?;
    let def = ctx.definition()?;
    let act = def.activity(&activity_id)?;
    let activity_type = act.activity_type().to_string();
    let behavior = act.behavior();
    debug!(
        execution = %ctx.id,
        activity = %activity_id,
        activity_type = %activity_type,
        "executing activity behavior"
    );
    if let Some(instance) = ctx.tree.get(ctx.id)?.activity_instance() {
        ctx.tree
            .log_activity_instance_started(ctx.id, activity_id.clone(), instance);
    }
    behavior.execute(ctx).map_err(|err| {
        let execution = describe(ctx);
        EngineError::from_behavior(err, &activity_id, &activity_type, execution)
    })
}

fn activity_leave(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let activity_id = current_activity(ctx)?;
    let def = ctx.definition()?;
    let act = def.activity(&activity_id)?;
    let activity_type = act.activity_type().to_string();
    let behavior = act.behavior();

    ctx.tree.leave_activity_instance(ctx.id)?;
    let Some(flow) = behavior.as_flow_node() else {
        return Err(EngineError::NotAFlowNode {
            activity_id,
            activity_type,
        });
    };
    flow.do_leave(ctx).map_err(|err| {
        let execution = describe(ctx);
        EngineError::from_behavior(err, &activity_id, &activity_type, execution)
    })
}

// ─── Scope destruction and propagation ────────────────────────

struct OutgoingExecution {
    execution: ExecutionId,
    transition: TransitionId,
}

fn transition_destroy_scope(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let transitions = std::mem::take(&mut ctx.tree.get_mut(ctx.id)?.transitions_to_take);
    let activity_id = current_activity(ctx)?;
    let def = ctx.definition()?;
    let act = def.activity(&activity_id)?;
    let activity_type = act.activity_type().to_string();
    let (is_scope, concurrent) = {
        let e = ctx.tree.get(ctx.id)?;
        (e.is_scope(), e.is_concurrent())
    };

    let propagating = if is_scope && act.is_scope() && !concurrent {
        if act.behavior().can_have_child_scopes()
            && !ctx.tree.non_event_scope_children(ctx.id)?.is_empty()
        {
            return Err(EngineError::InvalidDestroy {
                execution: ctx.id,
                reason: format!("behavior of activity '{activity_id}' still requires child scopes"),
            });
        }
        ctx.tree.destroy(ctx.id)?
    } else {
        // concurrent executions propagate on themselves and keep their
        // scope parent alive
        ctx.id
    };

    match transitions.len() {
        0 => Err(EngineError::NoOutgoingTransitions {
            activity_id,
            activity_type,
        }),
        1 => {
            let transition = transitions.into_iter().next().expect("length checked");
            ctx.tree.set_transition(propagating, Some(transition))?;
            ctx.enqueue(propagating, AtomicOperation::TransitionNotifyListenerTake)
        }
        _ => fork(ctx, propagating, transitions),
    }
}

fn fork(
    ctx: &mut ExecutionCtx<'_>,
    propagating: ExecutionId,
    transitions: Vec<TransitionId>,
) -> Result<()> {
    ctx.tree.get_mut(propagating)?.active = false;
    let (prop_is_scope, prop_parent) = {
        let e = ctx.tree.get(propagating)?;
        (e.is_scope(), e.parent())
    };
    let scope = if prop_is_scope {
        propagating
    } else {
        prop_parent.ok_or(EngineError::UnknownExecution(propagating))?
    };

    let mut outgoing: Vec<OutgoingExecution> = Vec::with_capacity(transitions.len());
    let mut remaining = transitions.iter();
    if !prop_is_scope {
        // the propagating execution itself serves the first branch
        let first = remaining.next().expect("fork needs at least two transitions");
        outgoing.push(OutgoingExecution {
            execution: propagating,
            transition: first.clone(),
        });
    }
    for transition in remaining {
        let branch = ctx.tree.create_concurrent_execution(scope)?;
        outgoing.push(OutgoingExecution {
            execution: branch,
            transition: transition.clone(),
        });
    }
    ctx.tree.push_event(MutationEvent::ConcurrentForked {
        scope,
        branches: outgoing.iter().map(|o| o.execution).collect(),
        transitions: transitions.clone(),
    });
    debug!(scope = %scope, branches = outgoing.len(), "forking into concurrent branches");

    // Enqueued in reverse declared order: the dispatcher stack is LIFO, so
    // the net dispatch order matches declaration order.
    for out in outgoing.iter().rev() {
        {
            let e = ctx.tree.get_mut(out.execution)?;
            e.concurrent = true;
            e.active = true;
        }
        ctx.tree.set_transition(out.execution, Some(out.transition.clone()))?;
        ctx.enqueue(out.execution, AtomicOperation::TransitionNotifyListenerTake)?;
    }
    Ok(())
}

// ─── Activity end ─────────────────────────────────────────────

fn activity_notify_listener_end(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let activity_id = current_activity(ctx)?;
    let def = ctx.definition()?;
    let act = def.activity(&activity_id)?;
    let activity_type = act.activity_type().to_string();
    let listeners = act.listeners(EVENT_END).to_vec();
    let flow_scope = act.flow_scope().cloned();

    notify_listeners(ctx, listeners, EVENT_END, &activity_id, &activity_type)?;
    ctx.tree.leave_activity_instance(ctx.id)?;

    let (parent, concurrent) = {
        let e = ctx.tree.get(ctx.id)?;
        (e.parent(), e.is_concurrent())
    };
    let Some(parent) = parent else {
        return ctx.enqueue_here(AtomicOperation::ProcessEnd);
    };

    if concurrent {
        // branch done; the last branch to go completes the scope
        ctx.tree.set_activity(ctx.id, None)?;
        ctx.tree.remove(ctx.id)?;
        if ctx.tree.non_event_scope_children(parent)?.is_empty() {
            complete_scope(ctx, parent, flow_scope)?;
        }
        return Ok(());
    }

    match flow_scope {
        Some(_) => complete_scope(ctx, ctx.id, flow_scope),
        None => {
            // a plain child at process level folds straight into the root
            ctx.tree.set_activity(ctx.id, None)?;
            ctx.tree.remove(ctx.id)?;
            if ctx.tree.non_event_scope_children(parent)?.is_empty() {
                ctx.enqueue(parent, AtomicOperation::ProcessEnd)?;
            }
            Ok(())
        }
    }
}

/// All work inside a scope execution has ended; either the whole instance
/// is done or the scope activity itself completes.
fn complete_scope(
    ctx: &mut ExecutionCtx<'_>,
    scope_exec: ExecutionId,
    flow_scope: Option<ActivityId>,
) -> Result<()> {
    let Some(scope_activity) = flow_scope else {
        return ctx.enqueue(scope_exec, AtomicOperation::ProcessEnd);
    };
    ctx.tree.set_activity(scope_exec, Some(scope_activity.clone()))?;
    let def = ctx.definition()?;
    let act = def.activity(&scope_activity)?;
    let activity_type = act.activity_type().to_string();
    let behavior = act.behavior();

    let saved = ctx.id;
    ctx.id = scope_exec;
    let result = match behavior.as_composite() {
        Some(composite) => composite.complete(ctx).map_err(|err| {
            let execution = describe(ctx);
            EngineError::from_behavior(err, &scope_activity, &activity_type, execution)
        }),
        None => ctx.enqueue_here(AtomicOperation::ActivityLeave),
    };
    ctx.id = saved;
    result
}

// ─── Scope interruption ───────────────────────────────────────

/// Shared interruption step. The two concrete operations differ only in how
/// the interrupting activity is entered afterwards: fresh scope
/// instantiation, or the normal transition entry path.
fn interrupt_scope(ctx: &mut ExecutionCtx<'_>, op: AtomicOperation) -> Result<()> {
    let (next, transition, is_scope, parent) = {
        let e = ctx.tree.get(ctx.id)?;
        (
            e.next_activity.clone(),
            e.transition().cloned(),
            e.is_scope(),
            e.parent(),
        )
    };
    let interrupting = next.ok_or(EngineError::NoCurrentActivity(ctx.id))?;
    let scope = if is_scope {
        ctx.id
    } else {
        let parent = parent.ok_or(EngineError::UnknownExecution(ctx.id))?;
        // the triggering execution goes first so it can never fire its own
        // end events after the interruption
        ctx.tree.set_activity(ctx.id, None)?;
        ctx.tree.remove(ctx.id)?;
        parent
    };
    let reason = format!(
        "interrupting execution, entering activity '{interrupting}' ({})",
        op.canonical_name()
    );
    debug!(scope = %scope, activity = %interrupting, "interrupting scope");
    ctx.tree.interrupt(scope, reason)?;
    ctx.tree.set_activity(scope, Some(interrupting.clone()))?;
    ctx.tree.set_transition(scope, transition)?;
    {
        let s = ctx.tree.get_mut(scope)?;
        s.active = true;
        s.next_activity = None;
    }

    if op == AtomicOperation::ActivityStartInterruptScope {
        ctx.tree.get_mut(scope)?.instantiation =
            Some(ScopeInstantiation::new(vec![interrupting]));
        ctx.enqueue(scope, AtomicOperation::ActivityInitStack)
    } else {
        ctx.enqueue(scope, AtomicOperation::TransitionNotifyListenerStart)
    }
}

// ─── Instance end ─────────────────────────────────────────────

fn process_end(ctx: &mut ExecutionCtx<'_>) -> Result<()> {
    let def = ctx.definition()?;
    let listeners = def.listeners(EVENT_END).to_vec();
    let key = def.key().to_string();
    notify_listeners(ctx, listeners, EVENT_END, &key, "process")?;

    ctx.tree.leave_activity_instance(ctx.id)?;
    {
        let e = ctx.tree.get_mut(ctx.id)?;
        e.ended = true;
        e.active = false;
    }
    ctx.tree
        .push_event(MutationEvent::ProcessInstanceEnded { execution: ctx.id });

    let (super_execution, super_case) = {
        let e = ctx.tree.get(ctx.id)?;
        (e.super_execution(), e.super_case_execution().cloned())
    };
    if let Some(calling) = super_execution {
        return complete_super_execution(ctx, calling);
    }
    if let Some(case_execution) = super_case {
        return complete_super_case(ctx, case_execution);
    }
    debug!(execution = %ctx.id, "process instance ended");
    ctx.tree.remove(ctx.id)
}

fn complete_super_execution(ctx: &mut ExecutionCtx<'_>, calling: ExecutionId) -> Result<()> {
    // The ended instance is logically finished but still observable, so
    // output capture sees its final variable state.
    let ended = ctx.tree.get(ctx.id)?.clone();
    let calling_activity = ctx
        .tree
        .get(calling)?
        .activity()
        .cloned()
        .ok_or(EngineError::NoCurrentActivity(calling))?;
    let calling_def = ctx
        .definition_by_key(&ctx.tree.get(calling)?.process_definition().clone())?;
    let behavior = calling_def.activity(&calling_activity)?.behavior();
    let Some(sub) = behavior.as_sub_process() else {
        return Err(EngineError::SubProcessCompletion {
            execution: describe_other(ctx, calling),
            source: anyhow::anyhow!(
                "behavior of activity '{calling_activity}' cannot complete a sub-process"
            ),
        });
    };

    sub.pass_output_variables(ctx.tree.get_mut(calling)?, &ended)
        .map_err(|source| EngineError::SubProcessCompletion {
            execution: ended.to_string(),
            source,
        })?;
    ctx.tree.push_event(MutationEvent::VariablesPassed {
        from: ctx.id,
        to: calling,
    });
    ctx.tree.get_mut(calling)?.sub_process_instance = None;
    ctx.tree.get_mut(ctx.id)?.super_execution = None;
    ctx.tree.remove(ctx.id)?;

    let ended_id = ctx.id;
    ctx.id = calling;
    let result = sub.completed(ctx);
    ctx.id = ended_id;
    result.map_err(|err| {
        let execution = describe_other(ctx, calling);
        error!(execution = %execution, error = %err, "sub-process completion failed");
        match err.downcast::<EngineError>() {
            Ok(engine) => engine,
            Err(source) => EngineError::SubProcessCompletion { execution, source },
        }
    })
}

fn complete_super_case(
    ctx: &mut ExecutionCtx<'_>,
    case_execution: crate::types::CaseExecutionId,
) -> Result<()> {
    let Some(bridge) = ctx.case_bridge() else {
        return Err(EngineError::SubProcessCompletion {
            execution: describe(ctx),
            source: anyhow::anyhow!("no case bridge registered"),
        });
    };
    let ended = ctx.tree.get(ctx.id)?.clone();
    bridge
        .transfer_variables(&ended, &case_execution)
        .map_err(|source| EngineError::SubProcessCompletion {
            execution: ended.to_string(),
            source,
        })?;
    ctx.tree.remove(ctx.id)?;
    bridge.completed(&case_execution).map_err(|source| {
        error!(case_execution = %case_execution, error = %source, "sub-case completion failed");
        EngineError::SubProcessCompletion {
            execution: ended.to_string(),
            source,
        }
    })
}
