//! Collaborator seams: behavior capabilities and listener dispatch.
//!
//! The interpreter only ever calls through these traits and never inspects
//! concrete types. Capabilities are discovered via the `as_*` accessors;
//! an activity whose behavior lacks a capability simply cannot be used in
//! the corresponding position (leaving a non-flow-node is a fatal engine
//! error, for example).

use crate::interpreter::ExecutionCtx;
use crate::tree::Execution;
use crate::types::CaseExecutionId;

/// Behavior of a single activity. `execute` runs when the interpreter
/// reaches the activity; an implementation that returns without enqueuing
/// anything leaves the execution in a wait state.
pub trait ActivityBehavior: Send + Sync {
    fn execute(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()>;

    /// External trigger for a waiting execution (task completion, message).
    /// The default continues through the normal leave path.
    fn signal(&self, ctx: &mut ExecutionCtx<'_>, _signal: &str) -> anyhow::Result<()> {
        ctx.enqueue_leave()?;
        Ok(())
    }

    fn as_flow_node(&self) -> Option<&dyn FlowNodeBehavior> {
        None
    }

    fn as_composite(&self) -> Option<&dyn CompositeBehavior> {
        None
    }

    fn as_sub_process(&self) -> Option<&dyn SubProcessBehavior> {
        None
    }

    /// True for behaviors that throw compensation: their activity instances
    /// synchronize with child scopes the same way composites do.
    fn is_compensation_throwing(&self) -> bool {
        false
    }

    /// Whether activity instances of child scopes belong to this behavior's
    /// instance. Also guards scope destruction: a scope execution whose
    /// behavior still requires child scopes must not be collapsed while any
    /// remain.
    fn can_have_child_scopes(&self) -> bool {
        self.as_composite().is_some() || self.is_compensation_throwing()
    }
}

/// Flow nodes have a defined notion of outgoing transitions; only they can
/// be left.
pub trait FlowNodeBehavior: ActivityBehavior {
    /// Decide which transitions to take next, typically via
    /// [`ExecutionCtx::take_transitions`] or [`ExecutionCtx::leave_default`].
    fn do_leave(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()>;
}

/// Scope activities that own nested activity instances (embedded
/// sub-processes and the like).
pub trait CompositeBehavior: ActivityBehavior {
    /// Invoked on the scope execution once all work inside the scope has
    /// ended. Usually leaves the scope activity.
    fn complete(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()>;
}

/// Activities that start another process instance and wait for it.
///
/// Both hooks are invoked with the ended execution logically finished but
/// not yet structurally removed, so output capture still sees its final
/// variable state.
pub trait SubProcessBehavior: ActivityBehavior {
    /// Transfer output data from the ending sub-process instance to the
    /// calling execution. Runs strictly before `completed`.
    fn pass_output_variables(
        &self,
        calling: &mut Execution,
        ended: &Execution,
    ) -> anyhow::Result<()>;

    /// Resume the calling execution after the sub-process execution has been
    /// destroyed.
    fn completed(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()>;
}

/// Bridge to the case-execution collaborator for process instances started
/// as sub-cases.
pub trait SuperCaseBridge: Send + Sync {
    fn transfer_variables(
        &self,
        ended: &Execution,
        case_execution: &CaseExecutionId,
    ) -> anyhow::Result<()>;

    fn completed(&self, case_execution: &CaseExecutionId) -> anyhow::Result<()>;
}

/// Listener hook fired at the defined extension points with a well-known
/// event-name constant per phase ([`crate::types::EVENT_START`],
/// [`crate::types::EVENT_END`], [`crate::types::EVENT_TAKE`]).
pub trait ExecutionListener: Send + Sync {
    fn notify(&self, event: &str, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()>;
}

/// Host hook consulted when an operation that declares
/// `handles_failure_as_process_error` fails with a modeled process error.
/// Returning `Ok(true)` means the error was converted into a caught process
/// error and the engine may carry on with whatever the handler enqueued.
pub trait ProcessErrorHandler: Send + Sync {
    fn handle(
        &self,
        error: &crate::error::ProcessError,
        ctx: &mut ExecutionCtx<'_>,
    ) -> anyhow::Result<bool>;
}
