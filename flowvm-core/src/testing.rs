//! Reusable behaviors, listeners and collaborator doubles for exercising
//! the interpreter. Process graphs in tests are assembled from these
//! instead of ad-hoc one-off impls.

use crate::behavior::{
    ActivityBehavior, CompositeBehavior, ExecutionListener, FlowNodeBehavior, ProcessErrorHandler,
    SubProcessBehavior, SuperCaseBridge,
};
use crate::error::ProcessError;
use crate::interpreter::{ExecutionCtx, InterruptionKind};
use crate::tree::Execution;
use crate::types::{ActivityId, CaseExecutionId, DefinitionKey, EVENT_TAKE};
use std::sync::Mutex;

/// Pass-through task: executes and immediately continues through the leave
/// path.
pub struct AutomaticTask;

impl ActivityBehavior for AutomaticTask {
    fn execute(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.enqueue_leave()?;
        Ok(())
    }

    fn as_flow_node(&self) -> Option<&dyn FlowNodeBehavior> {
        Some(self)
    }
}

impl FlowNodeBehavior for AutomaticTask {
    fn do_leave(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.leave_default()?;
        Ok(())
    }
}

/// Stays put until signalled from the outside.
pub struct WaitState;

impl ActivityBehavior for WaitState {
    fn execute(&self, _ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_flow_node(&self) -> Option<&dyn FlowNodeBehavior> {
        Some(self)
    }
}

impl FlowNodeBehavior for WaitState {
    fn do_leave(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.leave_default()?;
        Ok(())
    }
}

/// Ends the execution it runs on; ending the last work ends the instance.
pub struct EndEvent;

impl ActivityBehavior for EndEvent {
    fn execute(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.end()?;
        Ok(())
    }
}

/// Embedded sub-process: a scope activity that runs a nested body and
/// completes once all work inside has ended.
pub struct EmbeddedSubProcess {
    initial: ActivityId,
}

impl EmbeddedSubProcess {
    pub fn new(initial: impl Into<ActivityId>) -> Self {
        Self {
            initial: initial.into(),
        }
    }
}

impl ActivityBehavior for EmbeddedSubProcess {
    fn execute(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.enter_activity(self.initial.clone())?;
        Ok(())
    }

    fn as_flow_node(&self) -> Option<&dyn FlowNodeBehavior> {
        Some(self)
    }

    fn as_composite(&self) -> Option<&dyn CompositeBehavior> {
        Some(self)
    }
}

impl FlowNodeBehavior for EmbeddedSubProcess {
    fn do_leave(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.leave_default()?;
        Ok(())
    }
}

impl CompositeBehavior for EmbeddedSubProcess {
    fn complete(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.enqueue_leave()?;
        Ok(())
    }
}

/// Starts another definition as a sub-process and waits for it. Named
/// output variables (all, when none are named) are copied back to the
/// calling execution when the sub-process instance ends.
pub struct CallActivity {
    definition: DefinitionKey,
    outputs: Vec<String>,
}

impl CallActivity {
    pub fn new(definition: impl Into<DefinitionKey>) -> Self {
        Self {
            definition: definition.into(),
            outputs: Vec::new(),
        }
    }

    pub fn with_outputs(mut self, outputs: Vec<String>) -> Self {
        self.outputs = outputs;
        self
    }
}

impl ActivityBehavior for CallActivity {
    fn execute(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.create_sub_process_instance(self.definition.clone())?;
        Ok(())
    }

    fn as_flow_node(&self) -> Option<&dyn FlowNodeBehavior> {
        Some(self)
    }

    fn as_sub_process(&self) -> Option<&dyn SubProcessBehavior> {
        Some(self)
    }
}

impl FlowNodeBehavior for CallActivity {
    fn do_leave(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.leave_default()?;
        Ok(())
    }
}

impl SubProcessBehavior for CallActivity {
    fn pass_output_variables(
        &self,
        calling: &mut Execution,
        ended: &Execution,
    ) -> anyhow::Result<()> {
        for (name, value) in ended.variables() {
            if self.outputs.is_empty() || self.outputs.iter().any(|o| o == name) {
                calling.set_variable(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn completed(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.enqueue_leave()?;
        Ok(())
    }
}

/// Clears the enclosing scope and enters the configured activity, in the
/// manner of a terminate end event or a cancel boundary.
pub struct ScopeInterrupter {
    activity: ActivityId,
    kind: InterruptionKind,
}

impl ScopeInterrupter {
    pub fn new(activity: impl Into<ActivityId>, kind: InterruptionKind) -> Self {
        Self {
            activity: activity.into(),
            kind,
        }
    }
}

impl ActivityBehavior for ScopeInterrupter {
    fn execute(&self, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        ctx.execute_interruption(self.activity.clone(), self.kind)?;
        Ok(())
    }
}

/// Fails with the given message every time it executes.
pub struct FailingTask {
    message: String,
}

impl FailingTask {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ActivityBehavior for FailingTask {
    fn execute(&self, _ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("{}", self.message))
    }
}

// ─── Listeners ────────────────────────────────────────────────

/// Records every notification as `event:name`, where name is the pending
/// transition for take events and the current activity otherwise.
#[derive(Default)]
pub struct RecordingListener {
    seen: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<String> {
        self.seen.lock().expect("listener log poisoned").clone()
    }
}

impl ExecutionListener for RecordingListener {
    fn notify(&self, event: &str, ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        let exec = ctx.execution()?;
        let name = if event == EVENT_TAKE {
            exec.transition().cloned()
        } else {
            exec.activity().cloned()
        };
        self.seen
            .lock()
            .expect("listener log poisoned")
            .push(format!("{event}:{}", name.unwrap_or_else(|| "<process>".to_string())));
        Ok(())
    }
}

/// Raises a modeled process error on every notification.
pub struct ErrorRaisingListener {
    code: String,
}

impl ErrorRaisingListener {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl ExecutionListener for ErrorRaisingListener {
    fn notify(&self, event: &str, _ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<()> {
        Err(ProcessError::new(self.code.clone(), format!("raised during {event}")).into())
    }
}

// ─── Collaborator doubles ─────────────────────────────────────

/// Boundary handler that records caught error codes and reports every
/// process error as handled.
#[derive(Default)]
pub struct CatchingErrorHandler {
    caught: Mutex<Vec<String>>,
}

impl CatchingErrorHandler {
    pub fn caught(&self) -> Vec<String> {
        self.caught.lock().expect("handler log poisoned").clone()
    }
}

impl ProcessErrorHandler for CatchingErrorHandler {
    fn handle(&self, error: &ProcessError, _ctx: &mut ExecutionCtx<'_>) -> anyhow::Result<bool> {
        self.caught
            .lock()
            .expect("handler log poisoned")
            .push(error.code.clone());
        Ok(true)
    }
}

/// Case bridge double that records variable transfers and completions.
#[derive(Default)]
pub struct RecordingCaseBridge {
    notifications: Mutex<Vec<String>>,
}

impl RecordingCaseBridge {
    pub fn notifications(&self) -> Vec<String> {
        self.notifications
            .lock()
            .expect("bridge log poisoned")
            .clone()
    }
}

impl SuperCaseBridge for RecordingCaseBridge {
    fn transfer_variables(
        &self,
        ended: &Execution,
        case_execution: &CaseExecutionId,
    ) -> anyhow::Result<()> {
        self.notifications
            .lock()
            .expect("bridge log poisoned")
            .push(format!(
                "variables:{case_execution}:{}",
                ended.variables().len()
            ));
        Ok(())
    }

    fn completed(&self, case_execution: &CaseExecutionId) -> anyhow::Result<()> {
        self.notifications
            .lock()
            .expect("bridge log poisoned")
            .push(format!("completed:{case_execution}"));
        Ok(())
    }
}
