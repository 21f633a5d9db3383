//! The trampoline dispatcher and the host-facing engine surface.
//!
//! The dispatcher keeps a LIFO stack of execution ids whose pending
//! operation should run next. Operations enqueue follow-ups instead of
//! calling each other, so arbitrarily long processes execute in constant
//! call depth. Because the next step lives on the execution itself, the
//! host can snapshot the tree at any suspension point and resume it in a
//! later transaction, possibly in another system.

use crate::behavior::{ProcessErrorHandler, SuperCaseBridge};
use crate::error::{EngineError, Result};
use crate::graph::ProcessDefinition;
use crate::ops::AtomicOperation;
use crate::tree::{Execution, ExecutionTree};
use crate::types::{ActivityId, CaseExecutionId, DefinitionKey, ExecutionId, TransitionId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound on atomic operations per entry point, as a guard against
    /// cyclic graphs that never reach a wait state.
    pub max_operations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_operations: 10_000,
        }
    }
}

/// Result of driving a tree until quiescence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every enqueued operation ran; the tree is at rest (possibly empty).
    Completed,
    /// One or more executions suspended at an async continuation point and
    /// keep their pending operation for a later [`ProcessEngine::resume`].
    Suspended(Vec<ExecutionId>),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    pub fn suspended_executions(&self) -> &[ExecutionId] {
        match self {
            RunOutcome::Completed => &[],
            RunOutcome::Suspended(ids) => ids,
        }
    }
}

/// How an interrupting activity is entered after its scope was cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptionKind {
    /// Fresh scope instantiation of the interrupting activity.
    InterruptScope,
    /// Normal transition entry into the interrupting activity.
    CancelScope,
}

/// Stateless interpreter over deployed process definitions. All instance
/// state lives in the [`ExecutionTree`] handed to each entry point, so one
/// engine serves any number of trees.
pub struct ProcessEngine {
    definitions: BTreeMap<DefinitionKey, Arc<ProcessDefinition>>,
    case_bridge: Option<Arc<dyn SuperCaseBridge>>,
    error_handler: Option<Arc<dyn ProcessErrorHandler>>,
    config: EngineConfig,
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            definitions: BTreeMap::new(),
            case_bridge: None,
            error_handler: None,
            config,
        }
    }

    pub fn deploy(&mut self, definition: ProcessDefinition) -> DefinitionKey {
        let key = definition.key().to_string();
        self.definitions.insert(key.clone(), Arc::new(definition));
        key
    }

    pub fn definition(&self, key: &str) -> Result<Arc<ProcessDefinition>> {
        self.definitions
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDefinition(key.to_string()))
    }

    pub fn set_case_bridge(&mut self, bridge: Arc<dyn SuperCaseBridge>) {
        self.case_bridge = Some(bridge);
    }

    pub fn set_error_handler(&mut self, handler: Arc<dyn ProcessErrorHandler>) {
        self.error_handler = Some(handler);
    }

    // ── Entry points ──

    /// Create a process instance of the given definition and drive it until
    /// quiescence.
    pub fn start_process(
        &self,
        tree: &mut ExecutionTree,
        definition: &str,
    ) -> Result<(ExecutionId, RunOutcome)> {
        self.start_process_with_variables(tree, definition, BTreeMap::new())
    }

    pub fn start_process_with_variables(
        &self,
        tree: &mut ExecutionTree,
        definition: &str,
        variables: BTreeMap<String, serde_json::Value>,
    ) -> Result<(ExecutionId, RunOutcome)> {
        self.definition(definition)?;
        let root = tree.create_process_instance(definition.to_string());
        {
            let exec = tree.get_mut(root)?;
            exec.variables = variables;
            exec.pending_op = Some(AtomicOperation::ProcessStart);
        }
        let outcome = self.run(tree, vec![root], None)?;
        Ok((root, outcome))
    }

    /// Create a process instance on behalf of a case execution and drive it
    /// until quiescence. When the instance ends it reports back through the
    /// registered [`SuperCaseBridge`].
    pub fn start_process_for_case(
        &self,
        tree: &mut ExecutionTree,
        definition: &str,
        case_execution: CaseExecutionId,
    ) -> Result<(ExecutionId, RunOutcome)> {
        self.definition(definition)?;
        let root = tree.create_process_instance(definition.to_string());
        {
            let exec = tree.get_mut(root)?;
            exec.super_case_execution = Some(case_execution);
            exec.pending_op = Some(AtomicOperation::ProcessStart);
        }
        let outcome = self.run(tree, vec![root], None)?;
        Ok((root, outcome))
    }

    /// Trigger a waiting execution from the outside (task completion,
    /// message receipt) and drive the tree until quiescence again.
    pub fn signal(
        &self,
        tree: &mut ExecutionTree,
        id: ExecutionId,
        signal: &str,
    ) -> Result<RunOutcome> {
        let exec = tree.get(id)?;
        let activity_id = exec
            .activity()
            .cloned()
            .ok_or(EngineError::NoCurrentActivity(id))?;
        let def = self.definition(exec.process_definition())?;
        let act = def.activity(&activity_id)?;
        let activity_type = act.activity_type().to_string();
        let behavior = act.behavior();
        debug!(execution = %id, activity = %activity_id, signal, "signalling execution");

        let mut stack = Vec::new();
        {
            let mut ctx = ExecutionCtx {
                engine: self,
                tree,
                stack: &mut stack,
                id,
            };
            behavior.signal(&mut ctx, signal).map_err(|err| {
                EngineError::from_behavior(err, &activity_id, &activity_type, id.to_string())
            })?;
        }
        self.run(tree, stack, None)
    }

    /// Continue a suspended execution from its persisted pending operation.
    /// The forced first step runs even if its activity asks for an async
    /// continuation, otherwise resumption could never make progress.
    pub fn resume(&self, tree: &mut ExecutionTree, id: ExecutionId) -> Result<RunOutcome> {
        if tree.get(id)?.pending_operation().is_none() {
            return Err(EngineError::NothingToResume(id));
        }
        self.run(tree, vec![id], Some(id))
    }

    // ── Dispatcher ──

    fn run(
        &self,
        tree: &mut ExecutionTree,
        mut stack: Vec<ExecutionId>,
        mut forced: Option<ExecutionId>,
    ) -> Result<RunOutcome> {
        let mut suspended = Vec::new();
        let mut steps: usize = 0;
        while let Some(id) = stack.pop() {
            // Stale stack entries are normal: operations remove executions
            // that other entries still reference.
            if !tree.contains(id) {
                continue;
            }
            let Some(op) = tree.get(id)?.pending_operation() else {
                continue;
            };
            let force_this = forced == Some(id);
            if !force_this && op.is_async_capable() && self.wants_async(tree, id)? {
                debug!(execution = %id, operation = %op, "suspending for async continuation");
                suspended.push(id);
                continue;
            }
            if force_this {
                forced = None;
            }
            steps += 1;
            if steps > self.config.max_operations {
                return Err(EngineError::OperationLimitExceeded {
                    execution: id,
                    limit: self.config.max_operations,
                });
            }
            tree.get_mut(id)?.pending_op = None;
            debug!(execution = %id, operation = %op, "performing atomic operation");
            let mut ctx = ExecutionCtx {
                engine: self,
                tree,
                stack: &mut stack,
                id,
            };
            if let Err(err) = op.execute(&mut ctx) {
                if op.handles_failure_as_process_error() {
                    let handled = self.handle_process_error(tree, &mut stack, id, &err)?;
                    if handled {
                        continue;
                    }
                }
                return Err(err);
            }
        }
        if suspended.is_empty() {
            Ok(RunOutcome::Completed)
        } else {
            Ok(RunOutcome::Suspended(suspended))
        }
    }

    fn handle_process_error(
        &self,
        tree: &mut ExecutionTree,
        stack: &mut Vec<ExecutionId>,
        id: ExecutionId,
        err: &EngineError,
    ) -> Result<bool> {
        let (Some(process_error), Some(handler)) =
            (err.as_process_error(), self.error_handler.as_ref())
        else {
            return Ok(false);
        };
        warn!(
            execution = %id,
            code = %process_error.code,
            "delegating process error to boundary handler"
        );
        let mut ctx = ExecutionCtx {
            engine: self,
            tree,
            stack,
            id,
        };
        handler.handle(process_error, &mut ctx).map_err(|source| {
            EngineError::from_behavior(source, "<error boundary>", "handler", id.to_string())
        })
    }

    fn wants_async(&self, tree: &ExecutionTree, id: ExecutionId) -> Result<bool> {
        let exec = tree.get(id)?;
        let Some(transition) = exec.transition() else {
            return Ok(false);
        };
        let def = self.definition(exec.process_definition())?;
        let dest = def.transition(transition)?.destination().clone();
        Ok(def.activity(&dest)?.is_async_before())
    }
}

/// Mutable view handed to operations, behaviors and listeners: the tree,
/// the dispatcher stack and the execution currently being driven.
pub struct ExecutionCtx<'a> {
    pub(crate) engine: &'a ProcessEngine,
    pub tree: &'a mut ExecutionTree,
    pub(crate) stack: &'a mut Vec<ExecutionId>,
    pub id: ExecutionId,
}

impl ExecutionCtx<'_> {
    pub fn execution(&self) -> Result<&Execution> {
        self.tree.get(self.id)
    }

    pub fn execution_mut(&mut self) -> Result<&mut Execution> {
        self.tree.get_mut(self.id)
    }

    /// Definition of the current execution's process.
    pub fn definition(&self) -> Result<Arc<ProcessDefinition>> {
        let key = self.tree.get(self.id)?.process_definition().clone();
        self.engine.definition(&key)
    }

    pub fn definition_by_key(&self, key: &str) -> Result<Arc<ProcessDefinition>> {
        self.engine.definition(key)
    }

    pub(crate) fn case_bridge(&self) -> Option<Arc<dyn SuperCaseBridge>> {
        self.engine.case_bridge.clone()
    }

    /// Record `op` as the next step of `id` and put it on the dispatcher
    /// stack.
    pub fn enqueue(&mut self, id: ExecutionId, op: AtomicOperation) -> Result<()> {
        self.tree.get_mut(id)?.pending_op = Some(op);
        self.stack.push(id);
        Ok(())
    }

    pub fn enqueue_here(&mut self, op: AtomicOperation) -> Result<()> {
        self.enqueue(self.id, op)
    }

    /// Continue through the normal leave path of the current activity.
    pub fn enqueue_leave(&mut self) -> Result<()> {
        self.enqueue_here(AtomicOperation::ActivityLeave)
    }

    /// Leave the current activity along all of its declared outgoing
    /// transitions.
    pub fn leave_default(&mut self) -> Result<()> {
        let activity = self
            .tree
            .get(self.id)?
            .activity()
            .cloned()
            .ok_or(EngineError::NoCurrentActivity(self.id))?;
        let def = self.definition()?;
        let outgoing = def.activity(&activity)?.outgoing().to_vec();
        self.take_transitions(outgoing)
    }

    /// Propagate along an explicit set of transitions, in the given order.
    /// An empty set fails when the destroy step runs.
    pub fn take_transitions(&mut self, transitions: Vec<TransitionId>) -> Result<()> {
        self.tree.get_mut(self.id)?.transitions_to_take = transitions;
        self.enqueue_here(AtomicOperation::TransitionDestroyScope)
    }

    /// End the current activity; ending the last work in the instance ends
    /// the instance.
    pub fn end(&mut self) -> Result<()> {
        self.enqueue_here(AtomicOperation::ActivityNotifyListenerEnd)
    }

    /// Enter a directly nested activity of the current scope execution,
    /// instantiating intermediate scopes if the activity is itself a scope.
    pub fn enter_activity(&mut self, activity: impl Into<ActivityId>) -> Result<()> {
        self.tree.get_mut(self.id)?.instantiation =
            Some(crate::types::ScopeInstantiation::new(vec![activity.into()]));
        self.enqueue_here(AtomicOperation::ActivityInitStack)
    }

    /// Clear the enclosing scope and enter `activity` afterwards.
    pub fn execute_interruption(
        &mut self,
        activity: impl Into<ActivityId>,
        kind: InterruptionKind,
    ) -> Result<()> {
        self.tree.get_mut(self.id)?.next_activity = Some(activity.into());
        let op = match kind {
            InterruptionKind::InterruptScope => AtomicOperation::ActivityStartInterruptScope,
            InterruptionKind::CancelScope => AtomicOperation::ActivityStartCancelScope,
        };
        self.enqueue_here(op)
    }

    /// Start an instance of another definition as a sub-process of the
    /// current execution. The current execution stays active and waits for
    /// the sub-process instance to end.
    pub fn create_sub_process_instance(
        &mut self,
        definition: impl Into<DefinitionKey>,
    ) -> Result<ExecutionId> {
        let key = definition.into();
        self.engine.definition(&key)?;
        let sub = self.tree.create_sub_process_instance(key, self.id)?;
        self.enqueue(sub, AtomicOperation::ProcessStart)?;
        Ok(sub)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: serde_json::Value) -> Result<()> {
        self.execution_mut()?.set_variable(name, value);
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<serde_json::Value> {
        self.tree
            .get(self.id)
            .ok()
            .and_then(|e| e.variable(name).cloned())
    }
}
