//! The execution tree: the only shared mutable resource in this core.
//!
//! Executions are kept in an arena addressed by stable id; parent/child
//! relationships are id references, never native pointers, which keeps the
//! exclusive parent-owns-child relationship explicit and makes the
//! destruction-ordering invariants checkable. All mutators preserve the
//! structural invariants and fail fast with a descriptive error instead of
//! corrupting the tree silently.

use crate::error::{EngineError, Result};
use crate::events::MutationEvent;
use crate::ops::AtomicOperation;
use crate::types::*;
use std::collections::BTreeMap;
use tracing::debug;

/// One token position in the process graph.
#[derive(Clone, Debug)]
pub struct Execution {
    pub(crate) id: ExecutionId,
    pub(crate) parent: Option<ExecutionId>,
    pub(crate) children: Vec<ExecutionId>,
    pub(crate) process_definition: DefinitionKey,
    pub(crate) process_instance: ExecutionId,
    pub(crate) activity: Option<ActivityId>,
    pub(crate) transition: Option<TransitionId>,
    pub(crate) pending_op: Option<AtomicOperation>,
    pub(crate) activity_instance: Option<ActivityInstanceId>,
    pub(crate) sequence_counter: u64,
    pub(crate) scope: bool,
    pub(crate) concurrent: bool,
    pub(crate) active: bool,
    pub(crate) ended: bool,
    pub(crate) event_scope: bool,
    pub(crate) process_instance_starting: bool,
    pub(crate) interrupted: Option<String>,
    pub(crate) super_execution: Option<ExecutionId>,
    pub(crate) super_case_execution: Option<CaseExecutionId>,
    pub(crate) sub_process_instance: Option<ExecutionId>,
    pub(crate) variables: BTreeMap<String, serde_json::Value>,

    // Step-scoped transients, never persisted.
    pub(crate) transitions_to_take: Vec<TransitionId>,
    pub(crate) instantiation: Option<ScopeInstantiation>,
    pub(crate) next_activity: Option<ActivityId>,
}

impl Execution {
    fn new(id: ExecutionId, process_definition: DefinitionKey, process_instance: ExecutionId) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            process_definition,
            process_instance,
            activity: None,
            transition: None,
            pending_op: None,
            activity_instance: None,
            sequence_counter: 0,
            scope: false,
            concurrent: false,
            active: false,
            ended: false,
            event_scope: false,
            process_instance_starting: false,
            interrupted: None,
            super_execution: None,
            super_case_execution: None,
            sub_process_instance: None,
            variables: BTreeMap::new(),
            transitions_to_take: Vec::new(),
            instantiation: None,
            next_activity: None,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn parent(&self) -> Option<ExecutionId> {
        self.parent
    }

    pub fn children(&self) -> &[ExecutionId] {
        &self.children
    }

    pub fn process_definition(&self) -> &DefinitionKey {
        &self.process_definition
    }

    /// Root of this execution's process instance; the root's own id.
    pub fn process_instance(&self) -> ExecutionId {
        self.process_instance
    }

    pub fn is_process_instance(&self) -> bool {
        self.parent.is_none()
    }

    pub fn activity(&self) -> Option<&ActivityId> {
        self.activity.as_ref()
    }

    pub fn transition(&self) -> Option<&TransitionId> {
        self.transition.as_ref()
    }

    pub fn pending_operation(&self) -> Option<AtomicOperation> {
        self.pending_op
    }

    pub fn activity_instance(&self) -> Option<ActivityInstanceId> {
        self.activity_instance
    }

    pub fn sequence_counter(&self) -> u64 {
        self.sequence_counter
    }

    pub fn is_scope(&self) -> bool {
        self.scope
    }

    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn is_event_scope(&self) -> bool {
        self.event_scope
    }

    pub fn interrupted_reason(&self) -> Option<&str> {
        self.interrupted.as_deref()
    }

    pub fn super_execution(&self) -> Option<ExecutionId> {
        self.super_execution
    }

    pub fn super_case_execution(&self) -> Option<&CaseExecutionId> {
        self.super_case_execution.as_ref()
    }

    pub fn sub_process_instance(&self) -> Option<ExecutionId> {
        self.sub_process_instance
    }

    pub fn variables(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&serde_json::Value> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.variables.insert(name.into(), value);
    }
}

impl std::fmt::Display for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "execution[{}, activity={}, scope={}, concurrent={}, active={}]",
            self.id,
            self.activity.as_deref().unwrap_or("<none>"),
            self.scope,
            self.concurrent,
            self.active
        )
    }
}

/// Arena of executions plus the structural mutation log.
#[derive(Default)]
pub struct ExecutionTree {
    executions: BTreeMap<ExecutionId, Execution>,
    log: Vec<MutationEvent>,
}

impl ExecutionTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Reads ──

    pub fn contains(&self, id: ExecutionId) -> bool {
        self.executions.contains_key(&id)
    }

    pub fn get(&self, id: ExecutionId) -> Result<&Execution> {
        self.executions
            .get(&id)
            .ok_or(EngineError::UnknownExecution(id))
    }

    pub fn get_mut(&mut self, id: ExecutionId) -> Result<&mut Execution> {
        self.executions
            .get_mut(&id)
            .ok_or(EngineError::UnknownExecution(id))
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    pub fn executions(&self) -> impl Iterator<Item = &Execution> {
        self.executions.values()
    }

    /// All executions belonging to the given process instance.
    pub fn instance_executions(&self, instance: ExecutionId) -> Vec<ExecutionId> {
        self.executions
            .values()
            .filter(|e| e.process_instance == instance)
            .map(|e| e.id)
            .collect()
    }

    /// Children of `id` that are not event-scope executions.
    pub fn non_event_scope_children(&self, id: ExecutionId) -> Result<Vec<ExecutionId>> {
        let exec = self.get(id)?;
        Ok(exec
            .children
            .iter()
            .copied()
            .filter(|c| {
                self.executions
                    .get(c)
                    .map(|e| !e.event_scope)
                    .unwrap_or(false)
            })
            .collect())
    }

    // ── Creation ──

    /// Create the root execution of a fresh process instance.
    pub fn create_process_instance(&mut self, definition: DefinitionKey) -> ExecutionId {
        let id = ExecutionId::generate();
        let mut exec = Execution::new(id, definition.clone(), id);
        exec.scope = true;
        exec.active = true;
        exec.process_instance_starting = true;
        self.executions.insert(id, exec);
        self.log.push(MutationEvent::ExecutionCreated {
            execution: id,
            parent: None,
            concurrent: false,
            scope: true,
        });
        self.log.push(MutationEvent::ProcessInstanceStarted {
            execution: id,
            definition,
        });
        id
    }

    /// Create the root execution of a process instance started as a
    /// sub-process of `super_execution`, linking both directions.
    pub fn create_sub_process_instance(
        &mut self,
        definition: DefinitionKey,
        super_execution: ExecutionId,
    ) -> Result<ExecutionId> {
        self.get(super_execution)?;
        let id = self.create_process_instance(definition);
        self.executions
            .get_mut(&id)
            .expect("just created")
            .super_execution = Some(super_execution);
        self.get_mut(super_execution)?.sub_process_instance = Some(id);
        Ok(id)
    }

    /// Create a child execution under `parent`.
    pub fn create_child(&mut self, parent: ExecutionId, scope: bool) -> Result<ExecutionId> {
        let (definition, instance) = {
            let p = self.get(parent)?;
            (p.process_definition.clone(), p.process_instance)
        };
        let id = ExecutionId::generate();
        let mut exec = Execution::new(id, definition, instance);
        exec.parent = Some(parent);
        exec.scope = scope;
        exec.active = true;
        self.executions.insert(id, exec);
        self.get_mut(parent)?.children.push(id);
        self.log.push(MutationEvent::ExecutionCreated {
            execution: id,
            parent: Some(parent),
            concurrent: false,
            scope,
        });
        Ok(id)
    }

    /// Create a concurrent sibling under the given scope execution. The new
    /// execution starts at the scope's current activity; the caller gives it
    /// a transition and drives it from there.
    pub fn create_concurrent_execution(&mut self, scope: ExecutionId) -> Result<ExecutionId> {
        let scope_exec = self.get(scope)?;
        if !scope_exec.scope {
            return Err(EngineError::InvalidDestroy {
                execution: scope,
                reason: "concurrent executions can only be created under a scope execution"
                    .to_string(),
            });
        }
        let activity = scope_exec.activity.clone();
        let id = self.create_child(scope, false)?;
        let exec = self.get_mut(id)?;
        exec.concurrent = true;
        exec.activity = activity;
        if let Some(event) = self.log.last_mut() {
            if let MutationEvent::ExecutionCreated { concurrent, .. } = event {
                *concurrent = true;
            }
        }
        Ok(id)
    }

    // ── Pointer mutation ──

    pub fn set_activity(&mut self, id: ExecutionId, activity: Option<ActivityId>) -> Result<()> {
        let exec = self.get_mut(id)?;
        if exec.activity != activity {
            exec.activity = activity.clone();
            self.log
                .push(MutationEvent::ActivitySet { execution: id, activity });
        }
        Ok(())
    }

    pub fn set_transition(
        &mut self,
        id: ExecutionId,
        transition: Option<TransitionId>,
    ) -> Result<()> {
        let exec = self.get_mut(id)?;
        if exec.transition != transition {
            exec.transition = transition.clone();
            self.log.push(MutationEvent::TransitionSet {
                execution: id,
                transition,
            });
        }
        Ok(())
    }

    // ── Activity instances ──

    /// Enter a new activity instance: bumps the sequence counter and assigns
    /// a fresh activity-instance id.
    pub fn enter_activity_instance(&mut self, id: ExecutionId) -> Result<ActivityInstanceId> {
        let exec = self.get_mut(id)?;
        exec.sequence_counter += 1;
        let instance = ActivityInstanceId::generate();
        exec.activity_instance = Some(instance);
        Ok(instance)
    }

    /// Leave the current activity instance, restoring the parent execution's
    /// instance id (or none at the root).
    pub fn leave_activity_instance(&mut self, id: ExecutionId) -> Result<()> {
        let (old, parent) = {
            let exec = self.get(id)?;
            (exec.activity_instance, exec.parent)
        };
        let parent_instance = match parent {
            Some(p) => self.get(p)?.activity_instance,
            None => None,
        };
        let exec = self.get_mut(id)?;
        exec.activity_instance = parent_instance;
        if let Some(instance) = old {
            self.log.push(MutationEvent::ActivityInstanceEnded {
                execution: id,
                activity_instance: instance,
            });
        }
        Ok(())
    }

    pub(crate) fn log_activity_instance_started(
        &mut self,
        id: ExecutionId,
        activity: ActivityId,
        activity_instance: ActivityInstanceId,
    ) {
        self.log.push(MutationEvent::ActivityInstanceStarted {
            execution: id,
            activity,
            activity_instance,
        });
    }

    // ── Structural removal ──

    /// Remove a leaf execution from the tree. Removing the last concurrent
    /// child of a scope reactivates the scope execution (the implicit join).
    pub fn remove(&mut self, id: ExecutionId) -> Result<()> {
        let exec = self.get(id)?;
        if !exec.children.is_empty() {
            return Err(EngineError::InvalidRemove {
                execution: id,
                reason: format!(
                    "{} children still attached; destruction must proceed child-before-parent",
                    exec.children.len()
                ),
            });
        }
        let was_concurrent = exec.concurrent;
        let parent = exec.parent;
        self.executions.remove(&id);
        self.log.push(MutationEvent::ExecutionRemoved { execution: id });

        if let Some(parent) = parent {
            if let Some(p) = self.executions.get_mut(&parent) {
                p.children.retain(|c| *c != id);
            }
            let any_concurrent_left = self
                .executions
                .get(&parent)
                .map(|p| {
                    p.children
                        .iter()
                        .any(|c| self.executions.get(c).map(|e| e.concurrent).unwrap_or(false))
                })
                .unwrap_or(false);
            if was_concurrent && !any_concurrent_left {
                if let Some(p) = self.executions.get_mut(&parent) {
                    p.active = true;
                    debug!(scope = %parent, "last concurrent child removed, scope reactivated");
                }
            }
        }
        Ok(())
    }

    /// Collapse a scope execution: copy the activity/transition pointers up
    /// to the parent, then remove the scope execution. Only valid for a
    /// childless, non-root scope execution.
    pub fn destroy(&mut self, id: ExecutionId) -> Result<ExecutionId> {
        let exec = self.get(id)?;
        if !exec.scope {
            return Err(EngineError::InvalidDestroy {
                execution: id,
                reason: "not a scope execution".to_string(),
            });
        }
        if !exec.children.is_empty() {
            return Err(EngineError::InvalidDestroy {
                execution: id,
                reason: format!("{} active children remain in the scope", exec.children.len()),
            });
        }
        let parent = exec.parent.ok_or_else(|| EngineError::InvalidDestroy {
            execution: id,
            reason: "process instance root cannot be destroyed".to_string(),
        })?;
        let activity = exec.activity.clone();
        let transition = exec.transition.clone();
        let activity_instance = exec.activity_instance;

        self.set_activity(parent, activity)?;
        self.set_transition(parent, transition)?;
        {
            let p = self.get_mut(parent)?;
            p.activity_instance = activity_instance;
            p.active = true;
        }
        self.log.push(MutationEvent::ScopeDestroyed { execution: id });
        self.remove(id)?;
        Ok(parent)
    }

    /// Forcibly clear a scope for an interrupting activity: removes every
    /// non-event-scope child subtree (child-before-parent) and records the
    /// interruption reason on the scope execution.
    pub fn interrupt(&mut self, id: ExecutionId, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        let doomed = self.non_event_scope_children(id)?;
        let mut removed = Vec::new();
        for child in &doomed {
            self.remove_cascade(*child, &mut removed)?;
        }
        let exec = self.get_mut(id)?;
        exec.interrupted = Some(reason.clone());
        self.log.push(MutationEvent::ScopeInterrupted {
            execution: id,
            reason,
            removed_children: removed,
        });
        Ok(())
    }

    fn remove_cascade(&mut self, id: ExecutionId, removed: &mut Vec<ExecutionId>) -> Result<()> {
        let children = self.get(id)?.children.clone();
        for child in children {
            self.remove_cascade(child, removed)?;
        }
        self.remove(id)?;
        removed.push(id);
        Ok(())
    }

    // ── Mutation log ──

    pub(crate) fn push_event(&mut self, event: MutationEvent) {
        self.log.push(event);
    }

    /// Drain the mutation log for the host's persistence layer. Called at
    /// transaction boundaries.
    pub fn take_log(&mut self) -> Vec<MutationEvent> {
        std::mem::take(&mut self.log)
    }

    pub fn log(&self) -> &[MutationEvent] {
        &self.log
    }

    // ── Persistence snapshot ──

    pub fn snapshot(&self) -> Vec<PersistedExecution> {
        self.executions
            .values()
            .map(|e| PersistedExecution {
                id: e.id,
                parent: e.parent,
                process_definition: e.process_definition.clone(),
                activity: e.activity.clone(),
                transition: e.transition.clone(),
                pending_operation: e.pending_op.map(|op| op.canonical_name().to_string()),
                activity_instance: e.activity_instance,
                sequence_counter: e.sequence_counter,
                scope: e.scope,
                concurrent: e.concurrent,
                active: e.active,
                ended: e.ended,
                event_scope: e.event_scope,
                process_instance_starting: e.process_instance_starting,
                super_execution: e.super_execution,
                super_case_execution: e.super_case_execution.clone(),
                sub_process_instance: e.sub_process_instance,
                variables: e.variables.clone(),
            })
            .collect()
    }

    /// Rebuild a tree from persisted state. The next step of every suspended
    /// execution is reconstructed purely from its persisted pending
    /// operation name.
    pub fn restore(records: Vec<PersistedExecution>) -> Result<Self> {
        let mut tree = Self::new();
        // First pass: materialize all executions.
        for r in &records {
            let pending_op = match &r.pending_operation {
                Some(name) => Some(
                    AtomicOperation::from_canonical_name(name)
                        .ok_or_else(|| EngineError::UnknownOperation(name.clone()))?,
                ),
                None => None,
            };
            let mut exec = Execution::new(r.id, r.process_definition.clone(), r.id);
            exec.parent = r.parent;
            exec.activity = r.activity.clone();
            exec.transition = r.transition.clone();
            exec.pending_op = pending_op;
            exec.activity_instance = r.activity_instance;
            exec.sequence_counter = r.sequence_counter;
            exec.scope = r.scope;
            exec.concurrent = r.concurrent;
            exec.active = r.active;
            exec.ended = r.ended;
            exec.event_scope = r.event_scope;
            exec.process_instance_starting = r.process_instance_starting;
            exec.super_execution = r.super_execution;
            exec.super_case_execution = r.super_case_execution.clone();
            exec.sub_process_instance = r.sub_process_instance;
            exec.variables = r.variables.clone();
            tree.executions.insert(r.id, exec);
        }
        // Second pass: rebuild child links and instance roots.
        for r in &records {
            if let Some(parent) = r.parent {
                if !tree.executions.contains_key(&parent) {
                    return Err(EngineError::UnknownExecution(parent));
                }
                tree.executions
                    .get_mut(&parent)
                    .expect("checked above")
                    .children
                    .push(r.id);
            }
        }
        let ids: Vec<ExecutionId> = tree.executions.keys().copied().collect();
        for id in ids {
            let root = tree.find_root(id)?;
            tree.executions.get_mut(&id).expect("present").process_instance = root;
        }
        Ok(tree)
    }

    fn find_root(&self, id: ExecutionId) -> Result<ExecutionId> {
        let mut current = id;
        loop {
            match self.get(current)?.parent {
                Some(p) => current = p,
                None => return Ok(current),
            }
        }
    }

    // ── Integrity ──

    /// Structural invariant check: parent/child back-references agree, no
    /// dangling child references, concurrent executions sit under a scope
    /// execution.
    pub fn validate(&self) -> Result<()> {
        for exec in self.executions.values() {
            for child in &exec.children {
                let c = self
                    .executions
                    .get(child)
                    .ok_or(EngineError::UnknownExecution(*child))?;
                if c.parent != Some(exec.id) {
                    return Err(EngineError::InvalidRemove {
                        execution: *child,
                        reason: format!("parent back-reference does not match {}", exec.id),
                    });
                }
            }
            if let Some(parent) = exec.parent {
                let p = self
                    .executions
                    .get(&parent)
                    .ok_or(EngineError::UnknownExecution(parent))?;
                if !p.children.contains(&exec.id) {
                    return Err(EngineError::InvalidRemove {
                        execution: exec.id,
                        reason: format!("not registered as a child of {parent}"),
                    });
                }
                if exec.concurrent && !p.scope {
                    return Err(EngineError::InvalidRemove {
                        execution: exec.id,
                        reason: "concurrent execution not owned by a scope execution".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
