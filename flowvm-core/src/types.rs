use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ─── Scalar aliases ───────────────────────────────────────────

/// Graph-side identifier of an activity within a process definition.
pub type ActivityId = String;

/// Graph-side identifier of a transition within a process definition.
pub type TransitionId = String;

/// Key under which a compiled process definition is registered.
pub type DefinitionKey = String;

/// Opaque reference to a case execution owned by the case collaborator.
pub type CaseExecutionId = String;

// ─── Execution id ─────────────────────────────────────────────

/// Stable identity of one execution token. The root execution's id doubles
/// as the process instance id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one user-visible activity instance. Distinct from the id of
/// the execution currently occupying it: a scope execution and its parent
/// may share an activity instance, and an execution changes activity
/// instance every time it enters a new activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityInstanceId(pub Uuid);

impl ActivityInstanceId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for ActivityInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ─── Listener event names ─────────────────────────────────────

/// Listener phase fired when an activity instance starts.
pub const EVENT_START: &str = "start";
/// Listener phase fired when an activity instance ends.
pub const EVENT_END: &str = "end";
/// Listener phase fired when a transition is taken.
pub const EVENT_TAKE: &str = "take";

// ─── Instantiation stack ──────────────────────────────────────

/// Transient context used while several nested scopes are entered in one
/// logical step. Holds the activities still to be entered, outermost first.
/// The whole context is disposed once the stack is drained; it is never
/// persisted across a transaction boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeInstantiation {
    pub stack: Vec<ActivityId>,
}

impl ScopeInstantiation {
    pub fn new(stack: Vec<ActivityId>) -> Self {
        Self { stack }
    }
}

// ─── Persisted layout ─────────────────────────────────────────

/// The exact per-execution state that survives a suspension (and nothing
/// more). Consumed and produced by this core, owned by the host's
/// persistence layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedExecution {
    pub id: ExecutionId,
    pub parent: Option<ExecutionId>,
    pub process_definition: DefinitionKey,
    pub activity: Option<ActivityId>,
    pub transition: Option<TransitionId>,
    /// Canonical name of the pending atomic operation, if suspended.
    pub pending_operation: Option<String>,
    pub activity_instance: Option<ActivityInstanceId>,
    pub sequence_counter: u64,
    pub scope: bool,
    pub concurrent: bool,
    pub active: bool,
    pub ended: bool,
    pub event_scope: bool,
    pub process_instance_starting: bool,
    pub super_execution: Option<ExecutionId>,
    pub super_case_execution: Option<CaseExecutionId>,
    pub sub_process_instance: Option<ExecutionId>,
    pub variables: BTreeMap<String, serde_json::Value>,
}
