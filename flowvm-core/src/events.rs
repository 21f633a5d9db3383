use crate::types::*;
use serde::{Deserialize, Serialize};

/// Structural mutation log entries — one per execution-tree mutation.
///
/// The interpreter never persists anything itself; it appends these to the
/// tree's log and the host drains them at the transaction boundary via
/// [`crate::tree::ExecutionTree::take_log`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum MutationEvent {
    ExecutionCreated {
        execution: ExecutionId,
        parent: Option<ExecutionId>,
        concurrent: bool,
        scope: bool,
    },
    ExecutionRemoved {
        execution: ExecutionId,
    },
    ScopeDestroyed {
        execution: ExecutionId,
    },
    ScopeInterrupted {
        execution: ExecutionId,
        reason: String,
        removed_children: Vec<ExecutionId>,
    },
    ActivitySet {
        execution: ExecutionId,
        activity: Option<ActivityId>,
    },
    TransitionSet {
        execution: ExecutionId,
        transition: Option<TransitionId>,
    },
    ActivityInstanceStarted {
        execution: ExecutionId,
        activity: ActivityId,
        activity_instance: ActivityInstanceId,
    },
    ActivityInstanceEnded {
        execution: ExecutionId,
        activity_instance: ActivityInstanceId,
    },
    ConcurrentForked {
        scope: ExecutionId,
        branches: Vec<ExecutionId>,
        transitions: Vec<TransitionId>,
    },
    ProcessInstanceStarted {
        execution: ExecutionId,
        definition: DefinitionKey,
    },
    ProcessInstanceEnded {
        execution: ExecutionId,
    },
    VariablesPassed {
        from: ExecutionId,
        to: ExecutionId,
    },
}
