//! Resumable interpreter core for graph-shaped business processes.
//!
//! Process definitions are immutable graphs of activities and transitions;
//! running instances are trees of [`tree::Execution`] tokens driven by a
//! stack-based dispatcher over a fixed catalogue of
//! [`ops::AtomicOperation`]s. Every operation records the next step on the
//! execution it drives, so an instance can suspend at an async continuation
//! point, be persisted via [`tree::ExecutionTree::snapshot`], and picked up
//! again in a later transaction with [`interpreter::ProcessEngine::resume`].
//!
//! The core owns no I/O: persistence, job queues and the case collaborator
//! sit behind the [`behavior`] seams and the structural
//! [`events::MutationEvent`] log.

pub mod behavior;
pub mod error;
pub mod events;
pub mod graph;
pub mod interpreter;
pub mod ops;
pub mod testing;
pub mod tree;
pub mod types;

pub use behavior::{
    ActivityBehavior, CompositeBehavior, ExecutionListener, FlowNodeBehavior, ProcessErrorHandler,
    SubProcessBehavior, SuperCaseBridge,
};
pub use error::{EngineError, ProcessError, Result};
pub use events::MutationEvent;
pub use graph::{Activity, ProcessDefinition, ProcessDefinitionBuilder, Transition};
pub use interpreter::{EngineConfig, ExecutionCtx, InterruptionKind, ProcessEngine, RunOutcome};
pub use ops::AtomicOperation;
pub use tree::{Execution, ExecutionTree};
pub use types::{
    ActivityId, ActivityInstanceId, CaseExecutionId, DefinitionKey, ExecutionId,
    PersistedExecution, ScopeInstantiation, TransitionId, EVENT_END, EVENT_START, EVENT_TAKE,
};
