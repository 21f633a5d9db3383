//! Engine error taxonomy.
//!
//! Structural invariant violations are fatal and never retried. Behavior
//! failures keep their own type when they are already engine- or
//! process-typed; anything else is wrapped with the offending activity's
//! id/type so diagnosability survives the collaborator seam.

use crate::types::{ActivityId, DefinitionKey, ExecutionId, TransitionId};
use thiserror::Error;

/// A modeled, catchable process-level error. Behaviors and listeners may
/// raise one; only the explicitly marked operations are allowed to hand it
/// to the host's error-boundary mechanism instead of aborting the engine.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("process error '{code}': {message}")]
pub struct ProcessError {
    pub code: String,
    pub message: String,
}

impl ProcessError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Fatal and wrapped failures raised by the interpreter core.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown process definition '{0}'")]
    UnknownDefinition(DefinitionKey),

    #[error("unknown activity '{0}'")]
    UnknownActivity(ActivityId),

    #[error("unknown transition '{0}'")]
    UnknownTransition(TransitionId),

    #[error("unknown execution {0}")]
    UnknownExecution(ExecutionId),

    #[error("activity '{activity_id}' ({activity_type}) has no outgoing transitions")]
    NoOutgoingTransitions {
        activity_id: ActivityId,
        activity_type: String,
    },

    #[error("cannot leave activity '{activity_id}' ({activity_type}): behavior is not a flow node")]
    NotAFlowNode {
        activity_id: ActivityId,
        activity_type: String,
    },

    #[error("cannot destroy execution {execution}: {reason}")]
    InvalidDestroy {
        execution: ExecutionId,
        reason: String,
    },

    #[error("cannot remove execution {execution}: {reason}")]
    InvalidRemove {
        execution: ExecutionId,
        reason: String,
    },

    #[error("execution {0} has no pending operation to resume")]
    NothingToResume(ExecutionId),

    #[error("execution {0} is not positioned at an activity")]
    NoCurrentActivity(ExecutionId),

    #[error("instantiation stack of execution {0} is empty")]
    EmptyInstantiationStack(ExecutionId),

    #[error("unknown atomic operation '{0}'")]
    UnknownOperation(String),

    #[error("operation limit of {limit} exceeded on execution {execution}")]
    OperationLimitExceeded {
        execution: ExecutionId,
        limit: usize,
    },

    #[error("execution of activity '{activity_id}' ({activity_type}) failed on {execution}: {source}")]
    ActivityExecution {
        activity_id: ActivityId,
        activity_type: String,
        execution: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("sub-process completion failed on calling execution {execution}: {source}")]
    SubProcessCompletion {
        execution: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl EngineError {
    /// Wrap a behavior/listener failure with activity context. Failures that
    /// are already engine- or process-typed propagate unchanged.
    pub fn from_behavior(
        err: anyhow::Error,
        activity_id: &str,
        activity_type: &str,
        execution: String,
    ) -> Self {
        match err.downcast::<EngineError>() {
            Ok(engine) => engine,
            Err(err) => match err.downcast::<ProcessError>() {
                Ok(process) => EngineError::Process(process),
                Err(source) => EngineError::ActivityExecution {
                    activity_id: activity_id.to_string(),
                    activity_type: activity_type.to_string(),
                    execution,
                    source,
                },
            },
        }
    }

    /// The modeled process error carried by this failure, if any.
    pub fn as_process_error(&self) -> Option<&ProcessError> {
        match self {
            EngineError::Process(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
