//! Read-only process graph.
//!
//! The interpreter queries this model for activity/transition metadata and
//! behavior dispatch; it is never mutated at runtime. Activities nest: an
//! activity's `parent` is its flow scope (the scope activity it sits
//! inside), `None` for process-level activities.

use crate::behavior::{ActivityBehavior, ExecutionListener};
use crate::error::{EngineError, Result};
use crate::types::{ActivityId, DefinitionKey, TransitionId};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct Activity {
    id: ActivityId,
    /// Free-form type tag ("serviceTask", "endEvent", ...) used in
    /// diagnostics only.
    activity_type: String,
    parent: Option<ActivityId>,
    scope: bool,
    async_before: bool,
    incoming: Vec<TransitionId>,
    outgoing: Vec<TransitionId>,
    behavior: Arc<dyn ActivityBehavior>,
    listeners: BTreeMap<String, Vec<Arc<dyn ExecutionListener>>>,
}

impl Activity {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn activity_type(&self) -> &str {
        &self.activity_type
    }

    /// The scope activity this one nests inside, `None` at process level.
    pub fn flow_scope(&self) -> Option<&ActivityId> {
        self.parent.as_ref()
    }

    pub fn is_scope(&self) -> bool {
        self.scope
    }

    /// Whether the trampoline must suspend before entering this activity.
    pub fn is_async_before(&self) -> bool {
        self.async_before
    }

    pub fn incoming(&self) -> &[TransitionId] {
        &self.incoming
    }

    /// Outgoing transitions in declared order.
    pub fn outgoing(&self) -> &[TransitionId] {
        &self.outgoing
    }

    pub fn behavior(&self) -> Arc<dyn ActivityBehavior> {
        Arc::clone(&self.behavior)
    }

    pub fn listeners(&self, event: &str) -> &[Arc<dyn ExecutionListener>] {
        self.listeners.get(event).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub struct Transition {
    id: TransitionId,
    source: ActivityId,
    destination: ActivityId,
    take_listeners: Vec<Arc<dyn ExecutionListener>>,
}

impl Transition {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &ActivityId {
        &self.source
    }

    pub fn destination(&self) -> &ActivityId {
        &self.destination
    }

    pub fn take_listeners(&self) -> &[Arc<dyn ExecutionListener>] {
        &self.take_listeners
    }
}

/// A compiled, immutable process definition.
pub struct ProcessDefinition {
    key: DefinitionKey,
    initial: ActivityId,
    activities: BTreeMap<ActivityId, Activity>,
    transitions: BTreeMap<TransitionId, Transition>,
    listeners: BTreeMap<String, Vec<Arc<dyn ExecutionListener>>>,
}

impl std::fmt::Debug for ProcessDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessDefinition")
            .field("key", &self.key)
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

impl ProcessDefinition {
    pub fn builder(key: impl Into<DefinitionKey>) -> ProcessDefinitionBuilder {
        ProcessDefinitionBuilder::new(key)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn initial(&self) -> &ActivityId {
        &self.initial
    }

    pub fn activity(&self, id: &str) -> Result<&Activity> {
        self.activities
            .get(id)
            .ok_or_else(|| EngineError::UnknownActivity(id.to_string()))
    }

    pub fn transition(&self, id: &str) -> Result<&Transition> {
        self.transitions
            .get(id)
            .ok_or_else(|| EngineError::UnknownTransition(id.to_string()))
    }

    /// Process-scope listeners for the given phase.
    pub fn listeners(&self, event: &str) -> &[Arc<dyn ExecutionListener>] {
        self.listeners.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The chain of activities to instantiate when entering `activity` from
    /// the process scope: enclosing scopes outermost-first, then the
    /// activity itself.
    pub fn scope_chain(&self, activity: &str) -> Result<Vec<ActivityId>> {
        let mut chain = vec![self.activity(activity)?.id.clone()];
        let mut current = self.activity(activity)?.flow_scope().cloned();
        while let Some(scope) = current {
            let act = self.activity(&scope)?;
            chain.push(act.id.clone());
            current = act.flow_scope().cloned();
        }
        chain.reverse();
        Ok(chain)
    }

    /// Activities directly nested in the given scope.
    pub fn children_of(&self, scope: &str) -> Vec<&Activity> {
        self.activities
            .values()
            .filter(|a| a.parent.as_deref() == Some(scope))
            .collect()
    }
}

// ─── Builder ──────────────────────────────────────────────────

/// Chainable builder used by graph compilers and tests. Validates
/// referential integrity at `build` time.
pub struct ProcessDefinitionBuilder {
    key: DefinitionKey,
    initial: Option<ActivityId>,
    activities: Vec<Activity>,
    transitions: Vec<(TransitionId, ActivityId, ActivityId)>,
    take_listeners: BTreeMap<TransitionId, Vec<Arc<dyn ExecutionListener>>>,
    listeners: BTreeMap<String, Vec<Arc<dyn ExecutionListener>>>,
}

impl ProcessDefinitionBuilder {
    fn new(key: impl Into<DefinitionKey>) -> Self {
        Self {
            key: key.into(),
            initial: None,
            activities: Vec::new(),
            transitions: Vec::new(),
            take_listeners: BTreeMap::new(),
            listeners: BTreeMap::new(),
        }
    }

    pub fn activity(
        mut self,
        id: impl Into<ActivityId>,
        activity_type: impl Into<String>,
        behavior: Arc<dyn ActivityBehavior>,
    ) -> Self {
        self.activities.push(Activity {
            id: id.into(),
            activity_type: activity_type.into(),
            parent: None,
            scope: false,
            async_before: false,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            behavior,
            listeners: BTreeMap::new(),
        });
        self
    }

    /// Mark the most recently added activity as a scope.
    pub fn scope(mut self) -> Self {
        if let Some(last) = self.activities.last_mut() {
            last.scope = true;
        }
        self
    }

    /// Mark the most recently added activity as an async continuation point.
    pub fn async_before(mut self) -> Self {
        if let Some(last) = self.activities.last_mut() {
            last.async_before = true;
        }
        self
    }

    /// Nest the most recently added activity inside the given scope.
    pub fn in_scope(mut self, parent: impl Into<ActivityId>) -> Self {
        if let Some(last) = self.activities.last_mut() {
            last.parent = Some(parent.into());
        }
        self
    }

    /// Attach a listener to the most recently added activity.
    pub fn listener(mut self, event: impl Into<String>, l: Arc<dyn ExecutionListener>) -> Self {
        if let Some(last) = self.activities.last_mut() {
            last.listeners.entry(event.into()).or_default().push(l);
        }
        self
    }

    pub fn transition(
        mut self,
        id: impl Into<TransitionId>,
        source: impl Into<ActivityId>,
        destination: impl Into<ActivityId>,
    ) -> Self {
        self.transitions
            .push((id.into(), source.into(), destination.into()));
        self
    }

    pub fn take_listener(
        mut self,
        transition: impl Into<TransitionId>,
        l: Arc<dyn ExecutionListener>,
    ) -> Self {
        self.take_listeners
            .entry(transition.into())
            .or_default()
            .push(l);
        self
    }

    /// Attach a listener at process scope (start/end of the instance).
    pub fn process_listener(
        mut self,
        event: impl Into<String>,
        l: Arc<dyn ExecutionListener>,
    ) -> Self {
        self.listeners.entry(event.into()).or_default().push(l);
        self
    }

    pub fn initial(mut self, id: impl Into<ActivityId>) -> Self {
        self.initial = Some(id.into());
        self
    }

    pub fn build(mut self) -> Result<ProcessDefinition> {
        let mut activities: BTreeMap<ActivityId, Activity> = BTreeMap::new();
        for act in self.activities.drain(..) {
            activities.insert(act.id.clone(), act);
        }

        // Referential integrity before wiring anything up.
        for (id, source, destination) in &self.transitions {
            if !activities.contains_key(source) {
                return Err(EngineError::UnknownActivity(format!(
                    "{source} (source of transition '{id}')"
                )));
            }
            if !activities.contains_key(destination) {
                return Err(EngineError::UnknownActivity(format!(
                    "{destination} (destination of transition '{id}')"
                )));
            }
        }
        for act in activities.values() {
            if let Some(parent) = &act.parent {
                if !activities.contains_key(parent) {
                    return Err(EngineError::UnknownActivity(format!(
                        "{parent} (flow scope of activity '{}')",
                        act.id
                    )));
                }
            }
        }
        let initial = self
            .initial
            .ok_or_else(|| EngineError::UnknownActivity("<initial not set>".to_string()))?;
        if !activities.contains_key(&initial) {
            return Err(EngineError::UnknownActivity(initial));
        }

        let mut transitions = BTreeMap::new();
        for (id, source, destination) in self.transitions {
            activities
                .get_mut(&source)
                .expect("validated above")
                .outgoing
                .push(id.clone());
            activities
                .get_mut(&destination)
                .expect("validated above")
                .incoming
                .push(id.clone());
            let take_listeners = self.take_listeners.remove(&id).unwrap_or_default();
            transitions.insert(
                id.clone(),
                Transition {
                    id,
                    source,
                    destination,
                    take_listeners,
                },
            );
        }

        Ok(ProcessDefinition {
            key: self.key,
            initial,
            activities,
            transitions,
            listeners: self.listeners,
        })
    }
}
