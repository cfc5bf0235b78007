//! Status reporting: transition events and action progress.
//!
//! Sinks are injected into the orchestrator. Calls are synchronous and must
//! not block; a panicking sink is contained and logged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::context::RunStatus;

/// A single status transition of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub run_id: Uuid,
    pub campaign_id: String,
    pub topic: String,
    pub from: RunStatus,
    pub to: RunStatus,
    pub at: DateTime<Utc>,
    pub detail: Option<String>,
}

/// Receives every run status transition.
pub trait StatusSink: Send + Sync {
    fn on_transition(&self, event: &TransitionEvent);
}

/// State of one step inside an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Running,
    Done,
    Skipped,
    Failed,
}

/// Coarse progress display for long-running actions.
pub trait ActionTracker: Send + Sync {
    fn start_action(&self, action_id: &str, title: &str);
    fn add_step(&self, action_id: &str, step: &str);
    fn update_step(&self, action_id: &str, step: &str, state: StepState);
    fn set_progress(&self, action_id: &str, percent: u8);
    fn complete_action(&self, action_id: &str, summary: &str);
    fn fail_action(&self, action_id: &str, error: &str);
}

/// Logs transitions and action progress through `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn on_transition(&self, event: &TransitionEvent) {
        tracing::info!(
            run_id = %event.run_id,
            campaign = %event.campaign_id,
            topic = %event.topic,
            from = %event.from,
            to = %event.to,
            detail = event.detail.as_deref().unwrap_or(""),
            "Run transition"
        );
    }
}

impl ActionTracker for TracingSink {
    fn start_action(&self, action_id: &str, title: &str) {
        tracing::debug!(action = action_id, title = title, "Action started");
    }

    fn add_step(&self, action_id: &str, step: &str) {
        tracing::debug!(action = action_id, step = step, "Step added");
    }

    fn update_step(&self, action_id: &str, step: &str, state: StepState) {
        tracing::debug!(action = action_id, step = step, state = ?state, "Step updated");
    }

    fn set_progress(&self, action_id: &str, percent: u8) {
        tracing::trace!(action = action_id, percent = percent, "Progress");
    }

    fn complete_action(&self, action_id: &str, summary: &str) {
        tracing::debug!(action = action_id, summary = summary, "Action completed");
    }

    fn fail_action(&self, action_id: &str, error: &str) {
        tracing::debug!(action = action_id, error = error, "Action failed");
    }
}

/// Tracker that discards everything.
#[derive(Debug, Default, Clone)]
pub struct NoopTracker;

impl ActionTracker for NoopTracker {
    fn start_action(&self, _action_id: &str, _title: &str) {}
    fn add_step(&self, _action_id: &str, _step: &str) {}
    fn update_step(&self, _action_id: &str, _step: &str, _state: StepState) {}
    fn set_progress(&self, _action_id: &str, _percent: u8) {}
    fn complete_action(&self, _action_id: &str, _summary: &str) {}
    fn fail_action(&self, _action_id: &str, _error: &str) {}
}

/// Recorded tracker call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionCall {
    Start(String),
    Step(String),
    Update(String, StepState),
    Progress(u8),
    Complete(String),
    Fail(String),
}

/// Records transitions and tracker calls in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TransitionEvent>>,
    calls: Mutex<Vec<(String, ActionCall)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransitionEvent> {
        lock(&self.events).clone()
    }

    /// Statuses reached by a run, in order.
    pub fn trail(&self, run_id: Uuid) -> Vec<RunStatus> {
        lock(&self.events)
            .iter()
            .filter(|e| e.run_id == run_id)
            .map(|e| e.to)
            .collect()
    }

    pub fn calls(&self, action_id: &str) -> Vec<ActionCall> {
        lock(&self.calls)
            .iter()
            .filter(|(id, _)| id == action_id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    fn record(&self, action_id: &str, call: ActionCall) {
        lock(&self.calls).push((action_id.to_string(), call));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl StatusSink for MemorySink {
    fn on_transition(&self, event: &TransitionEvent) {
        lock(&self.events).push(event.clone());
    }
}

impl ActionTracker for MemorySink {
    fn start_action(&self, action_id: &str, title: &str) {
        self.record(action_id, ActionCall::Start(title.to_string()));
    }

    fn add_step(&self, action_id: &str, step: &str) {
        self.record(action_id, ActionCall::Step(step.to_string()));
    }

    fn update_step(&self, action_id: &str, step: &str, state: StepState) {
        self.record(action_id, ActionCall::Update(step.to_string(), state));
    }

    fn set_progress(&self, action_id: &str, percent: u8) {
        self.record(action_id, ActionCall::Progress(percent));
    }

    fn complete_action(&self, action_id: &str, summary: &str) {
        self.record(action_id, ActionCall::Complete(summary.to_string()));
    }

    fn fail_action(&self, action_id: &str, error: &str) {
        self.record(action_id, ActionCall::Fail(error.to_string()));
    }
}

/// Fans status out to the injected sink and tracker, containing panics.
#[derive(Clone)]
pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
    tracker: Arc<dyn ActionTracker>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self {
            sink: Arc::new(TracingSink),
            tracker: Arc::new(NoopTracker),
        }
    }
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn StatusSink>, tracker: Arc<dyn ActionTracker>) -> Self {
        Self { sink, tracker }
    }

    pub fn transition(&self, event: &TransitionEvent) {
        guarded("status sink", || self.sink.on_transition(event));
    }

    pub fn start(&self, action_id: &str, title: &str) {
        guarded("action tracker", || self.tracker.start_action(action_id, title));
    }

    pub fn step(&self, action_id: &str, step: &str, state: StepState) {
        guarded("action tracker", || {
            if state == StepState::Running {
                self.tracker.add_step(action_id, step);
            }
            self.tracker.update_step(action_id, step, state);
        });
    }

    pub fn progress(&self, action_id: &str, percent: u8) {
        guarded("action tracker", || {
            self.tracker.set_progress(action_id, percent.min(100))
        });
    }

    pub fn complete(&self, action_id: &str, summary: &str) {
        guarded("action tracker", || {
            self.tracker.complete_action(action_id, summary)
        });
    }

    pub fn fail(&self, action_id: &str, error: &str) {
        guarded("action tracker", || self.tracker.fail_action(action_id, error));
    }
}

fn guarded(what: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(callback = what, "Status callback panicked; continuing");
    }
}
