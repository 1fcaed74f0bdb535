//! Evaluator execution tracing (`[AMBIENT-LOG]`).
//!
//! Grounded on `examples/parcadei-ouros/crates/ouros/src/tracer.rs`'s `VmTracer`: a
//! trait of default-no-op hooks so the zero-cost tracer (here, [`NoopTracer`])
//! monomorphizes away entirely, with concrete implementations for human-readable
//! stderr logging and full-event recording. The core `ember` crate stays silent
//! otherwise — no `log`/`tracing` dependency — matching `ouros-cli`'s own direct
//! `eprintln!`/`println!` diagnostics rather than a logging facade.

use std::fmt;

/// One evaluator event, recorded by [`RecordingTracer`] for deterministic replay or
/// post-mortem inspection of a run.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    /// A function/method call pushed a new [`crate::dispatch::CallFrame`].
    Call { name: String, depth: usize },
    /// A call frame was popped (normal return).
    Return { name: String, depth: usize },
    /// An exception started unwinding.
    Thrown { class_name: String, depth: usize },
}

/// Hook points an [`Engine`](crate::engine::Engine) can be given to observe
/// evaluation. All methods default to no-ops, so an implementation only needs to
/// override the hooks it cares about — see [`NoopTracer`].
pub trait EvalTracer: fmt::Debug {
    /// Called by `DispatchState::new_call_frame` just after pushing.
    fn on_call(&mut self, _name: &str, _depth: usize) {}
    /// Called by `DispatchState::pop_call_frame` just before popping.
    fn on_return(&mut self, _name: &str, _depth: usize) {}
    /// Called when an exception begins unwinding through `eval`.
    fn on_thrown(&mut self, _class_name: &str, _depth: usize) {}
}

/// Zero-cost default: every hook is the trait's no-op default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// Prints a human-readable call/return/exception log to stderr, for interactive
/// debugging of an embedded script (`ember-cli --trace`, say).
#[derive(Debug, Default)]
pub struct StderrTracer {
    limit: Option<usize>,
    count: usize,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self { limit: None, count: 0 }
    }

    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit), count: 0 }
    }

    fn should_log(&mut self) -> bool {
        self.count += 1;
        self.limit.is_none_or(|limit| self.count <= limit)
    }
}

impl EvalTracer for StderrTracer {
    fn on_call(&mut self, name: &str, depth: usize) {
        if self.should_log() {
            eprintln!("  >>> call {name} depth={depth}");
        }
    }

    fn on_return(&mut self, name: &str, depth: usize) {
        if self.should_log() {
            eprintln!("  <<< return {name} depth={depth}");
        }
    }

    fn on_thrown(&mut self, class_name: &str, depth: usize) {
        if self.should_log() {
            eprintln!("  !!! throw {class_name} depth={depth}");
        }
    }
}

/// Records every event into an in-memory log for later inspection (tests, replay).
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }
}

impl EvalTracer for RecordingTracer {
    fn on_call(&mut self, name: &str, depth: usize) {
        self.events.push(TraceEvent::Call { name: name.to_string(), depth });
    }

    fn on_return(&mut self, name: &str, depth: usize) {
        self.events.push(TraceEvent::Return { name: name.to_string(), depth });
    }

    fn on_thrown(&mut self, class_name: &str, depth: usize) {
        self.events.push(TraceEvent::Thrown { class_name: class_name.to_string(), depth });
    }
}

#[cfg(test)]
mod tests {
    use super::{EvalTracer, RecordingTracer, TraceEvent};

    #[test]
    fn recording_tracer_accumulates_events_in_order() {
        let mut tracer = RecordingTracer::new();
        tracer.on_call("f", 1);
        tracer.on_return("f", 0);
        assert_eq!(tracer.events().len(), 2);
        assert!(matches!(tracer.events()[0], TraceEvent::Call { depth: 1, .. }));
        assert!(matches!(tracer.events()[1], TraceEvent::Return { depth: 0, .. }));
    }
}
