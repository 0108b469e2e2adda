//! Event fan-out to external observers
//!
//! After each minute's state mutation the engine hands every new event to
//! every registered observer, in log order. A failing or panicking observer
//! is logged and counted; it never stops the simulation.

use crate::models::event::{Event, EventKind};
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("listener failed: {0}")]
    Failed(String),

    #[error("listener panicked: {0}")]
    Panicked(String),
}

/// Receiver for simulation events
pub trait SimulationObserver: Send {
    fn on_event(&mut self, kind: EventKind, event: &Event) -> Result<(), ListenerError>;
}

/// Observer backed by a closure
pub struct ListenerFn<F>(pub F);

impl<F> SimulationObserver for ListenerFn<F>
where
    F: FnMut(EventKind, &Event) -> Result<(), ListenerError> + Send,
{
    fn on_event(&mut self, kind: EventKind, event: &Event) -> Result<(), ListenerError> {
        (self.0)(kind, event)
    }
}

/// Registered observers
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn SimulationObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Box<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `events` to every observer; returns the number of failures
    pub fn notify(&mut self, events: &[Event]) -> u32 {
        let mut failures = 0;
        for event in events {
            let kind = event.kind();
            for (index, observer) in self.observers.iter_mut().enumerate() {
                let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_event(kind, event)))
                    .unwrap_or_else(|payload| Err(ListenerError::Panicked(panic_message(&payload))));
                if let Err(err) = outcome {
                    failures += 1;
                    tracing::warn!(
                        observer = index,
                        event = event.event_type(),
                        minute = event.minute(),
                        error = %err,
                        "observer failed; continuing"
                    );
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
